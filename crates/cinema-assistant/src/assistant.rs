use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::debug;

use crate::conversation::{ChatRequest, Conversation};
use crate::errors::StreamError;
use crate::session::{Reply, ReplySession};
use crate::stream::StreamEvent;
use crate::transport::ChatTransport;

/// Handle used to request cancellation of a running reply.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Cancellation is best-effort and becomes visible as a terminal
    /// `StreamEvent::Failed` with `StreamError::Cancelled`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Entry point for asking questions over a chat transport.
#[derive(Clone)]
pub struct Assistant {
    transport: Arc<dyn ChatTransport>,
}

impl Assistant {
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::default()
    }

    /// Records `question` in the conversation and starts streaming the reply.
    ///
    /// The caller stores the answer with `Conversation::record_reply` once the
    /// reply finishes.
    pub async fn ask(
        &self,
        conversation: &mut Conversation,
        question: impl Into<String>,
    ) -> Result<ReplyStream, StreamError> {
        conversation.push_user(question)?;
        self.reply(conversation.to_request()).await
    }

    /// Opens the response stream and starts decoding it on a background task.
    ///
    /// Upstream rejections and send failures are returned here, before any
    /// event is emitted.
    pub async fn reply(&self, request: ChatRequest) -> Result<ReplyStream, StreamError> {
        request.validate()?;
        let reply_id = uuid::Uuid::new_v4();
        let options = request.options.clone();
        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        debug!(%reply_id, transport = self.transport.name(), messages = request.messages.len(), "starting reply");

        let opening = self.transport.open_stream(request);
        let bytes = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, opening)
                .await
                .map_err(|_| StreamError::TimedOut)??,
            None => opening.await?,
        };

        let session = ReplySession::new(bytes);
        let message_rx = session.subscribe();
        let (tx, rx) = mpsc::channel(options.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);

        tokio::spawn(reply_task(
            reply_id, session, deadline, tx, final_tx, abort_rx,
        ));

        Ok(ReplyStream {
            reply_id,
            rx,
            final_rx,
            message_rx,
            abort_handle: AbortHandle { tx: abort_tx },
            saw_terminal: false,
        })
    }
}

/// Builder used to attach a transport before creating an `Assistant`.
#[derive(Default)]
pub struct AssistantBuilder {
    transport: Option<Arc<dyn ChatTransport>>,
}

impl AssistantBuilder {
    pub fn transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Assistant, StreamError> {
        let transport = self
            .transport
            .ok_or_else(|| StreamError::Config("assistant requires a chat transport".into()))?;
        Ok(Assistant { transport })
    }
}

/// Streaming handle returned by `Assistant::reply`.
///
/// Use `next_event()` to consume events as they arrive, `message_watch()` to
/// observe the assembled text, and `finish()` to obtain the final result.
pub struct ReplyStream {
    reply_id: uuid::Uuid,
    rx: mpsc::Receiver<StreamEvent>,
    final_rx: oneshot::Receiver<Result<Reply, StreamError>>,
    message_rx: watch::Receiver<String>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl ReplyStream {
    pub fn reply_id(&self) -> uuid::Uuid {
        self.reply_id
    }

    /// Returns a handle that can cancel the reply.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Receiver holding the full message assembled so far.
    pub fn message_watch(&self) -> watch::Receiver<String> {
        self.message_rx.clone()
    }

    /// Waits for and returns the next event.
    ///
    /// Returns `None` after the event channel is closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(StreamEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains the stream (if needed) and returns the terminal result.
    pub async fn finish(mut self) -> Result<Reply, StreamError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(StreamError::protocol_msg(format!(
                "reply task ended without final result (reply={})",
                self.reply_id
            ))),
        }
    }
}

enum Step {
    Abort(bool),
    HandleDropped,
    TimedOut,
    Next(Result<Option<String>, StreamError>),
}

async fn reply_task(
    reply_id: uuid::Uuid,
    mut session: ReplySession,
    deadline: Option<Instant>,
    tx: mpsc::Sender<StreamEvent>,
    final_tx: oneshot::Sender<Result<Reply, StreamError>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    if !send_event(&tx, StreamEvent::Started { reply_id }).await {
        let _ = final_tx.send(Err(StreamError::protocol_msg(
            "reply receiver dropped before Started",
        )));
        return;
    }

    let timer = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(timer);

    let mut seq = 0_u64;
    loop {
        let step = tokio::select! {
            changed = abort_rx.changed() => match changed {
                Ok(()) => {
                    let aborted = *abort_rx.borrow();
                    Step::Abort(aborted)
                }
                Err(_) => Step::HandleDropped,
            },
            () = &mut timer => Step::TimedOut,
            () = tx.closed() => Step::HandleDropped,
            next = session.next_fragment() => Step::Next(next),
        };

        match step {
            Step::Abort(false) => {}
            Step::Abort(true) => {
                debug!(%reply_id, seq, "reply cancelled");
                drop(session);
                fail(&tx, final_tx, reply_id, StreamError::Cancelled).await;
                return;
            }
            Step::HandleDropped => {
                debug!(%reply_id, seq, "reply handle dropped; releasing stream");
                return;
            }
            Step::TimedOut => {
                debug!(%reply_id, seq, "reply timed out");
                drop(session);
                fail(&tx, final_tx, reply_id, StreamError::TimedOut).await;
                return;
            }
            Step::Next(Ok(Some(text))) => {
                debug!(%reply_id, seq, len = text.len(), "reply fragment");
                let sent = send_event(&tx, StreamEvent::Fragment { reply_id, seq, text }).await;
                seq = seq.saturating_add(1);
                if !sent {
                    let _ = final_tx.send(Err(StreamError::protocol_msg(
                        "reply receiver dropped during output",
                    )));
                    return;
                }
            }
            Step::Next(Ok(None)) => {
                let reply = session.into_reply();
                debug!(%reply_id, fragments = reply.fragments, end_reason = ?reply.end_reason, "reply completed");
                let sent = send_event(
                    &tx,
                    StreamEvent::Completed {
                        reply_id,
                        reply: reply.clone(),
                    },
                )
                .await;
                let _ = final_tx.send(if sent {
                    Ok(reply)
                } else {
                    Err(StreamError::protocol_msg(
                        "reply receiver dropped before completion",
                    ))
                });
                return;
            }
            Step::Next(Err(err)) => {
                drop(session);
                fail(&tx, final_tx, reply_id, err).await;
                return;
            }
        }
    }
}

async fn fail(
    tx: &mpsc::Sender<StreamEvent>,
    final_tx: oneshot::Sender<Result<Reply, StreamError>>,
    reply_id: uuid::Uuid,
    error: StreamError,
) {
    let _ = send_event(
        tx,
        StreamEvent::Failed {
            reply_id,
            error: error.clone(),
        },
    )
    .await;
    let _ = final_tx.send(Err(error));
}

async fn send_event(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ChatMessage, Role};
    use crate::decoder::EndReason;
    use crate::transport::ByteStream;
    use bytes::Bytes;
    use futures::stream;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;

    struct FakeTransport {
        behavior: FakeBehavior,
        dropped: Arc<AtomicBool>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    enum FakeBehavior {
        Reject(StreamError),
        Chunks(Vec<Result<Bytes, StreamError>>),
        Pending,
    }

    /// Flags when the body stream is dropped.
    struct Guarded {
        inner: ByteStream,
        dropped: Arc<AtomicBool>,
    }

    impl futures::Stream for Guarded {
        type Item = Result<Bytes, StreamError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.as_mut().poll_next(cx)
        }
    }

    impl Drop for Guarded {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl ChatTransport for FakeTransport {
        fn name(&self) -> &str {
            "fake"
        }

        async fn open_stream(&self, request: ChatRequest) -> Result<ByteStream, StreamError> {
            self.requests.lock().expect("lock").push(request);
            let inner: ByteStream = match &self.behavior {
                FakeBehavior::Reject(err) => return Err(err.clone()),
                FakeBehavior::Chunks(chunks) => Box::pin(stream::iter(chunks.clone())),
                FakeBehavior::Pending => Box::pin(stream::pending()),
            };
            Ok(Box::pin(Guarded {
                inner,
                dropped: self.dropped.clone(),
            }))
        }
    }

    fn fake(behavior: FakeBehavior) -> (Assistant, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport {
            behavior,
            dropped: Arc::new(AtomicBool::new(false)),
            requests: Mutex::new(Vec::new()),
        });
        let assistant = Assistant::builder()
            .transport(transport.clone())
            .build()
            .expect("assistant");
        (assistant, transport)
    }

    fn data_line(content: &str) -> Bytes {
        Bytes::from(format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        ))
    }

    fn question(text: &str) -> ChatRequest {
        ChatRequest::new(vec![ChatMessage::user(text)])
    }

    #[tokio::test]
    async fn emits_started_fragments_and_completed() {
        let (assistant, _) = fake(FakeBehavior::Chunks(vec![
            Ok(data_line("Hel")),
            Ok(data_line("lo")),
            Ok(Bytes::from_static(b"data: [DONE]\n")),
        ]));
        let mut stream = assistant.reply(question("hi")).await.expect("start");

        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        let id = stream.reply_id();
        assert_eq!(events[0], StreamEvent::Started { reply_id: id });
        assert_eq!(
            events[1],
            StreamEvent::Fragment {
                reply_id: id,
                seq: 0,
                text: "Hel".into()
            }
        );
        assert_eq!(
            events[2],
            StreamEvent::Fragment {
                reply_id: id,
                seq: 1,
                text: "lo".into()
            }
        );
        assert!(matches!(&events[3], StreamEvent::Completed { reply, .. } if reply.message == "Hello"));
        assert_eq!(*stream.message_watch().borrow(), "Hello");

        let reply = stream.finish().await.expect("finish");
        assert_eq!(reply.message, "Hello");
        assert_eq!(reply.end_reason, Some(EndReason::Sentinel));
    }

    #[tokio::test]
    async fn read_error_after_two_fragments_fails_reply() {
        let (assistant, transport) = fake(FakeBehavior::Chunks(vec![
            Ok(data_line("a")),
            Ok(data_line("b")),
            Err(StreamError::read("reset by peer")),
        ]));
        let mut stream = assistant.reply(question("hi")).await.expect("start");
        let watch = stream.message_watch();

        let mut fragments = Vec::new();
        let mut failure = None;
        while let Some(event) = stream.next_event().await {
            match event {
                StreamEvent::Fragment { text, .. } => fragments.push(text),
                StreamEvent::Failed { error, .. } => {
                    failure = Some(error);
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(fragments, vec!["a", "b"]);
        assert_eq!(failure, Some(StreamError::read("reset by peer")));
        assert_eq!(*watch.borrow(), "ab");
        assert_eq!(stream.finish().await, Err(StreamError::read("reset by peer")));
        assert!(transport.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn upstream_rejection_is_a_start_error() {
        let (assistant, _) = fake(FakeBehavior::Reject(StreamError::upstream(
            402,
            "payment required",
        )));
        let err = assistant.reply(question("hi")).await;
        assert!(matches!(err, Err(StreamError::Upstream { status: 402, .. })));
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_transport() {
        let (assistant, transport) = fake(FakeBehavior::Chunks(Vec::new()));
        let err = assistant.reply(ChatRequest::new(Vec::new())).await;
        assert!(matches!(err, Err(StreamError::Validation(_))));
        assert!(transport.requests.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn cancellation_emits_terminal_error_and_releases_stream() {
        let (assistant, transport) = fake(FakeBehavior::Pending);
        let mut stream = assistant.reply(question("hi")).await.expect("start");
        let abort = stream.abort_handle();
        assert!(matches!(
            stream.next_event().await,
            Some(StreamEvent::Started { .. })
        ));
        abort.abort();

        let mut saw_cancel = false;
        while let Some(event) = stream.next_event().await {
            if let StreamEvent::Failed {
                error: StreamError::Cancelled,
                ..
            } = event
            {
                saw_cancel = true;
                break;
            }
        }
        assert!(saw_cancel);
        assert_eq!(stream.finish().await, Err(StreamError::Cancelled));
        assert!(transport.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropping_stream_releases_body_while_abort_handle_lives() {
        let (assistant, transport) = fake(FakeBehavior::Pending);
        let mut stream = assistant.reply(question("hi")).await.expect("start");
        let abort = stream.abort_handle();
        assert!(matches!(
            stream.next_event().await,
            Some(StreamEvent::Started { .. })
        ));
        drop(stream);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !transport.dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("body released");
        drop(abort);
    }

    #[tokio::test]
    async fn timeout_fails_a_stalled_reply() {
        let (assistant, transport) = fake(FakeBehavior::Pending);
        let stream = assistant
            .reply(question("hi").timeout(Duration::from_millis(20)))
            .await
            .expect("start");
        assert_eq!(stream.finish().await, Err(StreamError::TimedOut));
        assert!(transport.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn close_without_sentinel_completes() {
        let (assistant, _) = fake(FakeBehavior::Chunks(vec![Ok(data_line("tail"))]));
        let reply = assistant
            .reply(question("hi"))
            .await
            .expect("start")
            .finish()
            .await
            .expect("finish");
        assert_eq!(reply.message, "tail");
        assert_eq!(reply.end_reason, Some(EndReason::EndOfStream));
    }

    #[tokio::test]
    async fn ask_sends_history_and_records_question() {
        let (assistant, transport) = fake(FakeBehavior::Chunks(vec![
            Ok(data_line("1969")),
            Ok(Bytes::from_static(b"data: [DONE]\n")),
        ]));
        let mut conversation = Conversation::new();
        conversation.push_user("من أخرج فيلم الأرض؟").expect("question");
        conversation.record_reply("يوسف شاهين");

        let reply = assistant
            .ask(&mut conversation, "ومتى؟")
            .await
            .expect("start")
            .finish()
            .await
            .expect("finish");
        conversation.record_reply(reply.message);

        let sent = transport.requests.lock().expect("lock");
        assert_eq!(sent[0].messages.len(), 3);
        assert_eq!(sent[0].messages[2], ChatMessage::user("ومتى؟"));
        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation.messages()[3].role, Role::Assistant);
    }

    #[test]
    fn builder_requires_transport() {
        assert!(matches!(
            Assistant::builder().build(),
            Err(StreamError::Config(_))
        ));
    }
}

//! Streaming questions to the assistant and printing the answers.

use std::io::Write;
use std::time::Duration;

use cinema_assistant::prelude::*;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

/// Ctrl-C presses, from a single process-wide listener.
///
/// Once the first `tokio::signal::ctrl_c` listener exists, SIGINT no longer
/// terminates the process, so every place that waits on the user also waits
/// on this.
pub struct Interrupts {
    rx: mpsc::UnboundedReceiver<()>,
}

impl Interrupts {
    pub fn listen() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
        Self { rx }
    }

    /// Resolves on the next press; never resolves if the listener is gone.
    async fn next(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

/// Streams the reply to `question` into `out` and records it in the
/// conversation.
///
/// Ctrl-C cancels the reply in flight, and so does a failed write to `out`.
/// Text received before the cancel is kept in the conversation.
pub async fn ask_once(
    assistant: &Assistant,
    conversation: &mut Conversation,
    question: &str,
    timeout: Option<Duration>,
    interrupts: &mut Interrupts,
    out: &mut impl Write,
) -> Result<Reply, StreamError> {
    conversation.push_user(question)?;
    let mut request = conversation.to_request();
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let mut stream = assistant.reply(request).await?;
    let abort = stream.abort_handle();
    let message = stream.message_watch();
    let mut cancelled = false;
    loop {
        tokio::select! {
            event = stream.next_event() => match event {
                Some(StreamEvent::Fragment { text, .. }) => {
                    if let Err(err) = write_fragment(out, &text)
                        && !cancelled
                    {
                        debug!(error = %err, reply = %stream.reply_id(), "output closed; cancelling reply");
                        cancelled = true;
                        abort.abort();
                    }
                }
                Some(event) if event.is_terminal() => break,
                Some(_) => {}
                None => break,
            },
            () = interrupts.next(), if !cancelled => {
                cancelled = true;
                abort.abort();
            }
        }
    }
    if let Err(err) = writeln!(out) {
        debug!(error = %err, "could not terminate answer line");
    }

    let result = stream.finish().await;
    let partial = message.borrow().clone();
    conversation.record_reply(match &result {
        Ok(reply) => reply.message.clone(),
        Err(_) => partial,
    });
    result
}

/// Interactive loop on stdin; see `chat_loop`.
pub async fn run_chat(
    assistant: &Assistant,
    timeout: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut interrupts = Interrupts::listen();
    let input = BufReader::new(tokio::io::stdin());
    chat_loop(
        assistant,
        timeout,
        input,
        &mut interrupts,
        &mut std::io::stdout(),
    )
    .await
}

/// One question per input line, history kept between turns.
///
/// Empty lines are ignored; `/reset` clears the history; `/quit`, EOF or
/// Ctrl-C at the prompt ends the loop.
async fn chat_loop(
    assistant: &Assistant,
    timeout: Option<Duration>,
    input: impl AsyncBufRead + Unpin,
    interrupts: &mut Interrupts,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut conversation = Conversation::new();
    let mut lines = input.lines();

    prompt(out)?;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = interrupts.next() => {
                writeln!(out)?;
                break;
            }
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => {}
            "/quit" => break,
            "/reset" => {
                conversation.clear();
                writeln!(out, "(history cleared)")?;
            }
            question => {
                if let Err(err) =
                    ask_once(assistant, &mut conversation, question, timeout, interrupts, out).await
                {
                    tracing::warn!(error = %err, conversation = %conversation.id(), "reply failed");
                    writeln!(out, "error: {err}")?;
                }
            }
        }
        prompt(out)?;
    }
    Ok(())
}

fn write_fragment(out: &mut impl Write, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}

fn prompt(out: &mut impl Write) -> std::io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}

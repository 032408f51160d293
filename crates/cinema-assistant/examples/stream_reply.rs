use std::io::Write as _;
use std::sync::Arc;

use cinema_assistant::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StreamError> {
    let assistant = Assistant::builder()
        .transport(Arc::new(ChatClient::from_env()?))
        .build()?;

    let mut conversation = Conversation::new();
    let mut reply = assistant
        .ask(&mut conversation, "رشح لي فيلماً من بطولة فاتن حمامة.")
        .await?;

    while let Some(event) = reply.next_event().await {
        match event {
            StreamEvent::Fragment { text, .. } => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            StreamEvent::Completed { .. } => println!(),
            StreamEvent::Failed { error, .. } => eprintln!("reply error: {error}"),
            StreamEvent::Started { .. } => {}
        }
    }

    let reply = reply.finish().await?;
    conversation.record_reply(reply.message);
    Ok(())
}

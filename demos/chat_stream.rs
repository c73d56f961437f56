//! Stream a chat reply to stdout.
//!
//! Run with:
//! ```bash
//! export DELTASTREAM_API_URL="http://localhost:8000"
//! export DELTASTREAM_SESSION="fastapiusersauth=<token>"
//! RUST_LOG=deltastream=debug cargo run --example chat_stream -- "What is Rust?"
//! ```
//!
//! Ctrl-C cancels the stream and closes the connection.

use std::io::Write;

use futures::StreamExt;
use deltastream::ChatClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let question = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let question = if question.is_empty() {
        "Write a haiku about Rust programming.".to_string()
    } else {
        question
    };

    let client = ChatClient::from_env()?;
    let conversation = std::env::var("DELTASTREAM_CONVERSATION").ok();

    let mut deltas = match conversation {
        Some(id) => client.stream_message_in(id, question).await?,
        None => client.stream_message(question).await?,
    };

    let cancel = deltas.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let stats = deltas.stats();
    let mut stdout = std::io::stdout();
    while let Some(delta) = deltas.next().await {
        match delta {
            Ok(text) => {
                print!("{text}");
                stdout.flush()?;
            }
            Err(e) => {
                eprintln!("\nError in stream: {e}");
                return Err(e.into());
            }
        }
    }

    println!();
    tracing::info!(
        deltas = stats.deltas(),
        discarded = stats.discarded_frames(),
        done = stats.saw_done(),
        "stream finished"
    );

    Ok(())
}

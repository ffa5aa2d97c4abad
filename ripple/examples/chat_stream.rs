//! Example: stream a chat completion token by token.
//!
//! Requires OPENAI_API_KEY environment variable.
//!
//! Run with: OPENAI_API_KEY=sk-... cargo run --example chat_stream -p ripple

use std::io::Write;
use std::time::Duration;

use futures::StreamExt;
use ripple::{HttpTransport, JsonDecoder, StreamError, StreamRequest, StreamingSession};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let api_key = std::env::var("OPENAI_API_KEY")?;
    let request = StreamRequest::post("https://api.openai.com/v1/chat/completions")
        .bearer_auth(api_key)
        .json(&serde_json::json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "messages": [{"role": "user", "content": "Write a haiku about rivers."}],
        }))?;

    let transport = HttpTransport::new().timeout(Duration::from_secs(120));
    let mut events =
        StreamingSession::new(transport, JsonDecoder::<ChatChunk>::new()).into_stream(request);

    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            Ok(chunk) => {
                for choice in chunk.choices {
                    if let Some(text) = choice.delta.content {
                        write!(stdout, "{text}")?;
                        stdout.flush()?;
                    }
                    if let Some(reason) = choice.finish_reason {
                        writeln!(stdout, "\n[finish: {reason}]")?;
                    }
                }
            }
            Err(StreamError::Frame(err)) => eprintln!("\nskipped frame: {err}"),
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

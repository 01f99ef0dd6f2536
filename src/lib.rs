//! # streamchat - streaming answer client
//!
//! Consumes a server-pushed event stream over an HTTP response body and turns
//! it into a growing answer with an explicit, observable status.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Framing that survives arbitrary chunk boundaries (including split UTF-8)
//! - One event type for both request modes, validated per mode
//! - Cooperative cancellation through `CancellationToken`
//! - Block REST endpoints for one-shot generation and lookup
//!
//! ## Architecture
//!
//! ```text
//! bytes ─▶ Utf8Decoder ─▶ ChunkBuffer ─▶ parse_event ─▶ Accumulator ─▶ SessionStatus
//!                                                                  └──▶ SessionUpdate
//! ```
//!
//! ### Core Types
//!
//! - **`ChatClient`**: runs one session at a time and owns the shared status
//! - **`SessionHandle`**: updates, status, cancellation and outcome of one session
//! - **`SessionStatus`**: idle, streaming, completed or failed
//! - **`FinalResult`**: the answer, generated block or out-of-scope message
//!
//! ## Example
//! ```no_run
//! use streamchat::client::ChatClient;
//! use streamchat::options::TransportOptions;
//! use streamchat::session::SessionUpdate;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ChatClient::http(TransportOptions::new("http://localhost:8000"))?;
//!     let mut handle = client.ask("What changed in the last release?").await?;
//!
//!     while let Some(update) = handle.next_update().await {
//!         match update {
//!             SessionUpdate::Progress { status_text, partial_answer } => {
//!                 println!("[{}] {}", status_text, partial_answer);
//!             }
//!             SessionUpdate::Finished(result) => println!("{:?}", result),
//!             SessionUpdate::Failed(reason) => eprintln!("failed: {}", reason),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod blocks;
pub mod client;
pub mod dispatch;
pub mod event;
pub mod http;
pub mod model;
pub mod options;
pub mod session;
pub mod sse;
pub mod status;
pub mod transport;

// Re-exports for convenience
pub use client::{ChatClient, ClientError};
pub use model::{BlockData, FinalResult, Mode, StreamRequest};
pub use session::{SessionHandle, SessionOutcome, SessionUpdate, StreamSession};
pub use status::SessionStatus;

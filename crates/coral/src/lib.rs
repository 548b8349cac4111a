//! # Coral client
//!
//! Client for a Coral multi-agent session server: session bootstrap over
//! HTTP and the per-session debug WebSocket.
//!
//! ```rust,no_run
//! use coral::{ClientOptions, CoralClient, WsClient, WsClientOptions, WsUpdate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ClientOptions::new("localhost", 5555, "app", "privacy-key");
//!     let client = CoralClient::new(options)?;
//!     let session_id = client.create_session().await?;
//!
//!     let mut socket = WsClient::new(WsClientOptions::new(
//!         client.base_url(),
//!         client.application_id(),
//!         client.privacy_key(),
//!         &session_id,
//!     ))?;
//!     let mut updates = socket.connect();
//!
//!     while let Some(update) = updates.recv().await {
//!         if let WsUpdate::Event(event) = update {
//!             println!("{event:?}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod types;
pub mod ws;

pub use client::{new_session_id, ClientOptions, CoralClient};
pub use error::{CoralError, Result};
pub use ws::{
    ReconnectPolicy, UpdateReceiver, WsClient, WsClientOptions, WsLifecycleEvent, WsUpdate,
};

pub use types::{
    Agent, AgentGraphRequest, AgentOption, AgentProvider, AgentRegistryId, CoralEvent,
    CreateSessionRequest, CreateSessionResponse, GraphAgent, MessageRole, OutboundFrame,
    ProviderCredentials, SessionEvent, Thread, ToolRequest,
};

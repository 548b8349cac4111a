//! HTTP client for bootstrapping Coral sessions.

use reqwest::Client;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CoralError, Result};
use crate::types::{
    AgentGraphRequest, CreateSessionRequest, CreateSessionResponse, ProviderCredentials,
};

const SESSIONS_PATH: &str = "/api/v1/sessions";

/// Options for creating a session client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the Coral server, e.g. `http://localhost:5555`.
    pub base_url: String,
    /// The application id the session is created under.
    pub application_id: String,
    /// The privacy key paired with the application id.
    pub privacy_key: String,
    /// Credentials embedded in the agent graph.
    pub credentials: ProviderCredentials,
}

impl ClientOptions {
    /// Create options for a server reachable at `host:port`.
    pub fn new(
        host: impl AsRef<str>,
        port: u16,
        application_id: impl Into<String>,
        privacy_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: format!("http://{}:{}", host.as_ref(), port),
            application_id: application_id.into(),
            privacy_key: privacy_key.into(),
            credentials: ProviderCredentials::default(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the provider credentials handed to the agents.
    pub fn with_credentials(mut self, credentials: ProviderCredentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Client for the Coral session API.
#[derive(Debug, Clone)]
pub struct CoralClient {
    http: Client,
    base_url: String,
    application_id: String,
    privacy_key: String,
    credentials: ProviderCredentials,
}

impl CoralClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let http = Client::builder().build()?;

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            application_id: options.application_id,
            privacy_key: options.privacy_key,
            credentials: options.credentials,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn privacy_key(&self) -> &str {
        &self.privacy_key
    }

    /// Build the request body for a new session with the fixed
    /// interface/debugger topology.
    pub fn session_request(&self) -> CreateSessionRequest {
        CreateSessionRequest {
            application_id: self.application_id.clone(),
            privacy_key: self.privacy_key.clone(),
            session_id: new_session_id(),
            agent_graph_request: AgentGraphRequest::interface_and_debugger(&self.credentials),
        }
    }

    /// Create a session and return the id the server assigned to it.
    ///
    /// A non-2xx answer fails with [`CoralError::Api`] carrying the status
    /// and the body verbatim. There is no retry.
    pub async fn create_session(&self) -> Result<String> {
        let request = self.session_request();
        let url = format!("{}{}", self.base_url, SESSIONS_PATH);
        debug!(
            url = %url,
            requested_session_id = %request.session_id,
            "creating coral session"
        );

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CoralError::api(status.as_u16(), body));
        }

        let created: CreateSessionResponse = serde_json::from_str(&body)
            .map_err(|err| CoralError::InvalidResponse(err.to_string()))?;
        info!(session_id = %created.session_id, "coral session created");
        Ok(created.session_id)
    }
}

/// A fresh client-side session id, `session-<uuid>`.
pub fn new_session_id() -> String {
    format!("session-{}", Uuid::new_v4())
}

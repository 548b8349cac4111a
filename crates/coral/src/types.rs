//! Wire types for the Coral session API and the debug WebSocket.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// === Session bootstrap ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub application_id: String,
    pub privacy_key: String,
    pub session_id: String,
    pub agent_graph_request: AgentGraphRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentGraphRequest {
    pub agents: Vec<GraphAgent>,
    pub groups: Vec<Vec<String>>,
    #[serde(default)]
    pub custom_tools: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphAgent {
    pub id: AgentRegistryId,
    pub name: String,
    pub description: String,
    pub options: BTreeMap<String, AgentOption>,
    pub system_prompt: String,
    pub blocking: bool,
    #[serde(default)]
    pub custom_tool_access: Vec<String>,
    #[serde(default)]
    pub coral_plugins: Vec<Value>,
    pub provider: AgentProvider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistryId {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOption {
    #[serde(rename = "type")]
    pub option_type: String,
    pub value: String,
}

impl AgentOption {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            option_type: "string".to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProvider {
    #[serde(rename = "type")]
    pub provider_type: String,
    pub runtime: String,
}

impl AgentProvider {
    pub fn local_docker() -> Self {
        Self {
            provider_type: "local".to_string(),
            runtime: "docker".to_string(),
        }
    }
}

/// Provider credentials handed to the agents of a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub deepseek_api_key: String,
    pub qdrant_api_key: String,
    pub qdrant_url: String,
    pub codestral_api_key: String,
}

pub const INTERFACE_AGENT_NAME: &str = "interface";
pub const DEBUG_AGENT_NAME: &str = "debugger";

impl AgentGraphRequest {
    /// The fixed topology: one interface agent and one debugging agent in a
    /// single group.
    pub fn interface_and_debugger(creds: &ProviderCredentials) -> Self {
        let interface = GraphAgent {
            id: AgentRegistryId {
                name: "interface-agent".to_string(),
                version: "1.0.0".to_string(),
            },
            name: INTERFACE_AGENT_NAME.to_string(),
            description: "User interface agent for interaction".to_string(),
            options: BTreeMap::from([(
                "DEEPSEEK_API_KEY".to_string(),
                AgentOption::string(&creds.deepseek_api_key),
            )]),
            system_prompt: "You are a helpful interface agent that facilitates user interactions."
                .to_string(),
            blocking: true,
            custom_tool_access: Vec::new(),
            coral_plugins: Vec::new(),
            provider: AgentProvider::local_docker(),
        };

        let debugger = GraphAgent {
            id: AgentRegistryId {
                name: "unified-debug-agent".to_string(),
                version: "1.0.0".to_string(),
            },
            name: DEBUG_AGENT_NAME.to_string(),
            description: "Unified debugging agent for code analysis and fixes".to_string(),
            options: BTreeMap::from([
                (
                    "DEEPSEEK_API_KEY".to_string(),
                    AgentOption::string(&creds.deepseek_api_key),
                ),
                (
                    "QDRANT_API_KEY".to_string(),
                    AgentOption::string(&creds.qdrant_api_key),
                ),
                (
                    "QDRANT_URL".to_string(),
                    AgentOption::string(&creds.qdrant_url),
                ),
                (
                    "CODESTRAL_API_KEY".to_string(),
                    AgentOption::string(&creds.codestral_api_key),
                ),
            ]),
            system_prompt:
                "You are a unified debugging agent that handles complete debugging workflows."
                    .to_string(),
            blocking: true,
            custom_tool_access: Vec::new(),
            coral_plugins: Vec::new(),
            provider: AgentProvider::local_docker(),
        };

        Self {
            agents: vec![interface, debugger],
            groups: vec![vec![
                INTERFACE_AGENT_NAME.to_string(),
                DEBUG_AGENT_NAME.to_string(),
            ]],
            custom_tools: Map::new(),
        }
    }
}

// === Roster ===

/// An agent as reported by the session roster. Fields the relay does not
/// interpret are kept in `extra` and forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Agent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            state: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub participants: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// === Inbound events ===

/// A tool invocation an agent asks the session client to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl ToolRequest {
    /// String parameter lookup; absent or non-string values read as `None`.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Frames received on the debug WebSocket, keyed by their `type` tag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoralEvent {
    DebugAgentRegistered {
        id: String,
    },
    AgentList {
        #[serde(
            rename = "sessionAgents",
            default,
            deserialize_with = "null_as_empty"
        )]
        session_agents: Vec<Agent>,
    },
    ThreadList {
        #[serde(default, deserialize_with = "null_as_empty")]
        threads: Vec<Thread>,
    },
    Session {
        event: SessionEvent,
    },
    ToolRequest(ToolRequest),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    AgentReady {
        #[serde(default)]
        agent: Value,
    },
    AgentRegistered {
        agent: Agent,
    },
    #[serde(rename_all = "camelCase")]
    AgentStateUpdated {
        agent_id: String,
        #[serde(default)]
        state: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MessageSent {
        thread_id: String,
        #[serde(default)]
        message: Value,
    },
    ThreadCreated(Thread),
    #[serde(other)]
    Unknown,
}

// === Outbound frames ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
}

/// Frames written to the debug WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    CreateThread {
        name: String,
        participants: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        thread_id: String,
        content: String,
        role: MessageRole,
    },
    #[serde(rename_all = "camelCase")]
    UserResponse {
        request_id: String,
        response: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolResponse {
        request_id: String,
        result: Value,
    },
    UserMessage {
        content: String,
        role: MessageRole,
    },
}

impl OutboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateThread { .. } => "create_thread",
            Self::SendMessage { .. } => "send_message",
            Self::UserResponse { .. } => "user_response",
            Self::ToolResponse { .. } => "tool_response",
            Self::UserMessage { .. } => "user_message",
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

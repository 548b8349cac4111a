//! Browser-facing protocol: `{"event": <name>, "data": <payload>}` text frames.

use coral::{Agent, Thread};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::questions::AgentQuestion;

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Commands the browser sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    CreateSession,
    #[serde(rename_all = "camelCase")]
    SendMessage {
        #[serde(default)]
        thread_id: Option<String>,
        content: String,
        #[serde(default)]
        create_thread: bool,
    },
    CreateThread {
        name: String,
        #[serde(default)]
        participants: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    UserResponse {
        request_id: String,
        response: String,
    },
    ListQuestions,
}

impl ClientCommand {
    /// Payloads on `create-session` and `list-questions` are ignored.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let Envelope { event, data } = serde_json::from_str(text)?;
        match event.as_str() {
            "create-session" => Ok(Self::CreateSession),
            "list-questions" => Ok(Self::ListQuestions),
            _ => serde_json::from_value(json!({ "event": event, "data": data })),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateSession => "create-session",
            Self::SendMessage { .. } => "send-message",
            Self::CreateThread { .. } => "create-thread",
            Self::UserResponse { .. } => "user-response",
            Self::ListQuestions => "list-questions",
        }
    }
}

/// Events pushed to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    SessionCreated { session_id: String },
    AgentsUpdated(Vec<Agent>),
    ThreadsUpdated(Vec<Thread>),
    #[serde(rename_all = "camelCase")]
    MessageReceived { thread_id: String, message: Value },
    AgentQuestion(AgentQuestion),
    #[serde(rename_all = "camelCase")]
    ResponseSent { question_id: String, answer: String },
    ConnectionStatus {
        connected: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Error(ErrorPayload),
    QuestionsList(Vec<AgentQuestion>),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
            error: None,
            question_id: None,
        })
    }

    pub fn error_with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
            error: Some(detail.into()),
            question_id: None,
        })
    }

    pub fn invalid_question(question_id: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: "Invalid question ID".to_string(),
            error: None,
            question_id: Some(question_id.into()),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{ClientCommand, ServerEvent};

    #[test]
    fn parses_every_browser_command() {
        assert_eq!(
            ClientCommand::parse(r#"{"event":"create-session"}"#).unwrap(),
            ClientCommand::CreateSession
        );
        assert_eq!(
            ClientCommand::parse(
                r#"{"event":"send-message","data":{"threadId":"t1","content":"hi"}}"#
            )
            .unwrap(),
            ClientCommand::SendMessage {
                thread_id: Some("t1".into()),
                content: "hi".into(),
                create_thread: false,
            }
        );
        assert_eq!(
            ClientCommand::parse(
                r#"{"event":"send-message","data":{"content":"hi","createThread":true}}"#
            )
            .unwrap(),
            ClientCommand::SendMessage {
                thread_id: None,
                content: "hi".into(),
                create_thread: true,
            }
        );
        assert_eq!(
            ClientCommand::parse(
                r#"{"event":"create-thread","data":{"name":"triage","participants":["a"]}}"#
            )
            .unwrap(),
            ClientCommand::CreateThread {
                name: "triage".into(),
                participants: vec!["a".into()],
            }
        );
        assert_eq!(
            ClientCommand::parse(
                r#"{"event":"user-response","data":{"requestId":"q1","response":"yes"}}"#
            )
            .unwrap(),
            ClientCommand::UserResponse {
                request_id: "q1".into(),
                response: "yes".into(),
            }
        );
        assert_eq!(
            ClientCommand::parse(r#"{"event":"list-questions"}"#).unwrap(),
            ClientCommand::ListQuestions
        );
    }

    #[test]
    fn payloadless_commands_ignore_any_data() {
        for data in [r#"{}"#, "null", r#"{"reason":"retry"}"#, "[1,2]"] {
            assert_eq!(
                ClientCommand::parse(&format!(r#"{{"event":"create-session","data":{data}}}"#))
                    .unwrap(),
                ClientCommand::CreateSession
            );
            assert_eq!(
                ClientCommand::parse(&format!(r#"{{"event":"list-questions","data":{data}}}"#))
                    .unwrap(),
                ClientCommand::ListQuestions
            );
        }
    }

    #[test]
    fn rejects_unknown_and_incomplete_commands() {
        assert!(ClientCommand::parse(r#"{"event":"reboot"}"#).is_err());
        assert!(ClientCommand::parse(r#"{"event":"user-response","data":{}}"#).is_err());
        assert!(ClientCommand::parse(r#"{"event":"send-message"}"#).is_err());
        assert!(ClientCommand::parse(r#"{"data":{}}"#).is_err());
        assert!(ClientCommand::parse("not json").is_err());
    }

    #[test]
    fn server_events_use_the_event_data_envelope() {
        let created: Value = serde_json::from_str(
            &ServerEvent::SessionCreated {
                session_id: "s-1".into(),
            }
            .to_json()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(
            created,
            json!({"event": "session-created", "data": {"sessionId": "s-1"}})
        );

        let status = serde_json::to_value(ServerEvent::ConnectionStatus {
            connected: true,
            error: None,
        })
        .unwrap();
        assert_eq!(
            status,
            json!({"event": "connection-status", "data": {"connected": true}})
        );

        let invalid = serde_json::to_value(ServerEvent::invalid_question("q9")).unwrap();
        assert_eq!(
            invalid,
            json!({"event": "error", "data": {"message": "Invalid question ID", "questionId": "q9"}})
        );

        let failed = serde_json::to_value(ServerEvent::error_with_detail(
            "Failed to create session",
            "HTTP 500: boom",
        ))
        .unwrap();
        assert_eq!(
            failed["data"],
            json!({"message": "Failed to create session", "error": "HTTP 500: boom"})
        );
    }

    #[test]
    fn agents_updated_carries_a_plain_array() {
        let event = ServerEvent::AgentsUpdated(vec![coral::Agent::new("a")]);
        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["event"], "agents-updated");
        assert_eq!(value["data"][0]["id"], "a");
    }
}

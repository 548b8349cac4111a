use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use coral::ToolRequest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

pub const REQUEST_QUESTION_TOOL: &str = "request-question";
pub const ANSWER_QUESTION_TOOL: &str = "answer-question";

/// A question as the browser sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentQuestion {
    pub id: String,
    pub question: String,
    pub context: String,
    pub timestamp: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// A question waiting for an answer, with the tool request that asked it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuestion {
    pub question: AgentQuestion,
    pub request: ToolRequest,
    seq: u64,
}

/// Correlates browser-facing question ids with the tool requests that raised
/// them. Each entry is answered at most once.
#[derive(Debug, Default)]
pub struct PendingQuestions {
    entries: HashMap<String, PendingQuestion>,
    next_seq: u64,
}

impl PendingQuestions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `request-question` tool request under a fresh id. A
    /// non-string question is shown as its JSON text; a missing one as "".
    pub fn ask(&mut self, request: ToolRequest) -> AgentQuestion {
        let text = match request.params.get("question") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => {
                tracing::warn!(
                    request_id = %request.id,
                    "request-question without a question parameter"
                );
                String::new()
            }
            Some(other) => other.to_string(),
        };

        let question = AgentQuestion {
            id: Uuid::new_v4().to_string(),
            question: text,
            context: request.param_str("context").unwrap_or_default().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            agent_id: request.agent_id.clone(),
            thread_id: request.thread_id.clone(),
        };

        self.next_seq += 1;
        self.entries.insert(
            question.id.clone(),
            PendingQuestion {
                question: question.clone(),
                request,
                seq: self.next_seq,
            },
        );
        question
    }

    /// Remove and return the entry; a second call for the same id yields `None`.
    pub fn take(&mut self, id: &str) -> Option<PendingQuestion> {
        self.entries.remove(id)
    }

    /// Put an entry back after a failed forward; it keeps its place in `active()`.
    pub fn restore(&mut self, pending: PendingQuestion) {
        self.entries.insert(pending.question.id.clone(), pending);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Pending questions in arrival order.
    pub fn active(&self) -> Vec<AgentQuestion> {
        let mut pending: Vec<&PendingQuestion> = self.entries.values().collect();
        pending.sort_by_key(|entry| entry.seq);
        pending
            .into_iter()
            .map(|entry| entry.question.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Payload of the `tool_response` that answers a question.
pub fn answer_result(answer: Value) -> Value {
    json!({ "success": true, "result": answer })
}

#[cfg(test)]
mod tests {
    use coral::ToolRequest;
    use serde_json::json;

    use super::{answer_result, PendingQuestions};

    fn ask_request(id: &str, params: serde_json::Value) -> ToolRequest {
        ToolRequest {
            id: id.to_string(),
            tool: "request-question".to_string(),
            params,
            agent_id: Some("agent-1".to_string()),
            thread_id: Some("thread-1".to_string()),
        }
    }

    #[test]
    fn ask_assigns_fresh_id_and_defaults_context() {
        let mut pending = PendingQuestions::new();
        let question = pending.ask(ask_request("req-1", json!({"question": "Proceed?"})));

        assert_ne!(question.id, "req-1");
        assert_eq!(question.question, "Proceed?");
        assert_eq!(question.context, "");
        assert_eq!(question.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(question.thread_id.as_deref(), Some("thread-1"));
        assert!(question.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&question.timestamp).is_ok());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn ask_registers_requests_without_string_question_text() {
        let mut pending = PendingQuestions::new();
        let missing = pending.ask(ask_request("req-1", json!({"context": "only context"})));
        let null = pending.ask(ask_request("req-2", json!({"question": null})));
        let structured = pending.ask(ask_request("req-3", json!({"question": {"pick": [1, 2]}})));
        let number = pending.ask(ask_request("req-4", json!({"question": 42})));

        assert_eq!(missing.question, "");
        assert_eq!(missing.context, "only context");
        assert_eq!(null.question, "");
        assert_eq!(structured.question, r#"{"pick":[1,2]}"#);
        assert_eq!(number.question, "42");
        assert_eq!(pending.len(), 4);

        let taken = pending.take(&missing.id).expect("registered under its id");
        assert_eq!(taken.request.id, "req-1");
    }

    #[test]
    fn take_answers_at_most_once() {
        let mut pending = PendingQuestions::new();
        let question = pending.ask(ask_request("req-1", json!({"question": "Q", "context": "C"})));

        let taken = pending.take(&question.id).expect("first take succeeds");
        assert_eq!(taken.request.id, "req-1");
        assert_eq!(taken.question.context, "C");
        assert!(pending.take(&question.id).is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn active_lists_in_arrival_order_and_clear_empties() {
        let mut pending = PendingQuestions::new();
        let first = pending.ask(ask_request("req-1", json!({"question": "one"})));
        let second = pending.ask(ask_request("req-2", json!({"question": "two"})));

        let ids: Vec<_> = pending.active().into_iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![first.id.clone(), second.id.clone()]);

        let taken = pending.take(&first.id).unwrap();
        pending.restore(taken);
        let ids: Vec<_> = pending.active().into_iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        pending.clear();
        assert!(pending.active().is_empty());
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn answer_result_wraps_answer() {
        assert_eq!(
            answer_result(json!("yes")),
            json!({"success": true, "result": "yes"})
        );
    }
}

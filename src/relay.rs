//! Per-connection relay between one browser and one Coral session.

use coral::{
    Agent, CoralEvent, MessageRole, OutboundFrame, SessionEvent, Thread, ToolRequest, WsClient,
    WsLifecycleEvent, WsUpdate,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::browser::{ClientCommand, ServerEvent};
use crate::questions::{
    answer_result, PendingQuestions, ANSWER_QUESTION_TOOL, REQUEST_QUESTION_TOOL,
};

/// The outbound half of a Coral session socket.
pub trait RemoteLink {
    fn send(&self, frame: &OutboundFrame) -> coral::Result<()>;
    fn disconnect(&mut self);
}

impl RemoteLink for WsClient {
    fn send(&self, frame: &OutboundFrame) -> coral::Result<()> {
        WsClient::send(self, frame)
    }

    fn disconnect(&mut self) {
        WsClient::disconnect(self)
    }
}

/// Session state for one browser connection. Owned by that connection's
/// task; nothing here is shared.
pub struct RelaySession<L = WsClient> {
    session_id: String,
    agent_id: Option<String>,
    agents: Vec<Agent>,
    threads: Vec<Thread>,
    questions: PendingQuestions,
    link: L,
    browser: mpsc::UnboundedSender<ServerEvent>,
}

impl<L: RemoteLink> RelaySession<L> {
    pub fn new(
        session_id: impl Into<String>,
        link: L,
        browser: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: None,
            agents: Vec::new(),
            threads: Vec::new(),
            questions: PendingQuestions::new(),
            link,
            browser,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Id of the session's own debug agent, once announced.
    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    /// Disconnect the remote socket and drop unanswered questions.
    pub fn close(&mut self) {
        tracing::info!(session_id = %self.session_id, "closing session");
        self.questions.clear();
        self.link.disconnect();
    }

    fn emit(&self, event: ServerEvent) {
        if self.browser.send(event).is_err() {
            tracing::debug!(session_id = %self.session_id, "browser channel closed");
        }
    }

    pub fn handle_update(&mut self, update: WsUpdate) {
        match update {
            WsUpdate::Lifecycle(event) => self.handle_lifecycle(event),
            WsUpdate::Event(event) => self.handle_event(event),
        }
    }

    pub fn handle_lifecycle(&mut self, event: WsLifecycleEvent) {
        match event {
            WsLifecycleEvent::Open => {
                tracing::info!(session_id = %self.session_id, "session socket open");
                self.emit(ServerEvent::ConnectionStatus {
                    connected: true,
                    error: None,
                });
            }
            WsLifecycleEvent::Error(error) => {
                tracing::warn!(session_id = %self.session_id, %error, "session socket error");
                self.emit(ServerEvent::ConnectionStatus {
                    connected: false,
                    error: Some(error),
                });
            }
            WsLifecycleEvent::Close => {
                tracing::info!(session_id = %self.session_id, "session socket closed");
                self.emit(ServerEvent::ConnectionStatus {
                    connected: false,
                    error: None,
                });
            }
            WsLifecycleEvent::Reconnecting { attempt } => {
                tracing::info!(session_id = %self.session_id, attempt, "reconnecting session socket");
            }
            WsLifecycleEvent::GaveUp { attempts } => {
                tracing::warn!(
                    session_id = %self.session_id,
                    attempts,
                    "session socket gave up reconnecting"
                );
            }
        }
    }

    pub fn handle_event(&mut self, event: CoralEvent) {
        match event {
            CoralEvent::DebugAgentRegistered { id } => {
                tracing::info!(session_id = %self.session_id, agent_id = %id, "debug agent registered");
                self.agent_id = Some(id);
            }
            CoralEvent::AgentList { session_agents } => {
                self.agents = session_agents;
                self.emit_agents();
            }
            CoralEvent::ThreadList { threads } => {
                self.threads = threads;
                self.emit_threads();
            }
            CoralEvent::Session { event } => self.handle_session_event(event),
            CoralEvent::ToolRequest(request) => self.handle_tool_request(request),
            CoralEvent::Unknown => {
                tracing::debug!(session_id = %self.session_id, "ignoring unknown session frame");
            }
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::AgentReady { agent } => {
                tracing::debug!(session_id = %self.session_id, %agent, "agent ready");
            }
            SessionEvent::AgentRegistered { agent } => {
                self.agents.push(agent);
                self.emit_agents();
            }
            SessionEvent::AgentStateUpdated { agent_id, state } => {
                match self.agents.iter_mut().find(|agent| agent.id == agent_id) {
                    Some(agent) => {
                        agent.state = state;
                        self.emit_agents();
                    }
                    None => {
                        tracing::debug!(%agent_id, "state update for unknown agent");
                    }
                }
            }
            SessionEvent::MessageSent { thread_id, message } => {
                self.emit(ServerEvent::MessageReceived { thread_id, message });
            }
            SessionEvent::ThreadCreated(thread) => {
                self.threads.push(thread);
                self.emit_threads();
            }
            SessionEvent::Unknown => {
                tracing::debug!(session_id = %self.session_id, "ignoring unknown session event");
            }
        }
    }

    fn handle_tool_request(&mut self, request: ToolRequest) {
        match request.tool.as_str() {
            REQUEST_QUESTION_TOOL => {
                let question = self.questions.ask(request);
                tracing::info!(question_id = %question.id, "agent asked a question");
                self.emit(ServerEvent::AgentQuestion(question));
            }
            ANSWER_QUESTION_TOOL => self.answer_from_remote(&request),
            other => {
                tracing::debug!(tool = other, request_id = %request.id, "ignoring tool request");
            }
        }
    }

    fn answer_from_remote(&mut self, request: &ToolRequest) {
        let Some(question_id) = request.param_str("questionId") else {
            tracing::warn!(request_id = %request.id, "answer-question without questionId");
            return;
        };
        let Some(pending) = self.questions.take(question_id) else {
            tracing::warn!(%question_id, "answer for unknown question");
            return;
        };
        let answer = request.params.get("answer").cloned().unwrap_or(Value::Null);
        let frame = OutboundFrame::ToolResponse {
            request_id: pending.request.id.clone(),
            result: answer_result(answer),
        };
        if let Err(err) = self.link.send(&frame) {
            tracing::warn!(%question_id, error = %err, "failed to forward answer");
            self.questions.restore(pending);
        }
    }

    /// Browser commands other than `create-session`, which the connection
    /// handles before a session exists.
    pub fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::CreateSession => {
                tracing::debug!("create-session reached an existing session");
            }
            ClientCommand::SendMessage {
                thread_id,
                content,
                create_thread,
            } => self.send_chat(thread_id.as_deref(), content, create_thread),
            ClientCommand::CreateThread { name, participants } => {
                let frame = OutboundFrame::CreateThread { name, participants };
                self.forward(&frame);
            }
            ClientCommand::UserResponse {
                request_id,
                response,
            } => self.respond_to_question(&request_id, response),
            ClientCommand::ListQuestions => {
                self.emit(ServerEvent::QuestionsList(self.questions.active()));
            }
        }
    }

    /// Every chat line goes to the agents as a direct `user_message`. The
    /// thread the browser had selected is only logged.
    pub fn send_chat(&mut self, thread_id: Option<&str>, content: String, create_thread: bool) {
        tracing::debug!(thread_id, create_thread, "forwarding chat as direct message");
        let frame = OutboundFrame::UserMessage {
            content,
            role: MessageRole::User,
        };
        self.forward(&frame);
    }

    pub fn respond_to_question(&mut self, question_id: &str, answer: String) {
        let Some(pending) = self.questions.take(question_id) else {
            self.emit(ServerEvent::invalid_question(question_id));
            return;
        };
        let frame = OutboundFrame::ToolResponse {
            request_id: pending.request.id.clone(),
            result: answer_result(Value::String(answer.clone())),
        };
        match self.link.send(&frame) {
            Ok(()) => self.emit(ServerEvent::ResponseSent {
                question_id: question_id.to_string(),
                answer,
            }),
            Err(err) => {
                self.questions.restore(pending);
                self.emit(ServerEvent::error(err.to_string()));
            }
        }
    }

    fn forward(&self, frame: &OutboundFrame) {
        if let Err(err) = self.link.send(frame) {
            tracing::warn!(kind = frame.kind(), error = %err, "outbound frame not sent");
            self.emit(ServerEvent::error(err.to_string()));
        }
    }

    fn emit_agents(&self) {
        self.emit(ServerEvent::AgentsUpdated(self.agents.clone()));
    }

    fn emit_threads(&self) {
        self.emit(ServerEvent::ThreadsUpdated(self.threads.clone()));
    }
}

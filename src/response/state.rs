use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    context::ContextSnapshot,
    history::{ConversationHistory, HistoryEntry},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ResponseStatus {
    #[default]
    Idle,
    Submitting,
    Streaming,
    Completed,
    Failed,
    RateLimited,
}

impl ResponseStatus {
    /// Loading, streaming, answer and error views all keep the popup pinned.
    pub fn keeps_popup_pinned(&self) -> bool {
        !matches!(self, ResponseStatus::Idle)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseState {
    pub status: ResponseStatus,
    pub request_id: Option<Uuid>,
    /// Normalized text of the current response.
    pub buffer: String,
    /// Set once the current request's answer is in `history`.
    pub assistant_appended: bool,
    pub history: ConversationHistory,
    pub context: Option<ContextSnapshot>,
    /// Rate-limit notices. Shown like an answer, never stored in `history`.
    pub transient: Option<String>,
    pub error: Option<String>,
}

impl ResponseState {
    pub fn is_current(&self, request_id: Uuid) -> bool {
        self.request_id == Some(request_id)
    }

    /// Clears per-request fields and makes `request_id` current.
    pub fn begin_request(&mut self, request_id: Uuid) {
        self.status = ResponseStatus::Submitting;
        self.request_id = Some(request_id);
        self.buffer.clear();
        self.assistant_appended = false;
        self.transient = None;
        self.error = None;
    }

    /// Appends the finished answer once per request.
    pub fn record_answer(&mut self) -> bool {
        let answer = self.buffer.trim();
        if self.assistant_appended || answer.is_empty() {
            return false;
        }
        let answer = answer.to_string();
        self.history.push_assistant(answer);
        self.assistant_appended = true;
        true
    }

    pub fn snapshot(&self, server_seconds_remaining: u64) -> ResponseSnapshot {
        ResponseSnapshot {
            status: self.status,
            request_id: self.request_id,
            text: self.buffer.clone(),
            transient: self.transient.clone(),
            error: self.error.clone(),
            transcript: self.history.visible().to_vec(),
            server_seconds_remaining,
        }
    }
}

/// What the popup UI renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    pub status: ResponseStatus,
    pub request_id: Option<Uuid>,
    pub text: String,
    pub transient: Option<String>,
    pub error: Option<String>,
    pub transcript: Vec<HistoryEntry>,
    pub server_seconds_remaining: u64,
}

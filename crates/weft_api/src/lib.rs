use serde::{Deserialize, Serialize};
use serde_json::Value;

mod events;
pub use events::{
    ApprovalRequest, PlanStep, PlanStepStatus, ServerEvent, UserInputOption, UserInputQuestion,
    UserInputRequest, decode_notification,
};

pub const THREAD_LIST_PAGE_SIZE: u32 = 100;

/// Returns the payload of a response, unwrapping a top-level `result` field when present.
pub fn rpc_result(response: &Value) -> &Value {
    match response.get("result") {
        Some(result) if !result.is_null() => result,
        _ => response,
    }
}

/// Extracts an in-band error from a response.
///
/// Servers report failures either as `{"error": "text"}` or as
/// `{"error": {"message": "text", ...}}`, at the top level or nested under `result`.
pub fn rpc_error_message(response: &Value) -> Option<String> {
    fn message_of(error: &Value) -> Option<String> {
        match error {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .or_else(|| Some(error.to_string())),
            other => Some(other.to_string()),
        }
    }

    if let Some(message) = response.get("error").and_then(message_of) {
        return Some(message);
    }
    response
        .get("result")
        .and_then(|result| result.get("error"))
        .and_then(message_of)
}

/// Decodes the payload of a successful response into `T`.
pub fn decode_result<T: serde::de::DeserializeOwned>(response: &Value) -> Result<T, String> {
    if let Some(message) = rpc_error_message(response) {
        return Err(message);
    }
    serde_json::from_value(rpc_result(response).clone())
        .map_err(|err| format!("unexpected response shape: {err}"))
}

/// Server timestamps arrive either in seconds or in milliseconds.
pub fn normalize_timestamp_ms(raw: i64) -> i64 {
    if raw > 0 && raw < 10_000_000_000 {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ThreadSortKey {
    #[serde(rename = "created_at")]
    CreatedAt,
    #[serde(rename = "updated_at")]
    UpdatedAt,
}

impl ThreadSortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

impl Default for ThreadSortKey {
    fn default() -> Self {
        Self::UpdatedAt
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub id: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub source: Option<Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadListPage {
    #[serde(default)]
    pub data: Vec<ThreadSummary>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDetail {
    pub id: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub source: Option<Value>,
    #[serde(default)]
    pub turns: Vec<TurnDetail>,
}

/// Response of `thread/start`, `thread/fork` and `thread/resume`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread: ThreadDetail,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnStatus {
    NotStarted,
    InProgress,
    Completed,
    Interrupted,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnDetail {
    pub id: String,
    pub status: TurnStatus,
    #[serde(default)]
    pub items: Vec<ThreadItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnRef {
    pub id: String,
    #[serde(default)]
    pub status: Option<TurnStatus>,
}

/// Response of `turn/start` and `turn/steer`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    #[serde(default)]
    pub turn: Option<TurnRef>,
    #[serde(default)]
    pub turn_id: Option<String>,
}

impl TurnResponse {
    pub fn turn_id(&self) -> Option<&str> {
        self.turn
            .as_ref()
            .map(|turn| turn.id.as_str())
            .or(self.turn_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStartResponse {
    #[serde(default)]
    pub turn: Option<TurnRef>,
    #[serde(default)]
    pub review_thread_id: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveFailure {
    pub thread_id: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveBatchResponse {
    #[serde(default)]
    pub ok_ids: Vec<String>,
    #[serde(default)]
    pub failed: Vec<ArchiveFailure>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReviewTarget {
    UncommittedChanges,
    BaseBranch {
        branch: String,
    },
    Commit {
        sha: String,
        #[serde(default)]
        title: Option<String>,
    },
    Custom {
        instructions: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewDelivery {
    Inline,
    Detached,
}

impl ReviewDelivery {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Detached => "detached",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UserInput {
    Text {
        text: String,
    },
    Image {
        url: String,
    },
    LocalImage {
        path: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Failed,
    Declined,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileUpdateChange {
    pub path: String,
    #[serde(default)]
    pub kind: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ThreadItem {
    #[serde(rename_all = "camelCase")]
    UserMessage {
        id: String,
        #[serde(default)]
        content: Vec<UserInput>,
    },
    AgentMessage {
        id: String,
        #[serde(default)]
        text: String,
    },
    Reasoning {
        id: String,
        #[serde(default)]
        summary: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    CommandExecution {
        id: String,
        #[serde(default)]
        command: String,
        #[serde(default)]
        status: Option<ItemStatus>,
        #[serde(default)]
        aggregated_output: Option<String>,
        #[serde(default)]
        exit_code: Option<i32>,
        #[serde(default)]
        duration_ms: Option<i64>,
    },
    FileChange {
        id: String,
        #[serde(default)]
        changes: Vec<FileUpdateChange>,
        #[serde(default)]
        status: Option<ItemStatus>,
    },
    McpToolCall {
        id: String,
        #[serde(default)]
        server: String,
        #[serde(default)]
        tool: String,
        #[serde(default)]
        status: Option<ItemStatus>,
    },
    #[serde(rename_all = "camelCase")]
    CollabAgentToolCall {
        id: String,
        #[serde(default)]
        tool: String,
        #[serde(default)]
        sender_thread_id: Option<String>,
        #[serde(default)]
        receiver_thread_ids: Vec<String>,
        #[serde(default)]
        status: Option<ItemStatus>,
    },
    WebSearch {
        id: String,
        #[serde(default)]
        query: String,
    },
    Plan {
        id: String,
        #[serde(default)]
        text: String,
    },
    EnteredReviewMode {
        id: String,
        #[serde(default)]
        review: String,
    },
    ExitedReviewMode {
        id: String,
        #[serde(default)]
        review: String,
    },
    ContextCompaction {
        id: String,
    },
    #[serde(other)]
    Unknown,
}

impl ThreadItem {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::UserMessage { id, .. }
            | Self::AgentMessage { id, .. }
            | Self::Reasoning { id, .. }
            | Self::CommandExecution { id, .. }
            | Self::FileChange { id, .. }
            | Self::McpToolCall { id, .. }
            | Self::CollabAgentToolCall { id, .. }
            | Self::WebSearch { id, .. }
            | Self::Plan { id, .. }
            | Self::EnteredReviewMode { id, .. }
            | Self::ExitedReviewMode { id, .. }
            | Self::ContextCompaction { id } => Some(id),
            Self::Unknown => None,
        }
    }
}

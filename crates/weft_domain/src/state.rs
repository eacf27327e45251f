use crate::ConversationItem;
use std::collections::{HashMap, HashSet};
use std::fmt;

pub const DEFAULT_THREAD_NAME: &str = "New thread";

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ThreadListSort {
    CreatedAt,
    #[default]
    UpdatedAt,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TurnPhase {
    #[default]
    NotStarted,
    Starting,
    InProgress,
    Completed,
    Interrupted,
    Failed,
}

/// Per-thread processing record. Only the reducer writes it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ThreadStatus {
    pub is_processing: bool,
    pub is_reviewing: bool,
    pub has_unread: bool,
    pub phase: TurnPhase,
    pub processing_started_at: Option<i64>,
    pub last_activity_at: Option<i64>,
    pub last_duration_ms: Option<i64>,
    pub last_error_at: Option<i64>,
    pub last_error_message: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlanStepStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlanStep {
    pub step: String,
    pub status: PlanStepStatus,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TurnPlan {
    pub turn_id: String,
    pub explanation: Option<String>,
    pub steps: Vec<PlanStep>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingApproval {
    pub workspace_id: WorkspaceId,
    pub request_id: serde_json::Value,
    pub method: String,
    pub thread_id: Option<ThreadId>,
    pub params: serde_json::Value,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserInputPrompt {
    pub id: String,
    pub header: String,
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingUserInput {
    pub workspace_id: WorkspaceId,
    pub request_id: serde_json::Value,
    pub thread_id: ThreadId,
    pub turn_id: Option<String>,
    pub item_id: Option<String>,
    pub prompts: Vec<UserInputPrompt>,
}

#[derive(Clone, Debug, Default)]
pub struct ThreadsState {
    pub active_workspace_id: Option<WorkspaceId>,
    pub active_thread_by_workspace: HashMap<WorkspaceId, ThreadId>,
    pub threads_by_workspace: HashMap<WorkspaceId, Vec<ThreadSummary>>,
    pub thread_sort_by_workspace: HashMap<WorkspaceId, ThreadListSort>,
    pub thread_list_loading: HashSet<WorkspaceId>,
    pub thread_list_paging: HashSet<WorkspaceId>,
    pub thread_list_cursor: HashMap<WorkspaceId, String>,
    pub items_by_thread: HashMap<ThreadId, Vec<ConversationItem>>,
    pub status_by_thread: HashMap<ThreadId, ThreadStatus>,
    pub active_turn_by_thread: HashMap<ThreadId, String>,
    pub resume_loading: HashSet<ThreadId>,
    pub loaded_threads: HashSet<ThreadId>,
    pub parent_by_thread: HashMap<ThreadId, ThreadId>,
    pub custom_names: HashMap<(WorkspaceId, ThreadId), String>,
    pub pinned_by_workspace: HashMap<WorkspaceId, HashMap<ThreadId, i64>>,
    pub plan_by_thread: HashMap<ThreadId, TurnPlan>,
    pub diff_by_thread: HashMap<ThreadId, String>,
    pub approvals: Vec<PendingApproval>,
    pub user_input_requests: Vec<PendingUserInput>,
}

impl ThreadsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_thread_id(&self, workspace_id: &WorkspaceId) -> Option<&ThreadId> {
        self.active_thread_by_workspace.get(workspace_id)
    }

    /// The thread currently on screen: the active thread of the active workspace.
    pub fn focused_thread(&self) -> Option<(&WorkspaceId, &ThreadId)> {
        let workspace_id = self.active_workspace_id.as_ref()?;
        let thread_id = self.active_thread_by_workspace.get(workspace_id)?;
        Some((workspace_id, thread_id))
    }

    pub fn is_focused(&self, thread_id: &ThreadId) -> bool {
        self.focused_thread()
            .is_some_and(|(_, focused)| focused == thread_id)
    }

    pub fn threads(&self, workspace_id: &WorkspaceId) -> &[ThreadSummary] {
        self.threads_by_workspace
            .get(workspace_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn thread(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId) -> Option<&ThreadSummary> {
        self.threads(workspace_id)
            .iter()
            .find(|thread| &thread.id == thread_id)
    }

    pub fn workspace_of_thread(&self, thread_id: &ThreadId) -> Option<&WorkspaceId> {
        self.threads_by_workspace
            .iter()
            .find(|(_, threads)| threads.iter().any(|thread| &thread.id == thread_id))
            .map(|(workspace_id, _)| workspace_id)
    }

    /// Threads in display order: pinned threads first (most recently pinned first),
    /// then the listing order.
    pub fn ordered_threads(&self, workspace_id: &WorkspaceId) -> Vec<&ThreadSummary> {
        let pinned = self.pinned_by_workspace.get(workspace_id);
        let mut out: Vec<(usize, &ThreadSummary)> =
            self.threads(workspace_id).iter().enumerate().collect();
        out.sort_by(|(a_index, a), (b_index, b)| {
            let a_pin = pinned.and_then(|pinned| pinned.get(&a.id));
            let b_pin = pinned.and_then(|pinned| pinned.get(&b.id));
            match (a_pin, b_pin) {
                (Some(a_pin), Some(b_pin)) => b_pin.cmp(a_pin),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a_index.cmp(b_index),
            }
        });
        out.into_iter().map(|(_, thread)| thread).collect()
    }

    pub fn items(&self, thread_id: &ThreadId) -> &[ConversationItem] {
        self.items_by_thread
            .get(thread_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn status(&self, thread_id: &ThreadId) -> Option<&ThreadStatus> {
        self.status_by_thread.get(thread_id)
    }

    pub fn is_processing(&self, thread_id: &ThreadId) -> bool {
        self.status(thread_id)
            .is_some_and(|status| status.is_processing)
    }

    pub fn active_turn_id(&self, thread_id: &ThreadId) -> Option<&str> {
        self.active_turn_by_thread.get(thread_id).map(String::as_str)
    }

    pub fn custom_name(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId) -> Option<&str> {
        self.custom_names
            .get(&(workspace_id.clone(), thread_id.clone()))
            .map(String::as_str)
    }

    pub fn parent_of(&self, thread_id: &ThreadId) -> Option<&ThreadId> {
        self.parent_by_thread.get(thread_id)
    }

    pub fn is_pinned(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId) -> bool {
        self.pinned_by_workspace
            .get(workspace_id)
            .is_some_and(|pinned| pinned.contains_key(thread_id))
    }

    pub fn thread_list_cursor(&self, workspace_id: &WorkspaceId) -> Option<&str> {
        self.thread_list_cursor
            .get(workspace_id)
            .map(String::as_str)
    }
}

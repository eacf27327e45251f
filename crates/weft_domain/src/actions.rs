use crate::{
    ConversationItem, CustomThreadName, PendingApproval, PendingUserInput, ThreadId,
    ThreadListSort, ThreadSummary, TurnPhase, TurnPlan, WorkspaceId,
};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub enum Action {
    SetActiveWorkspace {
        workspace_id: Option<WorkspaceId>,
    },
    SetActiveThread {
        workspace_id: WorkspaceId,
        thread_id: Option<ThreadId>,
    },

    EnsureThread {
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        timestamp: i64,
    },
    RemoveThread {
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
    },
    SetThreads {
        workspace_id: WorkspaceId,
        threads: Vec<ThreadSummary>,
        sort: ThreadListSort,
    },
    SetThreadListLoading {
        workspace_id: WorkspaceId,
        loading: bool,
    },
    SetThreadListPaging {
        workspace_id: WorkspaceId,
        paging: bool,
    },
    SetThreadListCursor {
        workspace_id: WorkspaceId,
        cursor: Option<String>,
    },
    /// Name reported by the server; ignored when the user has assigned one.
    SetThreadName {
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        name: String,
    },
    /// User rename. `None` clears the custom name.
    RenameThread {
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        name: Option<String>,
    },
    SetThreadTimestamp {
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        timestamp: i64,
    },
    SetThreadParent {
        thread_id: ThreadId,
        parent_id: ThreadId,
    },
    ToggleThreadPin {
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        now: i64,
    },
    CustomNamesLoaded {
        names: Vec<CustomThreadName>,
    },
    PinnedThreadsLoaded {
        workspace_id: WorkspaceId,
        pinned: HashMap<ThreadId, i64>,
    },

    SetThreadResumeLoading {
        thread_id: ThreadId,
        loading: bool,
    },
    MarkThreadLoaded {
        thread_id: ThreadId,
        loaded: bool,
    },
    SetThreadItems {
        thread_id: ThreadId,
        items: Vec<ConversationItem>,
    },
    UpsertItem {
        thread_id: ThreadId,
        item: ConversationItem,
        timestamp: i64,
    },
    RemoveItem {
        thread_id: ThreadId,
        item_id: String,
    },
    AppendAgentDelta {
        thread_id: ThreadId,
        item_id: String,
        delta: String,
        timestamp: i64,
    },

    MarkProcessing {
        thread_id: ThreadId,
        is_processing: bool,
        timestamp: i64,
    },
    MarkReviewing {
        thread_id: ThreadId,
        is_reviewing: bool,
    },
    SetActiveTurnId {
        thread_id: ThreadId,
        turn_id: Option<String>,
    },
    SetTurnPhase {
        thread_id: ThreadId,
        phase: TurnPhase,
    },
    MarkUnread {
        thread_id: ThreadId,
        has_unread: bool,
    },
    SetLastError {
        thread_id: ThreadId,
        message: String,
        timestamp: i64,
    },
    /// Clears processing, review mode and the active turn together.
    ResetTurnState {
        thread_id: ThreadId,
        timestamp: i64,
    },
    SetTurnPlan {
        thread_id: ThreadId,
        plan: Option<TurnPlan>,
    },
    SetTurnDiff {
        thread_id: ThreadId,
        diff: Option<String>,
    },

    AddApproval(PendingApproval),
    RemoveApproval {
        workspace_id: WorkspaceId,
        request_id: serde_json::Value,
    },
    AddUserInputRequest(PendingUserInput),
    RemoveUserInputRequest {
        workspace_id: WorkspaceId,
        request_id: serde_json::Value,
    },
}

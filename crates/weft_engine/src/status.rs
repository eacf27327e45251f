//! Turn and processing transitions shared by every layer.

use crate::store::Store;
use weft_domain::{Action, ConversationItem, ThreadId, TurnPhase, WorkspaceId, local_item_id};

impl Store {
    pub fn mark_processing(&self, thread_id: &ThreadId, is_processing: bool) {
        let timestamp = self.now();
        self.dispatch(Action::MarkProcessing {
            thread_id: thread_id.clone(),
            is_processing,
            timestamp,
        });
    }

    pub fn mark_reviewing(&self, thread_id: &ThreadId, is_reviewing: bool) {
        self.dispatch(Action::MarkReviewing {
            thread_id: thread_id.clone(),
            is_reviewing,
        });
    }

    pub fn set_active_turn(&self, thread_id: &ThreadId, turn_id: Option<String>) {
        self.dispatch(Action::SetActiveTurnId {
            thread_id: thread_id.clone(),
            turn_id,
        });
    }

    pub fn set_turn_phase(&self, thread_id: &ThreadId, phase: TurnPhase) {
        self.dispatch(Action::SetTurnPhase {
            thread_id: thread_id.clone(),
            phase,
        });
    }

    /// Processing off, review off and no active turn, in one dispatch.
    pub fn reset_turn(&self, thread_id: &ThreadId) {
        let timestamp = self.now();
        self.dispatch(Action::ResetTurnState {
            thread_id: thread_id.clone(),
            timestamp,
        });
    }

    pub fn is_processing(&self, thread_id: &ThreadId) -> bool {
        self.read(|state| state.is_processing(thread_id))
    }

    pub fn active_turn_id(&self, thread_id: &ThreadId) -> Option<String> {
        self.read(|state| state.active_turn_id(thread_id).map(ToOwned::to_owned))
    }

    pub fn items(&self, thread_id: &ThreadId) -> Vec<ConversationItem> {
        self.read(|state| state.items(thread_id).to_vec())
    }

    pub fn active_thread_id(&self, workspace_id: &WorkspaceId) -> Option<ThreadId> {
        self.read(|state| state.active_thread_id(workspace_id).cloned())
    }

    /// Appends a local assistant-role message to the thread.
    pub fn push_assistant_notice(&self, thread_id: &ThreadId, text: impl Into<String>) {
        let timestamp = self.now();
        self.dispatch(Action::UpsertItem {
            thread_id: thread_id.clone(),
            item: ConversationItem::assistant_message(local_item_id("notice"), text),
            timestamp,
        });
    }

    /// Makes a failure visible in the conversation and flags the thread unread when it is
    /// not on screen.
    pub fn push_thread_error(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        message: &str,
    ) {
        tracing::warn!(
            workspace_id = %workspace_id,
            thread_id = %thread_id,
            error = %message,
            "thread operation failed"
        );
        let timestamp = self.now();
        self.push_assistant_notice(thread_id, format!("Error: {message}"));
        self.dispatch(Action::SetLastError {
            thread_id: thread_id.clone(),
            message: message.to_owned(),
            timestamp,
        });
        self.dispatch(Action::MarkUnread {
            thread_id: thread_id.clone(),
            has_unread: true,
        });
    }
}

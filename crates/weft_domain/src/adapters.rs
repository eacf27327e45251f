use crate::{ThreadCodexParams, ThreadId, WorkspaceId};
use std::collections::HashMap;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CustomThreadName {
    pub workspace_id: WorkspaceId,
    pub thread_id: ThreadId,
    pub name: String,
}

/// A review that runs in its own thread, remembered so the parent link survives a restart.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetachedReviewLink {
    pub workspace_id: WorkspaceId,
    pub parent_thread_id: ThreadId,
    pub child_thread_id: ThreadId,
    pub created_at_unix_ms: i64,
}

/// Local preference storage. Errors are reported as text and never abort the caller.
pub trait PreferenceStore: Send + Sync {
    fn load_thread_activity(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<HashMap<ThreadId, i64>, String>;

    fn save_thread_activity(
        &self,
        workspace_id: &WorkspaceId,
        activity: &HashMap<ThreadId, i64>,
    ) -> Result<(), String>;

    fn load_pinned_threads(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<HashMap<ThreadId, i64>, String>;

    fn save_pinned_threads(
        &self,
        workspace_id: &WorkspaceId,
        pinned: &HashMap<ThreadId, i64>,
    ) -> Result<(), String>;

    fn load_custom_thread_names(&self) -> Result<Vec<CustomThreadName>, String>;

    fn save_custom_thread_name(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        name: Option<&str>,
    ) -> Result<(), String>;

    fn load_codex_params(&self, scope_key: &str) -> Result<Option<ThreadCodexParams>, String>;

    fn save_codex_params(&self, scope_key: &str, params: &ThreadCodexParams)
    -> Result<(), String>;

    fn load_detached_review_links(&self) -> Result<Vec<DetachedReviewLink>, String>;

    fn save_detached_review_link(&self, link: &DetachedReviewLink) -> Result<(), String>;

    fn remove_detached_review_link(
        &self,
        workspace_id: &WorkspaceId,
        child_thread_id: &ThreadId,
    ) -> Result<(), String>;
}

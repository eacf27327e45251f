use crate::{ThreadId, WorkspaceId};
use std::collections::HashMap;

/// Persistence work requested by the reducer; the engine runs these against a
/// [`crate::PreferenceStore`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Effect {
    SaveCustomThreadName {
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        name: Option<String>,
    },
    SavePinnedThreads {
        workspace_id: WorkspaceId,
        pinned: HashMap<ThreadId, i64>,
    },
}

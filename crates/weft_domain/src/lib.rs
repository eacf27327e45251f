mod state;
pub use state::{
    DEFAULT_THREAD_NAME, PendingApproval, PendingUserInput, PlanStep, PlanStepStatus, ThreadId,
    ThreadListSort, ThreadStatus, ThreadSummary, ThreadsState, TurnPhase, TurnPlan,
    UserInputPrompt, WorkspaceId,
};

mod item;
pub use item::{
    ConversationItem, ItemKind, ItemStatus, MessageRole, ReviewState, has_running_command,
    is_reviewing_from_items, local_item_id,
};

mod merge;
pub use merge::{MergeMode, merge_thread_items};

mod settings;
pub use settings::{AccessMode, ThinkingEffort, parse_access_mode, parse_thinking_effort};

mod codex_params;
pub use codex_params::{
    CodexArgsOverride, CodexDefaults, CodexSelection, NO_THREAD_SCOPE, PendingNewThreadSeed,
    ThreadCodexParams, ThreadCodexState, build_thread_codex_seed_patch, codex_params_key,
    create_pending_thread_seed, no_thread_scope_key, resolve_thread_codex_state,
    resolve_workspace_runtime_codex_args_override, sanitize_runtime_codex_args,
};

mod adapters;
pub use adapters::{CustomThreadName, DetachedReviewLink, PreferenceStore};

mod actions;
pub use actions::Action;
mod effects;
pub use effects::Effect;

mod reducer;

mod time;
pub use time::{now_unix_ms, unix_ms};

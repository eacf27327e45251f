use crate::{AccessMode, ThinkingEffort, ThreadId, WorkspaceId};

/// Scope suffix for the per-workspace record used while no thread is active.
pub const NO_THREAD_SCOPE: &str = "__no_thread__";

/// Extra runtime arguments for a thread.
///
/// `Inherit` falls through to the workspace's no-thread scope, `Default` pins "no extra
/// arguments" regardless of what the workspace later selects.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum CodexArgsOverride {
    #[default]
    Inherit,
    Default,
    Override(String),
}

impl CodexArgsOverride {
    pub fn kind_str(&self) -> &'static str {
        match self {
            CodexArgsOverride::Inherit => "inherit",
            CodexArgsOverride::Default => "default",
            CodexArgsOverride::Override(_) => "override",
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            CodexArgsOverride::Override(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn from_parts(kind: &str, value: Option<String>) -> Option<Self> {
        match kind {
            "inherit" => Some(CodexArgsOverride::Inherit),
            "default" => Some(CodexArgsOverride::Default),
            "override" => value.map(CodexArgsOverride::Override),
            _ => None,
        }
    }

    pub fn is_inherit(&self) -> bool {
        matches!(self, CodexArgsOverride::Inherit)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ThreadCodexParams {
    pub model_id: Option<String>,
    pub effort: Option<ThinkingEffort>,
    pub access_mode: Option<AccessMode>,
    pub collaboration_mode_id: Option<String>,
    pub codex_args_override: CodexArgsOverride,
    pub updated_at_unix_ms: i64,
}

pub fn codex_params_key(workspace_id: &WorkspaceId, thread_id: &ThreadId) -> String {
    format!("{workspace_id}:{thread_id}")
}

pub fn no_thread_scope_key(workspace_id: &WorkspaceId) -> String {
    format!("{workspace_id}:{NO_THREAD_SCOPE}")
}

const HONORED_FLAGS_WITH_VALUE: &[&str] = &["-c", "--config", "-p", "--profile", "--enable", "--disable"];
const HONORED_SWITCHES: &[&str] = &["--search"];
const IGNORED_FLAGS_WITH_VALUE: &[&str] = &[
    "-m",
    "--model",
    "-s",
    "--sandbox",
    "-a",
    "--ask-for-approval",
    "-C",
    "--cd",
    "-i",
    "--image",
    "--add-dir",
    "--local-provider",
];
const IGNORED_SWITCHES: &[&str] = &[
    "--full-auto",
    "--dangerously-bypass-approvals-and-sandbox",
    "--yolo",
    "--oss",
];

/// Keeps only the flags the runtime applies per thread.
///
/// Model, sandbox, approval and directory flags are owned by other settings and are
/// dropped along with their values. Returns `None` when nothing usable remains.
pub fn sanitize_runtime_codex_args(raw: &str) -> Option<String> {
    let tokens = shlex::split(raw.trim())?;
    let mut kept: Vec<String> = Vec::new();
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        let (flag, inline_value) = match token.split_once('=') {
            Some((flag, value)) if flag.starts_with('-') => (flag.to_owned(), Some(value.to_owned())),
            _ => (token.clone(), None),
        };
        let flag = flag.as_str();

        if HONORED_SWITCHES.contains(&flag) {
            kept.push(token);
        } else if HONORED_FLAGS_WITH_VALUE.contains(&flag) {
            if inline_value.is_some() {
                kept.push(token);
            } else if let Some(value) = iter.next() {
                kept.push(token);
                kept.push(value);
            }
        } else if IGNORED_FLAGS_WITH_VALUE.contains(&flag) {
            if inline_value.is_none() {
                iter.next();
            }
        } else if IGNORED_SWITCHES.contains(&flag) {
            continue;
        }
    }

    if kept.is_empty() {
        return None;
    }
    shlex::try_join(kept.iter().map(String::as_str)).ok()
}

fn sanitized_override(value: &CodexArgsOverride) -> Option<String> {
    value.value().and_then(sanitize_runtime_codex_args)
}

/// Arguments actually passed to the runtime for a turn in `thread_id` (or for a new thread
/// when `thread_id` is `None`).
pub fn resolve_workspace_runtime_codex_args_override(
    workspace_id: &WorkspaceId,
    thread_id: Option<&ThreadId>,
    get_params: impl Fn(&str) -> Option<ThreadCodexParams>,
) -> Option<String> {
    let no_thread = || {
        get_params(&no_thread_scope_key(workspace_id))
            .and_then(|params| sanitized_override(&params.codex_args_override))
    };
    let Some(thread_id) = thread_id else {
        return no_thread();
    };
    match get_params(&codex_params_key(workspace_id, thread_id)) {
        Some(params) if !params.codex_args_override.is_inherit() => {
            sanitized_override(&params.codex_args_override)
        }
        _ => no_thread(),
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CodexDefaults {
    pub model_id: Option<String>,
    pub effort: Option<ThinkingEffort>,
    pub access_mode: AccessMode,
    pub collaboration_mode_id: Option<String>,
}

/// What the user currently has selected for the next turn.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CodexSelection {
    pub model_id: Option<String>,
    pub effort: Option<ThinkingEffort>,
    pub access_mode: AccessMode,
    pub collaboration_mode_id: Option<String>,
    pub codex_args_override: CodexArgsOverride,
}

/// Choices made before the thread they apply to exists.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingNewThreadSeed {
    pub workspace_id: WorkspaceId,
    pub collaboration_mode_id: Option<String>,
    pub access_mode: AccessMode,
    pub codex_args_override: CodexArgsOverride,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ThreadCodexState {
    pub scope_key: String,
    pub access_mode: AccessMode,
    pub preferred_model_id: Option<String>,
    pub preferred_effort: Option<ThinkingEffort>,
    pub preferred_collab_mode_id: Option<String>,
    pub preferred_codex_args_override: Option<String>,
}

/// Resolves the effective parameters for the displayed thread.
///
/// Priority: stored thread record, then a pending seed for the same workspace, then the
/// workspace no-thread record, then `defaults`.
pub fn resolve_thread_codex_state(
    workspace_id: &WorkspaceId,
    thread_id: Option<&ThreadId>,
    pending_seed: Option<&PendingNewThreadSeed>,
    defaults: &CodexDefaults,
    get_params: impl Fn(&str) -> Option<ThreadCodexParams>,
) -> ThreadCodexState {
    let scope_key = match thread_id {
        Some(thread_id) => codex_params_key(workspace_id, thread_id),
        None => no_thread_scope_key(workspace_id),
    };
    let thread_record = thread_id.and_then(|_| get_params(&scope_key));
    let no_thread_record = get_params(&no_thread_scope_key(workspace_id));
    let seed = pending_seed.filter(|seed| &seed.workspace_id == workspace_id);

    let preferred_model_id = thread_record
        .as_ref()
        .and_then(|record| record.model_id.clone())
        .or_else(|| no_thread_record.as_ref().and_then(|record| record.model_id.clone()))
        .or_else(|| defaults.model_id.clone());
    let preferred_effort = thread_record
        .as_ref()
        .and_then(|record| record.effort)
        .or_else(|| no_thread_record.as_ref().and_then(|record| record.effort))
        .or(defaults.effort);
    let access_mode = thread_record
        .as_ref()
        .and_then(|record| record.access_mode)
        .or_else(|| seed.map(|seed| seed.access_mode))
        .or_else(|| no_thread_record.as_ref().and_then(|record| record.access_mode))
        .unwrap_or(defaults.access_mode);
    let preferred_collab_mode_id = thread_record
        .as_ref()
        .and_then(|record| record.collaboration_mode_id.clone())
        .or_else(|| seed.and_then(|seed| seed.collaboration_mode_id.clone()))
        .or_else(|| {
            no_thread_record
                .as_ref()
                .and_then(|record| record.collaboration_mode_id.clone())
        })
        .or_else(|| defaults.collaboration_mode_id.clone());

    let args_layers = [
        thread_record.as_ref().map(|record| &record.codex_args_override),
        seed.map(|seed| &seed.codex_args_override),
        no_thread_record.as_ref().map(|record| &record.codex_args_override),
    ];
    let preferred_codex_args_override = args_layers
        .into_iter()
        .flatten()
        .find(|layer| !layer.is_inherit())
        .and_then(|layer| layer.value().map(ToOwned::to_owned));

    ThreadCodexState {
        scope_key,
        access_mode,
        preferred_model_id,
        preferred_effort,
        preferred_collab_mode_id,
        preferred_codex_args_override,
    }
}

/// Initial record persisted for a freshly created thread.
pub fn build_thread_codex_seed_patch(
    workspace_id: &WorkspaceId,
    selection: &CodexSelection,
    pending_seed: Option<&PendingNewThreadSeed>,
    now_unix_ms: i64,
) -> ThreadCodexParams {
    let seed = pending_seed.filter(|seed| &seed.workspace_id == workspace_id);
    ThreadCodexParams {
        model_id: selection.model_id.clone(),
        effort: selection.effort,
        access_mode: Some(seed.map_or(selection.access_mode, |seed| seed.access_mode)),
        collaboration_mode_id: match seed {
            Some(seed) => seed.collaboration_mode_id.clone(),
            None => selection.collaboration_mode_id.clone(),
        },
        codex_args_override: match seed {
            Some(seed) => seed.codex_args_override.clone(),
            None => selection.codex_args_override.clone(),
        },
        updated_at_unix_ms: now_unix_ms,
    }
}

pub fn create_pending_thread_seed(
    active_workspace_id: Option<&WorkspaceId>,
    active_thread_id: Option<&ThreadId>,
    selection: &CodexSelection,
) -> Option<PendingNewThreadSeed> {
    if active_thread_id.is_some() {
        return None;
    }
    let workspace_id = active_workspace_id?;
    Some(PendingNewThreadSeed {
        workspace_id: workspace_id.clone(),
        collaboration_mode_id: selection.collaboration_mode_id.clone(),
        access_mode: selection.access_mode,
        codex_args_override: selection.codex_args_override.clone(),
    })
}

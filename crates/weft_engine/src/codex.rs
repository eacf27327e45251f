use crate::prefs::Prefs;
use crate::store::Store;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use weft_domain::{
    CodexDefaults, CodexSelection, PendingNewThreadSeed, ThreadCodexParams,
    ThreadCodexState, ThreadId, WorkspaceId, build_thread_codex_seed_patch, codex_params_key,
    create_pending_thread_seed, no_thread_scope_key, resolve_thread_codex_state,
    resolve_workspace_runtime_codex_args_override,
};

struct CodexInner {
    selection: CodexSelection,
    pending_seed: Option<PendingNewThreadSeed>,
}

/// Current model/effort/access selection plus the persisted per-thread records.
pub struct CodexSettings {
    store: Arc<Store>,
    prefs: Prefs,
    defaults: CodexDefaults,
    inner: Mutex<CodexInner>,
}

impl CodexSettings {
    pub(crate) fn new(store: Arc<Store>, prefs: Prefs, defaults: CodexDefaults) -> Self {
        let selection = CodexSelection {
            model_id: defaults.model_id.clone(),
            effort: defaults.effort,
            access_mode: defaults.access_mode,
            collaboration_mode_id: defaults.collaboration_mode_id.clone(),
            codex_args_override: Default::default(),
        };
        Self {
            store,
            prefs,
            defaults,
            inner: Mutex::new(CodexInner {
                selection,
                pending_seed: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CodexInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Loads the thread record and the workspace no-thread record, keyed by scope.
    async fn load_scopes(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: Option<&ThreadId>,
    ) -> HashMap<String, ThreadCodexParams> {
        let mut keys = vec![no_thread_scope_key(workspace_id)];
        if let Some(thread_id) = thread_id {
            keys.push(codex_params_key(workspace_id, thread_id));
        }
        let loaded = self
            .prefs
            .run("load codex params", move |prefs| {
                let mut records = HashMap::new();
                for key in keys {
                    if let Some(params) = prefs.load_codex_params(&key)? {
                        records.insert(key, params);
                    }
                }
                Ok(records)
            })
            .await;
        loaded.unwrap_or_else(|err| {
            tracing::warn!(workspace_id = %workspace_id, error = %err, "failed to load codex params");
            HashMap::new()
        })
    }

    async fn save(&self, scope_key: String, record: ThreadCodexParams) {
        let key = scope_key.clone();
        let saved = self
            .prefs
            .run("save codex params", move |prefs| {
                prefs.save_codex_params(&key, &record)
            })
            .await;
        if let Err(err) = saved {
            tracing::warn!(scope_key = %scope_key, error = %err, "failed to save codex params");
        }
    }

    pub fn selection(&self) -> CodexSelection {
        self.lock().selection.clone()
    }

    pub fn pending_seed(&self) -> Option<PendingNewThreadSeed> {
        self.lock().pending_seed.clone()
    }

    pub async fn thread_state(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: Option<&ThreadId>,
    ) -> ThreadCodexState {
        let records = self.load_scopes(workspace_id, thread_id).await;
        let seed = self.pending_seed();
        resolve_thread_codex_state(
            workspace_id,
            thread_id,
            seed.as_ref(),
            &self.defaults,
            |key| records.get(key).cloned(),
        )
    }

    pub async fn runtime_args(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: Option<&ThreadId>,
    ) -> Option<String> {
        let records = self.load_scopes(workspace_id, thread_id).await;
        resolve_workspace_runtime_codex_args_override(workspace_id, thread_id, |key| {
            records.get(key).cloned()
        })
    }

    /// Records a new selection for the active thread of `workspace_id`, or for the next
    /// thread when none is active.
    pub async fn update_selection(&self, workspace_id: &WorkspaceId, selection: CodexSelection) {
        let active_thread = self.store.active_thread_id(workspace_id);
        let now = self.store.now();
        let scope_key = match &active_thread {
            Some(thread_id) => codex_params_key(workspace_id, thread_id),
            None => no_thread_scope_key(workspace_id),
        };
        let record = ThreadCodexParams {
            model_id: selection.model_id.clone(),
            effort: selection.effort,
            access_mode: Some(selection.access_mode),
            collaboration_mode_id: selection.collaboration_mode_id.clone(),
            codex_args_override: selection.codex_args_override.clone(),
            updated_at_unix_ms: now,
        };
        let seed =
            create_pending_thread_seed(Some(workspace_id), active_thread.as_ref(), &selection);
        {
            let mut inner = self.lock();
            if seed.is_some() {
                inner.pending_seed = seed;
            }
            inner.selection = selection;
        }
        self.save(scope_key, record).await;
    }

    /// Persists the initial record for a thread that was just created and consumes the
    /// pending seed if it was meant for this workspace.
    pub async fn seed_new_thread(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId) {
        let now = self.store.now();
        let (patch, consumed) = {
            let mut inner = self.lock();
            let patch = build_thread_codex_seed_patch(
                workspace_id,
                &inner.selection,
                inner.pending_seed.as_ref(),
                now,
            );
            let consumed = inner
                .pending_seed
                .as_ref()
                .is_some_and(|seed| &seed.workspace_id == workspace_id);
            if consumed {
                inner.pending_seed = None;
            }
            (patch, consumed)
        };
        self.save(codex_params_key(workspace_id, thread_id), patch)
            .await;
        tracing::debug!(
            workspace_id = %workspace_id,
            thread_id = %thread_id,
            consumed_seed = consumed,
            "seeded thread codex params"
        );
    }
}

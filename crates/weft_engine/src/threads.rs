use crate::codex::CodexSettings;
use crate::config::EngineConfig;
use crate::events::conversation_item_from_api;
use crate::prefs::Prefs;
use crate::rpc::{ThreadRpc, call, is_unsupported_method_error};
use crate::store::Store;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use weft_api::{
    ArchiveBatchResponse, ArchiveFailure, ThreadDetail, ThreadListPage, ThreadResponse,
    ThreadSortKey, TurnStatus, decode_result, normalize_timestamp_ms,
};
use weft_domain::{
    Action, ConversationItem, DEFAULT_THREAD_NAME, MergeMode, ThreadId,
    ThreadListSort, ThreadSummary, TurnPhase, WorkspaceId, is_reviewing_from_items,
    merge_thread_items,
};

const PREVIEW_NAME_MAX_CHARS: usize = 40;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ResumeOptions {
    pub force: bool,
    pub replace_local: bool,
    pub mode: MergeMode,
}

impl ResumeOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ListOptions {
    /// Refresh in place: no loading indicator, and the active thread stays listed even when
    /// the server has not reported it yet.
    pub preserve_state: bool,
    pub sort: ThreadListSort,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ThreadArchiveBatchResult {
    pub all_succeeded: bool,
    pub ok_ids: Vec<String>,
    pub failed: Vec<ArchiveFailure>,
    pub total: usize,
}

impl ThreadArchiveBatchResult {
    /// Summarises per-id outcomes in request order. Ids with no reported outcome count as
    /// failures.
    fn from_outcomes(
        requested: &[String],
        ok: &HashSet<String>,
        failed: &HashMap<String, String>,
    ) -> Self {
        let mut ok_ids = Vec::new();
        let mut failures = Vec::new();
        for thread_id in requested {
            if ok.contains(thread_id) {
                ok_ids.push(thread_id.clone());
            } else {
                failures.push(ArchiveFailure {
                    thread_id: thread_id.clone(),
                    error: failed
                        .get(thread_id)
                        .cloned()
                        .unwrap_or_else(|| "missing result".to_owned()),
                });
            }
        }
        Self {
            all_succeeded: failures.is_empty(),
            ok_ids,
            failed: failures,
            total: requested.len(),
        }
    }

    fn all_failed(requested: &[String], error: &str) -> Self {
        let failed = requested
            .iter()
            .map(|thread_id| (thread_id.clone(), error.to_owned()))
            .collect();
        Self::from_outcomes(requested, &HashSet::new(), &failed)
    }
}

#[derive(Default)]
struct ActionsInner {
    resume_in_flight: HashMap<ThreadId, usize>,
    replace_on_resume: HashSet<ThreadId>,
    list_token: HashMap<WorkspaceId, u64>,
    next_list_token: u64,
    activity: HashMap<WorkspaceId, HashMap<ThreadId, i64>>,
    workspace_roots: HashMap<WorkspaceId, String>,
}

struct ListedThreads {
    threads: Vec<weft_api::ThreadSummary>,
    next_cursor: Option<String>,
}

/// Start, fork, resume, list and archive.
pub struct ThreadActions {
    store: Arc<Store>,
    rpc: Arc<dyn ThreadRpc>,
    prefs: Prefs,
    config: EngineConfig,
    codex: Arc<CodexSettings>,
    inner: Mutex<ActionsInner>,
    activity_load: tokio::sync::Mutex<()>,
}

impl ThreadActions {
    pub(crate) fn new(
        store: Arc<Store>,
        rpc: Arc<dyn ThreadRpc>,
        prefs: Prefs,
        config: EngineConfig,
        codex: Arc<CodexSettings>,
    ) -> Self {
        Self {
            store,
            rpc,
            prefs,
            config,
            codex,
            inner: Mutex::new(ActionsInner::default()),
            activity_load: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ActionsInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Listing only keeps threads whose working directory is `root`.
    pub fn register_workspace(&self, workspace_id: &WorkspaceId, root: &str) {
        self.lock()
            .workspace_roots
            .insert(workspace_id.clone(), normalize_root(root));
    }

    fn workspace_root(&self, workspace_id: &WorkspaceId) -> Option<String> {
        self.lock().workspace_roots.get(workspace_id).cloned()
    }

    pub async fn start_thread_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
        activate: bool,
    ) -> Option<ThreadId> {
        let response = call(
            "thread/start",
            workspace_id.as_str(),
            self.rpc.start_thread(workspace_id.as_str()),
        )
        .await
        .and_then(|response| decode_result::<ThreadResponse>(&response));
        let thread = match response {
            Ok(response) => response.thread,
            Err(err) => {
                tracing::warn!(workspace_id = %workspace_id, error = %err, "failed to start thread");
                return None;
            }
        };
        if thread.id.trim().is_empty() {
            tracing::warn!(workspace_id = %workspace_id, "thread/start returned no thread id");
            return None;
        }

        let thread_id = ThreadId::new(thread.id);
        let now = self.store.now();
        self.store.dispatch(Action::EnsureThread {
            workspace_id: workspace_id.clone(),
            thread_id: thread_id.clone(),
            timestamp: now,
        });
        self.store.dispatch(Action::MarkThreadLoaded {
            thread_id: thread_id.clone(),
            loaded: true,
        });
        if activate {
            self.activate_thread(workspace_id, &thread_id);
        }
        self.codex.seed_new_thread(workspace_id, &thread_id).await;
        self.record_thread_activity(workspace_id, &thread_id, now)
            .await;
        tracing::info!(workspace_id = %workspace_id, thread_id = %thread_id, "thread started");
        Some(thread_id)
    }

    pub async fn fork_thread_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        activate: bool,
    ) -> Option<ThreadId> {
        let response = call(
            "thread/fork",
            workspace_id.as_str(),
            self.rpc
                .fork_thread(workspace_id.as_str(), thread_id.as_str()),
        )
        .await
        .and_then(|response| decode_result::<ThreadResponse>(&response));
        let forked = match response {
            Ok(response) if !response.thread.id.trim().is_empty() => {
                ThreadId::new(response.thread.id)
            }
            Ok(_) => {
                tracing::warn!(workspace_id = %workspace_id, thread_id = %thread_id, "thread/fork returned no thread id");
                return None;
            }
            Err(err) => {
                tracing::warn!(
                    workspace_id = %workspace_id,
                    thread_id = %thread_id,
                    error = %err,
                    "failed to fork thread"
                );
                return None;
            }
        };

        self.store.dispatch(Action::EnsureThread {
            workspace_id: workspace_id.clone(),
            thread_id: forked.clone(),
            timestamp: self.store.now(),
        });
        self.lock().replace_on_resume.insert(forked.clone());
        if activate {
            self.activate_thread(workspace_id, &forked);
        }
        self.resume_thread_for_workspace(
            workspace_id,
            &forked,
            ResumeOptions {
                force: true,
                replace_local: true,
                mode: MergeMode::LiveRefresh,
            },
        )
        .await;
        Some(forked)
    }

    /// Loads a thread from the server. Returns `None` when the resume failed.
    pub async fn resume_thread_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        options: ResumeOptions,
    ) -> Option<ThreadId> {
        if !options.force {
            let (loaded, processing) = self.store.read(|state| {
                (
                    state.loaded_threads.contains(thread_id),
                    state.is_processing(thread_id),
                )
            });
            if loaded || processing {
                return Some(thread_id.clone());
            }
        }

        self.begin_resume(thread_id);
        let response = call(
            "thread/resume",
            workspace_id.as_str(),
            self.rpc
                .resume_thread(workspace_id.as_str(), thread_id.as_str()),
        )
        .await
        .and_then(|response| decode_result::<ThreadResponse>(&response));
        let outcome = match response {
            Ok(response) => {
                self.apply_resumed_thread(workspace_id, thread_id, response.thread, options);
                Some(thread_id.clone())
            }
            Err(err) => {
                tracing::debug!(
                    workspace_id = %workspace_id,
                    thread_id = %thread_id,
                    error = %err,
                    "thread resume failed"
                );
                None
            }
        };
        self.end_resume(thread_id);
        outcome
    }

    fn begin_resume(&self, thread_id: &ThreadId) {
        let first = {
            let mut inner = self.lock();
            let count = inner
                .resume_in_flight
                .entry(thread_id.clone())
                .or_insert(0);
            *count += 1;
            *count == 1
        };
        if first {
            self.store.dispatch(Action::SetThreadResumeLoading {
                thread_id: thread_id.clone(),
                loading: true,
            });
        }
    }

    fn end_resume(&self, thread_id: &ThreadId) {
        let last = {
            let mut inner = self.lock();
            match inner.resume_in_flight.get(thread_id).copied() {
                None | Some(0) => false,
                Some(1) => {
                    inner.resume_in_flight.remove(thread_id);
                    true
                }
                Some(count) => {
                    inner.resume_in_flight.insert(thread_id.clone(), count - 1);
                    false
                }
            }
        };
        if last {
            self.store.dispatch(Action::SetThreadResumeLoading {
                thread_id: thread_id.clone(),
                loading: false,
            });
        }
    }

    pub fn is_resume_in_flight(&self, thread_id: &ThreadId) -> bool {
        self.lock().resume_in_flight.contains_key(thread_id)
    }

    fn apply_resumed_thread(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        detail: ThreadDetail,
        options: ResumeOptions,
    ) {
        let now = self.store.now();
        self.store.dispatch(Action::EnsureThread {
            workspace_id: workspace_id.clone(),
            thread_id: thread_id.clone(),
            timestamp: now,
        });
        if let Some(parent) = detail.source.as_ref().and_then(parent_thread_from_source) {
            self.store.dispatch(Action::SetThreadParent {
                thread_id: thread_id.clone(),
                parent_id: ThreadId::new(parent),
            });
        }

        let remote: Vec<ConversationItem> = detail
            .turns
            .iter()
            .flat_map(|turn| turn.items.iter())
            .filter_map(conversation_item_from_api)
            .collect();
        let local = self.store.items(thread_id);
        let flagged = self.lock().replace_on_resume.remove(thread_id);
        let replace = options.replace_local || flagged;
        let authoritative = local.is_empty() || replace;

        if authoritative {
            let items = if replace {
                remote
            } else {
                merge_thread_items(remote, &local, options.mode)
            };
            let reviewing = is_reviewing_from_items(&items);
            self.store.dispatch(Action::SetThreadItems {
                thread_id: thread_id.clone(),
                items,
            });

            let running_turn = detail
                .turns
                .iter()
                .rev()
                .find(|turn| turn.status == TurnStatus::InProgress);
            match running_turn {
                Some(turn) => {
                    self.store.mark_processing(thread_id, true);
                    self.store.set_active_turn(thread_id, Some(turn.id.clone()));
                    self.store.set_turn_phase(thread_id, TurnPhase::InProgress);
                }
                None => self.store.mark_processing(thread_id, false),
            }
            self.store.mark_reviewing(thread_id, reviewing);
        } else if options.mode == MergeMode::LoadOlder {
            let items = merge_thread_items(remote, &local, MergeMode::LoadOlder);
            self.store.dispatch(Action::SetThreadItems {
                thread_id: thread_id.clone(),
                items,
            });
        }

        let name = display_name(detail.name.as_deref(), &detail.preview);
        if name != DEFAULT_THREAD_NAME {
            self.store.dispatch(Action::SetThreadName {
                workspace_id: workspace_id.clone(),
                thread_id: thread_id.clone(),
                name,
            });
        }
        if let Some(updated_at) = detail.updated_at.map(normalize_timestamp_ms) {
            self.store.dispatch(Action::SetThreadTimestamp {
                workspace_id: workspace_id.clone(),
                thread_id: thread_id.clone(),
                timestamp: updated_at,
            });
        }
        self.store.dispatch(Action::MarkThreadLoaded {
            thread_id: thread_id.clone(),
            loaded: true,
        });
    }

    /// Resumes `thread_id`, or starts a fresh thread when that fails. Either way the result
    /// becomes the active thread.
    pub async fn open_thread(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
    ) -> Option<ThreadId> {
        self.activate_thread(workspace_id, thread_id);
        if let Some(thread_id) = self
            .resume_thread_for_workspace(workspace_id, thread_id, ResumeOptions::default())
            .await
        {
            return Some(thread_id);
        }
        tracing::info!(
            workspace_id = %workspace_id,
            thread_id = %thread_id,
            "resume failed, starting a new thread"
        );
        self.start_thread_for_workspace(workspace_id, true).await
    }

    pub async fn load_older_thread_items(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
    ) -> Option<ThreadId> {
        self.resume_thread_for_workspace(
            workspace_id,
            thread_id,
            ResumeOptions {
                force: true,
                replace_local: false,
                mode: MergeMode::LoadOlder,
            },
        )
        .await
    }

    pub fn activate_thread(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId) {
        self.store.dispatch(Action::SetActiveThread {
            workspace_id: workspace_id.clone(),
            thread_id: Some(thread_id.clone()),
        });
    }

    /// Replaces the workspace listing. Returns `Ok(false)` when a newer listing superseded
    /// this one and its results were discarded.
    pub async fn list_threads_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
        options: ListOptions,
    ) -> Result<bool, String> {
        let token = {
            let mut inner = self.lock();
            inner.next_list_token += 1;
            let token = inner.next_list_token;
            inner.list_token.insert(workspace_id.clone(), token);
            token
        };
        if !options.preserve_state {
            self.set_list_loading(workspace_id, true);
        }

        let has_known_activity = self.load_activity(workspace_id).await;
        let listed = self
            .fetch_threads(workspace_id, None, options.sort, has_known_activity)
            .await;
        if !self.is_current_list(workspace_id, token) {
            tracing::debug!(workspace_id = %workspace_id, token, "discarding stale thread list");
            return Ok(false);
        }

        let listed = match listed {
            Ok(listed) => listed,
            Err(err) => {
                self.set_list_loading(workspace_id, false);
                tracing::warn!(workspace_id = %workspace_id, error = %err, "failed to list threads");
                return Err(err);
            }
        };

        let (mut threads, activity) = self.summarize_listed(workspace_id, &listed.threads);
        if options.preserve_state
            && let Some(active) = self.store.active_thread_id(workspace_id)
            && !threads.iter().any(|thread| thread.id == active)
            && let Some(existing) = self
                .store
                .read(|state| state.thread(workspace_id, &active).cloned())
        {
            threads.push(existing);
        }
        sort_threads(&mut threads, options.sort);

        self.store.dispatch(Action::SetThreads {
            workspace_id: workspace_id.clone(),
            threads,
            sort: options.sort,
        });
        self.store.dispatch(Action::SetThreadListCursor {
            workspace_id: workspace_id.clone(),
            cursor: listed.next_cursor,
        });
        self.set_list_loading(workspace_id, false);
        if let Some(activity) = activity {
            self.save_activity(workspace_id, activity).await;
        }
        Ok(true)
    }

    /// Fetches the next pages after the stored cursor and appends threads not listed yet.
    pub async fn load_older_threads_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<bool, String> {
        let Some(cursor) = self.store.read(|state| {
            state
                .thread_list_cursor(workspace_id)
                .map(ToOwned::to_owned)
        }) else {
            return Ok(false);
        };
        let token = self
            .lock()
            .list_token
            .get(workspace_id)
            .copied()
            .unwrap_or_default();
        let sort = self.store.read(|state| {
            state
                .thread_sort_by_workspace
                .get(workspace_id)
                .copied()
                .unwrap_or_default()
        });

        self.set_list_paging(workspace_id, true);
        self.load_activity(workspace_id).await;
        let listed = self
            .fetch_threads(workspace_id, Some(cursor), sort, true)
            .await;
        if !self.is_current_list(workspace_id, token) {
            self.set_list_paging(workspace_id, false);
            tracing::debug!(workspace_id = %workspace_id, "discarding stale older threads");
            return Ok(false);
        }
        let listed = match listed {
            Ok(listed) => listed,
            Err(err) => {
                self.set_list_paging(workspace_id, false);
                tracing::warn!(workspace_id = %workspace_id, error = %err, "failed to load older threads");
                return Err(err);
            }
        };

        let (older, activity) = self.summarize_listed(workspace_id, &listed.threads);
        let mut threads = self
            .store
            .read(|state| state.threads(workspace_id).to_vec());
        let known: HashSet<ThreadId> = threads.iter().map(|thread| thread.id.clone()).collect();
        threads.extend(
            older
                .into_iter()
                .filter(|thread| !known.contains(&thread.id)),
        );

        self.store.dispatch(Action::SetThreads {
            workspace_id: workspace_id.clone(),
            threads,
            sort,
        });
        self.store.dispatch(Action::SetThreadListCursor {
            workspace_id: workspace_id.clone(),
            cursor: listed.next_cursor,
        });
        self.set_list_paging(workspace_id, false);
        if let Some(activity) = activity {
            self.save_activity(workspace_id, activity).await;
        }
        Ok(true)
    }

    fn is_current_list(&self, workspace_id: &WorkspaceId, token: u64) -> bool {
        self.lock().list_token.get(workspace_id).copied().unwrap_or_default() == token
    }

    fn set_list_loading(&self, workspace_id: &WorkspaceId, loading: bool) {
        self.store.dispatch(Action::SetThreadListLoading {
            workspace_id: workspace_id.clone(),
            loading,
        });
    }

    fn set_list_paging(&self, workspace_id: &WorkspaceId, paging: bool) {
        self.store.dispatch(Action::SetThreadListPaging {
            workspace_id: workspace_id.clone(),
            paging,
        });
    }

    async fn fetch_threads(
        &self,
        workspace_id: &WorkspaceId,
        mut cursor: Option<String>,
        sort: ThreadListSort,
        has_known_activity: bool,
    ) -> Result<ListedThreads, String> {
        let root = self.workspace_root(workspace_id);
        let sort_key = match sort {
            ThreadListSort::CreatedAt => ThreadSortKey::CreatedAt,
            ThreadListSort::UpdatedAt => ThreadSortKey::UpdatedAt,
        };
        let max_empty_pages = self.config.max_empty_pages(has_known_activity);

        let mut threads = Vec::new();
        let mut seen = HashSet::new();
        let mut pages = 0usize;
        let mut empty_pages = 0usize;
        loop {
            let response = call(
                "thread/list",
                workspace_id.as_str(),
                self.rpc.list_threads(
                    workspace_id.as_str(),
                    cursor.as_deref(),
                    self.config.list_page_size,
                    sort_key,
                ),
            )
            .await?;
            let page: ThreadListPage = decode_result(&response)?;
            pages += 1;

            for thread in page.data {
                if let Some(root) = &root
                    && &normalize_root(&thread.cwd) != root
                {
                    continue;
                }
                if seen.insert(thread.id.clone()) {
                    threads.push(thread);
                }
            }
            // Only pages before the first match count against the empty-page bound.
            if threads.is_empty() {
                empty_pages += 1;
            }
            cursor = page.next_cursor.filter(|cursor| !cursor.is_empty());

            if threads.len() >= self.config.list_target_count
                || cursor.is_none()
                || empty_pages >= max_empty_pages
                || pages >= self.config.list_max_pages
            {
                break;
            }
        }
        tracing::debug!(
            workspace_id = %workspace_id,
            pages,
            matched = threads.len(),
            "thread list fetched"
        );
        Ok(ListedThreads {
            threads,
            next_cursor: cursor,
        })
    }

    /// Converts listed threads, folding their timestamps into the activity cache and
    /// recording sub-agent parents. Returns the cache to persist when it changed.
    fn summarize_listed(
        &self,
        workspace_id: &WorkspaceId,
        listed: &[weft_api::ThreadSummary],
    ) -> (Vec<ThreadSummary>, Option<HashMap<ThreadId, i64>>) {
        let mut out = Vec::with_capacity(listed.len());
        let mut parents = Vec::new();
        let changed = {
            let mut inner = self.lock();
            let activity = inner.activity.entry(workspace_id.clone()).or_default();
            let mut changed = false;
            for thread in listed {
                let thread_id = ThreadId::new(thread.id.clone());
                let created_at = thread
                    .created_at
                    .or(thread.updated_at)
                    .map(normalize_timestamp_ms)
                    .unwrap_or_default();
                if let Some(updated_at) = thread.updated_at.map(normalize_timestamp_ms) {
                    let cached = activity.entry(thread_id.clone()).or_insert(0);
                    if updated_at > *cached {
                        *cached = updated_at;
                        changed = true;
                    }
                }
                let last_activity = activity
                    .get(&thread_id)
                    .copied()
                    .unwrap_or_default()
                    .max(created_at);

                if let Some(parent) = thread.source.as_ref().and_then(parent_thread_from_source) {
                    parents.push((thread_id.clone(), ThreadId::new(parent)));
                }
                out.push(ThreadSummary {
                    id: thread_id,
                    name: display_name(thread.name.as_deref(), &thread.preview),
                    created_at,
                    updated_at: last_activity,
                });
            }
            changed.then(|| activity.clone())
        };
        for (thread_id, parent_id) in parents {
            self.store.dispatch(Action::SetThreadParent {
                thread_id,
                parent_id,
            });
        }
        (out, changed)
    }

    fn cached_activity_known(&self, workspace_id: &WorkspaceId) -> Option<bool> {
        self.lock()
            .activity
            .get(workspace_id)
            .map(|activity| !activity.is_empty())
    }

    /// Loads the persisted activity cache once per workspace. Returns whether any activity
    /// is known.
    async fn load_activity(&self, workspace_id: &WorkspaceId) -> bool {
        if let Some(known) = self.cached_activity_known(workspace_id) {
            return known;
        }
        let _loading = self.activity_load.lock().await;
        if let Some(known) = self.cached_activity_known(workspace_id) {
            return known;
        }
        let key = workspace_id.clone();
        let loaded = self
            .prefs
            .run("load thread activity", move |prefs| {
                prefs.load_thread_activity(&key)
            })
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(workspace_id = %workspace_id, error = %err, "failed to load thread activity");
                HashMap::new()
            });
        let mut inner = self.lock();
        let activity = inner
            .activity
            .entry(workspace_id.clone())
            .or_insert(loaded);
        !activity.is_empty()
    }

    async fn save_activity(&self, workspace_id: &WorkspaceId, activity: HashMap<ThreadId, i64>) {
        let key = workspace_id.clone();
        let saved = self
            .prefs
            .run("save thread activity", move |prefs| {
                prefs.save_thread_activity(&key, &activity)
            })
            .await;
        if let Err(err) = saved {
            tracing::warn!(workspace_id = %workspace_id, error = %err, "failed to save thread activity");
        }
    }

    /// Bumps the cached activity of a thread and its listed timestamp.
    pub async fn record_thread_activity(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        timestamp: i64,
    ) {
        self.load_activity(workspace_id).await;
        let activity = {
            let mut inner = self.lock();
            let activity = inner.activity.entry(workspace_id.clone()).or_default();
            if activity.get(thread_id).is_some_and(|cached| *cached >= timestamp) {
                return;
            }
            activity.insert(thread_id.clone(), timestamp);
            activity.clone()
        };
        self.store.dispatch(Action::SetThreadTimestamp {
            workspace_id: workspace_id.clone(),
            thread_id: thread_id.clone(),
            timestamp,
        });
        self.save_activity(workspace_id, activity).await;
    }

    pub async fn archive_threads(
        &self,
        workspace_id: &WorkspaceId,
        thread_ids: &[ThreadId],
    ) -> ThreadArchiveBatchResult {
        let requested: Vec<String> = thread_ids
            .iter()
            .map(|thread_id| thread_id.as_str().to_owned())
            .collect();
        if requested.is_empty() {
            return ThreadArchiveBatchResult {
                all_succeeded: true,
                ..ThreadArchiveBatchResult::default()
            };
        }

        let batch = call(
            "thread/archiveMany",
            workspace_id.as_str(),
            self.rpc.archive_threads(workspace_id.as_str(), &requested),
        )
        .await
        .and_then(|response| decode_result::<ArchiveBatchResponse>(&response));
        let result = match batch {
            Ok(batch) => {
                let ok: HashSet<String> = batch.ok_ids.into_iter().collect();
                let failed: HashMap<String, String> = batch
                    .failed
                    .into_iter()
                    .map(|failure| (failure.thread_id, failure.error))
                    .collect();
                ThreadArchiveBatchResult::from_outcomes(&requested, &ok, &failed)
            }
            Err(err) if is_unsupported_method_error(&err) => {
                tracing::info!(
                    workspace_id = %workspace_id,
                    error = %err,
                    "batch archive unsupported, archiving one by one"
                );
                self.archive_one_by_one(workspace_id, &requested).await
            }
            Err(err) => {
                tracing::warn!(workspace_id = %workspace_id, error = %err, "batch archive failed");
                ThreadArchiveBatchResult::all_failed(&requested, &err)
            }
        };

        for thread_id in &result.ok_ids {
            self.store.dispatch(Action::RemoveThread {
                workspace_id: workspace_id.clone(),
                thread_id: ThreadId::new(thread_id.clone()),
            });
        }
        result
    }

    async fn archive_one_by_one(
        &self,
        workspace_id: &WorkspaceId,
        requested: &[String],
    ) -> ThreadArchiveBatchResult {
        let mut ok = HashSet::new();
        let mut failed = HashMap::new();
        for thread_id in requested {
            let outcome = call(
                "thread/archive",
                workspace_id.as_str(),
                self.rpc.archive_thread(workspace_id.as_str(), thread_id),
            )
            .await;
            match outcome {
                Ok(_) => {
                    ok.insert(thread_id.clone());
                }
                Err(err) => {
                    failed.insert(thread_id.clone(), err);
                }
            }
        }
        ThreadArchiveBatchResult::from_outcomes(requested, &ok, &failed)
    }

    /// Stores a user-chosen name and mirrors it to the server. The local name is kept when
    /// the server rejects it.
    pub async fn rename_thread(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        name: &str,
    ) {
        self.store.dispatch(Action::RenameThread {
            workspace_id: workspace_id.clone(),
            thread_id: thread_id.clone(),
            name: Some(name.to_owned()),
        });
        let Some(name) = self.store.read(|state| {
            state
                .custom_name(workspace_id, thread_id)
                .map(ToOwned::to_owned)
        }) else {
            return;
        };
        if let Err(err) = call(
            "thread/name/set",
            workspace_id.as_str(),
            self.rpc
                .set_thread_name(workspace_id.as_str(), thread_id.as_str(), &name),
        )
        .await
        {
            tracing::warn!(
                workspace_id = %workspace_id,
                thread_id = %thread_id,
                error = %err,
                "failed to mirror thread name"
            );
        }
    }

    pub fn toggle_thread_pin(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId) {
        self.store.dispatch(Action::ToggleThreadPin {
            workspace_id: workspace_id.clone(),
            thread_id: thread_id.clone(),
            now: self.store.now(),
        });
    }

    pub async fn load_workspace_preferences(&self, workspace_id: &WorkspaceId) {
        let key = workspace_id.clone();
        let pinned = self
            .prefs
            .run("load pinned threads", move |prefs| {
                prefs.load_pinned_threads(&key)
            })
            .await;
        match pinned {
            Ok(pinned) => {
                self.store.dispatch(Action::PinnedThreadsLoaded {
                    workspace_id: workspace_id.clone(),
                    pinned,
                });
            }
            Err(err) => {
                tracing::warn!(workspace_id = %workspace_id, error = %err, "failed to load pinned threads");
            }
        }
        self.load_activity(workspace_id).await;
    }

    /// Restores persisted detached-review parent links for `workspace_id`. Links whose child
    /// is gone from a complete listing are forgotten. Returns the number restored.
    pub async fn reconcile_detached_reviews(&self, workspace_id: &WorkspaceId) -> usize {
        let links = self
            .prefs
            .run("load detached reviews", |prefs| prefs.load_detached_review_links())
            .await;
        let links: Vec<_> = match links {
            Ok(links) => links
                .into_iter()
                .filter(|link| &link.workspace_id == workspace_id)
                .collect(),
            Err(err) => {
                tracing::warn!(workspace_id = %workspace_id, error = %err, "failed to load detached reviews");
                return 0;
            }
        };
        if links.is_empty() {
            return 0;
        }

        let listed = match self
            .fetch_threads(workspace_id, None, ThreadListSort::UpdatedAt, true)
            .await
        {
            Ok(listed) => listed,
            Err(err) => {
                tracing::debug!(workspace_id = %workspace_id, error = %err, "detached review reconcile skipped");
                return 0;
            }
        };
        let complete = listed.next_cursor.is_none();
        let sources: HashMap<&str, Option<&Value>> = listed
            .threads
            .iter()
            .map(|thread| (thread.id.as_str(), thread.source.as_ref()))
            .collect();

        let mut restored = 0;
        for link in links {
            match sources.get(link.child_thread_id.as_str()) {
                Some(source) => {
                    let matches = (*source).is_some_and(|source| {
                        is_review_source(source)
                            || parent_thread_from_source(source).as_deref()
                                == Some(link.parent_thread_id.as_str())
                    });
                    if matches {
                        self.store.dispatch(Action::SetThreadParent {
                            thread_id: link.child_thread_id.clone(),
                            parent_id: link.parent_thread_id.clone(),
                        });
                        restored += 1;
                    }
                }
                None if complete => {
                    let key = workspace_id.clone();
                    let removed = self
                        .prefs
                        .run("drop detached review", move |prefs| {
                            prefs.remove_detached_review_link(&key, &link.child_thread_id)
                        })
                        .await;
                    if let Err(err) = removed {
                        tracing::warn!(workspace_id = %workspace_id, error = %err, "failed to drop detached review");
                    }
                }
                None => {}
            }
        }
        restored
    }
}

fn normalize_root(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        path
    } else {
        trimmed.to_owned()
    }
}

/// Server name, else the first line of the preview, else the default.
fn display_name(name: Option<&str>, preview: &str) -> String {
    if let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) {
        return name.to_owned();
    }
    let first_line = preview.lines().map(str::trim).find(|line| !line.is_empty());
    match first_line {
        Some(line) if line.chars().count() > PREVIEW_NAME_MAX_CHARS => {
            let mut out: String = line.chars().take(PREVIEW_NAME_MAX_CHARS).collect();
            out.push('…');
            out
        }
        Some(line) => line.to_owned(),
        None => DEFAULT_THREAD_NAME.to_owned(),
    }
}

fn sort_threads(threads: &mut [ThreadSummary], sort: ThreadListSort) {
    match sort {
        ThreadListSort::UpdatedAt => threads.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        }),
        ThreadListSort::CreatedAt => threads.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        }),
    }
}

fn source_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    value
        .as_object()?
        .iter()
        .find(|(key, _)| keys.iter().any(|candidate| key.eq_ignore_ascii_case(candidate)))
        .map(|(_, value)| value)
}

/// Parent of a sub-agent thread, from `source.subagent.thread_spawn.parent_thread_id` (or
/// the same shape under `review`).
pub(crate) fn parent_thread_from_source(source: &Value) -> Option<String> {
    let sub_agent = source_field(source, &["subagent", "sub_agent"])?;
    let origin = source_field(sub_agent, &["thread_spawn", "threadSpawn"])
        .or_else(|| source_field(sub_agent, &["review"]))?;
    source_field(origin, &["parent_thread_id", "parentThreadId"])
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|parent| !parent.is_empty())
        .map(ToOwned::to_owned)
}

pub(crate) fn is_review_source(source: &Value) -> bool {
    match source_field(source, &["subagent", "sub_agent"]) {
        Some(Value::String(kind)) => kind.eq_ignore_ascii_case("review"),
        Some(sub_agent) if sub_agent.is_object() => {
            source_field(sub_agent, &["review"]).is_some()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parent_is_read_from_sub_agent_sources() {
        let spawn = json!({"subagent": {"thread_spawn": {"parent_thread_id": "p1", "depth": 1}}});
        assert_eq!(parent_thread_from_source(&spawn).as_deref(), Some("p1"));

        let camel = json!({"subAgent": {"threadSpawn": {"parentThreadId": "p2"}}});
        assert_eq!(parent_thread_from_source(&camel).as_deref(), Some("p2"));

        assert_eq!(parent_thread_from_source(&json!("vscode")), None);
        assert_eq!(parent_thread_from_source(&json!({"subagent": "review"})), None);
    }

    #[test]
    fn review_sources_are_recognized() {
        assert!(is_review_source(&json!({"subagent": "review"})));
        assert!(is_review_source(
            &json!({"subagent": {"review": {"parent_thread_id": "p"}}})
        ));
        assert!(!is_review_source(&json!({"subagent": "compact"})));
        assert!(!is_review_source(&json!("cli")));
    }

    #[test]
    fn display_name_prefers_name_then_preview() {
        assert_eq!(display_name(Some(" Fix CI "), "ignored"), "Fix CI");
        assert_eq!(display_name(None, "\n  first line\nsecond"), "first line");
        assert_eq!(display_name(Some(""), ""), DEFAULT_THREAD_NAME);

        let long = "x".repeat(60);
        let name = display_name(None, &long);
        assert_eq!(name.chars().count(), PREVIEW_NAME_MAX_CHARS + 1);
        assert!(name.ends_with('…'));
    }

    #[test]
    fn roots_compare_without_trailing_separators() {
        assert_eq!(normalize_root("/repo/app/"), "/repo/app");
        assert_eq!(normalize_root("C:\\repo\\app\\"), "C:/repo/app");
        assert_eq!(normalize_root("/"), "/");
    }

    #[test]
    fn unreported_archive_ids_count_as_failures() {
        let requested = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let ok = HashSet::from(["a".to_owned()]);
        let failed = HashMap::from([("b".to_owned(), "denied".to_owned())]);
        let result = ThreadArchiveBatchResult::from_outcomes(&requested, &ok, &failed);
        assert!(!result.all_succeeded);
        assert_eq!(result.ok_ids, vec!["a".to_owned()]);
        assert_eq!(result.total, 3);
        assert_eq!(
            result.failed,
            vec![
                ArchiveFailure {
                    thread_id: "b".to_owned(),
                    error: "denied".to_owned(),
                },
                ArchiveFailure {
                    thread_id: "c".to_owned(),
                    error: "missing result".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn created_sort_breaks_ties_by_id() {
        let summary = |id: &str, created_at: i64, updated_at: i64| ThreadSummary {
            id: ThreadId::new(id),
            name: id.to_owned(),
            created_at,
            updated_at,
        };
        let mut threads = vec![summary("b", 5, 9), summary("a", 5, 1), summary("c", 7, 2)];
        sort_threads(&mut threads, ThreadListSort::CreatedAt);
        let ids: Vec<_> = threads.iter().map(|thread| thread.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);

        sort_threads(&mut threads, ThreadListSort::UpdatedAt);
        let ids: Vec<_> = threads.iter().map(|thread| thread.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use weft_api::{ReviewDelivery, ReviewTarget, ThreadSortKey};
use weft_domain::{
    CodexDefaults, CustomThreadName, DetachedReviewLink, PreferenceStore, ThreadCodexParams,
    ThreadId, WorkspaceId,
};
use weft_engine::{Clock, EngineConfig, ThreadEngine, ThreadRpc, TurnRequest};

pub type Scripted = Result<Value, String>;

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub method: &'static str,
    pub workspace_id: String,
    pub args: Value,
}

/// Scripted agent server. Responses are queued per method; a method with nothing queued
/// falls back to its default, then to an error.
#[derive(Default)]
pub struct MockRpc {
    queued: Mutex<HashMap<&'static str, VecDeque<Scripted>>>,
    defaults: Mutex<HashMap<&'static str, Scripted>>,
    gates: Mutex<HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockRpc {
    pub fn push(&self, method: &'static str, response: Scripted) {
        self.queued
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(response);
    }

    pub fn set_default(&self, method: &'static str, response: Scripted) {
        self.defaults.lock().unwrap().insert(method, response);
    }

    /// The next call to `method` waits until the returned sender fires (or is dropped).
    pub fn gate(&self, method: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    pub fn args(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == method)
            .map(|call| call.args.clone())
            .collect()
    }

    async fn respond(&self, method: &'static str, workspace_id: &str, args: Value) -> Scripted {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            workspace_id: workspace_id.to_owned(),
            args,
        });
        let response = self
            .queued
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.defaults.lock().unwrap().get(method).cloned())
            .unwrap_or_else(|| Err(format!("no scripted response for {method}")));
        let gate = self
            .gates
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        response
    }
}

#[async_trait]
impl ThreadRpc for MockRpc {
    async fn start_thread(&self, workspace_id: &str) -> Result<Value, String> {
        self.respond("thread/start", workspace_id, json!({})).await
    }

    async fn fork_thread(&self, workspace_id: &str, thread_id: &str) -> Result<Value, String> {
        self.respond("thread/fork", workspace_id, json!({ "threadId": thread_id }))
            .await
    }

    async fn resume_thread(&self, workspace_id: &str, thread_id: &str) -> Result<Value, String> {
        self.respond("thread/resume", workspace_id, json!({ "threadId": thread_id }))
            .await
    }

    async fn list_threads(
        &self,
        workspace_id: &str,
        cursor: Option<&str>,
        limit: u32,
        sort_key: ThreadSortKey,
    ) -> Result<Value, String> {
        let args = json!({ "cursor": cursor, "limit": limit, "sortKey": sort_key.as_str() });
        self.respond("thread/list", workspace_id, args).await
    }

    async fn archive_thread(&self, workspace_id: &str, thread_id: &str) -> Result<Value, String> {
        self.respond("thread/archive", workspace_id, json!({ "threadId": thread_id }))
            .await
    }

    async fn archive_threads(
        &self,
        workspace_id: &str,
        thread_ids: &[String],
    ) -> Result<Value, String> {
        self.respond("thread/archiveMany", workspace_id, json!({ "threadIds": thread_ids }))
            .await
    }

    async fn send_user_message(
        &self,
        workspace_id: &str,
        thread_id: &str,
        request: &TurnRequest,
    ) -> Result<Value, String> {
        let args = json!({
            "threadId": thread_id,
            "text": request.text,
            "model": request.model,
            "effort": request.effort.map(|effort| effort.as_str()),
            "collaborationMode": request.collaboration_mode,
            "accessMode": request.access_mode.as_str(),
            "codexArgs": request.codex_args,
        });
        self.respond("turn/start", workspace_id, args).await
    }

    async fn steer_turn(
        &self,
        workspace_id: &str,
        thread_id: &str,
        turn_id: &str,
        text: &str,
        _images: &[String],
    ) -> Result<Value, String> {
        let args = json!({ "threadId": thread_id, "turnId": turn_id, "text": text });
        self.respond("turn/steer", workspace_id, args).await
    }

    async fn interrupt_turn(
        &self,
        workspace_id: &str,
        thread_id: &str,
        turn_id: &str,
    ) -> Result<Value, String> {
        let args = json!({ "threadId": thread_id, "turnId": turn_id });
        self.respond("turn/interrupt", workspace_id, args).await
    }

    async fn start_review(
        &self,
        workspace_id: &str,
        thread_id: &str,
        target: &ReviewTarget,
        delivery: ReviewDelivery,
    ) -> Result<Value, String> {
        let args = json!({ "threadId": thread_id, "target": target, "delivery": delivery.as_str() });
        self.respond("review/start", workspace_id, args).await
    }

    async fn compact_thread(&self, workspace_id: &str, thread_id: &str) -> Result<Value, String> {
        self.respond("thread/compact", workspace_id, json!({ "threadId": thread_id }))
            .await
    }

    async fn list_apps(&self, workspace_id: &str, cursor: Option<&str>) -> Result<Value, String> {
        self.respond("app/list", workspace_id, json!({ "cursor": cursor }))
            .await
    }

    async fn list_mcp_servers(&self, workspace_id: &str) -> Result<Value, String> {
        self.respond("mcpServerStatus/list", workspace_id, json!({}))
            .await
    }

    async fn set_thread_name(
        &self,
        workspace_id: &str,
        thread_id: &str,
        name: &str,
    ) -> Result<Value, String> {
        let args = json!({ "threadId": thread_id, "name": name });
        self.respond("thread/name/set", workspace_id, args).await
    }

    async fn respond_to_approval(
        &self,
        workspace_id: &str,
        request_id: &Value,
        result: Value,
    ) -> Result<Value, String> {
        let args = json!({ "id": request_id, "result": result });
        self.respond("approval/respond", workspace_id, args).await
    }

    async fn respond_to_user_input(
        &self,
        workspace_id: &str,
        request_id: &Value,
        result: Value,
    ) -> Result<Value, String> {
        let args = json!({ "id": request_id, "result": result });
        self.respond("userInput/respond", workspace_id, args).await
    }
}

#[derive(Default)]
pub struct InMemoryPrefs {
    pub activity: Mutex<HashMap<WorkspaceId, HashMap<ThreadId, i64>>>,
    pub pinned: Mutex<HashMap<WorkspaceId, HashMap<ThreadId, i64>>>,
    pub names: Mutex<Vec<CustomThreadName>>,
    pub codex_params: Mutex<HashMap<String, ThreadCodexParams>>,
    pub detached_reviews: Mutex<Vec<DetachedReviewLink>>,
}

impl PreferenceStore for InMemoryPrefs {
    fn load_thread_activity(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<HashMap<ThreadId, i64>, String> {
        Ok(self
            .activity
            .lock()
            .unwrap()
            .get(workspace_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_thread_activity(
        &self,
        workspace_id: &WorkspaceId,
        activity: &HashMap<ThreadId, i64>,
    ) -> Result<(), String> {
        self.activity
            .lock()
            .unwrap()
            .insert(workspace_id.clone(), activity.clone());
        Ok(())
    }

    fn load_pinned_threads(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<HashMap<ThreadId, i64>, String> {
        Ok(self
            .pinned
            .lock()
            .unwrap()
            .get(workspace_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_pinned_threads(
        &self,
        workspace_id: &WorkspaceId,
        pinned: &HashMap<ThreadId, i64>,
    ) -> Result<(), String> {
        self.pinned
            .lock()
            .unwrap()
            .insert(workspace_id.clone(), pinned.clone());
        Ok(())
    }

    fn load_custom_thread_names(&self) -> Result<Vec<CustomThreadName>, String> {
        Ok(self.names.lock().unwrap().clone())
    }

    fn save_custom_thread_name(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        name: Option<&str>,
    ) -> Result<(), String> {
        let mut names = self.names.lock().unwrap();
        names.retain(|entry| !(&entry.workspace_id == workspace_id && &entry.thread_id == thread_id));
        if let Some(name) = name {
            names.push(CustomThreadName {
                workspace_id: workspace_id.clone(),
                thread_id: thread_id.clone(),
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn load_codex_params(&self, scope_key: &str) -> Result<Option<ThreadCodexParams>, String> {
        Ok(self.codex_params.lock().unwrap().get(scope_key).cloned())
    }

    fn save_codex_params(&self, scope_key: &str, params: &ThreadCodexParams) -> Result<(), String> {
        self.codex_params
            .lock()
            .unwrap()
            .insert(scope_key.to_owned(), params.clone());
        Ok(())
    }

    fn load_detached_review_links(&self) -> Result<Vec<DetachedReviewLink>, String> {
        Ok(self.detached_reviews.lock().unwrap().clone())
    }

    fn save_detached_review_link(&self, link: &DetachedReviewLink) -> Result<(), String> {
        let mut links = self.detached_reviews.lock().unwrap();
        links.retain(|existing| {
            !(existing.workspace_id == link.workspace_id
                && existing.child_thread_id == link.child_thread_id)
        });
        links.push(link.clone());
        Ok(())
    }

    fn remove_detached_review_link(
        &self,
        workspace_id: &WorkspaceId,
        child_thread_id: &ThreadId,
    ) -> Result<(), String> {
        self.detached_reviews.lock().unwrap().retain(|existing| {
            !(&existing.workspace_id == workspace_id && &existing.child_thread_id == child_thread_id)
        });
        Ok(())
    }
}

/// Manually driven wall clock.
#[derive(Clone, Default)]
pub struct TestClock(Arc<AtomicI64>);

impl TestClock {
    pub fn clock(&self) -> Clock {
        let now = self.0.clone();
        Arc::new(move || now.load(Ordering::SeqCst))
    }

    pub fn set(&self, unix_ms: i64) {
        self.0.store(unix_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub engine: ThreadEngine,
    pub rpc: Arc<MockRpc>,
    pub prefs: Arc<InMemoryPrefs>,
    pub clock: TestClock,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default(), InMemoryPrefs::default())
}

pub fn harness_with(config: EngineConfig, prefs: InMemoryPrefs) -> Harness {
    let rpc = Arc::new(MockRpc::default());
    let prefs = Arc::new(prefs);
    let clock = TestClock::default();
    clock.set(1_000_000);
    let engine = ThreadEngine::new(
        rpc.clone(),
        prefs.clone(),
        config,
        CodexDefaults::default(),
        clock.clock(),
    );
    Harness {
        engine,
        rpc,
        prefs,
        clock,
    }
}

pub fn ws() -> WorkspaceId {
    WorkspaceId::new("ws-1")
}

pub fn thread(id: &str) -> ThreadId {
    ThreadId::new(id)
}

pub fn agent_item(id: &str, text: &str) -> Value {
    json!({ "type": "agentMessage", "id": id, "text": text })
}

pub fn thread_response(id: &str, turns: Value) -> Scripted {
    Ok(json!({ "result": { "thread": { "id": id, "preview": "", "turns": turns } } }))
}

pub fn completed_turn(id: &str, items: Vec<Value>) -> Value {
    json!({ "id": id, "status": "completed", "items": items })
}

pub fn turn_started(turn_id: &str) -> Scripted {
    Ok(json!({ "result": { "turn": { "id": turn_id, "status": "inProgress" } } }))
}

pub fn item_ids(harness: &Harness, thread_id: &ThreadId) -> Vec<String> {
    harness
        .engine
        .store()
        .items(thread_id)
        .into_iter()
        .map(|item| item.id)
        .collect()
}

/// Puts `thread_id` into a running turn, as if `turn/started` had been received.
pub fn start_running_turn(harness: &Harness, thread_id: &ThreadId, turn_id: &str) {
    let store = harness.engine.store();
    harness.engine.actions().activate_thread(&ws(), thread_id);
    store.mark_processing(thread_id, true);
    store.set_active_turn(thread_id, Some(turn_id.to_owned()));
}

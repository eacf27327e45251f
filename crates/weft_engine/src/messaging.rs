use crate::codex::CodexSettings;
use crate::config::EngineConfig;
use crate::metrics::PromptMetrics;
use crate::prefs::Prefs;
use crate::rpc::{ThreadRpc, TurnRequest, call, is_unsupported_method_error};
use crate::store::Store;
use crate::threads::{ResumeOptions, ThreadActions};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use weft_api::{ReviewDelivery, ReviewStartResponse, ReviewTarget, TurnResponse, decode_result, rpc_result};
use weft_domain::{
    AccessMode, Action, ConversationItem, DetachedReviewLink, ThinkingEffort,
    ThreadId, TurnPhase, WorkspaceId, local_item_id,
};

/// Turn id sent with an interrupt issued before the real id is known.
pub const PENDING_TURN_ID: &str = "pending";

/// Call-time overrides for a single message. Unset fields fall back to the thread's
/// resolved parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SendOptions {
    pub images: Vec<String>,
    pub model: Option<String>,
    pub effort: Option<ThinkingEffort>,
    pub collaboration_mode: Option<String>,
    pub access_mode: Option<AccessMode>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    Steered,
    Started { turn_id: Option<String> },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SlashCommand<'a> {
    Review(&'a str),
    Fork(&'a str),
    Compact,
    Status,
    Apps,
    Mcp,
    Resume,
    New(&'a str),
}

fn parse_slash_command(text: &str) -> Option<SlashCommand<'_>> {
    let rest = text.strip_prefix('/')?;
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let command = match name.to_ascii_lowercase().as_str() {
        "review" => SlashCommand::Review(args),
        "fork" => SlashCommand::Fork(args),
        "compact" => SlashCommand::Compact,
        "status" => SlashCommand::Status,
        "apps" => SlashCommand::Apps,
        "mcp" => SlashCommand::Mcp,
        "resume" => SlashCommand::Resume,
        "new" => SlashCommand::New(args),
        _ => return None,
    };
    Some(command)
}

enum SteerError {
    Unsupported,
    Failed(String),
}

#[derive(Default)]
struct MessagingInner {
    steer_unsupported: HashSet<WorkspaceId>,
    pending_interrupts: HashSet<ThreadId>,
}

/// Sending, steering, interrupting and the composer sub-commands.
pub struct ThreadMessaging {
    store: Arc<Store>,
    rpc: Arc<dyn ThreadRpc>,
    prefs: Prefs,
    config: EngineConfig,
    codex: Arc<CodexSettings>,
    actions: Arc<ThreadActions>,
    metrics: Arc<PromptMetrics>,
    inner: Mutex<MessagingInner>,
}

impl ThreadMessaging {
    pub(crate) fn new(
        store: Arc<Store>,
        rpc: Arc<dyn ThreadRpc>,
        prefs: Prefs,
        config: EngineConfig,
        codex: Arc<CodexSettings>,
        actions: Arc<ThreadActions>,
        metrics: Arc<PromptMetrics>,
    ) -> Self {
        Self {
            store,
            rpc,
            prefs,
            config,
            codex,
            actions,
            metrics,
            inner: Mutex::new(MessagingInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MessagingInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_steer_unsupported(&self, workspace_id: &WorkspaceId) -> bool {
        self.lock().steer_unsupported.contains(workspace_id)
    }

    /// Composer entry point: runs slash commands, otherwise sends `text` to the active
    /// thread, creating one first when the workspace has none.
    pub async fn send_user_message(
        &self,
        workspace_id: &WorkspaceId,
        text: &str,
        options: SendOptions,
    ) -> Result<(), String> {
        let text = text.trim();
        if let Some(command) = parse_slash_command(text) {
            return self.run_command(workspace_id, command, options).await;
        }
        let thread_id = self.ensure_active_thread(workspace_id).await?;
        self.send_message_to_thread(workspace_id, &thread_id, text, options)
            .await
            .map(|_| ())
    }

    async fn ensure_active_thread(&self, workspace_id: &WorkspaceId) -> Result<ThreadId, String> {
        if let Some(thread_id) = self.store.active_thread_id(workspace_id) {
            return Ok(thread_id);
        }
        self.actions
            .start_thread_for_workspace(workspace_id, true)
            .await
            .ok_or_else(|| "failed to start a thread".to_owned())
    }

    async fn run_command(
        &self,
        workspace_id: &WorkspaceId,
        command: SlashCommand<'_>,
        options: SendOptions,
    ) -> Result<(), String> {
        if let SlashCommand::New(text) = command {
            let thread_id = self
                .actions
                .start_thread_for_workspace(workspace_id, true)
                .await
                .ok_or_else(|| "failed to start a thread".to_owned())?;
            if !text.is_empty() {
                self.send_message_to_thread(workspace_id, &thread_id, text, options)
                    .await?;
            }
            return Ok(());
        }
        if let SlashCommand::Resume = command {
            let thread_id = self
                .store
                .active_thread_id(workspace_id)
                .ok_or_else(|| "no active thread".to_owned())?;
            return self.start_resume(workspace_id, &thread_id).await;
        }

        let thread_id = self.ensure_active_thread(workspace_id).await?;
        match command {
            SlashCommand::Review(instructions) => {
                let target = if instructions.is_empty() {
                    ReviewTarget::UncommittedChanges
                } else {
                    ReviewTarget::Custom {
                        instructions: instructions.to_owned(),
                    }
                };
                self.start_review_target(workspace_id, &thread_id, target, ReviewDelivery::Inline)
                    .await
                    .map(|_| ())
            }
            SlashCommand::Fork(text) => self
                .start_fork(workspace_id, &thread_id, text)
                .await
                .map(|_| ())
                .ok_or_else(|| "failed to fork thread".to_owned()),
            SlashCommand::Compact => self.start_compact(workspace_id, &thread_id).await,
            SlashCommand::Status => {
                self.start_status(workspace_id, &thread_id).await;
                Ok(())
            }
            SlashCommand::Apps => self.start_apps(workspace_id, &thread_id).await,
            SlashCommand::Mcp => self.start_mcp(workspace_id, &thread_id).await,
            SlashCommand::New(_) | SlashCommand::Resume => Ok(()),
        }
    }

    async fn build_turn_request(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        text: &str,
        options: SendOptions,
    ) -> TurnRequest {
        let state = self.codex.thread_state(workspace_id, Some(thread_id)).await;
        let codex_args = self.codex.runtime_args(workspace_id, Some(thread_id)).await;
        TurnRequest {
            text: text.to_owned(),
            images: options.images,
            model: options.model.or(state.preferred_model_id),
            effort: options.effort.or(state.preferred_effort),
            collaboration_mode: options
                .collaboration_mode
                .or(state.preferred_collab_mode_id),
            access_mode: options.access_mode.unwrap_or(state.access_mode),
            codex_args,
        }
    }

    fn steerable_turn(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId) -> Option<String> {
        if !self.config.steer_enabled
            || !self.store.is_processing(thread_id)
            || self.is_steer_unsupported(workspace_id)
        {
            return None;
        }
        self.store
            .active_turn_id(thread_id)
            .filter(|turn_id| turn_id != PENDING_TURN_ID)
    }

    /// Sends into the running turn when possible, otherwise starts a new turn. Failures are
    /// also appended to the conversation.
    pub async fn send_message_to_thread(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        text: &str,
        options: SendOptions,
    ) -> Result<SendOutcome, String> {
        let text = text.trim();
        if text.is_empty() && options.images.is_empty() {
            return Err("message is empty".to_owned());
        }
        self.metrics.record_prompt_sent(workspace_id, thread_id);
        let request = self
            .build_turn_request(workspace_id, thread_id, text, options)
            .await;

        if let Some(turn_id) = self.steerable_turn(workspace_id, thread_id) {
            match self.steer(workspace_id, thread_id, &turn_id, &request).await {
                Ok(()) => return Ok(SendOutcome::Steered),
                Err(SteerError::Unsupported) => {}
                Err(SteerError::Failed(err)) => {
                    self.store.push_thread_error(workspace_id, thread_id, &err);
                    return Err(err);
                }
            }
        }
        self.start_turn(workspace_id, thread_id, &request).await
    }

    async fn steer(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        turn_id: &str,
        request: &TurnRequest,
    ) -> Result<(), SteerError> {
        let optimistic =
            ConversationItem::user_message(local_item_id("user"), &request.text, request.images.clone());
        let optimistic_id = optimistic.id.clone();
        self.store.dispatch(Action::UpsertItem {
            thread_id: thread_id.clone(),
            item: optimistic,
            timestamp: self.store.now(),
        });

        let result = call(
            "turn/steer",
            workspace_id.as_str(),
            self.rpc.steer_turn(
                workspace_id.as_str(),
                thread_id.as_str(),
                turn_id,
                &request.text,
                &request.images,
            ),
        )
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unsupported_method_error(&err) => {
                self.lock().steer_unsupported.insert(workspace_id.clone());
                self.store.dispatch(Action::RemoveItem {
                    thread_id: thread_id.clone(),
                    item_id: optimistic_id,
                });
                tracing::info!(
                    workspace_id = %workspace_id,
                    error = %err,
                    "steer unsupported, falling back to turn/start"
                );
                Err(SteerError::Unsupported)
            }
            Err(err) => Err(SteerError::Failed(err)),
        }
    }

    async fn start_turn(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        request: &TurnRequest,
    ) -> Result<SendOutcome, String> {
        self.store.mark_processing(thread_id, true);
        self.store.set_turn_phase(thread_id, TurnPhase::Starting);

        let response = call(
            "turn/start",
            workspace_id.as_str(),
            self.rpc
                .send_user_message(workspace_id.as_str(), thread_id.as_str(), request),
        )
        .await
        .and_then(|response| decode_result::<TurnResponse>(&response));
        match response {
            Ok(response) => {
                let turn_id = response.turn_id().map(ToOwned::to_owned);
                if let Some(turn_id) = &turn_id {
                    self.adopt_turn(workspace_id, thread_id, turn_id).await;
                }
                Ok(SendOutcome::Started { turn_id })
            }
            Err(err) => {
                self.store.reset_turn(thread_id);
                self.store.set_turn_phase(thread_id, TurnPhase::Failed);
                self.store.push_thread_error(workspace_id, thread_id, &err);
                Err(err)
            }
        }
    }

    /// Records `turn_id` as the running turn, or interrupts it if a stop was requested while
    /// the id was still unknown.
    pub(crate) async fn adopt_turn(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        turn_id: &str,
    ) {
        if self.take_pending_interrupt(thread_id) {
            self.send_interrupt(workspace_id, thread_id, turn_id).await;
            return;
        }
        self.store.set_active_turn(thread_id, Some(turn_id.to_owned()));
        self.store.set_turn_phase(thread_id, TurnPhase::InProgress);
    }

    /// Stops the running turn. Local state is cleared before the request goes out.
    pub async fn interrupt_turn(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId) {
        let was_processing = self.store.is_processing(thread_id);
        let turn_id = self
            .store
            .active_turn_id(thread_id)
            .filter(|turn_id| turn_id != PENDING_TURN_ID);
        self.store.reset_turn(thread_id);

        let target = match turn_id {
            Some(turn_id) => turn_id,
            None => {
                if was_processing {
                    self.lock().pending_interrupts.insert(thread_id.clone());
                }
                PENDING_TURN_ID.to_owned()
            }
        };
        self.send_interrupt(workspace_id, thread_id, &target).await;
    }

    pub fn has_pending_interrupt(&self, thread_id: &ThreadId) -> bool {
        self.lock().pending_interrupts.contains(thread_id)
    }

    pub fn take_pending_interrupt(&self, thread_id: &ThreadId) -> bool {
        self.lock().pending_interrupts.remove(thread_id)
    }

    async fn send_interrupt(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId, turn_id: &str) {
        let result = call(
            "turn/interrupt",
            workspace_id.as_str(),
            self.rpc
                .interrupt_turn(workspace_id.as_str(), thread_id.as_str(), turn_id),
        )
        .await;
        if let Err(err) = result {
            tracing::warn!(
                workspace_id = %workspace_id,
                thread_id = %thread_id,
                turn_id,
                error = %err,
                "interrupt failed"
            );
        }
    }

    /// Starts a review. Inline reviews lock the thread; detached reviews run in a child
    /// thread whose id is returned.
    pub async fn start_review_target(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        target: ReviewTarget,
        delivery: ReviewDelivery,
    ) -> Result<Option<ThreadId>, String> {
        let inline = delivery == ReviewDelivery::Inline;
        if inline {
            self.store.mark_processing(thread_id, true);
            self.store.mark_reviewing(thread_id, true);
            self.store.set_turn_phase(thread_id, TurnPhase::Starting);
        }

        let response = call(
            "review/start",
            workspace_id.as_str(),
            self.rpc
                .start_review(workspace_id.as_str(), thread_id.as_str(), &target, delivery),
        )
        .await
        .and_then(|response| decode_result::<ReviewStartResponse>(&response));
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                if inline {
                    self.store.reset_turn(thread_id);
                }
                self.store.push_thread_error(workspace_id, thread_id, &err);
                return Err(err);
            }
        };

        let review_thread = response
            .review_thread_id
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty() && id != thread_id.as_str())
            .map(ThreadId::new);
        if inline {
            if let Some(turn) = response.turn {
                self.adopt_turn(workspace_id, thread_id, &turn.id).await;
            }
            return Ok(review_thread);
        }

        if let Some(child) = &review_thread {
            self.register_detached_review(workspace_id, thread_id, child)
                .await;
        }
        Ok(review_thread)
    }

    async fn register_detached_review(
        &self,
        workspace_id: &WorkspaceId,
        parent: &ThreadId,
        child: &ThreadId,
    ) {
        let now = self.store.now();
        self.store.dispatch(Action::EnsureThread {
            workspace_id: workspace_id.clone(),
            thread_id: child.clone(),
            timestamp: now,
        });
        self.store.dispatch(Action::SetThreadParent {
            thread_id: child.clone(),
            parent_id: parent.clone(),
        });
        let link = DetachedReviewLink {
            workspace_id: workspace_id.clone(),
            parent_thread_id: parent.clone(),
            child_thread_id: child.clone(),
            created_at_unix_ms: now,
        };
        let saved = self
            .prefs
            .run("save detached review", move |prefs| {
                prefs.save_detached_review_link(&link)
            })
            .await;
        if let Err(err) = saved {
            tracing::warn!(
                workspace_id = %workspace_id,
                thread_id = %child,
                error = %err,
                "failed to save detached review"
            );
        }
    }

    /// Forks `thread_id` into a new active thread and sends `text` there when non-empty.
    pub async fn start_fork(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        text: &str,
    ) -> Option<ThreadId> {
        let Some(forked) = self
            .actions
            .fork_thread_for_workspace(workspace_id, thread_id, true)
            .await
        else {
            self.store
                .push_thread_error(workspace_id, thread_id, "failed to fork thread");
            return None;
        };
        self.store.dispatch(Action::SetThreadParent {
            thread_id: forked.clone(),
            parent_id: thread_id.clone(),
        });
        let text = text.trim();
        if !text.is_empty()
            && let Err(err) = self
                .send_message_to_thread(workspace_id, &forked, text, SendOptions::default())
                .await
        {
            tracing::debug!(
                workspace_id = %workspace_id,
                thread_id = %forked,
                error = %err,
                "failed to send into forked thread"
            );
        }
        Some(forked)
    }

    pub async fn start_resume(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
    ) -> Result<(), String> {
        if self.store.is_processing(thread_id) {
            return Ok(());
        }
        match self
            .actions
            .resume_thread_for_workspace(workspace_id, thread_id, ResumeOptions::forced())
            .await
        {
            Some(_) => Ok(()),
            None => {
                let message = "failed to resume thread".to_owned();
                self.store
                    .push_thread_error(workspace_id, thread_id, &message);
                Err(message)
            }
        }
    }

    pub async fn start_compact(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
    ) -> Result<(), String> {
        let result = call(
            "thread/compact",
            workspace_id.as_str(),
            self.rpc
                .compact_thread(workspace_id.as_str(), thread_id.as_str()),
        )
        .await;
        if let Err(err) = &result {
            self.store.push_thread_error(workspace_id, thread_id, err);
        }
        result.map(|_| ())
    }

    pub async fn start_status(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId) {
        let state = self.codex.thread_state(workspace_id, Some(thread_id)).await;
        let status = self
            .store
            .read(|threads| threads.status(thread_id).cloned())
            .unwrap_or_default();
        let turn = match self.store.active_turn_id(thread_id) {
            Some(turn_id) => format!("{:?} ({turn_id})", status.phase),
            None => format!("{:?}", status.phase),
        };
        let lines = [
            format!("Thread: {thread_id}"),
            format!(
                "Model: {}",
                state.preferred_model_id.as_deref().unwrap_or("default")
            ),
            format!(
                "Reasoning effort: {}",
                state.preferred_effort.map_or("default", |effort| effort.as_str())
            ),
            format!("Access: {}", state.access_mode.as_str()),
            format!(
                "Collaboration mode: {}",
                state.preferred_collab_mode_id.as_deref().unwrap_or("default")
            ),
            format!(
                "Codex args: {}",
                state
                    .preferred_codex_args_override
                    .as_deref()
                    .unwrap_or("none")
            ),
            format!("Turn: {turn}"),
        ];
        self.store
            .push_assistant_notice(thread_id, lines.join("\n"));
    }

    pub async fn start_apps(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
    ) -> Result<(), String> {
        let result = call(
            "app/list",
            workspace_id.as_str(),
            self.rpc.list_apps(workspace_id.as_str(), None),
        )
        .await;
        match result {
            Ok(response) => {
                self.store
                    .push_assistant_notice(thread_id, format_listing("Apps", &response, describe_app));
                Ok(())
            }
            Err(err) => {
                self.store.push_thread_error(workspace_id, thread_id, &err);
                Err(err)
            }
        }
    }

    pub async fn start_mcp(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
    ) -> Result<(), String> {
        let result = call(
            "mcpServerStatus/list",
            workspace_id.as_str(),
            self.rpc.list_mcp_servers(workspace_id.as_str()),
        )
        .await;
        match result {
            Ok(response) => {
                self.store.push_assistant_notice(
                    thread_id,
                    format_listing("MCP servers", &response, describe_mcp_server),
                );
                Ok(())
            }
            Err(err) => {
                self.store.push_thread_error(workspace_id, thread_id, &err);
                Err(err)
            }
        }
    }
}

fn listing_entries(response: &Value) -> &[Value] {
    let result = rpc_result(response);
    result
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| result.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn format_listing(title: &str, response: &Value, describe: fn(&Value) -> Option<String>) -> String {
    let lines: Vec<String> = listing_entries(response)
        .iter()
        .filter_map(describe)
        .map(|line| format!("- {line}"))
        .collect();
    if lines.is_empty() {
        return format!("{title}: none");
    }
    format!("{title}:\n{}", lines.join("\n"))
}

fn entry_name(entry: &Value) -> Option<&str> {
    entry
        .get("name")
        .or_else(|| entry.get("id"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn describe_app(entry: &Value) -> Option<String> {
    let name = entry_name(entry)?;
    let mut line = name.to_owned();
    if let Some(description) = entry
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|description| !description.is_empty())
    {
        line.push_str(": ");
        line.push_str(description);
    }
    if entry.get("isEnabled").and_then(Value::as_bool) == Some(false) {
        line.push_str(" (disabled)");
    }
    Some(line)
}

fn describe_mcp_server(entry: &Value) -> Option<String> {
    let name = entry_name(entry)?;
    let tools = match entry.get("tools") {
        Some(Value::Object(tools)) => tools.len(),
        Some(Value::Array(tools)) => tools.len(),
        _ => 0,
    };
    let mut line = format!("{name} ({tools} tools)");
    if let Some(status) = entry
        .get("authStatus")
        .or_else(|| entry.get("status"))
        .and_then(Value::as_str)
    {
        line.push_str(&format!(", {status}"));
    }
    Some(line)
}

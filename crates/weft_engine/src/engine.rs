use crate::approvals::ApprovalRelay;
use crate::codex::CodexSettings;
use crate::config::EngineConfig;
use crate::events::ThreadEventRouter;
use crate::messaging::ThreadMessaging;
use crate::metrics::PromptMetrics;
use crate::prefs::Prefs;
use crate::rpc::ThreadRpc;
use crate::store::{Clock, Store, system_clock};
use crate::threads::{ListOptions, ThreadActions};
use crate::watchdog::StaleTurnWatchdog;
use anyhow::Context as _;
use serde_json::Value;
use std::sync::Arc;
use weft_api::{ServerEvent, decode_notification};
use weft_backend::SqliteStore;
use weft_domain::{Action, CodexDefaults, PreferenceStore, WorkspaceId};

/// Wires the services together around one shared [`Store`].
pub struct ThreadEngine {
    store: Arc<Store>,
    prefs: Prefs,
    config: EngineConfig,
    codex: Arc<CodexSettings>,
    actions: Arc<ThreadActions>,
    messaging: Arc<ThreadMessaging>,
    approvals: ApprovalRelay,
    watchdog: Arc<StaleTurnWatchdog>,
    router: ThreadEventRouter,
    metrics: Arc<PromptMetrics>,
}

impl ThreadEngine {
    pub fn new(
        rpc: Arc<dyn ThreadRpc>,
        prefs: Arc<dyn PreferenceStore>,
        config: EngineConfig,
        defaults: CodexDefaults,
        clock: Clock,
    ) -> Self {
        let store = Arc::new(Store::new(prefs.clone(), clock));
        let prefs = Prefs::new(prefs);
        let codex = Arc::new(CodexSettings::new(store.clone(), prefs.clone(), defaults));
        let actions = Arc::new(ThreadActions::new(
            store.clone(),
            rpc.clone(),
            prefs.clone(),
            config.clone(),
            codex.clone(),
        ));
        let metrics = Arc::new(PromptMetrics::default());
        let messaging = Arc::new(ThreadMessaging::new(
            store.clone(),
            rpc.clone(),
            prefs.clone(),
            config.clone(),
            codex.clone(),
            actions.clone(),
            metrics.clone(),
        ));
        let watchdog = Arc::new(StaleTurnWatchdog::new(
            store.clone(),
            config.stale_turn_policy,
        ));
        let router = ThreadEventRouter::new(
            store.clone(),
            actions.clone(),
            messaging.clone(),
            watchdog.clone(),
        );
        let approvals = ApprovalRelay::new(store.clone(), rpc);

        Self {
            store,
            prefs,
            config,
            codex,
            actions,
            messaging,
            approvals,
            watchdog,
            router,
            metrics,
        }
    }

    /// Engine backed by the SQLite preference store in `config.data_dir`.
    pub fn with_sqlite(
        rpc: Arc<dyn ThreadRpc>,
        config: EngineConfig,
        defaults: CodexDefaults,
    ) -> anyhow::Result<Self> {
        let data_dir = config
            .data_dir
            .clone()
            .context("no data directory configured (set WEFT_DATA_DIR)")?;
        let prefs = SqliteStore::open_in_data_dir(&data_dir).context("failed to open preferences")?;
        Ok(Self::new(
            rpc,
            Arc::new(prefs),
            config,
            defaults,
            system_clock(),
        ))
    }

    /// Loads preferences that are not scoped to a workspace.
    pub async fn bootstrap(&self) {
        let names = self
            .prefs
            .run("load custom thread names", |prefs| {
                prefs.load_custom_thread_names()
            })
            .await;
        match names {
            Ok(names) => {
                self.store.dispatch(Action::CustomNamesLoaded { names });
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load custom thread names");
            }
        }
    }

    /// Registers a workspace, loads its listing and restores detached review links.
    pub async fn open_workspace(&self, workspace_id: &WorkspaceId, root: &str) -> Result<(), String> {
        self.actions.register_workspace(workspace_id, root);
        self.actions.load_workspace_preferences(workspace_id).await;
        self.actions
            .list_threads_for_workspace(workspace_id, ListOptions::default())
            .await?;
        let restored = self.actions.reconcile_detached_reviews(workspace_id).await;
        if restored > 0 {
            tracing::debug!(workspace_id = %workspace_id, restored, "restored detached reviews");
        }
        Ok(())
    }

    pub fn set_active_workspace(&self, workspace_id: Option<WorkspaceId>) {
        self.store
            .dispatch(Action::SetActiveWorkspace { workspace_id });
    }

    pub async fn handle_event(&self, event: ServerEvent) {
        self.router.handle(event).await;
    }

    /// Decodes and applies a raw notification. Returns `false` when it is not one the engine
    /// consumes.
    pub async fn handle_notification(
        &self,
        workspace_id: &str,
        method: &str,
        params: &Value,
        request_id: Option<&Value>,
    ) -> bool {
        match decode_notification(workspace_id, method, params, request_id) {
            Some(event) => {
                self.router.handle(event).await;
                true
            }
            None => {
                tracing::debug!(workspace_id, method, "ignoring notification");
                false
            }
        }
    }

    pub fn spawn_watchdog(&self) -> tokio::task::JoinHandle<()> {
        self.watchdog.spawn(self.config.watchdog_poll_interval)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn actions(&self) -> &ThreadActions {
        &self.actions
    }

    pub fn messaging(&self) -> &ThreadMessaging {
        &self.messaging
    }

    pub fn approvals(&self) -> &ApprovalRelay {
        &self.approvals
    }

    pub fn codex(&self) -> &CodexSettings {
        &self.codex
    }

    pub fn watchdog(&self) -> &StaleTurnWatchdog {
        &self.watchdog
    }

    pub fn metrics(&self) -> &PromptMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

use crate::config::StaleTurnPolicy;
use crate::store::Store;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use weft_domain::{Action, ThreadId, WorkspaceId, has_running_command};

struct ProcessingThread {
    workspace_id: WorkspaceId,
    thread_id: ThreadId,
    started_at: Option<i64>,
    running_command: bool,
}

/// Resets turns that stay in processing with no sign of life from the server.
pub struct StaleTurnWatchdog {
    store: Arc<Store>,
    policy: StaleTurnPolicy,
    last_alive: Mutex<HashMap<WorkspaceId, i64>>,
}

impl StaleTurnWatchdog {
    pub fn new(store: Arc<Store>, policy: StaleTurnPolicy) -> Self {
        Self {
            store,
            policy,
            last_alive: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkspaceId, i64>> {
        self.last_alive
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_alive(&self, workspace_id: &WorkspaceId) {
        let now = self.store.now();
        self.lock().insert(workspace_id.clone(), now);
    }

    pub fn last_alive(&self, workspace_id: &WorkspaceId) -> Option<i64> {
        self.lock().get(workspace_id).copied()
    }

    /// Stops the active turn of `workspace_id` after the connection dropped. Returns whether
    /// a turn was reset.
    pub fn handle_disconnected(&self, workspace_id: &WorkspaceId) -> bool {
        let Some(thread_id) = self.store.active_thread_id(workspace_id) else {
            return false;
        };
        if !self.store.is_processing(&thread_id) {
            return false;
        }
        self.store.reset_turn(&thread_id);
        self.store.push_thread_error(
            workspace_id,
            &thread_id,
            "lost connection to the agent server; the turn was stopped, you can resend your message",
        );
        true
    }

    /// One poll. Returns the threads that were reset.
    pub fn tick(&self) -> Vec<ThreadId> {
        let now = self.store.now();
        let base_ms = duration_ms(self.policy.base_threshold());
        let candidates: Vec<ProcessingThread> = self.store.read(|state| {
            state
                .active_thread_by_workspace
                .iter()
                .filter(|(_, thread_id)| state.is_processing(thread_id))
                .map(|(workspace_id, thread_id)| ProcessingThread {
                    workspace_id: workspace_id.clone(),
                    thread_id: thread_id.clone(),
                    started_at: state
                        .status(thread_id)
                        .and_then(|status| status.processing_started_at),
                    running_command: has_running_command(state.items(thread_id)),
                })
                .collect()
        });

        let mut reset = Vec::new();
        for candidate in candidates {
            let Some(started_at) = candidate.started_at else {
                continue;
            };
            let elapsed_ms = now.saturating_sub(started_at);
            if elapsed_ms <= base_ms {
                continue;
            }

            let grace = match (candidate.running_command, self.policy.command_grace()) {
                (true, Some(command_grace)) => command_grace,
                _ => self.policy.silence_grace(),
            };
            let silence_ms = self
                .last_alive(&candidate.workspace_id)
                .map(|alive| now.saturating_sub(alive));
            if silence_ms.is_some_and(|silence_ms| silence_ms < duration_ms(grace)) {
                continue;
            }

            let notice = match silence_ms {
                Some(silence_ms) => format!(
                    "No activity from the agent for {}s. The turn was reset automatically; you can resend your message.",
                    silence_ms / 1000
                ),
                None => format!(
                    "The turn timed out after {}s. It was reset automatically; you can resend your message.",
                    elapsed_ms / 1000
                ),
            };
            tracing::warn!(
                workspace_id = %candidate.workspace_id,
                thread_id = %candidate.thread_id,
                elapsed_ms,
                silence_ms,
                "resetting stale turn"
            );
            self.store.reset_turn(&candidate.thread_id);
            self.store
                .push_assistant_notice(&candidate.thread_id, notice);
            self.store.dispatch(Action::MarkUnread {
                thread_id: candidate.thread_id.clone(),
                has_unread: true,
            });
            reset.push(candidate.thread_id);
        }
        reset
    }

    pub fn spawn(self: &Arc<Self>, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        let watchdog = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let reset = watchdog.tick();
                if !reset.is_empty() {
                    tracing::debug!(count = reset.len(), "watchdog reset stale turns");
                }
            }
        })
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

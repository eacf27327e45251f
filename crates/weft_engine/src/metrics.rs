use std::sync::atomic::{AtomicU64, Ordering};
use weft_domain::{ThreadId, WorkspaceId};

/// In-process counters. Each increment also emits an event on `weft::telemetry`.
#[derive(Debug, Default)]
pub struct PromptMetrics {
    prompts_sent: AtomicU64,
}

impl PromptMetrics {
    pub fn record_prompt_sent(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId) {
        let total = self.prompts_sent.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            target: "weft::telemetry",
            workspace_id = %workspace_id,
            thread_id = %thread_id,
            total,
            "prompt sent"
        );
    }

    pub fn prompts_sent(&self) -> u64 {
        self.prompts_sent.load(Ordering::Relaxed)
    }
}

mod approvals;
mod codex;
mod config;
mod engine;
mod events;
mod messaging;
mod metrics;
mod prefs;
mod rpc;
mod status;
mod store;
mod threads;
mod watchdog;

pub use approvals::{ApprovalDecision, ApprovalRelay};
pub use codex::CodexSettings;
pub use config::{EngineConfig, StaleTurnPolicy};
pub use engine::ThreadEngine;
pub use events::{ThreadEventRouter, conversation_item_from_api};
pub use messaging::{PENDING_TURN_ID, SendOptions, SendOutcome, ThreadMessaging};
pub use metrics::PromptMetrics;
pub use rpc::{ThreadRpc, TurnRequest, is_unsupported_method_error};
pub use store::{Clock, Store, system_clock};
pub use threads::{ListOptions, ResumeOptions, ThreadActions, ThreadArchiveBatchResult};
pub use watchdog::StaleTurnWatchdog;

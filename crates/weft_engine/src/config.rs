use anyhow::{Context as _, anyhow};
use std::path::PathBuf;
use std::time::Duration;
use weft_backend::{
    optional_bool_from_env, optional_string_from_env, optional_trimmed_path_from_env,
    optional_u64_from_env,
};

/// Thresholds used by the stale-turn watchdog.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StaleTurnPolicy {
    /// 120s base threshold, 30s of silence.
    #[default]
    Generic,
    /// 180s base threshold, 90s of silence, and up to ten minutes while a command runs.
    Conversation,
}

impl StaleTurnPolicy {
    pub fn base_threshold(self) -> Duration {
        match self {
            Self::Generic => Duration::from_secs(120),
            Self::Conversation => Duration::from_secs(180),
        }
    }

    pub fn silence_grace(self) -> Duration {
        match self {
            Self::Generic => Duration::from_secs(30),
            Self::Conversation => Duration::from_secs(90),
        }
    }

    pub fn command_grace(self) -> Option<Duration> {
        match self {
            Self::Generic => None,
            Self::Conversation => Some(Duration::from_secs(10 * 60)),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "generic" => Some(Self::Generic),
            "conversation" | "thread" => Some(Self::Conversation),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineConfig {
    pub steer_enabled: bool,
    pub list_page_size: u32,
    pub list_target_count: usize,
    pub list_max_pages: usize,
    pub list_max_empty_pages_cold: usize,
    pub list_max_empty_pages_warm: usize,
    pub watchdog_poll_interval: Duration,
    pub stale_turn_policy: StaleTurnPolicy,
    pub data_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            steer_enabled: true,
            list_page_size: weft_api::THREAD_LIST_PAGE_SIZE,
            list_target_count: 20,
            list_max_pages: 8,
            list_max_empty_pages_cold: 3,
            list_max_empty_pages_warm: 8,
            watchdog_poll_interval: Duration::from_secs(10),
            stale_turn_policy: StaleTurnPolicy::Generic,
            data_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut out = Self::default();

        if let Some(enabled) =
            optional_bool_from_env("WEFT_STEER_ENABLED").context("invalid steer setting")?
        {
            out.steer_enabled = enabled;
        }

        if let Some(secs) = optional_u64_from_env("WEFT_WATCHDOG_POLL_SECS")? {
            if secs == 0 {
                return Err(anyhow!("WEFT_WATCHDOG_POLL_SECS must be at least 1"));
            }
            out.watchdog_poll_interval = Duration::from_secs(secs);
        }

        if let Some(raw) = optional_string_from_env("WEFT_STALE_TURN_POLICY")? {
            out.stale_turn_policy = StaleTurnPolicy::parse(&raw)
                .ok_or_else(|| anyhow!("unknown WEFT_STALE_TURN_POLICY {raw:?}"))?;
        }

        out.data_dir = optional_trimmed_path_from_env("WEFT_DATA_DIR")?;
        Ok(out)
    }

    pub fn max_empty_pages(&self, has_known_activity: bool) -> usize {
        if has_known_activity {
            self.list_max_empty_pages_warm
        } else {
            self.list_max_empty_pages_cold
        }
    }
}

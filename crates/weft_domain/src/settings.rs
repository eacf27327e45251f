#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingEffort {
    Minimal,
    Low,
    Medium,
    High,
    XHigh,
}

impl ThinkingEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            ThinkingEffort::Minimal => "minimal",
            ThinkingEffort::Low => "low",
            ThinkingEffort::Medium => "medium",
            ThinkingEffort::High => "high",
            ThinkingEffort::XHigh => "xhigh",
        }
    }
}

pub fn parse_thinking_effort(value: &str) -> Option<ThinkingEffort> {
    let value = value.trim();
    [
        ThinkingEffort::Minimal,
        ThinkingEffort::Low,
        ThinkingEffort::Medium,
        ThinkingEffort::High,
        ThinkingEffort::XHigh,
    ]
    .into_iter()
    .find(|effort| value.eq_ignore_ascii_case(effort.as_str()))
}

/// Sandbox/approval posture sent with every turn.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    ReadOnly,
    #[default]
    Current,
    FullAccess,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "read-only",
            AccessMode::Current => "current",
            AccessMode::FullAccess => "full-access",
        }
    }
}

pub fn parse_access_mode(value: &str) -> Option<AccessMode> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("read-only") {
        return Some(AccessMode::ReadOnly);
    }
    if value.eq_ignore_ascii_case("current") {
        return Some(AccessMode::Current);
    }
    if value.eq_ignore_ascii_case("full-access") {
        return Some(AccessMode::FullAccess);
    }
    None
}

use anyhow::anyhow;
use std::path::PathBuf;

fn trimmed_var(name: &str) -> anyhow::Result<Option<String>> {
    let Some(value) = std::env::var_os(name) else {
        return Ok(None);
    };
    let value = value.to_string_lossy();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("{name} is set but empty"));
    }
    Ok(Some(trimmed.to_owned()))
}

pub fn optional_trimmed_path_from_env(name: &str) -> anyhow::Result<Option<PathBuf>> {
    Ok(trimmed_var(name)?.map(PathBuf::from))
}

/// `1/true/on/yes` and `0/false/off/no`, case-insensitive.
pub fn optional_bool_from_env(name: &str) -> anyhow::Result<Option<bool>> {
    let Some(value) = trimmed_var(name)? else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(Some(true)),
        "0" | "false" | "off" | "no" => Ok(Some(false)),
        _ => Err(anyhow!("{name} must be a boolean, got {value:?}")),
    }
}

pub fn optional_u64_from_env(name: &str) -> anyhow::Result<Option<u64>> {
    let Some(value) = trimmed_var(name)? else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| anyhow!("{name} must be an unsigned integer: {err}"))
}

pub fn optional_string_from_env(name: &str) -> anyhow::Result<Option<String>> {
    trimmed_var(name)
}

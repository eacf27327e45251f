use std::time::{SystemTime, UNIX_EPOCH};

pub fn unix_ms(time: SystemTime) -> Option<i64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
}

pub fn now_unix_ms() -> i64 {
    unix_ms(SystemTime::now()).unwrap_or(0)
}

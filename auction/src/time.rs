/// Wall-clock milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

pub const MS_PER_DAY: u64 = 86_400_000;

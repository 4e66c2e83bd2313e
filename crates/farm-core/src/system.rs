use std::{
    sync::OnceLock,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

static START_TIME: OnceLock<Instant> = OnceLock::new();
static START_UNIX: OnceLock<u64> = OnceLock::new();

/// Process start in unix seconds, fixed on first use.
fn start_unix() -> u64 {
    *START_UNIX.get_or_init(|| {
        START_TIME.get_or_init(Instant::now);
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    })
}

/// Get process uptime in seconds.
pub fn uptime_seconds() -> u64 {
    start_unix();
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_secs()
}

#[inline]
pub fn pid() -> u32 {
    std::process::id()
}

/// Host name, or `"unknown"` if it cannot be read.
pub fn hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Identifier of this process when it runs as a worker.
pub fn worker_id() -> &'static str {
    static ID: OnceLock<String> = OnceLock::new();
    ID.get_or_init(|| format!("worker_{}_{}", pid(), start_unix()))
}

/// Identifier of this process when it runs as a supervisor.
pub fn manager_id() -> &'static str {
    static ID: OnceLock<String> = OnceLock::new();
    ID.get_or_init(|| format!("manager_{}_{}", pid(), start_unix()))
}

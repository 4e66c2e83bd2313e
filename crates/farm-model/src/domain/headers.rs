/// Message header carrying the per-message soft timeout override, in whole seconds.
pub const HEADER_SOFT_TIMEOUT: &str = "soft_timeout_s";

/// Message header carrying the per-message hard timeout override, in whole seconds.
pub const HEADER_HARD_TIMEOUT: &str = "hard_timeout_s";

/// Timeout overrides exactly as found in the message headers.
///
/// Values are kept as text: the broker may hand us any header type and the worker decides
/// what is usable. Sanitising happens when the task resolves its effective timeouts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawTimeoutHeaders {
    pub soft_timeout_s: Option<String>,
    pub hard_timeout_s: Option<String>,
}

impl RawTimeoutHeaders {
    pub fn new(soft_timeout_s: Option<u64>, hard_timeout_s: Option<u64>) -> Self {
        Self {
            soft_timeout_s: soft_timeout_s.map(|v| v.to_string()),
            hard_timeout_s: hard_timeout_s.map(|v| v.to_string()),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.soft_timeout_s.is_none() && self.hard_timeout_s.is_none()
    }
}

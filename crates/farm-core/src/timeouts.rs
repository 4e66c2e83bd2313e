use std::time::Duration;

use farm_model::RawTimeoutHeaders;

/// Upper bound accepted for a per-message soft timeout (one day).
pub const MAX_SOFT_TIMEOUT_S: u64 = 24 * 3600;
/// Upper bound accepted for a per-message hard timeout (two days).
pub const MAX_HARD_TIMEOUT_S: u64 = 48 * 3600;

/// Effective watchdog deadlines of one task.
///
/// Invariant: `hard > soft`. A hard timeout at or below the soft one is corrected to
/// `soft + 1s`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    soft: Option<Duration>,
    hard: Duration,
}

impl Timeouts {
    /// `soft = 0` disables the soft watchdog.
    pub fn new(soft: Duration, hard: Duration) -> Self {
        let hard = if hard <= soft {
            soft + Duration::from_secs(1)
        } else {
            hard
        };
        Self {
            soft: (!soft.is_zero()).then_some(soft),
            hard,
        }
    }

    /// Applies per-message header overrides on top of `defaults`.
    ///
    /// Header values are clamped to `[0, 1 day]` (soft) and `[1s, 2 days]` (hard); values that
    /// do not parse as a number fall back to the default.
    pub fn resolve(headers: &RawTimeoutHeaders, defaults: &Timeouts) -> Self {
        if headers.is_empty() {
            return *defaults;
        }
        let soft = sanitize(headers.soft_timeout_s.as_deref(), 0, MAX_SOFT_TIMEOUT_S)
            .map(Duration::from_secs)
            .unwrap_or(defaults.soft.unwrap_or(Duration::ZERO));
        let hard = sanitize(headers.hard_timeout_s.as_deref(), 1, MAX_HARD_TIMEOUT_S)
            .map(Duration::from_secs)
            .unwrap_or(defaults.hard);
        Self::new(soft, hard)
    }

    #[inline]
    pub fn soft(&self) -> Option<Duration> {
        self.soft
    }

    #[inline]
    pub fn hard(&self) -> Duration {
        self.hard
    }
}

fn sanitize(raw: Option<&str>, min: u64, max: u64) -> Option<u64> {
    let raw = raw?.trim();
    let value = match raw.parse::<i64>() {
        Ok(v) => v,
        Err(_) => raw.parse::<f64>().ok().filter(|f| f.is_finite())?.trunc() as i64,
    };
    Some(value.clamp(min as i64, max as i64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Timeouts {
        Timeouts::new(Duration::from_secs(30), Duration::from_secs(60))
    }

    fn headers(soft: Option<&str>, hard: Option<&str>) -> RawTimeoutHeaders {
        RawTimeoutHeaders {
            soft_timeout_s: soft.map(str::to_string),
            hard_timeout_s: hard.map(str::to_string),
        }
    }

    #[test]
    fn zero_soft_disables_the_soft_watchdog() {
        let t = Timeouts::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(t.soft(), None);
        assert_eq!(t.hard(), Duration::from_secs(1));
    }

    #[test]
    fn hard_not_above_soft_becomes_soft_plus_one() {
        let t = Timeouts::new(Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(t.hard(), Duration::from_secs(6));

        let t = Timeouts::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(t.hard(), Duration::from_secs(1));
    }

    #[test]
    fn no_headers_keep_defaults() {
        assert_eq!(Timeouts::resolve(&RawTimeoutHeaders::default(), &defaults()), defaults());
    }

    #[test]
    fn headers_override_and_are_clamped() {
        let t = Timeouts::resolve(&headers(Some("5"), Some("0")), &defaults());
        assert_eq!(t.soft(), Some(Duration::from_secs(5)));
        assert_eq!(t.hard(), Duration::from_secs(6));

        let t = Timeouts::resolve(&headers(Some("-3"), Some("999999999")), &defaults());
        assert_eq!(t.soft(), None);
        assert_eq!(t.hard(), Duration::from_secs(MAX_HARD_TIMEOUT_S));
    }

    #[test]
    fn garbage_headers_fall_back_to_defaults() {
        let t = Timeouts::resolve(&headers(Some("soon"), Some("12.9")), &defaults());
        assert_eq!(t.soft(), Some(Duration::from_secs(30)));
        assert_eq!(t.hard(), Duration::from_secs(31));
    }

    #[test]
    fn only_hard_header_keeps_default_soft() {
        let t = Timeouts::resolve(&headers(None, Some("120")), &defaults());
        assert_eq!(t.soft(), Some(Duration::from_secs(30)));
        assert_eq!(t.hard(), Duration::from_secs(120));
    }
}

//! Metric window alignment.

use tracing::debug;

/// Native granularity of the metrics collector, in seconds.
pub const METRIC_GRANULARITY_SECS: u64 = 60;

/// Align a requested metric window to the collector's granularity.
///
/// Non-positive periods become one minute; anything else is rounded down to
/// a whole number of minutes, never below one.
pub fn normalize_period(requested: i64) -> u64 {
    if requested <= 0 {
        debug!(requested, "metric period not positive, using one minute");
        return METRIC_GRANULARITY_SECS;
    }

    let requested = requested as u64;
    let aligned = requested - requested % METRIC_GRANULARITY_SECS;
    let period = aligned.max(METRIC_GRANULARITY_SECS);
    if period != requested {
        debug!(requested, period, "metric period aligned to granularity");
    }
    period
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_becomes_one_minute() {
        assert_eq!(normalize_period(0), 60);
        assert_eq!(normalize_period(-1), 60);
        assert_eq!(normalize_period(i64::MIN), 60);
    }

    #[test]
    fn rounds_down_to_whole_minutes() {
        assert_eq!(normalize_period(95), 60);
        assert_eq!(normalize_period(181), 180);
        assert_eq!(normalize_period(359), 300);
    }

    #[test]
    fn aligned_periods_pass_through() {
        assert_eq!(normalize_period(60), 60);
        assert_eq!(normalize_period(180), 180);
        assert_eq!(normalize_period(3600), 3600);
    }

    #[test]
    fn never_below_one_minute() {
        assert_eq!(normalize_period(1), 60);
        assert_eq!(normalize_period(59), 60);
    }
}

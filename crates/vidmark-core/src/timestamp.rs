//! Human timestamps derived from playback positions.

use time::{Duration, Time};

/// Playback position that corresponds to the configured start-of-day time.
///
/// Sessions begin auto-paused one second into the video, so wall time is
/// anchored there rather than at 0.0. Kept as fixed policy.
pub const PLAYBACK_ORIGIN_SECONDS: f64 = 1.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Parse `HH:MM:SS` or `HH:MM`.
pub fn parse_start_time(text: &str) -> Option<Time> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    let field = |i: usize| -> Option<u8> { parts.get(i)?.parse().ok() };
    match parts.len() {
        2 => Time::from_hms(field(0)?, field(1)?, 0).ok(),
        3 => Time::from_hms(field(0)?, field(1)?, field(2)?).ok(),
        _ => None,
    }
}

/// Time of day shown for an entry at `playback_seconds`.
///
/// Without a configured start, the video is taken to begin at midnight.
/// Arithmetic wraps around midnight; fractional seconds are truncated.
/// A non-finite position maps to the start itself.
pub fn derive_timestamp(start: Option<Time>, playback_seconds: f64) -> String {
    let base = start.unwrap_or(Time::MIDNIGHT);
    let offset = playback_seconds - PLAYBACK_ORIGIN_SECONDS;
    if !offset.is_finite() {
        return format_time(base);
    }
    // reduce to one day first; large offsets overflow `Duration`
    let offset = Duration::seconds_f64(offset.rem_euclid(SECONDS_PER_DAY));
    format_time(base + offset)
}

pub fn format_time(t: Time) -> String {
    format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_both_forms() {
        assert_eq!(parse_start_time("08:00:00"), Time::from_hms(8, 0, 0).ok());
        assert_eq!(parse_start_time(" 7:30 "), Time::from_hms(7, 30, 0).ok());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_start_time("25:00").is_none());
        assert!(parse_start_time("08:61:00").is_none());
        assert!(parse_start_time("eight").is_none());
        assert!(parse_start_time("1:2:3:4").is_none());
        assert!(parse_start_time("").is_none());
    }

    #[test]
    fn origin_second_maps_to_start() {
        let start = parse_start_time("08:00:00");
        assert_eq!(derive_timestamp(start, 1.0), "08:00:00");
        assert_eq!(derive_timestamp(start, 61.0), "08:01:00");
        assert_eq!(derive_timestamp(start, 3662.9), "09:01:01");
    }

    #[test]
    fn before_origin_wraps_backwards() {
        assert_eq!(derive_timestamp(parse_start_time("08:00:00"), 0.0), "07:59:59");
        assert_eq!(derive_timestamp(None, 0.0), "23:59:59");
    }

    #[test]
    fn huge_and_non_finite_positions_stay_on_the_clock() {
        let start = parse_start_time("08:00:00");
        // 1e20 - 1 rounds to 1e20, which is 35_200 s past a whole day
        assert_eq!(derive_timestamp(start, 1e20), "17:46:40");
        assert_eq!(derive_timestamp(start, f64::NAN), "08:00:00");
        assert_eq!(derive_timestamp(start, f64::INFINITY), "08:00:00");
        assert_eq!(derive_timestamp(None, 86_401.0), "00:00:00");
    }

    #[test]
    fn no_start_counts_from_midnight() {
        assert_eq!(derive_timestamp(None, 91.0), "00:01:30");
    }
}

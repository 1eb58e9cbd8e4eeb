//! Human-readable elapsed-time formatting for run summaries

use std::time::Duration;

/// Format an elapsed duration for display.
///
/// - Under a minute: `12.3s`
/// - Under an hour: `5m 12s`
/// - An hour or more: `2h 05m 12s`
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pictag_common::human_time::format_elapsed;
///
/// assert_eq!(format_elapsed(Duration::from_millis(12_340)), "12.3s");
/// assert_eq!(format_elapsed(Duration::from_secs(312)), "5m 12s");
/// assert_eq!(format_elapsed(Duration::from_secs(7512)), "2h 05m 12s");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();

    if total_secs < 60 {
        return format!("{:.1}s", elapsed.as_secs_f64());
    }

    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours == 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    }
}

/// Live statistics over the most recent readings
use crate::models::Statistics;
use crate::storage::History;

/// Lookback of the live statistics, in seconds
pub const STATS_WINDOW_SECS: i64 = 300;

/// Min/max/average of every reading no older than `STATS_WINDOW_SECS`
///
/// Returns an all-zero summary with `count == 0` when nothing qualifies.
pub fn compute(history: &History, now: i64) -> Statistics {
    let mut stats = Statistics::default();
    let mut temp_sum = 0.0f32;
    let mut press_sum = 0.0f32;

    for reading in history
        .iter()
        .filter(|r| now - r.timestamp <= STATS_WINDOW_SECS)
    {
        if stats.count == 0 {
            stats.min_temp = reading.temperature;
            stats.max_temp = reading.temperature;
            stats.min_press = reading.pressure;
            stats.max_press = reading.pressure;
        } else {
            stats.min_temp = stats.min_temp.min(reading.temperature);
            stats.max_temp = stats.max_temp.max(reading.temperature);
            stats.min_press = stats.min_press.min(reading.pressure);
            stats.max_press = stats.max_press.max(reading.pressure);
        }
        temp_sum += reading.temperature;
        press_sum += reading.pressure;
        stats.count += 1;
    }

    if stats.count > 0 {
        stats.avg_temp = temp_sum / stats.count as f32;
        stats.avg_press = press_sum / stats.count as f32;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Reading;

    #[test]
    fn stale_history_yields_zero_summary() {
        let mut history = History::new();
        history.push(Reading::new(20.0, 1000.0, 100));
        history.push(Reading::new(21.0, 1001.0, 200));

        assert_eq!(compute(&history, 1000), Statistics::default());
        assert_eq!(compute(&History::new(), 1000), Statistics::default());
    }

    #[test]
    fn only_readings_inside_window_count() {
        let now = 10_000;
        let mut history = History::new();
        history.push(Reading::new(-5.0, 950.0, now - 301));
        history.push(Reading::new(20.0, 1000.0, now - 300));
        history.push(Reading::new(24.0, 1010.0, now - 10));
        history.push(Reading::new(22.0, 990.0, now));

        let stats = compute(&history, now);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_temp, 20.0);
        assert_eq!(stats.max_temp, 24.0);
        assert_eq!(stats.avg_temp, 22.0);
        assert_eq!(stats.min_press, 990.0);
        assert_eq!(stats.max_press, 1010.0);
        assert_eq!(stats.avg_press, 1000.0);
    }
}

use std::collections::VecDeque;
use std::time::Instant;

/// Ticks kept for the throughput average.
pub(crate) const HISTORY_LEN: usize = 10;

#[derive(Debug, Clone, Copy)]
struct TickRecord {
    generations: u64,
    start: Instant,
    end: Instant,
}

/// Sliding window of the most recent published ticks.
#[derive(Debug, Default)]
pub(crate) struct TickHistory {
    records: VecDeque<TickRecord>,
}

impl TickHistory {
    pub(crate) fn push(&mut self, generations: u64, start: Instant, end: Instant) {
        if self.records.len() == HISTORY_LEN {
            self.records.pop_front();
        }
        self.records.push_back(TickRecord {
            generations,
            start,
            end,
        });
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Generations over the wall time spanned by the window, from the oldest
    /// tick's start to the newest tick's end.
    pub(crate) fn average_generations_per_second(&self) -> Option<f64> {
        let oldest = self.records.front()?;
        let newest = self.records.back()?;
        let span = newest.end.saturating_duration_since(oldest.start);
        if span.is_zero() {
            return None;
        }
        let total: u64 = self
            .records
            .iter()
            .map(|record| record.generations)
            .fold(0, u64::saturating_add);
        Some(total as f64 / span.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_history_has_no_average() {
        let history = TickHistory::default();
        assert_eq!(history.average_generations_per_second(), None);
    }

    #[test]
    fn average_spans_oldest_start_to_newest_end() {
        let t0 = Instant::now();
        let mut history = TickHistory::default();
        let half = t0 + Duration::from_millis(500);
        history.push(5, t0, half);
        history.push(5, half, t0 + Duration::from_secs(1));
        let avg = history.average_generations_per_second().unwrap();
        assert!((avg - 10.0).abs() < 1e-9, "{avg}");
    }

    #[test]
    fn keeps_only_the_newest_ticks() {
        let t0 = Instant::now();
        let mut history = TickHistory::default();
        for i in 0..25u64 {
            let start = t0 + Duration::from_secs(i);
            history.push(1_000 * i, start, start + Duration::from_secs(1));
        }
        assert_eq!(history.len(), HISTORY_LEN);
        // Ticks 15..25, spanning 10 seconds.
        let expected = (15..25u64).map(|i| 1_000 * i).sum::<u64>() as f64 / 10.0;
        let avg = history.average_generations_per_second().unwrap();
        assert!((avg - expected).abs() < 1e-6, "{avg} vs {expected}");

        history.clear();
        assert_eq!(history.average_generations_per_second(), None);
    }

    proptest! {
        #[test]
        fn paced_ticks_never_exceed_target_rate(
            generations in 1u64..1_000,
            period_ms in 1u64..200,
            ticks in 1usize..30,
            slack_ms in proptest::collection::vec(0u64..50, 30),
        ) {
            let t0 = Instant::now();
            let mut history = TickHistory::default();
            let mut start = t0;
            for slack in slack_ms.iter().take(ticks) {
                let end = start + Duration::from_millis(period_ms + slack);
                history.push(generations, start, end);
                start = end;
            }
            let target = generations as f64 * 1_000.0 / period_ms as f64;
            let avg = history.average_generations_per_second().unwrap();
            prop_assert!(avg <= target * (1.0 + 1e-9), "{} > {}", avg, target);
        }
    }
}

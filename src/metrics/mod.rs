//! Rolling-window trend analysis over per-cycle training metrics:
//! accumulate a bounded history of cycles, then summarize it into moving
//! averages, a trend direction, and an ETA.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use crate::backend::QStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy)]
pub struct TrendResult {
    pub direction: Trend,
    /// `delta = recentAvg - previousAvg`, already sign-flipped for
    /// `lower_is_better` metrics so a positive value always means
    /// "improving".
    pub delta: f32,
    pub confidence: f32,
    /// How tightly clustered the two halves are around their own means,
    /// independent of whether they're moving: `1 -
    /// clamp(sqrt(pooledVariance) / (|recentAvg| + eps), 0, 1)`. A trend can
    /// be simultaneously near-zero (stagnant) and highly stable (not just
    /// noisy), which is what stagnation detection keys off rather than
    /// `confidence` — the latter tends toward zero exactly when the delta
    /// it's built from does.
    pub stability: f32,
}

/// Minimum absolute delta between recentAvg and previousAvg for a trend to
/// be reported as UP/DOWN rather than STABLE.
const EPSILON_STABLE: f32 = 0.05;

/// How a cycle's games ended, counted by [`crate::chess::Outcome`] vs.
/// step-limit truncation vs. cooperative cancellation (the last of which
/// this core never produces today, since self-play has no mid-game cancel
/// path, but the field stays so a future one has somewhere to report).
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminationBreakdown {
    pub natural: usize,
    pub step_limit: usize,
    pub manual: usize,
}

impl TerminationBreakdown {
    pub fn total(&self) -> usize {
        self.natural + self.step_limit + self.manual
    }

    pub fn step_limit_rate(&self) -> f32 {
        ratio(self.step_limit, self.total())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CycleMetrics {
    pub cycle: usize,
    pub games_played: usize,
    pub games_dropped: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub avg_ply: f32,
    pub mean_reward: f32,
    pub mean_loss: f32,
    pub mean_grad_norm: f32,
    pub mean_entropy: f32,
    pub q_stats: QStats,
    pub batches_processed: usize,
    pub buffer_utilization: f32,
    pub illegal_argmax_rate: f32,
    /// Unique/total ratio over the policy's last 500 action selections.
    /// `None` until that many selections have accumulated.
    pub action_diversity: Option<f32>,
    pub termination: TerminationBreakdown,
    pub wall_time: Duration,
}

impl CycleMetrics {
    pub fn win_rate(&self) -> f32 {
        ratio(self.wins, self.games_played)
    }

    pub fn draw_rate(&self) -> f32 {
        ratio(self.draws, self.games_played)
    }

    pub fn loss_rate(&self) -> f32 {
        ratio(self.losses, self.games_played)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}

/// A human-readable one-line summary, formatted as a single progress line
/// for the log.
pub trait TrainingStats {
    fn summary(&self) -> String;
}

impl TrainingStats for CycleMetrics {
    fn summary(&self) -> String {
        format!(
            "cycle {:>5} | games {:>3} ({} dropped) | w/d/l {}/{}/{} | avg_ply {:.1} | reward {:+.3} | loss {:.4} | grad_norm {:.3} | entropy {:.3} | buffer {:.0}% | illegal_argmax {:.1}% | {:.2}s",
            self.cycle,
            self.games_played,
            self.games_dropped,
            self.wins,
            self.draws,
            self.losses,
            self.avg_ply,
            self.mean_reward,
            self.mean_loss,
            self.mean_grad_norm,
            self.mean_entropy,
            self.buffer_utilization * 100.0,
            self.illegal_argmax_rate * 100.0,
            self.wall_time.as_secs_f32(),
        )
    }
}

pub struct MetricsTracker {
    window: usize,
    history: VecDeque<CycleMetrics>,
    started_at: Instant,
}

impl MetricsTracker {
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "trend_window must be > 0");
        Self {
            window,
            history: VecDeque::with_capacity(window * 2),
            started_at: Instant::now(),
        }
    }

    pub fn record(&mut self, metrics: CycleMetrics) {
        if self.history.len() == self.window * 2 {
            self.history.pop_front();
        }
        self.history.push_back(metrics);
    }

    pub fn latest(&self) -> Option<&CycleMetrics> {
        self.history.back()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn moving_average(&self, select: impl Fn(&CycleMetrics) -> f32) -> f32 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().map(select).sum::<f32>() / self.history.len() as f32
    }

    /// `recentAvg = mean(last W)`, `previousAvg = mean(prior W)`; direction
    /// is UP/DOWN when the delta clears `EPSILON_STABLE`, else STABLE.
    /// `confidence = clamp(|delta| / sqrt(pooledVariance), 0, 1)`, except
    /// confidence is 1 when the pooled variance is exactly zero and the
    /// delta is non-zero. `lower_is_better` negates the delta first (used
    /// for loss, where a decreasing value should report as an UP trend).
    /// Fewer than two recorded cycles always reports STABLE/0 confidence;
    /// with fewer than `2*window` cycles recorded so far, the two halves
    /// shrink to whatever is actually available.
    pub fn trend(&self, select: impl Fn(&CycleMetrics) -> f32, lower_is_better: bool) -> TrendResult {
        let values: Vec<f32> = self.history.iter().map(select).collect();
        let n = values.len();
        if n < 2 {
            return TrendResult { direction: Trend::Stable, delta: 0.0, confidence: 0.0, stability: 0.0 };
        }

        let half = (n / 2).min(self.window).max(1);
        let recent = &values[n - half..];
        let previous = &values[n - 2 * half..n - half];

        let recent_avg = mean(recent);
        let previous_avg = mean(previous);
        let mut delta = recent_avg - previous_avg;
        if lower_is_better {
            delta = -delta;
        }

        let pooled_variance = (variance(recent, recent_avg) + variance(previous, previous_avg)) / 2.0;
        let confidence = if pooled_variance <= 0.0 {
            if delta != 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            (delta.abs() / pooled_variance.sqrt()).clamp(0.0, 1.0)
        };
        let stability = 1.0 - (pooled_variance.sqrt() / (recent_avg.abs() + f32::EPSILON)).clamp(0.0, 1.0);

        let direction = if delta > EPSILON_STABLE {
            Trend::Up
        } else if delta < -EPSILON_STABLE {
            Trend::Down
        } else {
            Trend::Stable
        };
        TrendResult { direction, delta, confidence, stability }
    }

    /// Estimated time remaining given the mean wall-clock time per recorded
    /// cycle and how many cycles are left to `max_cycles`. `None` until at
    /// least 3 cycles have been recorded.
    pub fn eta(&self, current_cycle: usize, max_cycles: usize) -> Option<Duration> {
        if self.history.len() < 3 || current_cycle >= max_cycles {
            return None;
        }
        let mean_seconds = self.moving_average(|m| m.wall_time.as_secs_f32());
        let remaining_cycles = (max_cycles - current_cycle) as f32;
        Some(Duration::from_secs_f32((mean_seconds * remaining_cycles).max(0.0)))
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

fn variance(values: &[f32], mean: f32) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(cycle: usize, reward: f32) -> CycleMetrics {
        CycleMetrics {
            cycle,
            games_played: 4,
            games_dropped: 0,
            wins: 2,
            draws: 1,
            losses: 1,
            avg_ply: 30.0,
            mean_reward: reward,
            mean_loss: 0.1,
            mean_grad_norm: 0.2,
            mean_entropy: 1.0,
            q_stats: QStats::default(),
            batches_processed: 1,
            buffer_utilization: 0.5,
            illegal_argmax_rate: 0.0,
            action_diversity: Some(0.6),
            termination: TerminationBreakdown { natural: 3, step_limit: 1, manual: 0 },
            wall_time: Duration::from_secs(1),
        }
    }

    #[test]
    fn window_evicts_oldest_entries_past_twice_the_window() {
        let mut tracker = MetricsTracker::new(3);
        for i in 0..8 {
            tracker.record(metrics(i, 0.0));
        }
        assert_eq!(tracker.len(), 6);
        assert_eq!(tracker.latest().unwrap().cycle, 7);
    }

    #[test]
    fn rising_reward_is_detected_as_up_trend() {
        let mut tracker = MetricsTracker::new(10);
        for (i, reward) in [0.0, 0.0, 0.1, 0.1, 0.5, 0.5, 0.9, 0.9].into_iter().enumerate() {
            tracker.record(metrics(i, reward));
        }
        let trend = tracker.trend(|m| m.mean_reward, false);
        assert_eq!(trend.direction, Trend::Up);
        assert!(trend.confidence > 0.0);
    }

    #[test]
    fn flat_reward_is_stable() {
        let mut tracker = MetricsTracker::new(10);
        for i in 0..8 {
            tracker.record(metrics(i, 0.5));
        }
        let trend = tracker.trend(|m| m.mean_reward, false);
        assert_eq!(trend.direction, Trend::Stable);
    }

    #[test]
    fn decreasing_loss_reports_as_an_up_trend() {
        let mut tracker = MetricsTracker::new(10);
        for (i, loss) in [0.9, 0.9, 0.5, 0.5, 0.1, 0.1, 0.05, 0.05].into_iter().enumerate() {
            let mut m = metrics(i, 0.0);
            m.mean_loss = loss;
            tracker.record(m);
        }
        let trend = tracker.trend(|m| m.mean_loss, true);
        assert_eq!(trend.direction, Trend::Up);
    }

    #[test]
    fn eta_is_none_before_three_cycles_and_scales_with_remaining_after() {
        let mut tracker = MetricsTracker::new(10);
        tracker.record(metrics(0, 0.0));
        assert_eq!(tracker.eta(1, 11), None);

        tracker.record(metrics(1, 0.0));
        tracker.record(metrics(2, 0.0));
        let eta = tracker.eta(1, 11).unwrap();
        assert_eq!(eta, Duration::from_secs(10));
    }

    #[test]
    fn summary_is_a_single_line() {
        let summary = metrics(3, 0.2).summary();
        assert!(!summary.contains('\n'));
        assert!(summary.contains("cycle"));
    }
}

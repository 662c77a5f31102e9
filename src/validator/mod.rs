//! Rule-based detection of numerical and learning pathology in a training
//! cycle's metrics: a reusable, non-panicking check the trainer can act on
//! rather than letting a NaN loss or an exploding gradient pass silently.

use crate::diagnostics::Diagnostics;
use crate::metrics::CycleMetrics;
use crate::metrics::TrendResult;
use crate::VALIDATION_LOG_INTERVAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub rule: &'static str,
    pub severity: Severity,
    pub message: String,
}

/// EMA smoothing factor for the loss/grad-norm/entropy baselines these
/// rules are judged against.
const EMA_ALPHA: f32 = 0.2;
/// A smoothed loss increasing by more than this many absolute units from
/// one cycle's baseline to the next is flagged as an explosion.
const LOSS_EXPLOSION_DELTA: f32 = 5.0;
/// Smoothed grad-norm ceilings: above the higher, the explosion is severe
/// enough to escalate past a warning.
const GRAD_NORM_EXPLODE_HIGH: f32 = 10.0;
const GRAD_NORM_EXPLODE_LOW: f32 = 5.0;
/// Below this, the smoothed grad-norm has effectively stopped moving the
/// weights at all.
const GRAD_NORM_VANISH: f32 = 1e-6;
/// Smoothed entropy ceilings below which the policy is collapsing onto a
/// handful of actions; the lower threshold is the severe case.
const ENTROPY_COLLAPSE_HIGH: f32 = 0.1;
const ENTROPY_COLLAPSE_LOW: f32 = 0.5;
/// Games this short are ending before either side has had a chance to
/// develop a position; games this long are probably hitting the step
/// limit on legitimate play rather than proceeding toward a result.
const AVG_PLY_LOW: f32 = 10.0;
const AVG_PLY_HIGH: f32 = 150.0;
/// Above this draw rate, self-play is no longer generating enough decisive
/// outcomes to learn from.
const DRAW_RATE_HIGH: f32 = 0.7;
/// Above this fraction of games ending by step limit rather than a
/// decisive or drawn result, the cap is probably too tight for the
/// position complexity being trained on.
const STEP_LIMIT_RATE_HIGH: f32 = 0.5;
/// Below this unique/total ratio over the policy's rolling window, action
/// selection has collapsed onto a small repertoire.
const ACTION_DIVERSITY_LOW: f32 = 0.1;
/// Reward-trend magnitude below this, combined with high stability, means
/// training has plateaued rather than merely being noisy.
const STAGNATION_TREND_EPS: f32 = 0.001;
const STAGNATION_STABILITY: f32 = 0.8;
/// A reward trend declining past this rate is regression, not noise.
const STAGNATION_DECLINE: f32 = -0.01;
/// Above this fraction, the policy's unmasked argmax is landing outside
/// the legal set often enough to suggest the backend hasn't learned
/// legality at all.
const ILLEGAL_ARGMAX_WARN_RATE: f32 = 0.5;

pub struct TrainingValidator {
    ema_loss: Option<f32>,
    ema_grad_norm: Option<f32>,
    ema_entropy: Option<f32>,
    diagnostics: Diagnostics,
}

impl Default for TrainingValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingValidator {
    pub fn new() -> Self {
        Self { ema_loss: None, ema_grad_norm: None, ema_entropy: None, diagnostics: Diagnostics::new() }
    }

    fn update_ema(baseline: &mut Option<f32>, value: f32) -> f32 {
        let previous = baseline.unwrap_or(value);
        let next = EMA_ALPHA * value + (1.0 - EMA_ALPHA) * previous;
        *baseline = Some(next);
        next
    }

    /// Checks one cycle's metrics plus its reward trend (as computed by the
    /// caller's [`crate::metrics::MetricsTracker`]), updating internal EMA
    /// baselines and returning every issue found, logged (aggregated,
    /// rate-limited) through [`Diagnostics`] as a side effect.
    pub fn check(&mut self, metrics: &CycleMetrics, reward_trend: TrendResult) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if metrics.mean_loss.is_nan() || metrics.mean_loss.is_infinite() {
            issues.push(ValidationIssue {
                rule: "non_finite_loss",
                severity: Severity::Critical,
                message: format!("cycle {}: mean loss is {}", metrics.cycle, metrics.mean_loss),
            });
        }
        if metrics.mean_grad_norm.is_nan() || metrics.mean_grad_norm.is_infinite() {
            issues.push(ValidationIssue {
                rule: "non_finite_grad_norm",
                severity: Severity::Critical,
                message: format!("cycle {}: mean grad_norm is {}", metrics.cycle, metrics.mean_grad_norm),
            });
        }

        let previous_loss_baseline = self.ema_loss;
        if metrics.mean_loss.is_finite() {
            let smoothed_loss = Self::update_ema(&mut self.ema_loss, metrics.mean_loss);
            if let Some(previous) = previous_loss_baseline {
                if smoothed_loss - previous > LOSS_EXPLOSION_DELTA {
                    issues.push(ValidationIssue {
                        rule: "loss_explosion",
                        severity: Severity::High,
                        message: format!(
                            "cycle {}: smoothed loss rose by {:.4} ({:.4} -> {:.4})",
                            metrics.cycle,
                            smoothed_loss - previous,
                            previous,
                            smoothed_loss
                        ),
                    });
                }
            }
        }

        if metrics.mean_grad_norm.is_finite() {
            let smoothed_grad_norm = Self::update_ema(&mut self.ema_grad_norm, metrics.mean_grad_norm);
            if smoothed_grad_norm > GRAD_NORM_EXPLODE_HIGH {
                issues.push(ValidationIssue {
                    rule: "exploding_gradient",
                    severity: Severity::High,
                    message: format!(
                        "cycle {}: smoothed grad_norm {:.2} exceeds {:.0}",
                        metrics.cycle, smoothed_grad_norm, GRAD_NORM_EXPLODE_HIGH
                    ),
                });
            } else if smoothed_grad_norm > GRAD_NORM_EXPLODE_LOW {
                issues.push(ValidationIssue {
                    rule: "exploding_gradient",
                    severity: Severity::Low,
                    message: format!(
                        "cycle {}: smoothed grad_norm {:.2} exceeds {:.0}",
                        metrics.cycle, smoothed_grad_norm, GRAD_NORM_EXPLODE_LOW
                    ),
                });
            } else if smoothed_grad_norm < GRAD_NORM_VANISH {
                issues.push(ValidationIssue {
                    rule: "vanishing_gradient",
                    severity: Severity::Low,
                    message: format!(
                        "cycle {}: smoothed grad_norm {:.2e} has collapsed toward zero",
                        metrics.cycle, smoothed_grad_norm
                    ),
                });
            }
        }

        let smoothed_entropy = Self::update_ema(&mut self.ema_entropy, metrics.mean_entropy);
        if smoothed_entropy < ENTROPY_COLLAPSE_HIGH {
            issues.push(ValidationIssue {
                rule: "policy_collapse",
                severity: Severity::High,
                message: format!(
                    "cycle {}: smoothed entropy {:.3} below {:.1}",
                    metrics.cycle, smoothed_entropy, ENTROPY_COLLAPSE_HIGH
                ),
            });
        } else if smoothed_entropy < ENTROPY_COLLAPSE_LOW {
            issues.push(ValidationIssue {
                rule: "policy_collapse",
                severity: Severity::Low,
                message: format!(
                    "cycle {}: smoothed entropy {:.3} below {:.1}",
                    metrics.cycle, smoothed_entropy, ENTROPY_COLLAPSE_LOW
                ),
            });
        }

        if metrics.games_played > 0 {
            if metrics.avg_ply < AVG_PLY_LOW {
                issues.push(ValidationIssue {
                    rule: "avg_ply",
                    severity: Severity::Medium,
                    message: format!(
                        "cycle {}: average game length {:.1} plies below {:.0}",
                        metrics.cycle, metrics.avg_ply, AVG_PLY_LOW
                    ),
                });
            } else if metrics.avg_ply > AVG_PLY_HIGH {
                issues.push(ValidationIssue {
                    rule: "avg_ply",
                    severity: Severity::Low,
                    message: format!(
                        "cycle {}: average game length {:.1} plies above {:.0}",
                        metrics.cycle, metrics.avg_ply, AVG_PLY_HIGH
                    ),
                });
            }

            if metrics.draw_rate() > DRAW_RATE_HIGH {
                issues.push(ValidationIssue {
                    rule: "draw_rate_high",
                    severity: Severity::Medium,
                    message: format!(
                        "cycle {}: draw rate {:.1}% exceeds {:.0}%",
                        metrics.cycle,
                        metrics.draw_rate() * 100.0,
                        DRAW_RATE_HIGH * 100.0
                    ),
                });
            }

            if metrics.termination.step_limit_rate() > STEP_LIMIT_RATE_HIGH {
                issues.push(ValidationIssue {
                    rule: "step_limit_rate_high",
                    severity: Severity::Low,
                    message: format!(
                        "cycle {}: {:.1}% of games ended by step limit, above {:.0}%",
                        metrics.cycle,
                        metrics.termination.step_limit_rate() * 100.0,
                        STEP_LIMIT_RATE_HIGH * 100.0
                    ),
                });
            }
        }

        if let Some(diversity) = metrics.action_diversity {
            if diversity < ACTION_DIVERSITY_LOW {
                issues.push(ValidationIssue {
                    rule: "action_diversity_low",
                    severity: Severity::High,
                    message: format!(
                        "cycle {}: action diversity {:.3} below {:.1} over the policy's rolling window",
                        metrics.cycle, diversity, ACTION_DIVERSITY_LOW
                    ),
                });
            }
        }

        if reward_trend.delta.abs() < STAGNATION_TREND_EPS && reward_trend.stability > STAGNATION_STABILITY {
            issues.push(ValidationIssue {
                rule: "progress_stagnation",
                severity: Severity::Low,
                message: format!(
                    "cycle {}: reward trend {:+.4} with stability {:.2} has plateaued",
                    metrics.cycle, reward_trend.delta, reward_trend.stability
                ),
            });
        } else if reward_trend.delta < STAGNATION_DECLINE {
            issues.push(ValidationIssue {
                rule: "progress_stagnation",
                severity: Severity::Medium,
                message: format!(
                    "cycle {}: reward trend {:+.4} is declining",
                    metrics.cycle, reward_trend.delta
                ),
            });
        }

        if metrics.illegal_argmax_rate > ILLEGAL_ARGMAX_WARN_RATE {
            issues.push(ValidationIssue {
                rule: "illegal_argmax_rate_high",
                severity: Severity::Low,
                message: format!(
                    "cycle {}: unmasked argmax landed outside the legal set {:.1}% of the time",
                    metrics.cycle,
                    metrics.illegal_argmax_rate * 100.0
                ),
            });
        }

        for issue in &issues {
            let level = match issue.severity {
                Severity::Critical => log::Level::Error,
                Severity::High => log::Level::Error,
                Severity::Medium => log::Level::Warn,
                Severity::Low => log::Level::Warn,
            };
            self.diagnostics.emit_throttled(issue.rule, level, &issue.message, VALIDATION_LOG_INTERVAL);
        }

        issues
    }

    /// Flags a single mini-batch's result as numerically unusable, logged
    /// immediately rather than waiting for the next cycle-level [`check`].
    /// The trainer calls this instead of folding a non-finite batch into
    /// the cycle's aggregates, so one bad batch doesn't mark the whole
    /// cycle's mean loss NaN and doesn't stop the remaining batches in the
    /// cycle from running.
    pub fn flag_non_finite_batch(&self, cycle: usize, batch_index: usize) -> ValidationIssue {
        let issue = ValidationIssue {
            rule: "non_finite_batch",
            severity: Severity::Critical,
            message: format!("cycle {cycle} batch {batch_index}: rejected a non-finite batch result"),
        };
        self.diagnostics.emit_throttled(issue.rule, log::Level::Error, &issue.message, VALIDATION_LOG_INTERVAL);
        issue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QStats;
    use crate::metrics::TerminationBreakdown;
    use crate::metrics::Trend;
    use std::time::Duration;

    fn stable_trend() -> TrendResult {
        TrendResult { direction: Trend::Stable, delta: 0.02, confidence: 0.5, stability: 0.3 }
    }

    fn metrics(loss: f32, grad_norm: f32, illegal_rate: f32) -> CycleMetrics {
        CycleMetrics {
            cycle: 1,
            games_played: 4,
            games_dropped: 0,
            wins: 1,
            draws: 1,
            losses: 2,
            avg_ply: 40.0,
            mean_reward: 0.0,
            mean_loss: loss,
            mean_grad_norm: grad_norm,
            mean_entropy: 1.0,
            q_stats: QStats::default(),
            batches_processed: 1,
            buffer_utilization: 0.5,
            illegal_argmax_rate: illegal_rate,
            action_diversity: Some(0.6),
            termination: TerminationBreakdown { natural: 3, step_limit: 1, manual: 0 },
            wall_time: Duration::from_secs(1),
        }
    }

    #[test]
    fn nan_loss_is_flagged_critical() {
        let mut validator = TrainingValidator::new();
        let issues = validator.check(&metrics(f32::NAN, 1.0, 0.0), stable_trend());
        assert!(issues.iter().any(|i| i.rule == "non_finite_loss" && i.severity == Severity::Critical));
    }

    #[test]
    fn stable_loss_raises_no_explosion() {
        let mut validator = TrainingValidator::new();
        for _ in 0..5 {
            let issues = validator.check(&metrics(0.5, 1.0, 0.0), stable_trend());
            assert!(issues.iter().all(|i| i.rule != "loss_explosion"));
        }
    }

    #[test]
    fn sudden_loss_spike_after_a_stable_baseline_is_flagged() {
        let mut validator = TrainingValidator::new();
        for _ in 0..5 {
            validator.check(&metrics(0.5, 1.0, 0.0), stable_trend());
        }
        let issues = validator.check(&metrics(50.0, 1.0, 0.0), stable_trend());
        assert!(issues.iter().any(|i| i.rule == "loss_explosion" && i.severity == Severity::High));
    }

    #[test]
    fn grad_norm_above_high_ceiling_is_flagged_high() {
        let mut validator = TrainingValidator::new();
        let issues = validator.check(&metrics(0.5, 100.0, 0.0), stable_trend());
        assert!(issues.iter().any(|i| i.rule == "exploding_gradient" && i.severity == Severity::High));
    }

    #[test]
    fn grad_norm_above_low_ceiling_is_flagged_low() {
        let mut validator = TrainingValidator::new();
        let issues = validator.check(&metrics(0.5, 6.0, 0.0), stable_trend());
        assert!(issues.iter().any(|i| i.rule == "exploding_gradient" && i.severity == Severity::Low));
    }

    #[test]
    fn vanishing_gradient_is_flagged() {
        let mut validator = TrainingValidator::new();
        let issues = validator.check(&metrics(0.5, 1e-9, 0.0), stable_trend());
        assert!(issues.iter().any(|i| i.rule == "vanishing_gradient"));
    }

    #[test]
    fn low_entropy_is_flagged_as_policy_collapse() {
        let mut validator = TrainingValidator::new();
        let mut m = metrics(0.5, 1.0, 0.0);
        m.mean_entropy = 0.05;
        let issues = validator.check(&m, stable_trend());
        assert!(issues.iter().any(|i| i.rule == "policy_collapse" && i.severity == Severity::High));
    }

    #[test]
    fn short_average_games_are_flagged() {
        let mut validator = TrainingValidator::new();
        let mut m = metrics(0.5, 1.0, 0.0);
        m.avg_ply = 4.0;
        let issues = validator.check(&m, stable_trend());
        assert!(issues.iter().any(|i| i.rule == "avg_ply" && i.severity == Severity::Medium));
    }

    #[test]
    fn high_draw_rate_is_flagged() {
        let mut validator = TrainingValidator::new();
        let mut m = metrics(0.5, 1.0, 0.0);
        m.draws = 4;
        m.wins = 0;
        m.losses = 0;
        let issues = validator.check(&m, stable_trend());
        assert!(issues.iter().any(|i| i.rule == "draw_rate_high"));
    }

    #[test]
    fn high_step_limit_rate_is_flagged() {
        let mut validator = TrainingValidator::new();
        let mut m = metrics(0.5, 1.0, 0.0);
        m.termination = TerminationBreakdown { natural: 1, step_limit: 3, manual: 0 };
        let issues = validator.check(&m, stable_trend());
        assert!(issues.iter().any(|i| i.rule == "step_limit_rate_high"));
    }

    #[test]
    fn low_action_diversity_is_flagged() {
        let mut validator = TrainingValidator::new();
        let mut m = metrics(0.5, 1.0, 0.0);
        m.action_diversity = Some(0.02);
        let issues = validator.check(&m, stable_trend());
        assert!(issues.iter().any(|i| i.rule == "action_diversity_low"));
    }

    #[test]
    fn action_diversity_with_insufficient_data_is_not_checked() {
        let mut validator = TrainingValidator::new();
        let mut m = metrics(0.5, 1.0, 0.0);
        m.action_diversity = None;
        let issues = validator.check(&m, stable_trend());
        assert!(issues.iter().all(|i| i.rule != "action_diversity_low"));
    }

    #[test]
    fn a_flat_high_stability_trend_is_flagged_as_stagnation() {
        let mut validator = TrainingValidator::new();
        let trend = TrendResult { direction: Trend::Stable, delta: 0.0001, confidence: 0.1, stability: 0.95 };
        let issues = validator.check(&metrics(0.5, 1.0, 0.0), trend);
        assert!(issues.iter().any(|i| i.rule == "progress_stagnation" && i.severity == Severity::Low));
    }

    #[test]
    fn a_declining_trend_is_flagged_as_regression() {
        let mut validator = TrainingValidator::new();
        let trend = TrendResult { direction: Trend::Down, delta: -0.05, confidence: 0.9, stability: 0.5 };
        let issues = validator.check(&metrics(0.5, 1.0, 0.0), trend);
        assert!(issues.iter().any(|i| i.rule == "progress_stagnation" && i.severity == Severity::Medium));
    }

    #[test]
    fn high_illegal_argmax_rate_is_flagged() {
        let mut validator = TrainingValidator::new();
        let issues = validator.check(&metrics(0.5, 1.0, 0.9), stable_trend());
        assert!(issues.iter().any(|i| i.rule == "illegal_argmax_rate_high"));
    }

    #[test]
    fn flagging_a_non_finite_batch_reports_a_critical_issue() {
        let validator = TrainingValidator::new();
        let issue = validator.flag_non_finite_batch(3, 1);
        assert_eq!(issue.severity, Severity::Critical);
        assert_eq!(issue.rule, "non_finite_batch");
    }
}

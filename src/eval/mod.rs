//! Evaluates a candidate backend against a fixed opponent over a batch of
//! games and reports whether the result is statistically distinguishable
//! from a coin flip. Built from first principles (Wilson score interval,
//! exact two-tailed binomial test, Cohen's h) rather than reaching for a
//! stats crate this dependency graph has no other use for.

#[derive(Debug, Clone, Copy)]
pub struct EvaluationResult {
    pub wins: usize,
    pub losses: usize,
    pub draws: usize,
    pub games: usize,
    pub win_rate: f32,
    pub wilson_interval: (f32, f32),
    pub p_value: f32,
    pub cohens_h: f32,
    pub avg_game_length: f32,
}

/// 95% confidence z-score, the only confidence level this evaluator reports.
const Z_95: f64 = 1.959_963_985;

pub struct Evaluator;

impl Evaluator {
    /// `wins`/`losses`/`draws` are from the candidate's perspective. Draws
    /// count as half a win for the win-rate and significance calculations,
    /// the standard chess-rating convention. `total_plies` is the sum of
    /// every evaluated game's actual length, used only to report
    /// `avg_game_length`.
    pub fn evaluate(wins: usize, losses: usize, draws: usize, total_plies: u64) -> anyhow::Result<EvaluationResult> {
        let games = wins + losses + draws;
        anyhow::ensure!(games > 0, "cannot evaluate zero games");

        let score = wins as f64 + 0.5 * draws as f64;
        let win_rate = score / games as f64;

        let wilson_interval = Self::wilson_interval(score, games as f64, Z_95);
        let p_value = Self::binomial_two_tailed_p_value(wins, games, 0.5);
        let cohens_h = Self::cohens_h(win_rate, 0.5);

        Ok(EvaluationResult {
            wins,
            losses,
            draws,
            games,
            win_rate: win_rate as f32,
            wilson_interval: (wilson_interval.0 as f32, wilson_interval.1 as f32),
            p_value: p_value as f32,
            cohens_h: cohens_h as f32,
            avg_game_length: total_plies as f32 / games as f32,
        })
    }

    /// Wilson score interval for a proportion `successes / trials`, which
    /// stays well-behaved (unlike the normal approximation) near 0 or 1.
    fn wilson_interval(successes: f64, trials: f64, z: f64) -> (f64, f64) {
        let p_hat = successes / trials;
        let z2 = z * z;
        let denom = 1.0 + z2 / trials;
        let center = p_hat + z2 / (2.0 * trials);
        let margin = z * ((p_hat * (1.0 - p_hat) / trials) + z2 / (4.0 * trials * trials)).sqrt();
        (((center - margin) / denom).max(0.0), ((center + margin) / denom).min(1.0))
    }

    /// Natural log of the binomial coefficient `C(n, k)`, via a running sum
    /// of logs rather than a gamma function (no stats crate on this
    /// dependency graph to provide one).
    fn ln_choose(n: usize, k: usize) -> f64 {
        if k > n {
            return f64::NEG_INFINITY;
        }
        let k = k.min(n - k);
        let mut result = 0.0f64;
        for i in 0..k {
            result += ((n - i) as f64).ln() - ((i + 1) as f64).ln();
        }
        result
    }

    fn ln_pmf(n: usize, k: usize, p: f64) -> f64 {
        if p <= 0.0 {
            return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
        }
        if p >= 1.0 {
            return if k == n { 0.0 } else { f64::NEG_INFINITY };
        }
        Self::ln_choose(n, k) + k as f64 * p.ln() + (n - k) as f64 * (1.0 - p).ln()
    }

    /// Exact two-tailed binomial test: sums the probability of every
    /// outcome at least as extreme (no more likely) as the observed one
    /// under the null `p0` (classic "small p-value" method, matching
    /// R's `binom.test`).
    fn binomial_two_tailed_p_value(successes: usize, trials: usize, p0: f64) -> f64 {
        let observed_ln_pmf = Self::ln_pmf(trials, successes, p0);
        // small multiplicative slack so the observed outcome is always
        // included despite floating point rounding
        let threshold = observed_ln_pmf + 1e-9;
        (0..=trials)
            .map(|k| Self::ln_pmf(trials, k, p0))
            .filter(|&ln_p| ln_p <= threshold)
            .map(f64::exp)
            .sum::<f64>()
            .min(1.0)
    }

    /// Cohen's h effect size between two proportions.
    fn cohens_h(p1: f64, p2: f64) -> f64 {
        2.0 * p1.sqrt().asin() - 2.0 * p2.sqrt().asin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_record_is_not_significant() {
        let result = Evaluator::evaluate(10, 10, 0, 600).unwrap();
        assert!(result.p_value > 0.5);
        assert!((result.win_rate - 0.5).abs() < 1e-6);
    }

    #[test]
    fn lopsided_record_is_significant() {
        let result = Evaluator::evaluate(18, 2, 0, 600).unwrap();
        assert!(result.p_value < 0.05);
        assert!(result.win_rate > 0.5);
    }

    #[test]
    fn wilson_interval_brackets_the_point_estimate() {
        let result = Evaluator::evaluate(15, 5, 0, 600).unwrap();
        assert!(result.wilson_interval.0 <= result.win_rate);
        assert!(result.win_rate <= result.wilson_interval.1);
    }

    #[test]
    fn draws_count_as_half_a_win() {
        let result = Evaluator::evaluate(0, 0, 20, 600).unwrap();
        assert!((result.win_rate - 0.5).abs() < 1e-6);
    }

    #[test]
    fn cohens_h_is_zero_for_an_even_record() {
        let result = Evaluator::evaluate(10, 10, 0, 600).unwrap();
        assert!(result.cohens_h.abs() < 1e-3);
    }

    #[test]
    fn average_game_length_divides_total_plies_by_games() {
        let result = Evaluator::evaluate(5, 5, 0, 500).unwrap();
        assert_eq!(result.avg_game_length, 50.0);
    }

    #[test]
    fn evaluating_zero_games_is_an_error_not_a_panic() {
        assert!(Evaluator::evaluate(0, 0, 0, 0).is_err());
    }
}

//! Wilson interval and two-tailed binomial p-value against a fixed
//! win/loss record.

use chess_rl_core::eval::Evaluator;

#[test]
fn wilson_interval_and_p_value_match_a_fixed_win_loss_record() {
    let result = Evaluator::evaluate(55, 45, 0, 5000).unwrap();

    // standard Wilson score interval for 55/100 at z=1.96
    assert!((result.wilson_interval.0 - 0.4524).abs() < 1e-3);
    assert!((result.wilson_interval.1 - 0.6439).abs() < 1e-3);
    assert!((result.p_value - 0.368).abs() < 1e-2);
    assert!(result.p_value > 0.05, "not significant at alpha=0.05");
}

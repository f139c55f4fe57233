//! Cross-checking an accelerated backend against the CPU reference.
//!
//! A small fraction of evaluations run on both pipes. Each comparison is
//! recorded in a ring of the last [`SELFCHECK_WINDOW`] outcomes; too many
//! failures in that window mean the accelerated results are corrupt.

use std::sync::Mutex;

use sente_core::NUM_INTERSECTIONS;

use crate::result::NetResult;

/// Outcomes remembered.
pub const SELFCHECK_WINDOW: usize = 10;
/// Failures within the window that are fatal.
pub const SELFCHECK_MAX_FAILURES: usize = 3;
/// Largest tolerated relative difference.
pub const SELFCHECK_THRESHOLD: f32 = 0.2;

/// Magnitudes below this are treated as equal to it.
const SMALL_VALUE: f32 = 1.0 / NUM_INTERSECTIONS as f32;

/// Relative difference of two outputs; `f32::MAX` for NaN or a sign flip
/// between two non-negligible values.
pub fn relative_difference(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        return f32::MAX;
    }
    if a.abs() > SMALL_VALUE && b.abs() > SMALL_VALUE && (a > 0.0) != (b > 0.0) {
        return f32::MAX;
    }
    let fa = a.abs().max(SMALL_VALUE);
    let fb = b.abs().max(SMALL_VALUE);
    (fa - fb).abs() / fa.min(fb)
}

/// Whether two results agree within [`SELFCHECK_THRESHOLD`] on every output.
pub fn results_agree(primary: &NetResult, reference: &NetResult) -> bool {
    let within = |a: f32, b: f32| relative_difference(a, b) <= SELFCHECK_THRESHOLD;
    within(primary.winrate, reference.winrate)
        && within(primary.policy_pass, reference.policy_pass)
        && primary
            .policy
            .iter()
            .zip(&reference.policy)
            .all(|(&a, &b)| within(a, b))
}

/// Outcome of recording one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// This check failed, but the window is still within tolerance.
    Failed { failures: usize },
    /// This check failed and the window now holds too many failures.
    Diverged { failures: usize },
}

struct Ring {
    outcomes: [bool; SELFCHECK_WINDOW],
    next: usize,
}

/// Ring buffer of recent self-check outcomes (`true` = failure).
pub struct SelfCheck {
    ring: Mutex<Ring>,
}

impl Default for SelfCheck {
    fn default() -> Self {
        SelfCheck::new()
    }
}

impl SelfCheck {
    pub fn new() -> SelfCheck {
        SelfCheck {
            ring: Mutex::new(Ring {
                outcomes: [false; SELFCHECK_WINDOW],
                next: 0,
            }),
        }
    }

    /// Record whether the latest comparison failed and judge the window.
    ///
    /// Only a failing check can produce [`Verdict::Diverged`].
    pub fn record(&self, failed: bool) -> Verdict {
        let mut ring = self.ring.lock().expect("selfcheck mutex poisoned");
        let slot = ring.next;
        ring.outcomes[slot] = failed;
        ring.next = (slot + 1) % SELFCHECK_WINDOW;
        let failures = ring.outcomes.iter().filter(|&&f| f).count();
        match (failed, failures >= SELFCHECK_MAX_FAILURES) {
            (false, _) => Verdict::Passed,
            (true, false) => Verdict::Failed { failures },
            (true, true) => Verdict::Diverged { failures },
        }
    }

    /// Failures currently in the window.
    pub fn failures(&self) -> usize {
        let ring = self.ring.lock().expect("selfcheck mutex poisoned");
        ring.outcomes.iter().filter(|&&f| f).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_values_compare_equal() {
        assert_eq!(relative_difference(1e-6, 1e-4), 0.0);
        assert_eq!(relative_difference(0.0, -0.0), 0.0);
    }

    #[test]
    fn sign_flip_is_maximal_only_for_significant_values() {
        assert_eq!(relative_difference(0.5, -0.5), f32::MAX);
        assert!(relative_difference(1e-4, -1e-4) < SELFCHECK_THRESHOLD);
    }

    #[test]
    fn nan_is_maximal() {
        assert_eq!(relative_difference(f32::NAN, 0.5), f32::MAX);
        assert_eq!(relative_difference(0.5, f32::NAN), f32::MAX);
    }

    #[test]
    fn relative_error_uses_smaller_magnitude() {
        let d = relative_difference(0.5, 0.6);
        assert!((d - 0.2).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn third_failure_in_window_diverges() {
        let check = SelfCheck::new();
        assert_eq!(check.record(true), Verdict::Failed { failures: 1 });
        assert_eq!(check.record(false), Verdict::Passed);
        assert_eq!(check.record(true), Verdict::Failed { failures: 2 });
        assert_eq!(check.record(true), Verdict::Diverged { failures: 3 });
    }

    #[test]
    fn passing_check_never_diverges() {
        let check = SelfCheck::new();
        for _ in 0..3 {
            check.record(true);
        }
        assert_eq!(check.record(false), Verdict::Passed);
    }

    #[test]
    fn old_failures_age_out_of_window() {
        let check = SelfCheck::new();
        check.record(true);
        check.record(true);
        for _ in 0..SELFCHECK_WINDOW - 2 {
            check.record(false);
        }
        assert_eq!(check.failures(), 2);
        // The oldest failure is overwritten by this pass.
        assert_eq!(check.record(false), Verdict::Passed);
        assert_eq!(check.failures(), 1);
        assert_eq!(check.record(true), Verdict::Failed { failures: 1 });
    }

    #[test]
    fn agreement_checks_every_output() {
        let a = NetResult::default();
        let mut b = a.clone();
        assert!(results_agree(&a, &b));
        b.policy[100] = 0.5;
        assert!(!results_agree(&a, &b));
        let mut c = a.clone();
        c.winrate = 0.9;
        assert!(!results_agree(&a, &c));
    }
}

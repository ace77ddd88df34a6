//! Division schedule for the incremental coupling-rescaling scheme.
//!
//! The target weak coupling is walked down to the reference coupling in
//! geometric-ish steps; each step becomes one independent Markov chain that
//! estimates a single partition-function ratio.

/// One division: a weak-coupling value and the rescaling factor applied to
/// step down from it. `alpha < 1`, and the chain's estimator is `alpha^nw`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Division {
    pub jw: f64,
    pub alpha: f64,
}

/// Split the interval `(jw0, jw]` into divisions.
///
/// Each step uses `alpha = epsilon^(1 / (lambda * beta * jw * L))`, the step
/// size that keeps the expected ratio near `epsilon` given the 1D operator
/// count estimate `n ~ lambda * beta * J * L`. The clamp to
/// `[epsilon, 0.99999]` bounds alpha away from both 0 and 1, so the
/// schedule is finite for any valid input.
pub fn divide(jw: f64, jw0: f64, epsilon: f64, lambda: f64, beta: f64, l: usize) -> Vec<Division> {
    let mut divisions = Vec::new();
    let mut coupling = jw;

    while coupling > jw0 {
        let mut alpha = epsilon.powf(1.0 / (lambda * beta * coupling * l as f64));
        if alpha < epsilon {
            alpha = epsilon;
        } else if alpha > 0.99999 {
            alpha = 0.99999;
        }
        divisions.push(Division { jw: coupling, alpha });
        coupling *= alpha;
    }

    divisions
}

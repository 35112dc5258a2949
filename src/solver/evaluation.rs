//! Exact evaluation of a fixed policy.
//!
//! Fixing the action in every state turns the MDP into a Markov reward process
//! with transition matrix `P` and expected one-step rewards `r`. Its value
//! function is the solution of the Bellman expectation equation
//! `v = r + gamma * P v`, i.e. `(I - gamma * P) v = r`.

use std::fmt::Debug;
use std::hash::Hash;

use log::debug;
use ndarray::{Array1, Array2};

use crate::error::{Error, Result};
use crate::model::MarkovDecisionProcess;
use crate::solver::{Policy, ValueFunction};

/// Pivots smaller than this are treated as zero.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Row-stochastic matrix `P[i][j] = P(s_j | s_i, policy(s_i))`, rows and
/// columns in state declaration order. Absorbing states have a zero row.
///
/// # Errors
///
/// [`Error::InvalidPolicy`] if the policy misses a non-absorbing state, names
/// an unavailable action, or names an undeclared state.
pub fn transition_matrix<S, A>(
    mdp: &MarkovDecisionProcess<S, A>,
    policy: &Policy<S, A>,
) -> Result<Array2<f64>>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    let chosen = policy.to_dense(mdp)?;
    Ok(dense_transition_matrix(mdp, &chosen))
}

/// Expected one-step reward of every state under the policy:
/// `r[i] = sum_j P(s_i, a, s_j) * R(s_i, a, s_j)` with `a = policy(s_i)`.
///
/// # Errors
///
/// Same as [`transition_matrix`].
pub fn expected_rewards<S, A>(
    mdp: &MarkovDecisionProcess<S, A>,
    policy: &Policy<S, A>,
) -> Result<Array1<f64>>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    let chosen = policy.to_dense(mdp)?;
    Ok(dense_expected_rewards(mdp, &chosen))
}

/// Value function of a fixed policy under the model's discount factor.
///
/// Absorbing states evaluate to 0.
///
/// # Errors
///
/// - Same as [`transition_matrix`].
/// - [`Error::SingularSystem`] if the policy has no finite value, e.g. an
///   undiscounted (`gamma = 1`) cycle that never reaches an absorbing state.
///
/// # Examples
///
/// ```
/// use mdp::{evaluate_policy, Mdp, Policy};
///
/// let mdp = Mdp::new(
///     ["s1", "s2"],
///     ["a1", "a2"],
///     [
///         (("s1", "a1", "s1"), 0.9),
///         (("s1", "a1", "s2"), 0.1),
///         (("s2", "a2", "s1"), 1.0),
///     ],
///     [(("s1", "a1", "s1"), 20.0)],
///     0.5,
/// )
/// .unwrap();
/// let policy: Policy<_, _> = [("s1", "a1"), ("s2", "a2")].into_iter().collect();
///
/// let values = evaluate_policy(&mdp, &policy).unwrap();
/// assert!((values[&"s1"] - 34.285714).abs() < 1e-6);
/// assert!((values[&"s2"] - 17.142857).abs() < 1e-6);
/// ```
pub fn evaluate_policy<S, A>(
    mdp: &MarkovDecisionProcess<S, A>,
    policy: &Policy<S, A>,
) -> Result<ValueFunction<S>>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    let chosen = policy.to_dense(mdp)?;
    let n = mdp.num_states();
    debug!(
        "evaluating policy over {} states with gamma = {}",
        n,
        mdp.discount()
    );

    let system = Array2::<f64>::eye(n) - dense_transition_matrix(mdp, &chosen) * mdp.discount();
    let values = solve_linear_system(system, dense_expected_rewards(mdp, &chosen))?;
    Ok(ValueFunction::from_dense(mdp, &values.to_vec()))
}

fn dense_transition_matrix<S, A>(
    mdp: &MarkovDecisionProcess<S, A>,
    chosen: &[Option<usize>],
) -> Array2<f64>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    let n = mdp.num_states();
    let mut p = Array2::<f64>::zeros((n, n));
    for (s, action) in chosen.iter().enumerate() {
        if let Some(a) = *action {
            for outcome in mdp.outcomes(s, a) {
                p[[s, outcome.next]] += outcome.probability;
            }
        }
    }
    p
}

fn dense_expected_rewards<S, A>(
    mdp: &MarkovDecisionProcess<S, A>,
    chosen: &[Option<usize>],
) -> Array1<f64>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    chosen
        .iter()
        .enumerate()
        .map(|(s, action)| match *action {
            Some(a) => mdp
                .outcomes(s, a)
                .iter()
                .map(|o| o.probability * o.reward)
                .sum::<f64>(),
            None => 0.0,
        })
        .collect()
}

/// Gaussian elimination with partial pivoting.
fn solve_linear_system(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < SINGULAR_TOLERANCE {
            return Err(Error::SingularSystem);
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                let upper = a[[col, k]];
                a[[row, k]] -= factor * upper;
            }
            let upper = b[col];
            b[row] -= factor * upper;
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mdp;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn two_state(discount: f64) -> Mdp<&'static str, &'static str> {
        Mdp::new(
            ["s1", "s2"],
            ["a1", "a2"],
            [
                (("s1", "a1", "s1"), 0.9),
                (("s1", "a1", "s2"), 0.1),
                (("s2", "a2", "s1"), 1.0),
            ],
            [
                (("s1", "a1", "s1"), 20.0),
                (("s1", "a1", "s2"), 0.0),
                (("s2", "a2", "s1"), 0.0),
            ],
            discount,
        )
        .unwrap()
    }

    fn three_state() -> Mdp<&'static str, &'static str> {
        Mdp::new(
            ["a", "b", "c"],
            ["1", "2"],
            [
                (("a", "1", "b"), 1.0),
                (("a", "2", "c"), 1.0),
                (("b", "1", "a"), 0.5),
                (("b", "1", "c"), 0.5),
                (("b", "2", "a"), 0.5),
                (("b", "2", "c"), 0.5),
                (("c", "1", "a"), 0.2),
                (("c", "1", "b"), 0.8),
                (("c", "2", "a"), 0.7),
                (("c", "2", "b"), 0.3),
            ],
            [
                (("b", "1", "a"), 1.0),
                (("b", "1", "c"), 1.0),
                (("b", "2", "a"), 1.0),
                (("b", "2", "c"), 1.0),
                (("c", "1", "a"), 2.0),
                (("c", "1", "b"), 2.0),
                (("c", "2", "a"), 2.0),
                (("c", "2", "b"), 2.0),
            ],
            0.9,
        )
        .unwrap()
    }

    fn stay_policy() -> Policy<&'static str, &'static str> {
        [("s1", "a1"), ("s2", "a2")].into_iter().collect()
    }

    #[test]
    fn test_transition_matrix_rows_are_distributions() {
        let p = transition_matrix(&two_state(0.5), &stay_policy()).unwrap();
        assert_eq!(p, array![[0.9, 0.1], [1.0, 0.0]]);

        let policy: Policy<_, _> = [("a", "1"), ("b", "1"), ("c", "1")].into_iter().collect();
        let p = transition_matrix(&three_state(), &policy).unwrap();
        assert_eq!(
            p,
            array![[0.0, 1.0, 0.0], [0.5, 0.0, 0.5], [0.2, 0.8, 0.0]]
        );
    }

    #[test]
    fn test_expected_rewards() {
        let r = expected_rewards(&two_state(0.5), &stay_policy()).unwrap();
        assert_eq!(r, array![18.0, 0.0]);
    }

    #[test]
    fn test_evaluate_policy() {
        let values = evaluate_policy(&two_state(0.5), &stay_policy()).unwrap();
        assert_abs_diff_eq!(values[&"s1"], 34.285714, epsilon = 1e-6);
        assert_abs_diff_eq!(values[&"s2"], 17.142857, epsilon = 1e-6);

        let values = evaluate_policy(&two_state(0.99), &stay_policy()).unwrap();
        assert_abs_diff_eq!(values[&"s1"], 1637.852593, epsilon = 1e-6);
        assert_abs_diff_eq!(values[&"s2"], 1621.474067, epsilon = 1e-6);

        let policy: Policy<_, _> = [("a", "1"), ("b", "1"), ("c", "1")].into_iter().collect();
        let values = evaluate_policy(&three_state(), &policy).unwrap();
        assert_abs_diff_eq!(values[&"a"], 8.63, epsilon = 5e-3);
        assert_abs_diff_eq!(values[&"b"], 9.59, epsilon = 5e-3);
        assert_abs_diff_eq!(values[&"c"], 10.46, epsilon = 5e-3);
    }

    #[test]
    fn test_absorbing_states_evaluate_to_zero() {
        let mdp = Mdp::new(
            ["start", "end"],
            ["go"],
            [(("start", "go", "end"), 1.0)],
            [(("start", "go", "end"), 3.0)],
            1.0,
        )
        .unwrap();
        let policy: Policy<_, _> = [("start", "go")].into_iter().collect();

        let values = evaluate_policy(&mdp, &policy).unwrap();
        assert_eq!(values[&"end"], 0.0);
        assert_abs_diff_eq!(values[&"start"], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_undiscounted_cycle_is_singular() {
        let mdp = two_state(1.0);
        assert_eq!(
            evaluate_policy(&mdp, &stay_policy()),
            Err(Error::SingularSystem)
        );
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let policy: Policy<_, _> = [("s1", "a1")].into_iter().collect();
        assert!(matches!(
            evaluate_policy(&two_state(0.5), &policy),
            Err(Error::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_solve_linear_system_needs_pivoting() {
        let a = array![[0.0, 2.0], [1.0, 1.0]];
        let b = array![4.0, 3.0];
        let x = solve_linear_system(a, b).unwrap();
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 2.0, epsilon = 1e-12);
    }
}

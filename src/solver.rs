//! This module solves a [`MarkovDecisionProcess`] by value iteration: the
//! Bellman-optimality operator is applied to a value estimate until it stops
//! changing, and a greedy policy is read out of the converged values.

pub mod evaluation;
pub mod policy;
pub mod value_iteration;


use std::fmt::Debug;
use std::hash::Hash;

use log::debug;

use crate::error::{Error, Result};
use crate::model::MarkovDecisionProcess;

pub use evaluation::{evaluate_policy, expected_rewards, transition_matrix};
pub use policy::{extract_policy, q_value, Policy};
pub use value_iteration::{Termination, ValueFunction, ValueIteration};

/// When a sweep is small enough to stop iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoppingRule {
    /// Stop once `delta < epsilon`.
    #[default]
    Absolute,
    /// Stop once `delta < epsilon * (1 - gamma) / (2 * gamma)`, which bounds the
    /// loss of the greedy policy by `epsilon`.
    Bounded,
}

impl StoppingRule {
    /// The delta below which a sweep counts as converged.
    pub fn threshold(self, epsilon: f64, discount: f64) -> f64 {
        match self {
            StoppingRule::Absolute => epsilon,
            StoppingRule::Bounded if discount == 0.0 => f64::INFINITY,
            StoppingRule::Bounded => epsilon * (1.0 - discount) / (2.0 * discount),
        }
    }
}

/// Configuration options for a value-iteration solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Convergence tolerance on the largest per-state change of one sweep
    pub epsilon: f64,
    /// Maximum number of sweeps
    pub max_iterations: usize,
    /// Value every state starts from; absorbing states keep it
    pub initial_value: f64,
    pub stopping_rule: StoppingRule,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            max_iterations: 10_000,
            initial_value: 0.0,
            stopping_rule: StoppingRule::Absolute,
        }
    }
}

impl SolverConfig {
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_initial_value(mut self, initial_value: f64) -> Self {
        self.initial_value = initial_value;
        self
    }

    pub fn with_stopping_rule(mut self, stopping_rule: StoppingRule) -> Self {
        self.stopping_rule = stopping_rule;
        self
    }

    /// Checks that the configuration can drive a solve.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `epsilon` is not a finite positive number,
    /// `max_iterations` is zero, or `initial_value` is not finite.
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(Error::parameter(
                "epsilon",
                format!("must be a finite positive number, got {}", self.epsilon),
            ));
        }
        if self.max_iterations == 0 {
            return Err(Error::parameter("max_iterations", "must be at least 1"));
        }
        if !self.initial_value.is_finite() {
            return Err(Error::parameter(
                "initial_value",
                format!("must be finite, got {}", self.initial_value),
            ));
        }
        Ok(())
    }
}

/// Result of a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution<S, A>
where
    S: Eq + Hash,
{
    /// Converged (or best-effort) optimal value of every state
    pub values: ValueFunction<S>,
    /// Greedy action of every state that has one; absorbing states are absent
    pub policy: Policy<S, A>,
    /// Whether the last sweep fell below the stopping threshold
    pub converged: bool,
    /// Number of sweeps performed
    pub iterations: usize,
    /// Largest per-state change of the last sweep
    pub delta: f64,
    pub termination: Termination,
}

/// Solves an MDP by value iteration and extracts the greedy policy.
///
/// Hitting `max_iterations` is not an error: the solution is returned with
/// `converged == false` and holds the best-effort values and policy.
///
/// # Errors
///
/// [`Error::InvalidParameter`] if `config` does not validate.
///
/// # Examples
///
/// ```
/// use mdp::{solve, Mdp, SolverConfig};
///
/// let mdp = Mdp::new(
///     ["low", "high"],
///     ["save", "spend"],
///     [
///         (("low", "save", "low"), 1.0),
///         (("low", "spend", "high"), 1.0),
///         (("high", "save", "high"), 1.0),
///         (("high", "spend", "low"), 1.0),
///     ],
///     [(("low", "spend", "high"), 10.0)],
///     0.9,
/// )
/// .unwrap();
///
/// let solution = solve(&mdp, &SolverConfig::default()).unwrap();
/// assert!(solution.converged);
/// assert_eq!(solution.policy.get(&"low"), Some(&"spend"));
/// assert!((solution.values[&"low"] - 10.0 / 0.19).abs() < 1e-4);
/// ```
pub fn solve<S, A>(
    mdp: &MarkovDecisionProcess<S, A>,
    config: &SolverConfig,
) -> Result<Solution<S, A>>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    let mut engine = ValueIteration::new(mdp, config)?;
    debug!(
        "value iteration over {} states: gamma = {}, epsilon = {:e}, max_iterations = {}",
        mdp.num_states(),
        mdp.discount(),
        config.epsilon,
        config.max_iterations
    );

    let termination = engine.run();
    let policy = policy::greedy_policy(mdp, engine.values());

    debug!(
        "value iteration finished after {} sweeps ({:?}, delta = {:e})",
        engine.iterations(),
        termination,
        engine.delta()
    );

    Ok(Solution {
        values: engine.value_function(),
        policy,
        converged: termination == Termination::Converged,
        iterations: engine.iterations(),
        delta: engine.delta(),
        termination,
    })
}

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::mem;
use std::ops::Index;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::model::MarkovDecisionProcess;
use crate::solver::policy::best_action;
use crate::solver::SolverConfig;

/// Why a value-iteration run returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The last sweep changed no state by more than the stopping threshold.
    Converged,
    /// The sweep budget ran out first.
    MaxIterations,
    /// The caller's progress callback asked to stop.
    Stopped,
}

/// Expected discounted return of each state.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueFunction<S>
where
    S: Eq + Hash,
{
    values: HashMap<S, f64>,
}

impl<S> ValueFunction<S>
where
    S: Eq + Hash,
{
    pub fn get(&self, state: &S) -> Option<f64> {
        self.values.get(state).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&S, f64)> {
        self.values.iter().map(|(state, &value)| (state, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_inner(self) -> HashMap<S, f64> {
        self.values
    }

    pub(crate) fn from_dense<A>(mdp: &MarkovDecisionProcess<S, A>, values: &[f64]) -> Self
    where
        S: Clone + Debug,
        A: Clone + Eq + Hash + Debug,
    {
        mdp.states()
            .iter()
            .cloned()
            .zip(values.iter().copied())
            .collect()
    }

    /// Values in the model's state declaration order.
    pub(crate) fn to_dense<A>(&self, mdp: &MarkovDecisionProcess<S, A>) -> Result<Vec<f64>>
    where
        S: Clone + Debug,
        A: Clone + Eq + Hash + Debug,
    {
        mdp.states()
            .iter()
            .map(|state| {
                self.get(state).ok_or_else(|| {
                    Error::parameter("values", format!("no value for state {state:?}"))
                })
            })
            .collect()
    }
}

impl<S> Index<&S> for ValueFunction<S>
where
    S: Eq + Hash,
{
    type Output = f64;

    /// # Panics
    ///
    /// Panics if `state` has no value.
    fn index(&self, state: &S) -> &f64 {
        &self.values[state]
    }
}

impl<S> FromIterator<(S, f64)> for ValueFunction<S>
where
    S: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<S> From<HashMap<S, f64>> for ValueFunction<S>
where
    S: Eq + Hash,
{
    fn from(values: HashMap<S, f64>) -> Self {
        Self { values }
    }
}

/// Value-iteration engine over one model.
///
/// Every sweep is a synchronous (Jacobi) backup: all new values are computed
/// from the previous sweep's snapshot, never from values updated earlier in the
/// same sweep. States are visited in declaration order. Absorbing states keep
/// their initial value.
///
/// The engine can be driven one sweep at a time with [`ValueIteration::sweep`]
/// or run to termination with [`ValueIteration::run`] /
/// [`ValueIteration::run_while`].
///
/// # Examples
///
/// ```
/// use mdp::{Mdp, SolverConfig, Termination, ValueIteration};
///
/// let mdp = Mdp::new(
///     ["s0", "s1"],
///     ["go"],
///     [(("s0", "go", "s1"), 1.0), (("s1", "go", "s0"), 1.0)],
///     [(("s0", "go", "s1"), 1.0), (("s1", "go", "s0"), 2.0)],
///     0.9,
/// )
/// .unwrap();
///
/// let mut engine = ValueIteration::new(&mdp, &SolverConfig::default()).unwrap();
/// let first = engine.sweep();
/// assert_eq!(first, 2.0);
/// assert_eq!(engine.values(), &[1.0, 2.0]);
///
/// assert_eq!(engine.run(), Termination::Converged);
/// ```
#[derive(Debug, Clone)]
pub struct ValueIteration<'a, S, A> {
    mdp: &'a MarkovDecisionProcess<S, A>,
    threshold: f64,
    max_iterations: usize,
    values: Vec<f64>,
    scratch: Vec<f64>,
    iterations: usize,
    delta: f64,
}

impl<'a, S, A> ValueIteration<'a, S, A>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    /// Seeds every state with `config.initial_value`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `config` does not validate.
    pub fn new(mdp: &'a MarkovDecisionProcess<S, A>, config: &SolverConfig) -> Result<Self> {
        config.validate()?;
        let n = mdp.num_states();
        Ok(Self {
            mdp,
            threshold: config
                .stopping_rule
                .threshold(config.epsilon, mdp.discount()),
            max_iterations: config.max_iterations,
            values: vec![config.initial_value; n],
            scratch: vec![config.initial_value; n],
            iterations: 0,
            delta: f64::INFINITY,
        })
    }

    /// Applies the Bellman-optimality operator once to every state and returns
    /// the largest absolute change.
    pub fn sweep(&mut self) -> f64 {
        let gamma = self.mdp.discount();
        let mut delta = 0.0_f64;
        for (s, updated) in self.scratch.iter_mut().enumerate() {
            let old = self.values[s];
            let new = best_action(self.mdp, &self.values, s, gamma).map_or(old, |(_, q)| q);
            delta = delta.max((new - old).abs());
            *updated = new;
        }
        mem::swap(&mut self.values, &mut self.scratch);

        self.iterations += 1;
        self.delta = delta;
        trace!("sweep {}: delta = {:e}", self.iterations, delta);
        delta
    }

    /// Sweeps until convergence or until the sweep budget runs out.
    pub fn run(&mut self) -> Termination {
        self.run_while(|_, _| true)
    }

    /// Like [`ValueIteration::run`], but calls `keep_going(iterations, delta)`
    /// after every sweep that neither converged nor exhausted the budget, and
    /// stops with [`Termination::Stopped`] when it returns `false`.
    pub fn run_while<F>(&mut self, mut keep_going: F) -> Termination
    where
        F: FnMut(usize, f64) -> bool,
    {
        loop {
            if self.iterations >= self.max_iterations {
                warn!(
                    "value iteration did not converge within {} sweeps (delta = {:e})",
                    self.max_iterations, self.delta
                );
                return Termination::MaxIterations;
            }

            let delta = self.sweep();
            if delta < self.threshold {
                debug!(
                    "value iteration converged after {} sweeps (delta = {:e})",
                    self.iterations, delta
                );
                return Termination::Converged;
            }
            if self.iterations < self.max_iterations && !keep_going(self.iterations, delta) {
                return Termination::Stopped;
            }
        }
    }

    /// Current estimate in state declaration order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value_function(&self) -> ValueFunction<S> {
        ValueFunction::from_dense(self.mdp, &self.values)
    }

    /// Number of sweeps performed so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Largest change of the last sweep; infinite before the first one.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

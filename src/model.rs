//! This module provides the Markov Decision Process model: a finite set of
//! states, a finite set of actions, transition probabilities, rewards and a
//! discount factor.
//!
//! The model is validated once at construction and is immutable afterwards, so
//! a single instance can be shared by any number of concurrent solves.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use approx::abs_diff_eq;

use crate::error::{Error, Result};

/// Allowed deviation from 1.0 for the probabilities of one (state, action) pair.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Composite `(state, action, next_state)` key of the transition and reward tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransitionKey<S, A> {
    pub state: S,
    pub action: A,
    pub next: S,
}

impl<S, A> TransitionKey<S, A> {
    pub fn new(state: S, action: A, next: S) -> Self {
        Self {
            state,
            action,
            next,
        }
    }
}

impl<S, A> From<(S, A, S)> for TransitionKey<S, A> {
    fn from((state, action, next): (S, A, S)) -> Self {
        Self::new(state, action, next)
    }
}

/// `P(s, a, s')` keyed by [`TransitionKey`].
pub type TransitionTable<S, A> = HashMap<TransitionKey<S, A>, f64>;

/// `R(s, a, s')` keyed by [`TransitionKey`].
pub type RewardTable<S, A> = HashMap<TransitionKey<S, A>, f64>;

/// One possible successor of a (state, action) pair, in dense index form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Outcome {
    pub(crate) next: usize,
    pub(crate) probability: f64,
    pub(crate) reward: f64,
}

/// A finite Markov Decision Process `(S, A, P, R, gamma)`.
///
/// States and actions are opaque hashable tokens. Their declaration order is
/// kept and used everywhere an order matters: sweeps, tie-breaking between
/// equally good actions, and the rows of evaluation matrices.
///
/// A (state, action) pair is *available* when the transition table has at least
/// one entry for it. A state without available actions is absorbing.
#[derive(Debug, Clone)]
pub struct MarkovDecisionProcess<S, A> {
    states: Vec<S>,
    actions: Vec<A>,
    state_index: HashMap<S, usize>,
    action_index: HashMap<A, usize>,
    /// `outcomes[s][a]` sorted by successor declaration order; empty when `a` is
    /// not available in `s`.
    outcomes: Vec<Vec<Vec<Outcome>>>,
    discount: f64,
}

/// Short name for [`MarkovDecisionProcess`].
pub type Mdp<S, A> = MarkovDecisionProcess<S, A>;

impl<S, A> MarkovDecisionProcess<S, A>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    /// Builds and validates a model.
    ///
    /// `transitions` and `rewards` accept anything that iterates over
    /// `(key, value)` pairs where the key converts into a [`TransitionKey`],
    /// e.g. a `HashMap<(S, A, S), f64>` or an array of `((s, a, s'), value)`.
    /// A declared transition without a reward entry has reward 0.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if `discount` is not a finite value in `[0, 1]`.
    /// - [`Error::MalformedModel`] if a key references an undeclared state or
    ///   action, a state/action/key is declared twice, a reward has no matching
    ///   transition, or a reward is not finite.
    /// - [`Error::InvalidDistribution`] if the probabilities of an available
    ///   (state, action) pair do not sum to 1 within [`PROBABILITY_TOLERANCE`],
    ///   or one of them lies outside `[0, 1]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mdp::Mdp;
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
    /// assert_eq!(mdp.available_actions(&"low").count(), 2);
    /// assert_eq!(mdp.reward(&"high", &"spend", &"low"), Some(0.0));
    /// ```
    pub fn new<IS, IA, IP, IR, K>(
        states: IS,
        actions: IA,
        transitions: IP,
        rewards: IR,
        discount: f64,
    ) -> Result<Self>
    where
        IS: IntoIterator<Item = S>,
        IA: IntoIterator<Item = A>,
        IP: IntoIterator<Item = (K, f64)>,
        IR: IntoIterator<Item = (K, f64)>,
        K: Into<TransitionKey<S, A>>,
    {
        validate_discount(discount)?;

        let states: Vec<S> = states.into_iter().collect();
        let actions: Vec<A> = actions.into_iter().collect();
        let state_index = index_of("state", &states)?;
        let action_index = index_of("action", &actions)?;

        let resolve = |key: &TransitionKey<S, A>, table: &str| -> Result<(usize, usize, usize)> {
            let lookup_state = |s: &S| {
                state_index.get(s).copied().ok_or_else(|| {
                    Error::MalformedModel(format!(
                        "{table} entry {key:?} references undeclared state {s:?}"
                    ))
                })
            };
            let s = lookup_state(&key.state)?;
            let a = action_index.get(&key.action).copied().ok_or_else(|| {
                Error::MalformedModel(format!(
                    "{table} entry {key:?} references undeclared action {:?}",
                    key.action
                ))
            })?;
            let next = lookup_state(&key.next)?;
            Ok((s, a, next))
        };

        let mut probabilities: HashMap<(usize, usize, usize), f64> = HashMap::new();
        for (key, probability) in transitions {
            let key: TransitionKey<S, A> = key.into();
            let dense = resolve(&key, "transition")?;
            if probabilities.insert(dense, probability).is_some() {
                return Err(Error::MalformedModel(format!(
                    "transition {key:?} is declared more than once"
                )));
            }
        }

        let mut reward_of: HashMap<(usize, usize, usize), f64> = HashMap::new();
        for (key, reward) in rewards {
            let key: TransitionKey<S, A> = key.into();
            let dense = resolve(&key, "reward")?;
            if !probabilities.contains_key(&dense) {
                return Err(Error::MalformedModel(format!(
                    "reward {key:?} has no matching transition"
                )));
            }
            if !reward.is_finite() {
                return Err(Error::MalformedModel(format!(
                    "reward {key:?} is not finite: {reward}"
                )));
            }
            if reward_of.insert(dense, reward).is_some() {
                return Err(Error::MalformedModel(format!(
                    "reward {key:?} is declared more than once"
                )));
            }
        }

        let mut outcomes = vec![vec![Vec::new(); actions.len()]; states.len()];
        for (&(s, a, next), &probability) in &probabilities {
            let reward = reward_of.get(&(s, a, next)).copied().unwrap_or(0.0);
            outcomes[s][a].push(Outcome {
                next,
                probability,
                reward,
            });
        }

        // Fixed successor order keeps every sum reproducible across runs.
        for (s, row) in outcomes.iter_mut().enumerate() {
            for (a, successors) in row.iter_mut().enumerate() {
                if successors.is_empty() {
                    continue;
                }
                successors.sort_by_key(|o| o.next);
                check_distribution(successors).map_err(|sum| Error::InvalidDistribution {
                    state: format!("{:?}", states[s]),
                    action: format!("{:?}", actions[a]),
                    sum,
                })?;
            }
        }

        Ok(Self {
            states,
            actions,
            state_index,
            action_index,
            outcomes,
            discount,
        })
    }

    /// Returns a copy of this model with a different discount factor.
    pub fn with_discount(&self, discount: f64) -> Result<Self> {
        validate_discount(discount)?;
        Ok(Self {
            discount,
            ..self.clone()
        })
    }

    /// Declared states, in declaration order.
    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// Declared actions, in declaration order.
    pub fn actions(&self) -> &[A] {
        &self.actions
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn contains_state(&self, state: &S) -> bool {
        self.state_index.contains_key(state)
    }

    /// Actions with at least one transition out of `state`, in declaration order.
    ///
    /// Yields nothing for absorbing states and for states the model does not know.
    pub fn available_actions<'a>(&'a self, state: &S) -> impl Iterator<Item = &'a A> + 'a {
        self.state_index
            .get(state)
            .into_iter()
            .flat_map(move |&s| self.available(s))
            .map(move |a| &self.actions[a])
    }

    /// Whether `state` is declared and has no available action.
    pub fn is_absorbing(&self, state: &S) -> bool {
        self.state_index
            .get(state)
            .is_some_and(|&s| self.available(s).next().is_none())
    }

    /// `(next_state, probability, reward)` for every successor of `(state, action)`.
    ///
    /// Empty when the pair is not available.
    pub fn successors<'a>(
        &'a self,
        state: &S,
        action: &A,
    ) -> impl Iterator<Item = (&'a S, f64, f64)> + 'a {
        self.lookup(state, action)
            .into_iter()
            .flat_map(move |(s, a)| self.outcomes(s, a))
            .map(move |o| (&self.states[o.next], o.probability, o.reward))
    }

    /// States reachable in one step from `state` under `action`, in declaration order.
    pub fn successor_states<'a>(
        &'a self,
        state: &S,
        action: &A,
    ) -> impl Iterator<Item = &'a S> + 'a {
        self.successors(state, action).map(|(next, _, _)| next)
    }

    /// `P(next | state, action)`, or `None` if the transition is not in the table.
    pub fn probability(&self, state: &S, action: &A, next: &S) -> Option<f64> {
        self.outcome(state, action, next).map(|o| o.probability)
    }

    /// `R(state, action, next)`, or `None` if the transition is not in the table.
    pub fn reward(&self, state: &S, action: &A, next: &S) -> Option<f64> {
        self.outcome(state, action, next).map(|o| o.reward)
    }

    pub(crate) fn state_index(&self, state: &S) -> Option<usize> {
        self.state_index.get(state).copied()
    }

    pub(crate) fn action_index(&self, action: &A) -> Option<usize> {
        self.action_index.get(action).copied()
    }

    pub(crate) fn outcomes(&self, s: usize, a: usize) -> &[Outcome] {
        &self.outcomes[s][a]
    }

    /// Indices of the actions available in state `s`.
    pub(crate) fn available(&self, s: usize) -> impl Iterator<Item = usize> + '_ {
        self.outcomes[s]
            .iter()
            .enumerate()
            .filter(|(_, successors)| !successors.is_empty())
            .map(|(a, _)| a)
    }

    fn lookup(&self, state: &S, action: &A) -> Option<(usize, usize)> {
        Some((self.state_index(state)?, self.action_index(action)?))
    }

    fn outcome(&self, state: &S, action: &A, next: &S) -> Option<&Outcome> {
        let (s, a) = self.lookup(state, action)?;
        let next = self.state_index(next)?;
        self.outcomes(s, a).iter().find(|o| o.next == next)
    }
}

fn validate_discount(discount: f64) -> Result<()> {
    if discount.is_finite() && (0.0..=1.0).contains(&discount) {
        Ok(())
    } else {
        Err(Error::parameter(
            "discount",
            format!("must lie in [0, 1], got {discount}"),
        ))
    }
}

fn index_of<T>(kind: &str, items: &[T]) -> Result<HashMap<T, usize>>
where
    T: Clone + Eq + Hash + Debug,
{
    let mut index = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if index.insert(item.clone(), i).is_some() {
            return Err(Error::MalformedModel(format!(
                "{kind} {item:?} is declared more than once"
            )));
        }
    }
    Ok(index)
}

/// Returns the offending sum when the outcomes are not a probability distribution.
fn check_distribution(successors: &[Outcome]) -> std::result::Result<(), f64> {
    let sum: f64 = successors.iter().map(|o| o.probability).sum();
    let in_range = successors
        .iter()
        .all(|o| o.probability.is_finite() && (0.0..=1.0).contains(&o.probability));
    if in_range && abs_diff_eq!(sum, 1.0, epsilon = PROBABILITY_TOLERANCE) {
        Ok(())
    } else {
        Err(sum)
    }
}

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{Error, Result};
use crate::model::MarkovDecisionProcess;
use crate::solver::ValueFunction;

/// Deterministic policy: the action chosen in each state.
///
/// States without an entry have no defined action, which is how absorbing
/// states appear in extracted policies.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy<S, A>
where
    S: Eq + Hash,
{
    actions: HashMap<S, A>,
}

impl<S, A> Policy<S, A>
where
    S: Eq + Hash,
{
    pub fn get(&self, state: &S) -> Option<&A> {
        self.actions.get(state)
    }

    pub fn contains(&self, state: &S) -> bool {
        self.actions.contains_key(state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&S, &A)> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn into_inner(self) -> HashMap<S, A> {
        self.actions
    }

    /// The chosen action index of every state, in declaration order.
    ///
    /// Fails unless every state with available actions has one of them, and
    /// every entry names a declared state.
    pub(crate) fn to_dense(&self, mdp: &MarkovDecisionProcess<S, A>) -> Result<Vec<Option<usize>>>
    where
        S: Clone + Debug,
        A: Clone + Eq + Hash + Debug,
    {
        let mut chosen = Vec::with_capacity(mdp.num_states());
        for (s, state) in mdp.states().iter().enumerate() {
            let action = match self.get(state) {
                Some(action) => action,
                None if mdp.available(s).next().is_none() => {
                    chosen.push(None);
                    continue;
                }
                None => {
                    return Err(Error::InvalidPolicy(format!(
                        "no action for non-absorbing state {state:?}"
                    )));
                }
            };
            let a = mdp
                .action_index(action)
                .filter(|&a| !mdp.outcomes(s, a).is_empty())
                .ok_or_else(|| {
                    Error::InvalidPolicy(format!(
                        "action {action:?} is not available in state {state:?}"
                    ))
                })?;
            chosen.push(Some(a));
        }

        let assigned = chosen.iter().filter(|a| a.is_some()).count();
        if assigned != self.len() {
            return Err(Error::InvalidPolicy(
                "policy assigns actions to undeclared states".to_string(),
            ));
        }
        Ok(chosen)
    }
}

impl<S, A> FromIterator<(S, A)> for Policy<S, A>
where
    S: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (S, A)>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

impl<S, A> From<HashMap<S, A>> for Policy<S, A>
where
    S: Eq + Hash,
{
    fn from(actions: HashMap<S, A>) -> Self {
        Self { actions }
    }
}

/// Reads the greedy policy out of a value function.
///
/// Each state with available actions gets the action maximising
/// `sum_s' P(s, a, s') * (R(s, a, s') + gamma * V(s'))`. Ties go to the action
/// declared first, so repeated extraction always returns the same policy.
/// Absorbing states get no entry.
///
/// # Errors
///
/// [`Error::InvalidParameter`] if `values` lacks a declared state.
pub fn extract_policy<S, A>(
    mdp: &MarkovDecisionProcess<S, A>,
    values: &ValueFunction<S>,
) -> Result<Policy<S, A>>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    let values = values.to_dense(mdp)?;
    Ok(greedy_policy(mdp, &values))
}

/// One-step lookahead value of taking `action` in `state`.
///
/// Returns `None` when the action is not available in the state or `values`
/// lacks one of the states involved.
pub fn q_value<S, A>(
    mdp: &MarkovDecisionProcess<S, A>,
    values: &ValueFunction<S>,
    state: &S,
    action: &A,
) -> Option<f64>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    let mut q = 0.0;
    let mut available = false;
    for (next, probability, reward) in mdp.successors(state, action) {
        q += probability * (reward + mdp.discount() * values.get(next)?);
        available = true;
    }
    available.then_some(q)
}

pub(crate) fn greedy_policy<S, A>(mdp: &MarkovDecisionProcess<S, A>, values: &[f64]) -> Policy<S, A>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    let gamma = mdp.discount();
    (0..mdp.num_states())
        .filter_map(|s| {
            best_action(mdp, values, s, gamma)
                .map(|(a, _)| (mdp.states()[s].clone(), mdp.actions()[a].clone()))
        })
        .collect()
}

/// Compute Q(s, a) = sum_{s'} P(s'|s,a) [ R(s,a,s') + gamma * V(s') ].
pub(crate) fn action_value<S, A>(
    mdp: &MarkovDecisionProcess<S, A>,
    values: &[f64],
    s: usize,
    a: usize,
    gamma: f64,
) -> f64
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    let mut q = 0.0;
    for outcome in mdp.outcomes(s, a) {
        q += outcome.probability * (outcome.reward + gamma * values[outcome.next]);
    }
    q
}

/// The best available action of state `s` and its Q-value, or `None` for an
/// absorbing state. Only a strictly larger Q-value displaces the incumbent, so
/// ties keep the earliest declared action.
pub(crate) fn best_action<S, A>(
    mdp: &MarkovDecisionProcess<S, A>,
    values: &[f64],
    s: usize,
    gamma: f64,
) -> Option<(usize, f64)>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    let mut best: Option<(usize, f64)> = None;
    for a in mdp.available(s) {
        let q = action_value(mdp, values, s, a, gamma);
        if best.map_or(true, |(_, best_q)| q > best_q) {
            best = Some((a, q));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mdp;
    use approx::assert_abs_diff_eq;

    fn tied() -> Mdp<&'static str, &'static str> {
        // Both actions of "b" have identical outcomes.
        Mdp::new(
            ["a", "b"],
            ["left", "right"],
            [
                (("a", "left", "b"), 1.0),
                (("b", "left", "a"), 1.0),
                (("b", "right", "a"), 1.0),
            ],
            [(("b", "left", "a"), 1.0), (("b", "right", "a"), 1.0)],
            0.9,
        )
        .unwrap()
    }

    #[test]
    fn test_ties_go_to_first_declared_action() {
        let mdp = tied();
        let values: ValueFunction<_> = [("a", 3.0), ("b", 1.0)].into_iter().collect();
        let policy = extract_policy(&mdp, &values).unwrap();
        assert_eq!(policy.get(&"b"), Some(&"left"));
        assert_eq!(policy.get(&"a"), Some(&"left"));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let mdp = tied();
        let values: ValueFunction<_> = [("a", 3.0), ("b", 1.0)].into_iter().collect();
        let first = extract_policy(&mdp, &values).unwrap();
        let second = extract_policy(&mdp, &values).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_absorbing_states_have_no_action() {
        let mdp = Mdp::new(
            ["start", "end"],
            ["go", "wait"],
            [(("start", "go", "end"), 1.0), (("start", "wait", "start"), 1.0)],
            [(("start", "go", "end"), 5.0)],
            0.9,
        )
        .unwrap();
        let values: ValueFunction<_> = [("start", 0.0), ("end", 0.0)].into_iter().collect();
        let policy = extract_policy(&mdp, &values).unwrap();

        assert_eq!(policy.len(), 1);
        assert_eq!(policy.get(&"start"), Some(&"go"));
        assert!(!policy.contains(&"end"));
    }

    #[test]
    fn test_missing_value_is_an_error() {
        let mdp = tied();
        let values: ValueFunction<_> = [("a", 3.0)].into_iter().collect();
        assert!(matches!(
            extract_policy(&mdp, &values),
            Err(Error::InvalidParameter { name: "values", .. })
        ));
    }

    #[test]
    fn test_q_value() {
        let mdp = Mdp::new(
            ["s1", "s2"],
            ["a1", "a2"],
            [
                (("s1", "a1", "s1"), 0.9),
                (("s1", "a1", "s2"), 0.1),
                (("s2", "a2", "s1"), 1.0),
            ],
            [(("s1", "a1", "s1"), 20.0)],
            0.5,
        )
        .unwrap();
        let values: ValueFunction<_> = [("s1", 10.0), ("s2", 4.0)].into_iter().collect();

        // 0.9 * (20 + 0.5 * 10) + 0.1 * (0 + 0.5 * 4)
        assert_abs_diff_eq!(
            q_value(&mdp, &values, &"s1", &"a1").unwrap(),
            22.7,
            epsilon = 1e-12
        );
        assert_eq!(q_value(&mdp, &values, &"s1", &"a2"), None);
        assert_eq!(q_value(&mdp, &values, &"s3", &"a1"), None);
    }

    #[test]
    fn test_policy_to_dense_validation() {
        let mdp = tied();

        let policy: Policy<_, _> = [("a", "left"), ("b", "right")].into_iter().collect();
        assert_eq!(policy.to_dense(&mdp).unwrap(), vec![Some(0), Some(1)]);

        let missing: Policy<_, _> = [("b", "right")].into_iter().collect();
        assert!(matches!(missing.to_dense(&mdp), Err(Error::InvalidPolicy(_))));

        let unavailable: Policy<_, _> = [("a", "right"), ("b", "left")].into_iter().collect();
        assert!(matches!(
            unavailable.to_dense(&mdp),
            Err(Error::InvalidPolicy(_))
        ));

        let extra: Policy<_, _> = [("a", "left"), ("b", "left"), ("z", "left")]
            .into_iter()
            .collect();
        assert!(matches!(extra.to_dense(&mdp), Err(Error::InvalidPolicy(_))));
    }
}

pub mod error;
pub mod model;
pub mod solver;

pub use error::{Error, Result};
pub use model::{
    MarkovDecisionProcess, Mdp, RewardTable, TransitionKey, TransitionTable, PROBABILITY_TOLERANCE,
};
pub use solver::{
    evaluate_policy, expected_rewards, extract_policy, q_value, solve, transition_matrix, Policy,
    Solution, SolverConfig, StoppingRule, Termination, ValueFunction, ValueIteration,
};

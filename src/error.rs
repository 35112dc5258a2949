use thiserror::Error;

/// Errors raised while building a model, configuring a solve or evaluating a policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A table references an undeclared state or action, or the declarations
    /// themselves are inconsistent.
    #[error("malformed model: {0}")]
    MalformedModel(String),

    /// The successor probabilities of a (state, action) pair do not form a distribution.
    #[error("transition probabilities for state {state}, action {action} do not form a distribution (sum {sum})")]
    InvalidDistribution {
        state: String,
        action: String,
        sum: f64,
    },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// `I - gamma * P` has no inverse, so the policy has no finite value.
    #[error("policy evaluation system is singular")]
    SingularSystem,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid rule configuration: {0}")]
    InvalidRuleConfig(String),

    #[error("Rule evaluation failed: {0}")]
    RuleEvaluation(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Plan construction failed: {0}")]
    PlanConstruction(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
}

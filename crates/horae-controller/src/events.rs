//! Event reason constants surfaced in conditions and log fields

pub const EVALUATION_STARTED: &str = "EvaluationStarted";
pub const EVALUATION_STOPPED: &str = "EvaluationStopped";
pub const READY_FOR_EVALUATION: &str = "ReadyForEvaluation";
pub const CHECK_FAILED: &str = "UsageTemplateCheckFailed";
pub const DELETED: &str = "UsageTemplateDeleted";

use serde::{Deserialize, Serialize};

/// Successful result delivered by a supervised step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum StepValue {
    /// The task succeeded and nothing was requested back.
    Empty,
    /// Exit code, reported because the step asked for it.
    ExitCode(i32),
    /// Captured stdout, already decoded.
    Output(String),
}

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(feature = "schema")]
use schemars::JsonSchema;

/// Identifier assigned by the scheduler to an accepted work item.
///
/// `0` means "not submitted yet"; schedulers never hand out that value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(transparent)]
pub struct SubmissionId(u64);

impl SubmissionId {
    /// Placeholder for a record that has not been submitted.
    pub const NONE: SubmissionId = SubmissionId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for SubmissionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

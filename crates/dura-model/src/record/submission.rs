use serde::{Deserialize, Serialize};

use crate::{
    SubmissionId,
    error::{ModelError, ModelResult},
};

/// Restart-survivable identity of one slot-rehydration attempt.
///
/// `work_spec` never changes. `submission_id` starts at [`SubmissionId::NONE`] and is assigned
/// at most once; after that the scheduler is only ever queried, never resubmitted to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmission<W> {
    #[serde(default)]
    pub submission_id: SubmissionId,
    pub work_spec: W,
}

impl<W> PendingSubmission<W> {
    /// A record for work that has not been submitted yet.
    pub fn new(work_spec: W) -> Self {
        Self {
            submission_id: SubmissionId::NONE,
            work_spec,
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.submission_id.is_assigned()
    }

    /// Record the id handed out by the scheduler.
    ///
    /// Fails if an id is already recorded or `id` is the unassigned placeholder.
    pub fn assign(&mut self, id: SubmissionId) -> ModelResult<()> {
        if self.is_submitted() {
            return Err(ModelError::AlreadySubmitted(self.submission_id.get()));
        }
        if !id.is_assigned() {
            return Err(ModelError::Invalid("submission id 0 is reserved".into()));
        }
        self.submission_id = id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_assigned_at_most_once() {
        let mut rec = PendingSubmission::new("job-a".to_string());
        assert!(!rec.is_submitted());

        rec.assign(SubmissionId::new(7)).unwrap();
        assert!(rec.is_submitted());

        let err = rec.assign(SubmissionId::new(8)).unwrap_err();
        assert!(matches!(err, ModelError::AlreadySubmitted(7)));
        assert_eq!(rec.submission_id, SubmissionId::new(7));
    }

    #[test]
    fn placeholder_id_is_rejected() {
        let mut rec = PendingSubmission::new(());
        assert!(rec.assign(SubmissionId::NONE).is_err());
    }

    #[test]
    fn missing_id_deserializes_as_unsubmitted() {
        let rec: PendingSubmission<String> =
            serde_json::from_str(r#"{"workSpec": "job-a"}"#).unwrap();
        assert_eq!(rec.submission_id, SubmissionId::NONE);
    }
}

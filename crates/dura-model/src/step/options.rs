use serde::{Deserialize, Serialize};

use crate::{
    error::{ModelError, ModelResult},
    step::TextEncoding,
};

/// Per-step output handling, fixed at launch and persisted with the record.
///
/// - `capture_output`: keep the task's stdout apart from its log and return it on success;
/// - `output_encoding`: charset used to decode captured output;
/// - `report_exit_code`: return the exit code as the result instead of failing on non-zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepOptions {
    pub capture_output: bool,
    pub output_encoding: String,
    pub report_exit_code: bool,
}

impl StepOptions {
    /// Options that return captured stdout decoded with `encoding`.
    pub fn capture(encoding: impl Into<String>) -> Self {
        Self {
            capture_output: true,
            output_encoding: encoding.into(),
            report_exit_code: false,
        }
    }

    /// Options that return the exit code, whatever its value.
    pub fn exit_code() -> Self {
        Self {
            report_exit_code: true,
            ..Self::default()
        }
    }

    /// Parsed [`TextEncoding`] for `output_encoding`.
    pub fn encoding(&self) -> ModelResult<TextEncoding> {
        self.output_encoding.parse()
    }

    /// Rules:
    /// - output capture and exit-code reporting are mutually exclusive;
    /// - `output_encoding` names a supported charset.
    pub fn validate(&self) -> ModelResult<()> {
        if self.capture_output && self.report_exit_code {
            return Err(ModelError::ConflictingOptions(
                "captureOutput and reportExitCode cannot both be set".into(),
            ));
        }
        self.encoding().map(|_| ())
    }

    /// Non-fatal remarks about the options.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        let default = TextEncoding::default();
        if !self.capture_output
            && self.encoding().map(|e| e != default).unwrap_or(true)
        {
            out.push(format!(
                "encoding {} is ignored unless output capture is enabled",
                self.output_encoding
            ));
        }
        out
    }
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            capture_output: false,
            output_encoding: TextEncoding::default().as_str().to_string(),
            report_exit_code: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid_and_quiet() {
        let opts = StepOptions::default();
        assert!(opts.validate().is_ok());
        assert!(opts.warnings().is_empty());
        assert_eq!(opts.output_encoding, "UTF-8");
    }

    #[test]
    fn capture_and_exit_code_conflict() {
        let opts = StepOptions {
            report_exit_code: true,
            ..StepOptions::capture("UTF-8")
        };
        assert!(matches!(
            opts.validate(),
            Err(ModelError::ConflictingOptions(_))
        ));
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let opts = StepOptions::capture("klingon");
        assert!(matches!(opts.validate(), Err(ModelError::UnknownEncoding(_))));
    }

    #[test]
    fn warns_about_ignored_encoding() {
        let opts = StepOptions {
            output_encoding: "ISO-8859-1".into(),
            ..StepOptions::default()
        };
        assert!(opts.validate().is_ok());
        assert_eq!(opts.warnings().len(), 1);
        assert!(StepOptions::capture("ISO-8859-1").warnings().is_empty());
    }
}

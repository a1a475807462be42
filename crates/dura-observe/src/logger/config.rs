use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use super::{
    error::{LoggerError, LoggerResult},
    object::{LoggerFormat, LoggerLevel, LoggerTimeZone},
};

/// Overrides [`LoggerConfig::format`].
pub const ENV_FORMAT: &str = "DURA_LOG_FORMAT";
/// Overrides [`LoggerConfig::level`].
pub const ENV_LEVEL: &str = "DURA_LOG_LEVEL";
/// Overrides [`LoggerConfig::tz`].
pub const ENV_TZ: &str = "DURA_LOG_TZ";

/// Logger configuration.
///
/// Every field has a default, so a partial JSON object (or `{}`) is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerConfig {
    /// Output format.
    pub format: LoggerFormat,
    /// `EnvFilter` expression, e.g. `"info"` or `"dura_exec=debug,info"`.
    pub level: LoggerLevel,
    /// Timezone of the RFC3339 timestamps.
    pub tz: LoggerTimeZone,
    /// Include the event target (module path) in each line.
    pub with_targets: bool,
    /// Colored output; honoured only when stdout is a terminal.
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::default(),
            level: LoggerLevel::default(),
            tz: LoggerTimeZone::default(),
            with_targets: true,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    /// Defaults overlaid with `DURA_LOG_FORMAT`, `DURA_LOG_LEVEL` and `DURA_LOG_TZ`.
    pub fn from_env() -> LoggerResult<Self> {
        Self::default().overlay(|var| std::env::var(var).ok())
    }

    /// Applies the `DURA_LOG_*` variables found by `lookup` on top of `self`.
    ///
    /// Empty values are ignored. An unparsable value is an error naming the variable.
    pub fn overlay<F>(mut self, lookup: F) -> LoggerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_FORMAT) {
            self.format = v.parse().map_err(env_error(ENV_FORMAT))?;
        }
        if let Some(v) = get(ENV_LEVEL) {
            self.level = v.parse().map_err(env_error(ENV_LEVEL))?;
        }
        if let Some(v) = get(ENV_TZ) {
            self.tz = v.parse().map_err(env_error(ENV_TZ))?;
        }
        Ok(self)
    }

    /// True when `use_color` is set and stdout is a terminal.
    ///
    /// Evaluated at install time, not at parse time.
    pub fn should_use_color(&self) -> bool {
        self.use_color && std::io::stdout().is_terminal()
    }
}

fn env_error(var: &'static str) -> impl Fn(LoggerError) -> LoggerError {
    move |source| LoggerError::Env {
        var,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = LoggerConfig::default();

        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.tz, LoggerTimeZone::Utc);
        assert_eq!(cfg.level.as_str(), "info");
        assert!(cfg.with_targets);
        assert!(cfg.use_color);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: LoggerConfig =
            serde_json::from_str(r#"{"format": "json", "withTargets": false}"#).unwrap();

        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level.as_str(), "info");
        assert!(!cfg.with_targets);
        assert!(cfg.use_color);
    }

    #[test]
    fn invalid_level_in_json_is_rejected() {
        let err = serde_json::from_str::<LoggerConfig>(r#"{"level": "dura_core=loud"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn env_overrides_defaults() {
        let cfg = LoggerConfig::default()
            .overlay(vars(&[
                (ENV_FORMAT, "JSON"),
                (ENV_LEVEL, "dura_exec=trace,warn"),
                (ENV_TZ, "local"),
            ]))
            .unwrap();

        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level.as_str(), "dura_exec=trace,warn");
        assert_eq!(cfg.tz, LoggerTimeZone::Local);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let base = LoggerConfig {
            format: LoggerFormat::Json,
            ..Default::default()
        };
        let cfg = base.overlay(vars(&[(ENV_FORMAT, "  "), (ENV_LEVEL, "")])).unwrap();

        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level.as_str(), "info");
    }

    #[test]
    fn bad_env_value_names_the_variable() {
        let err = LoggerConfig::default()
            .overlay(vars(&[(ENV_TZ, "pst")]))
            .unwrap_err();

        assert!(matches!(err, LoggerError::Env { var: ENV_TZ, .. }));
        assert!(err.to_string().starts_with("DURA_LOG_TZ: "));
    }
}

use std::{
    fmt,
    str::FromStr,
    sync::{OnceLock, RwLock},
};

use serde::{Deserialize, Serialize};
use time::UtcOffset;

use crate::logger::error::LoggerError;

static LOCAL_OFFSET: RwLock<Option<UtcOffset>> = RwLock::new(None);
static DETECTION_WARNED: OnceLock<()> = OnceLock::new();

/// Timezone used for log timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerTimeZone {
    #[default]
    Utc,
    /// System timezone, captured by [`init_local_offset`].
    Local,
}

impl FromStr for LoggerTimeZone {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            _ => Err(LoggerError::InvalidTimeZone(s.to_owned())),
        }
    }
}

impl fmt::Display for LoggerTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoggerTimeZone::Utc => "utc",
            LoggerTimeZone::Local => "local",
        })
    }
}

/// Captures the local UTC offset.
///
/// Must run in `main()` before any other thread exists: on most Unix platforms the offset
/// cannot be read soundly from a multi-threaded process. Returns the offset now in effect.
///
/// ```no_run
/// fn main() {
///     dura_observe::init_local_offset();
///     // build the tokio runtime afterwards
/// }
/// ```
pub fn init_local_offset() -> UtcOffset {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    if let Ok(mut guard) = LOCAL_OFFSET.write() {
        *guard = Some(offset);
    }
    offset
}

/// Offset captured by [`init_local_offset`], detected lazily otherwise.
///
/// Lazy detection usually fails once the runtime is up; UTC is used then and a single
/// warning goes to stderr (the subscriber itself cannot be used from here).
pub(crate) fn local_offset() -> UtcOffset {
    if let Some(offset) = LOCAL_OFFSET.read().ok().and_then(|g| *g) {
        return offset;
    }

    match UtcOffset::current_local_offset() {
        Ok(offset) => {
            if let Ok(mut guard) = LOCAL_OFFSET.write() {
                *guard = Some(offset);
            }
            offset
        }
        Err(_) => {
            DETECTION_WARNED.get_or_init(|| {
                eprintln!(
                    "dura-observe: local timezone detection failed; call init_local_offset() \
                     before starting the runtime. Falling back to UTC."
                );
            });
            UtcOffset::UTC
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("UTC".parse::<LoggerTimeZone>().unwrap(), LoggerTimeZone::Utc);
        assert_eq!(" Local".parse::<LoggerTimeZone>().unwrap(), LoggerTimeZone::Local);
        assert!(matches!(
            "pst".parse::<LoggerTimeZone>(),
            Err(LoggerError::InvalidTimeZone(_))
        ));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&LoggerTimeZone::Local).unwrap(), r#""local""#);
        let tz: LoggerTimeZone = serde_json::from_str(r#""utc""#).unwrap();
        assert_eq!(tz, LoggerTimeZone::Utc);
    }

    #[test]
    fn captured_offset_is_reused() {
        let captured = init_local_offset();
        assert_eq!(local_offset(), captured);
        assert!(captured.whole_hours().abs() <= 14);
    }
}

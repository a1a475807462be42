mod config;
mod error;
mod install;
mod object;

pub use config::{ENV_FORMAT, ENV_LEVEL, ENV_TZ, LoggerConfig};
pub use error::{LoggerError, LoggerResult};
pub use object::{LoggerFormat, LoggerLevel, LoggerTimeZone, init_local_offset};

/// Installs the global `tracing` subscriber described by `cfg`.
///
/// Every `tracing` macro in the dura crates goes through this subscriber afterwards. It can be
/// installed once per process; a second call returns [`LoggerError::AlreadyInitialized`].
///
/// With [`LoggerTimeZone::Local`], call [`init_local_offset`] from `main()` before the tokio
/// runtime starts its worker threads, otherwise timestamps fall back to UTC.
///
/// # Examples
/// ```no_run
/// use dura_observe::{LoggerConfig, init_logger};
///
/// let cfg = LoggerConfig::from_env().expect("valid DURA_LOG_* variables");
/// init_logger(&cfg).expect("logger installed once");
/// tracing::info!("logger ready");
/// ```
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    match cfg.format {
        LoggerFormat::Text => install::text(cfg),
        LoggerFormat::Json => install::json(cfg),
        LoggerFormat::Journald => install::journald(cfg),
    }
}

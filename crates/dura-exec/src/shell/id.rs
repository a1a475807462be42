use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Per-process sequence for control directory names.
static CONTROL_SEQ: AtomicU64 = AtomicU64::new(1);

/// Build a control directory id that stays unique across controller restarts.
///
/// Format: `{unix_secs:x}-{pid:x}-{seq:x}`.
pub(crate) fn make_control_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let seq = CONTROL_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{secs:x}-{pid:x}-{seq:x}", pid = std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_within_a_process() {
        let a = make_control_id();
        let b = make_control_id();
        assert_ne!(a, b);
        assert_eq!(a.split('-').count(), 3);
    }
}

//! Process-wide gateway counters.
//!
//! Plain relaxed atomics: both actors bump them without coordination and the
//! binary periodically logs a [`Snapshot`].
use std::sync::atomic::{AtomicU64, Ordering};

static LINES_READ: AtomicU64 = AtomicU64::new(0);
static LINES_WITHOUT_FRAME: AtomicU64 = AtomicU64::new(0);
static FRAMES_STORED: AtomicU64 = AtomicU64::new(0);
static FRAMES_FAILED: AtomicU64 = AtomicU64::new(0);
static DATAGRAMS_RECEIVED: AtomicU64 = AtomicU64::new(0);
static DATAGRAMS_IGNORED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_RELAYED: AtomicU64 = AtomicU64::new(0);
static RELAY_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn inc_lines_read() {
    LINES_READ.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_lines_without_frame() {
    LINES_WITHOUT_FRAME.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_frames_stored() {
    FRAMES_STORED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_frames_failed() {
    FRAMES_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_datagrams_received() {
    DATAGRAMS_RECEIVED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_datagrams_ignored() {
    DATAGRAMS_IGNORED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_commands_relayed() {
    COMMANDS_RELAYED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_relay_failures() {
    RELAY_FAILURES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub lines_read: u64,
    pub lines_without_frame: u64,
    pub frames_stored: u64,
    pub frames_failed: u64,
    pub datagrams_received: u64,
    pub datagrams_ignored: u64,
    pub commands_relayed: u64,
    pub relay_failures: u64,
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lines={} noframe={} stored={} failed={} | udp rx={} ignored={} relayed={} relay_err={}",
            self.lines_read,
            self.lines_without_frame,
            self.frames_stored,
            self.frames_failed,
            self.datagrams_received,
            self.datagrams_ignored,
            self.commands_relayed,
            self.relay_failures
        )
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        lines_read: LINES_READ.load(Ordering::Relaxed),
        lines_without_frame: LINES_WITHOUT_FRAME.load(Ordering::Relaxed),
        frames_stored: FRAMES_STORED.load(Ordering::Relaxed),
        frames_failed: FRAMES_FAILED.load(Ordering::Relaxed),
        datagrams_received: DATAGRAMS_RECEIVED.load(Ordering::Relaxed),
        datagrams_ignored: DATAGRAMS_IGNORED.load(Ordering::Relaxed),
        commands_relayed: COMMANDS_RELAYED.load(Ordering::Relaxed),
        relay_failures: RELAY_FAILURES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are global and other tests bump them concurrently, so only
    // monotonic growth is asserted.
    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        inc_frames_stored();
        inc_commands_relayed();
        inc_datagrams_ignored();
        let after = snapshot();
        assert!(after.frames_stored > before.frames_stored);
        assert!(after.commands_relayed > before.commands_relayed);
        assert!(after.datagrams_ignored > before.datagrams_ignored);
    }

    #[test]
    fn snapshot_display_is_single_line() {
        let text = Snapshot::default().to_string();
        assert!(!text.contains('\n'));
        assert!(text.starts_with("lines=0"));
    }
}

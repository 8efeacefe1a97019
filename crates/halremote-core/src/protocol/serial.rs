//! Update-serial tracking for status streams.
//!
//! # What is an update serial? (for beginners)
//!
//! Every status message (full or incremental) published for a component
//! carries a monotonically increasing integer called the *update serial*.
//! Serials exist to make message loss visible: the update channel delivers
//! messages in order but a slow subscriber or a reconnect can drop some.
//! If a client holding serial 7 receives serial 9, update 8 was lost and the
//! client's pin mirror can no longer be trusted — it must resynchronize from
//! a fresh full snapshot rather than silently apply the partial state.
//!
//! The authority keeps one plain counter per component (stamped on the
//! outgoing message, then incremented).  The client side uses the
//! [`SerialTracker`] below, which distinguishes *seeding* (a full update
//! re-bases the tracker unconditionally) from *observing* (an incremental
//! update must be exactly the previous serial + 1).

use tracing::warn;

/// Result of checking an incremental update's serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialCheck {
    /// The serial is exactly the previous one + 1 (or the tracker was
    /// unseeded, in which case the stream position is simply adopted).
    Synced,
    /// One or more updates were lost; the mirror must resynchronize.
    Gap { expected: u64, got: u64 },
}

/// Client-side tracker for the per-component update serial.
#[derive(Debug, Default)]
pub struct SerialTracker {
    last: Option<u64>,
}

impl SerialTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the serial of a full update, re-basing the tracker.
    ///
    /// A full snapshot is self-contained, so whatever serial it carries
    /// becomes the new reference point.
    pub fn seed(&mut self, serial: u64) {
        self.last = Some(serial);
    }

    /// Checks an incremental update's serial against the expected value and
    /// records it.
    ///
    /// Returns [`SerialCheck::Gap`] when at least one update was lost.  The
    /// received serial is recorded either way (mirroring what the stream
    /// actually delivered), but on a gap the caller must not apply the
    /// message contents — it must trigger a resync instead.
    pub fn observe(&mut self, serial: u64) -> SerialCheck {
        let check = match self.last {
            Some(last) if serial == last.wrapping_add(1) => SerialCheck::Synced,
            Some(last) => {
                let expected = last.wrapping_add(1);
                warn!(expected, got = serial, "lost update detected");
                SerialCheck::Gap {
                    expected,
                    got: serial,
                }
            }
            // Unseeded: an incremental before any full update.  Adopt the
            // position; the caller decides whether it may apply (a mirror
            // without a snapshot has nothing to apply deltas to).
            None => SerialCheck::Synced,
        };
        self.last = Some(serial);
        check
    }

    /// The most recently recorded serial, if any.
    pub fn last(&self) -> Option<u64> {
        self.last
    }

    /// Forgets the stream position, e.g. after an unsubscribe.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

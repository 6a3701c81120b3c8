//! Go-Back-N send-side state machine.
//!
//! [`SendWindow`] maintains a sliding window of up to `window_size` in-flight
//! frames, keyed by their per-transfer frame index.
//!
//! # Protocol contract
//!
//! - At most `window_size` frames may be in flight at once
//!   (`next − base ≤ window_size`).
//! - ACKs are **cumulative**: ACK `k` means the receiver has accepted every
//!   frame with sequence ≤ `k`, so all of those slots are released at once
//!   and `base` becomes `k + 1`.
//! - On timeout the caller retransmits **every** buffered frame from `base`
//!   onwards (go back N — there is no per-frame selective retransmit).
//! - The retry counter resets whenever an ACK advances `base`; exceeding
//!   `max_retries` consecutive fruitless timeouts is a connection-reset
//!   condition for the transfer.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility ([`crate::message`] and [`crate::stream`] drive the loops).

use std::collections::BTreeMap;

/// Send-side window state for one transfer.
///
/// ```text
///    base              next
///      │                 │
///  ────┼─────────────────┼──────────────────▶ frame index
///      │ <── in flight ─▶│ <── not yet sent
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Oldest unacknowledged frame index (left window edge).
    base: u32,
    /// Frame index to assign to the next new frame.
    next: u32,
    /// Buffered payloads of every in-flight frame, ordered by index.
    unacked: BTreeMap<u32, Vec<u8>>,
    /// Consecutive fruitless timeout rounds since the last window advance.
    retries: u32,
    window_size: u32,
    max_retries: u32,
}

impl SendWindow {
    /// Create an empty window starting at frame index 0.
    pub fn new(window_size: u32, max_retries: u32) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: 0,
            next: 0,
            unacked: BTreeMap::new(),
            retries: 0,
            window_size,
            max_retries,
        }
    }

    /// Left window edge: the oldest frame still awaiting acknowledgement.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Index the next [`record_sent`](Self::record_sent) will assign.
    pub fn next_seq(&self) -> u32 {
        self.next
    }

    /// `true` when there is room for at least one more in-flight frame.
    pub fn has_capacity(&self) -> bool {
        self.next - self.base < self.window_size
    }

    /// Number of frames currently awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.unacked.len()
    }

    /// `true` when every transmitted frame has been acknowledged.
    pub fn is_empty(&self) -> bool {
        self.unacked.is_empty()
    }

    /// Buffer a just-transmitted payload and advance `next`.  Returns the
    /// frame index that was assigned.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is already full.  Check
    /// [`has_capacity`](Self::has_capacity) before calling.
    pub fn record_sent(&mut self, payload: Vec<u8>) -> u32 {
        debug_assert!(
            self.has_capacity(),
            "record_sent on a full window ({} / {})",
            self.in_flight(),
            self.window_size
        );
        let seq = self.next;
        self.unacked.insert(seq, payload);
        self.next += 1;
        seq
    }

    /// Process a cumulative ACK carrying the highest accepted frame index.
    ///
    /// Releases every buffered frame with sequence ≤ `ack`, advances `base`
    /// to `ack + 1`, and resets the retry counter.  Returns the number of
    /// slots released; a duplicate (`ack < base`) or spurious
    /// (`ack ≥ next`) ACK releases nothing.
    pub fn on_ack(&mut self, ack: u32) -> usize {
        if ack < self.base || ack >= self.next {
            return 0;
        }
        let released = self.unacked.len();
        self.unacked = self.unacked.split_off(&(ack + 1));
        let released = released - self.unacked.len();
        self.base = ack + 1;
        self.retries = 0;
        released
    }

    /// Record one fruitless ACK wait.
    ///
    /// Returns `true` when the retry budget is exhausted and the transfer
    /// must fail with a reset; otherwise the caller retransmits the whole
    /// outstanding window (see [`outstanding`](Self::outstanding)).
    pub fn on_timeout(&mut self) -> bool {
        self.retries += 1;
        self.retries > self.max_retries
    }

    /// Iterate over every in-flight frame from oldest to newest, for the
    /// go-back-N retransmission pass.
    pub fn outstanding(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.unacked.iter().map(|(seq, p)| (*seq, p.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let w = SendWindow::new(4, 3);
        assert_eq!(w.base(), 0);
        assert_eq!(w.next_seq(), 0);
        assert!(w.has_capacity());
        assert!(w.is_empty());
    }

    #[test]
    fn record_sent_assigns_consecutive_indices() {
        let mut w = SendWindow::new(4, 3);
        assert_eq!(w.record_sent(b"a".to_vec()), 0);
        assert_eq!(w.record_sent(b"b".to_vec()), 1);
        assert_eq!(w.next_seq(), 2);
        assert_eq!(w.base(), 0); // nothing acked yet
        assert_eq!(w.in_flight(), 2);
    }

    #[test]
    fn window_full_blocks_send() {
        let mut w = SendWindow::new(2, 3);
        w.record_sent(vec![0]);
        w.record_sent(vec![1]);
        assert!(!w.has_capacity());
    }

    #[test]
    fn cumulative_ack_releases_all_covered_slots_and_only_those() {
        let mut w = SendWindow::new(8, 3);
        for i in 0..5u8 {
            w.record_sent(vec![i]);
        }
        // ACK 2 covers frames 0, 1, 2 — exactly three slots.
        assert_eq!(w.on_ack(2), 3);
        assert_eq!(w.base(), 3);
        assert_eq!(w.in_flight(), 2);
        let left: Vec<u32> = w.outstanding().map(|(s, _)| s).collect();
        assert_eq!(left, vec![3, 4]);
    }

    #[test]
    fn duplicate_ack_releases_nothing() {
        let mut w = SendWindow::new(4, 3);
        w.record_sent(vec![0]);
        w.record_sent(vec![1]);
        assert_eq!(w.on_ack(0), 1);
        assert_eq!(w.on_ack(0), 0); // duplicate
        assert_eq!(w.base(), 1);
    }

    #[test]
    fn spurious_ack_beyond_next_ignored() {
        let mut w = SendWindow::new(4, 3);
        w.record_sent(vec![0]);
        assert_eq!(w.on_ack(1000), 0);
        assert_eq!(w.base(), 0);
    }

    #[test]
    fn ack_resets_retry_counter() {
        let mut w = SendWindow::new(4, 2);
        w.record_sent(vec![0]);
        assert!(!w.on_timeout()); // 1
        assert!(!w.on_timeout()); // 2
        w.record_sent(vec![1]);
        assert_eq!(w.on_ack(0), 1); // counter back to 0
        assert!(!w.on_timeout());
        assert!(!w.on_timeout());
        assert!(w.on_timeout()); // 3 > max_retries = 2
    }

    #[test]
    fn retry_budget_exhausts_after_exactly_max_retries_rounds() {
        let mut w = SendWindow::new(4, 5);
        w.record_sent(vec![0]);
        for _ in 0..5 {
            assert!(!w.on_timeout());
        }
        assert!(w.on_timeout(), "round max_retries + 1 must fail");
    }

    #[test]
    fn outstanding_yields_oldest_first() {
        let mut w = SendWindow::new(4, 3);
        w.record_sent(b"x".to_vec());
        w.record_sent(b"y".to_vec());
        w.record_sent(b"z".to_vec());
        w.on_ack(0);
        let frames: Vec<(u32, &[u8])> = w.outstanding().collect();
        assert_eq!(frames, vec![(1, b"y".as_slice()), (2, b"z".as_slice())]);
    }
}

//! Go-Back-N receive-side state machine.
//!
//! [`InOrderReceiver`] implements strict in-order acceptance:
//!
//! - Only the **expected** frame is accepted (`seq == expected`).
//! - A frame behind the cursor (`seq < expected`) is a duplicate caused by a
//!   lost ACK; the caller re-sends the last good cumulative ACK to nudge the
//!   sender, but the payload is never delivered twice.
//! - A frame ahead of the cursor is dropped — there is no reassembly buffer.
//!   The sender's go-back-N retransmit will supply the gap in order.
//!
//! This module only manages state; all socket I/O and payload handling is
//! the caller's responsibility (same split as [`crate::sender`]).

/// Classification of one inbound DATA frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// The expected frame: deliver the payload and advance the cursor.
    InOrder,
    /// Already accepted earlier; re-ACK, do not deliver.
    Duplicate,
    /// Ahead of the cursor; drop (no reassembly in go-back-N).
    OutOfOrder,
}

/// Receive-side cursor for one transfer.
#[derive(Debug, Default)]
pub struct InOrderReceiver {
    expected: u32,
}

impl InOrderReceiver {
    /// A fresh cursor expecting frame 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next frame index this receiver will accept.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Classify a DATA frame by its sequence number.  On [`Accept::InOrder`]
    /// the cursor advances and the caller must deliver the payload.
    pub fn on_data(&mut self, seq: u32) -> Accept {
        if seq == self.expected {
            self.expected += 1;
            Accept::InOrder
        } else if seq < self.expected {
            Accept::Duplicate
        } else {
            Accept::OutOfOrder
        }
    }

    /// Cumulative ACK value for the last accepted frame.
    ///
    /// Before anything has been accepted there is nothing to acknowledge,
    /// in which case this reports 0 — harmless, the sender ignores ACKs
    /// below its window base.  Also used for keepalive probes.
    pub fn last_ack(&self) -> u32 {
        self.expected.saturating_sub(1)
    }

    /// Restart the cursor at frame 0.
    ///
    /// Applied when the session migrates to a new peer and the
    /// `reset_sequence_on_migration` policy is in effect.
    pub fn reset(&mut self) {
        self.expected = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_frame_advances_cursor() {
        let mut r = InOrderReceiver::new();
        assert_eq!(r.on_data(0), Accept::InOrder);
        assert_eq!(r.expected(), 1);
        assert_eq!(r.last_ack(), 0);
    }

    #[test]
    fn out_of_order_frame_dropped_cursor_unchanged() {
        let mut r = InOrderReceiver::new();
        assert_eq!(r.on_data(5), Accept::OutOfOrder);
        assert_eq!(r.expected(), 0);
    }

    #[test]
    fn duplicate_frame_never_accepted_twice() {
        let mut r = InOrderReceiver::new();
        assert_eq!(r.on_data(0), Accept::InOrder);
        assert_eq!(r.on_data(0), Accept::Duplicate);
        assert_eq!(r.expected(), 1, "duplicate must not advance the cursor");
    }

    #[test]
    fn sequential_frames_accepted() {
        let mut r = InOrderReceiver::new();
        for seq in 0..4 {
            assert_eq!(r.on_data(seq), Accept::InOrder);
        }
        assert_eq!(r.expected(), 4);
        assert_eq!(r.last_ack(), 3);
    }

    #[test]
    fn gap_then_fill() {
        let mut r = InOrderReceiver::new();
        assert_eq!(r.on_data(0), Accept::InOrder);
        assert_eq!(r.on_data(2), Accept::OutOfOrder); // frame 1 missing
        assert_eq!(r.on_data(1), Accept::InOrder);
        assert_eq!(r.on_data(2), Accept::InOrder); // retransmitted in order
        assert_eq!(r.expected(), 3);
    }

    #[test]
    fn last_ack_before_first_accept_is_zero() {
        let r = InOrderReceiver::new();
        assert_eq!(r.last_ack(), 0);
    }

    #[test]
    fn reset_restarts_at_zero() {
        let mut r = InOrderReceiver::new();
        r.on_data(0);
        r.on_data(1);
        r.reset();
        assert_eq!(r.expected(), 0);
        assert_eq!(r.on_data(0), Accept::InOrder);
    }
}

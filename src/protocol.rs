//! Wire format and sequence accounting
//!
//! Every datagram carries exactly one audio frame:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────┐
//! │ Seq (u32, big-endian)│ Payload (codec bytes or raw PCM16 LE) │
//! │       4 bytes        │  fixed length for the whole session   │
//! └──────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! The payload length is not carried on the wire. Both ends derive it from
//! the same [`AudioSettings`], so the packet size is known before the first
//! datagram is sent or received.

use bytes::{Buf, BufMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::AudioSettings;

/// Length of the sequence header in bytes
pub const HEADER_LEN: usize = 4;

/// Fixed packet geometry for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
    payload_len: usize,
}

impl PacketLayout {
    pub fn new(payload_len: usize) -> Self {
        Self { payload_len }
    }

    pub fn for_settings(settings: &AudioSettings) -> Self {
        Self::new(settings.payload_len())
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Total datagram length, header included
    pub fn packet_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    /// Zeroed buffer of exactly one packet
    pub fn allocate(&self) -> Vec<u8> {
        vec![0u8; self.packet_len()]
    }
}

/// Write the sequence header at the start of `packet`
///
/// `packet` must be at least [`HEADER_LEN`] bytes long.
pub fn write_header(packet: &mut [u8], seq: u32) {
    let mut header = &mut packet[..HEADER_LEN];
    header.put_u32(seq);
}

/// Read the sequence header from the start of `packet`
pub fn read_header(packet: &[u8]) -> u32 {
    let mut header = &packet[..HEADER_LEN];
    header.get_u32()
}

/// Payload section of a packet
pub fn payload(packet: &[u8]) -> &[u8] {
    &packet[HEADER_LEN..]
}

/// Mutable payload section of a packet
pub fn payload_mut(packet: &mut [u8]) -> &mut [u8] {
    &mut packet[HEADER_LEN..]
}

/// Sender-side sequence numbering
///
/// Numbering restarts at 1 each capture session. With a non-zero loss
/// probability, `advance` occasionally skips a number so receivers see a
/// gap without the network dropping anything.
pub struct SequenceCounter {
    current: u32,
    loss_probability: f64,
    rng: StdRng,
    skipped: u64,
}

impl SequenceCounter {
    pub fn new(loss_probability: f64) -> Self {
        Self::with_rng(loss_probability, StdRng::from_entropy())
    }

    /// Deterministic counter for tests and benchmarks
    pub fn seeded(loss_probability: f64, seed: u64) -> Self {
        Self::with_rng(loss_probability, StdRng::seed_from_u64(seed))
    }

    fn with_rng(loss_probability: f64, rng: StdRng) -> Self {
        Self {
            current: 1,
            loss_probability: loss_probability.clamp(0.0, 1.0),
            rng,
            skipped: 0,
        }
    }

    /// Restart numbering at 1
    pub fn reset(&mut self) {
        self.current = 1;
        self.skipped = 0;
    }

    /// Number to stamp on the next packet
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Sequence numbers deliberately skipped since the last reset
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Move past the current number; returns the new current number
    pub fn advance(&mut self) -> u32 {
        let step = if self.loss_probability > 0.0 && self.rng.gen_bool(self.loss_probability) {
            self.skipped += 1;
            2
        } else {
            1
        };
        self.current = self.current.wrapping_add(step);
        self.current
    }
}

/// Receiver-side loss and progress accounting
#[derive(Debug, Clone, Default)]
pub struct LossTracker {
    last_seq: u32,
    losses: u64,
    progress: u64,
}

impl LossTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a played packet; returns the losses attributed to it
    ///
    /// A gap of `d > 1` from the last sequence number adds `d - 1` losses.
    /// Repeated, backwards or consecutive numbers add none. The last
    /// sequence number is always replaced.
    pub fn record(&mut self, seq: u32) -> u64 {
        let diff = seq as i64 - self.last_seq as i64;
        let lost = if diff > 1 { (diff - 1) as u64 } else { 0 };
        self.losses += lost;
        self.last_seq = seq;
        self.progress += 1;
        lost
    }

    pub fn last_seq(&self) -> u32 {
        self.last_seq
    }

    pub fn losses(&self) -> u64 {
        self.losses
    }

    pub fn progress(&self) -> u64 {
        self.progress
    }

    pub fn reset_losses(&mut self) {
        self.losses = 0;
    }

    pub fn reset_progress(&mut self) {
        self.progress = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_header_is_big_endian() {
        let mut packet = vec![0u8; 8];
        write_header(&mut packet, 0x0102_0304);
        assert_eq!(&packet[..4], &[1, 2, 3, 4]);
        assert_eq!(read_header(&packet), 0x0102_0304);
    }

    #[test]
    fn test_header_leaves_payload_alone() {
        let mut packet = vec![0xAAu8; 10];
        write_header(&mut packet, 7);
        assert!(payload(&packet).iter().all(|&b| b == 0xAA));
        assert_eq!(payload(&packet).len(), 6);
    }

    #[test]
    fn test_layout_sizes() {
        let mut settings = AudioSettings::default();
        settings.compression = false;
        let layout = PacketLayout::for_settings(&settings);
        assert_eq!(layout.payload_len(), 320);
        assert_eq!(layout.packet_len(), 324);
        assert_eq!(layout.allocate().len(), 324);

        settings.compression = true;
        let compressed = PacketLayout::for_settings(&settings);
        assert_eq!(compressed.packet_len(), HEADER_LEN + settings.payload_len());
        assert!(compressed.packet_len() < layout.packet_len());
    }

    #[test]
    fn test_counter_without_loss() {
        let mut counter = SequenceCounter::seeded(0.0, 1);
        assert_eq!(counter.current(), 1);
        for expected in 2..=100 {
            assert_eq!(counter.advance(), expected);
        }
        counter.reset();
        assert_eq!(counter.current(), 1);
    }

    #[test]
    fn test_counter_always_skips_at_full_probability() {
        let mut counter = SequenceCounter::seeded(1.0, 1);
        assert_eq!(counter.advance(), 3);
        assert_eq!(counter.advance(), 5);
        assert_eq!(counter.skipped(), 2);
    }

    #[test]
    fn test_injected_loss_rate_matches_probability() {
        let mut counter = SequenceCounter::seeded(0.25, 42);
        let frames = 20_000;
        for _ in 0..frames {
            counter.advance();
        }
        let rate = counter.skipped() as f64 / frames as f64;
        assert!((0.23..0.27).contains(&rate), "observed rate {}", rate);
    }

    #[test]
    fn test_tracker_counts_gaps() {
        let mut tracker = LossTracker::new();
        for seq in [1, 2, 4, 5, 7] {
            tracker.record(seq);
        }
        assert_eq!(tracker.losses(), 2);
        assert_eq!(tracker.last_seq(), 7);
        assert_eq!(tracker.progress(), 5);
    }

    #[test]
    fn test_tracker_ignores_restart() {
        let mut tracker = LossTracker::new();
        for seq in 1..=10 {
            tracker.record(seq);
        }
        // A new sender session starts again at 1
        assert_eq!(tracker.record(1), 0);
        assert_eq!(tracker.record(2), 0);
        assert_eq!(tracker.losses(), 0);
        assert_eq!(tracker.last_seq(), 2);
    }

    #[test]
    fn test_tracker_resets_are_independent() {
        let mut tracker = LossTracker::new();
        tracker.record(1);
        tracker.record(5);
        tracker.reset_losses();
        assert_eq!(tracker.losses(), 0);
        assert_eq!(tracker.progress(), 2);
        assert_eq!(tracker.last_seq(), 5);

        tracker.reset_progress();
        assert_eq!(tracker.progress(), 0);
        assert_eq!(tracker.last_seq(), 5);

        tracker.record(7);
        assert_eq!(tracker.losses(), 1);
    }

    proptest! {
        #[test]
        fn prop_header_roundtrip(seq in any::<u32>(), payload_len in 0usize..64) {
            let layout = PacketLayout::new(payload_len);
            let mut packet = layout.allocate();
            write_header(&mut packet, seq);
            prop_assert_eq!(read_header(&packet), seq);
            prop_assert_eq!(packet.len(), layout.packet_len());
        }

        #[test]
        fn prop_gap_adds_exactly_missing(a in 0u32..1_000_000, step in 0u32..1000) {
            let mut tracker = LossTracker::new();
            tracker.record(a);
            let before = tracker.losses();
            let b = a + step;
            tracker.record(b);
            let expected = if step > 1 { (step - 1) as u64 } else { 0 };
            prop_assert_eq!(tracker.losses() - before, expected);
        }

        #[test]
        fn prop_backwards_never_counts(a in 1u32..1_000_000, back in 0u32..1000) {
            let mut tracker = LossTracker::new();
            tracker.record(a);
            let before = tracker.losses();
            tracker.record(a.saturating_sub(back));
            prop_assert_eq!(tracker.losses(), before);
        }

        #[test]
        fn prop_lossless_stream(k in 1u32..500) {
            let mut tracker = LossTracker::new();
            for seq in 1..=k {
                tracker.record(seq);
            }
            prop_assert_eq!(tracker.last_seq(), k);
            prop_assert_eq!(tracker.losses(), 0);
            prop_assert_eq!(tracker.progress(), k as u64);
        }
    }
}

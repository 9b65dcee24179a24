//! Inbound reassembly of request fragments written by the peer

use std::time::Duration;

use log::*;
use provd_proto::{decode, DecodeError, Envelope};
use tokio::time::Instant;

/// Hard cap on buffered input; a peer that never pauses cannot grow it
/// past this before the idle timeout gets a chance to fire
pub const MAX_BUFFER: usize = 8 * 1024;

#[derive(Debug)]
pub enum Assembled {
    /// A full request parsed; the buffer is empty again
    Complete(Envelope),
    /// More fragments are needed
    Pending,
    /// The buffered input can never become a request and was dropped
    Discarded(DecodeError),
    /// The buffer hit [`MAX_BUFFER`] and was dropped
    Overflow(usize),
}

pub struct Reassembler {
    buffer: Vec<u8>,
    idle_timeout: Duration,
    deadline: Option<Instant>,
}

impl Reassembler {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            buffer: Vec::new(),
            idle_timeout,
            deadline: None,
        }
    }

    /// Append a fragment and try to parse the accumulated input
    pub fn push(&mut self, fragment: &[u8], now: Instant) -> Assembled {
        self.deadline = None;
        self.buffer.extend_from_slice(fragment);

        match decode(&self.buffer) {
            Ok(envelope) => {
                self.buffer.clear();
                Assembled::Complete(envelope)
            }
            Err(_) if self.buffer.len() > MAX_BUFFER => {
                let len = self.buffer.len();
                self.buffer.clear();
                Assembled::Overflow(len)
            }
            Err(e) if e.is_recoverable() => {
                trace!("Buffered {} bytes: {e}", self.buffer.len());
                self.deadline = Some(now + self.idle_timeout);
                Assembled::Pending
            }
            Err(e) => {
                self.buffer.clear();
                Assembled::Discarded(e)
            }
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drop partial input if the idle timeout has passed; true if it did
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                warn!("Timeout while receiving request, dropping {} bytes", self.buffer.len());
                self.reset();
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.deadline = None;
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn fragments_within_idle_timeout_join() {
        let start = Instant::now();
        let mut rx = Reassembler::new(secs(2.0));

        assert!(matches!(rx.push(br#"{"vers"#, start), Assembled::Pending));
        assert_eq!(rx.deadline(), Some(start + secs(2.0)));

        let later = start + secs(1.5);
        assert!(!rx.expire(later));
        match rx.push(br#"ion":1,"id":1,"type":"version"}"#, later) {
            Assembled::Complete(env) => assert_eq!(env.msg_type, "version"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(rx.buffered(), 0);
        assert_eq!(rx.deadline(), None);
    }

    #[test]
    fn idle_timeout_discards_partial_input() {
        let start = Instant::now();
        let mut rx = Reassembler::new(secs(2.0));
        rx.push(br#"{"vers"#, start);

        assert!(rx.expire(start + secs(3.0)));
        assert_eq!(rx.buffered(), 0);
        assert!(!rx.expire(start + secs(4.0)));

        // The tail alone is garbage and just waits for its own timeout
        assert!(matches!(
            rx.push(br#"ion":1,"id":1,"type":"version"}"#, start + secs(3.0)),
            Assembled::Pending
        ));
    }

    #[test]
    fn each_fragment_rearms_the_timer() {
        let start = Instant::now();
        let mut rx = Reassembler::new(secs(2.0));
        rx.push(b"{", start);
        rx.push(br#""version""#, start + secs(1.5));
        assert!(!rx.expire(start + secs(3.0)));
        assert!(rx.expire(start + secs(3.5)));
    }

    #[test]
    fn malformed_envelope_is_dropped_at_once() {
        let mut rx = Reassembler::new(secs(2.0));
        let now = Instant::now();
        assert!(matches!(
            rx.push(br#"{"version":1,"type":"version"}"#, now),
            Assembled::Discarded(_)
        ));
        assert_eq!(rx.buffered(), 0);
        assert_eq!(rx.deadline(), None);
    }

    #[test]
    fn oversized_input_is_dropped() {
        let mut rx = Reassembler::new(secs(2.0));
        let now = Instant::now();
        rx.push(b"[", now);
        let filler = vec![b' '; MAX_BUFFER];
        assert!(matches!(rx.push(&filler, now), Assembled::Overflow(_)));
        assert_eq!(rx.buffered(), 0);
    }
}

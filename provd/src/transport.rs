//! Chunk transport: outbound messages over the indicate characteristic
//!
//! A message is cut into chunks of at most `chunk_size` bytes. Only one
//! chunk is ever in flight: the next one goes out when the peer confirms
//! the previous indication. Messages queued while another is being sent
//! wait in FIFO order and are never interleaved with it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use log::*;

/// Sink for one outbound indication
///
/// Implemented by the GATT layer; it only moves bytes.
pub trait Indicate: Send + Sync {
    fn indicate(&self, chunk: &[u8]);
}

impl<T: Indicate + ?Sized> Indicate for Arc<T> {
    fn indicate(&self, chunk: &[u8]) {
        (**self).indicate(chunk)
    }
}

/// Called once after the last chunk of a message is confirmed
pub type Completion = Box<dyn FnOnce() + Send>;

struct Message {
    payload: Vec<u8>,
    sent: usize,
    on_complete: Option<Completion>,
}

#[derive(Default)]
struct TxState {
    /// Message currently being sent, awaiting confirmation of its last chunk
    current: Option<Message>,
    queue: VecDeque<Message>,
}

pub struct ChunkTransport<I> {
    indicator: I,
    chunk_size: usize,
    state: Mutex<TxState>,
}

impl<I: Indicate> ChunkTransport<I> {
    pub fn new(indicator: I, chunk_size: usize) -> Self {
        Self {
            indicator,
            chunk_size: chunk_size.max(1),
            state: Mutex::new(TxState::default()),
        }
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    fn lock(&self) -> MutexGuard<'_, TxState> {
        // Nothing panics while holding the lock; recover the state anyway
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue `payload` for delivery, starting at once if the link is idle
    pub fn send(&self, payload: Vec<u8>, on_complete: Option<Completion>) {
        if payload.is_empty() {
            if let Some(done) = on_complete {
                done();
            }
            return;
        }

        let mut message = Message {
            payload,
            sent: 0,
            on_complete,
        };

        let chunk = {
            let mut state = self.lock();
            if state.current.is_some() {
                trace!("Queueing {} byte message behind current send", message.payload.len());
                state.queue.push_back(message);
                return;
            }
            let chunk = self.next_chunk(&mut message);
            state.current = Some(message);
            chunk
        };
        self.indicator.indicate(&chunk);
    }

    /// The peer confirmed the chunk in flight
    pub fn confirm(&self) {
        let (chunk, done) = {
            let mut state = self.lock();
            let Some(current) = state.current.as_mut() else {
                debug!("Ignoring confirmation with nothing in flight");
                return;
            };

            if current.sent < current.payload.len() {
                (Some(self.next_chunk(current)), None)
            } else {
                let done = state.current.take().and_then(|m| m.on_complete);
                let chunk = match state.queue.pop_front() {
                    Some(mut next) => {
                        let chunk = self.next_chunk(&mut next);
                        state.current = Some(next);
                        Some(chunk)
                    }
                    None => None,
                };
                (chunk, done)
            }
        };

        if let Some(chunk) = chunk {
            self.indicator.indicate(&chunk);
        }
        if let Some(done) = done {
            done();
        }
    }

    /// Drop the message in flight and everything queued, without running
    /// their completions
    pub fn flush(&self) {
        let mut state = self.lock();
        let dropped = state.queue.len() + usize::from(state.current.is_some());
        state.current = None;
        state.queue.clear();
        if dropped > 0 {
            info!("Flushed {dropped} pending message(s)");
        }
    }

    /// True while a message is in flight or queued
    pub fn is_busy(&self) -> bool {
        self.lock().current.is_some()
    }

    fn next_chunk(&self, message: &mut Message) -> Vec<u8> {
        let end = (message.sent + self.chunk_size).min(message.payload.len());
        let chunk = message.payload[message.sent..end].to_vec();
        message.sent = end;
        chunk
    }
}

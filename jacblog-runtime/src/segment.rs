//! Shared control segment for synchronous input hand-off
//!
//! The running program's `input()` call is synchronous, so the worker thread
//! blocks on this segment until the page side writes a response. The layout
//! mirrors a shared memory block: slot 0 is the ready flag, slot 1 the payload
//! length, followed by a fixed-capacity byte region.
//!
//! Protocol: the page side writes only after an input request; the worker
//! only waits, reads, and resets the flag. At most one request is in flight.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default payload capacity in bytes
pub const DEFAULT_CAPACITY: usize = 4096;

/// Flag values for slot 0
pub const NOT_READY: i32 = 0;
pub const READY: i32 = 1;

/// Why a wait on the segment ended without a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SegmentWaitError {
    #[error("input wait interrupted")]
    Interrupted,

    #[error("input wait timed out after {0:?}")]
    TimedOut(Duration),
}

/// Fixed-layout control block shared between the page side and the worker
#[derive(Debug)]
pub struct ControlSegment {
    flag: AtomicI32,
    length: AtomicI32,
    payload: Mutex<Box<[u8]>>,
    interrupt: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl ControlSegment {
    /// Allocate a segment with the given payload capacity
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            flag: AtomicI32::new(NOT_READY),
            length: AtomicI32::new(0),
            payload: Mutex::new(vec![0u8; capacity].into_boxed_slice()),
            interrupt: AtomicBool::new(false),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.payload.lock().len()
    }

    /// Current value of the ready flag
    pub fn flag(&self) -> i32 {
        self.flag.load(Ordering::Acquire)
    }

    /// Current value of the length slot
    pub fn length(&self) -> usize {
        self.length.load(Ordering::Acquire).max(0) as usize
    }

    /// Store a response and wake the waiting worker (page side)
    ///
    /// The encoded text is truncated to the payload capacity, backing off to
    /// the nearest char boundary. Returns the number of bytes stored.
    pub fn write_response(&self, text: &str) -> usize {
        let stored = {
            let mut payload = self.payload.lock();
            let len = truncate_to_boundary(text, payload.len());
            payload[..len].copy_from_slice(&text.as_bytes()[..len]);
            len
        };

        if stored < text.len() {
            tracing::warn!(
                requested = text.len(),
                stored,
                "input response truncated to segment capacity"
            );
        }

        let _guard = self.lock.lock();
        self.length.store(stored as i32, Ordering::Release);
        self.flag.store(READY, Ordering::Release);
        self.wake.notify_all();
        stored
    }

    /// Block until a response is available (worker side)
    ///
    /// On success the payload is decoded and the flag is reset to not-ready
    /// before returning, so the next wait starts clean.
    pub fn wait_response(&self, timeout: Option<Duration>) -> Result<String, SegmentWaitError> {
        // A timeout too far out to represent is no deadline at all
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut guard = self.lock.lock();

        while self.flag.load(Ordering::Acquire) != READY {
            if self.is_interrupted() {
                return Err(SegmentWaitError::Interrupted);
            }
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut guard, deadline).timed_out()
                        && self.flag.load(Ordering::Acquire) != READY
                    {
                        if self.is_interrupted() {
                            return Err(SegmentWaitError::Interrupted);
                        }
                        return Err(SegmentWaitError::TimedOut(timeout.unwrap_or_default()));
                    }
                }
                None => self.wake.wait(&mut guard),
            }
        }

        let len = self.length();
        let text = {
            let payload = self.payload.lock();
            String::from_utf8_lossy(&payload[..len.min(payload.len())]).into_owned()
        };
        self.flag.store(NOT_READY, Ordering::Release);
        self.length.store(0, Ordering::Release);
        Ok(text)
    }

    /// Abort any pending wait and ask the running program to stop
    pub fn interrupt(&self) {
        let _guard = self.lock.lock();
        self.interrupt.store(true, Ordering::Release);
        self.wake.notify_all();
    }

    pub fn clear_interrupt(&self) {
        self.interrupt.store(false, Ordering::Release);
    }

    /// Drop any unread response and clear the interrupt slot
    ///
    /// Called by the page side between executions, never while a program
    /// may be waiting.
    pub fn reset(&self) {
        let _guard = self.lock.lock();
        self.flag.store(NOT_READY, Ordering::Release);
        self.length.store(0, Ordering::Release);
        self.interrupt.store(false, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }
}

fn truncate_to_boundary(text: &str, capacity: usize) -> usize {
    if text.len() <= capacity {
        return text.len();
    }
    let mut end = capacity;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

//! Interrupt-to-task edge event queue.
//!
//! GPIO ISRs cannot run user callbacks (they may allocate, lock or log), so
//! an ISR only records *which pin changed and in which direction*.  The
//! application task drains the queue and dispatches the registered edge
//! callbacks from task context.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌────────────────────┐
//! │ GPIO ISR    │────▶│  EdgeQueue   │────▶│ EdgeDispatcher     │
//! │ (producer)  │     │  (lock-free) │     │ ::dispatch_pending │
//! └─────────────┘     └──────────────┘     └────────────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

use crate::ports::PinId;

/// Maximum number of pending edges.  Power of 2 for cheap wrap-around.
pub const EDGE_QUEUE_CAP: usize = 32;

/// One recorded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub pin: PinId,
    pub rising: bool,
}

impl EdgeEvent {
    /// Pack into one byte: GPIO number in bits 1..=7, direction in bit 0.
    fn encode(self) -> Option<u8> {
        let n = u8::try_from(self.pin.0).ok().filter(|n| *n < 128)?;
        Some((n << 1) | u8::from(self.rising))
    }

    fn decode(raw: u8) -> Self {
        Self {
            pin: PinId(i32::from(raw >> 1)),
            rising: raw & 1 == 1,
        }
    }
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// One producer (the GPIO ISR context), one consumer (the task calling
// `pop`).  Slots are atomics, so no `static mut` is needed.

pub struct EdgeQueue {
    head: AtomicU8,
    tail: AtomicU8,
    slots: [AtomicU8; EDGE_QUEUE_CAP],
    dropped: AtomicU8,
}

impl EdgeQueue {
    pub const fn new() -> Self {
        Self {
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            slots: [const { AtomicU8::new(0) }; EDGE_QUEUE_CAP],
            dropped: AtomicU8::new(0),
        }
    }

    /// Record an edge.  ISR safe.  Returns `false` if the queue is full or
    /// the pin cannot be encoded (edge dropped).
    pub fn push(&self, event: EdgeEvent) -> bool {
        let Some(raw) = event.encode() else {
            return false;
        };
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next_head = (head + 1) % EDGE_QUEUE_CAP as u8;

        if next_head == tail {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.slots[head as usize].store(raw, Ordering::Relaxed);
        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Next edge in FIFO order.  Single consumer only.
    pub fn pop(&self) -> Option<EdgeEvent> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let raw = self.slots[tail as usize].load(Ordering::Relaxed);
        self.tail.store((tail + 1) % EDGE_QUEUE_CAP as u8, Ordering::Release);
        Some(EdgeEvent::decode(raw))
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed) as usize;
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        (head + EDGE_QUEUE_CAP - tail) % EDGE_QUEUE_CAP
    }

    /// Edges lost to a full queue since the last call.
    pub fn take_dropped(&self) -> u8 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

impl Default for EdgeQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue the GPIO ISRs write into.
pub static EDGE_QUEUE: EdgeQueue = EdgeQueue::new();

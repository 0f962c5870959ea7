//! Timer queue for phase deadlines.
//!
//! Rooms never own timers. Every deadline is an entry in one min-heap polled by the server loop,
//! so expiry and finalize timing is testable with a virtual clock.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use starfall_protocol::RoomId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Planning deadline: force lock-in and begin resolution
    Expire,
    /// Commit the pending resolution
    Finalize,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerEntry {
    pub fire_at_ms: u64,
    /// Insertion counter, keeps same-instant entries FIFO
    seq: u64,
    pub room: RoomId,
    pub kind: TimerKind,
    /// Turn the entry was scheduled for; entries for other turns are stale
    pub turn: u32,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<TimerEntry>>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, fire_at_ms: u64, room: RoomId, kind: TimerKind, turn: u32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(TimerEntry {
            fire_at_ms,
            seq,
            room,
            kind,
            turn,
        }));
    }

    /// Drop every entry for `room`.
    pub fn cancel_room(&mut self, room: &RoomId) {
        self.queue.retain(|Reverse(entry)| &entry.room != room);
    }

    /// Remove and return all entries due at `now_ms`, earliest first.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<TimerEntry> {
        let mut due = Vec::new();
        while self
            .queue
            .peek()
            .is_some_and(|Reverse(entry)| entry.fire_at_ms <= now_ms)
        {
            if let Some(Reverse(entry)) = self.queue.pop() {
                due.push(entry);
            }
        }
        due
    }

    pub fn next_fire_at(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse(entry)| entry.fire_at_ms)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending_for(&self, room: &RoomId) -> usize {
        self.queue
            .iter()
            .filter(|Reverse(entry)| &entry.room == room)
            .count()
    }
}

//! Intrusive run queues threaded through the process table.
//!
//! Each queue only holds head and tail slots; the links live in the PCBs, so
//! every operation is O(1) and a PCB can sit in at most one queue.

use super::task::{Priority, Process, Slot};
use crate::platform::Platform;

/// Queue linkage stored in each PCB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Links {
    pub(crate) prev: Option<Slot>,
    pub(crate) next: Option<Slot>,
    pub(crate) queued: bool,
}

/// FIFO of PCBs at one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunQueue {
    tier: Priority,
    head: Option<Slot>,
    tail: Option<Slot>,
}

impl RunQueue {
    pub const fn new(tier: Priority) -> Self {
        RunQueue { tier, head: None, tail: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append `slot` at the tail. The PCB must not be queued anywhere and its
    /// tier must be this queue's tier.
    pub fn push<P: Platform>(&mut self, procs: &mut [Process<P>], slot: Slot) {
        assert!(!procs[slot].links.queued, "push: slot {} already queued", slot);
        assert_eq!(procs[slot].priority, self.tier, "push: tier mismatch");

        procs[slot].links = Links { prev: self.tail, next: None, queued: true };
        match self.tail {
            Some(tail) => procs[tail].links.next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }

    /// Put `slot` back at the head, ahead of everything already waiting.
    pub fn push_front<P: Platform>(&mut self, procs: &mut [Process<P>], slot: Slot) {
        assert!(!procs[slot].links.queued, "push_front: slot {} already queued", slot);
        assert_eq!(procs[slot].priority, self.tier, "push_front: tier mismatch");

        procs[slot].links = Links { prev: None, next: self.head, queued: true };
        match self.head {
            Some(head) => procs[head].links.prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    /// Remove and return the head.
    pub fn dequeue<P: Platform>(&mut self, procs: &mut [Process<P>]) -> Option<Slot> {
        let head = self.head?;
        self.remove(procs, head);
        Some(head)
    }

    /// Remove `slot` from anywhere in the queue.
    fn remove<P: Platform>(&mut self, procs: &mut [Process<P>], slot: Slot) {
        let Links { prev, next, .. } = procs[slot].links;
        match prev {
            Some(prev) => procs[prev].links.next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => procs[next].links.prev = prev,
            None => self.tail = prev,
        }
        procs[slot].links = Links::default();
    }

    /// Walk head to tail. Stops after `procs.len()` steps so a corrupted
    /// queue cannot loop forever.
    pub fn iter<'a, P: Platform>(&self, procs: &'a [Process<P>]) -> QueueIter<'a, P> {
        QueueIter { procs, next: self.head, budget: procs.len() }
    }
}

pub struct QueueIter<'a, P: Platform> {
    procs: &'a [Process<P>],
    next: Option<Slot>,
    budget: usize,
}

impl<'a, P: Platform> Iterator for QueueIter<'a, P> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        if self.budget == 0 {
            return None;
        }
        let slot = self.next?;
        self.budget -= 1;
        self.next = self.procs[slot].links.next;
        Some(slot)
    }
}

/// The three feedback tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunQueues {
    pub high: RunQueue,
    pub medium: RunQueue,
    pub low: RunQueue,
}

impl Default for RunQueues {
    fn default() -> Self {
        RunQueues {
            high: RunQueue::new(Priority::High),
            medium: RunQueue::new(Priority::Medium),
            low: RunQueue::new(Priority::Low),
        }
    }
}

impl RunQueues {
    pub fn get(&self, tier: Priority) -> &RunQueue {
        match tier {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }

    pub fn get_mut(&mut self, tier: Priority) -> &mut RunQueue {
        match tier {
            Priority::High => &mut self.high,
            Priority::Medium => &mut self.medium,
            Priority::Low => &mut self.low,
        }
    }

    /// Append `slot` to the queue of its current tier.
    pub fn enqueue<P: Platform>(&mut self, procs: &mut [Process<P>], slot: Slot) {
        let tier = procs[slot].priority;
        self.get_mut(tier).push(procs, slot);
    }

    /// Return `slot` to the head of its current tier's queue.
    pub fn enqueue_front<P: Platform>(&mut self, procs: &mut [Process<P>], slot: Slot) {
        let tier = procs[slot].priority;
        self.get_mut(tier).push_front(procs, slot);
    }

    /// Take the head of the highest non-empty tier.
    pub fn pop_next<P: Platform>(&mut self, procs: &mut [Process<P>]) -> Option<(Slot, Priority)> {
        Priority::ALL.into_iter().find_map(|tier| {
            let slot = self.get_mut(tier).dequeue(procs)?;
            Some((slot, tier))
        })
    }

    /// Remove `slot` from the queue its tier names. Returns false if it was
    /// not queued.
    pub fn unlink<P: Platform>(&mut self, procs: &mut [Process<P>], slot: Slot) -> bool {
        if !procs[slot].links.queued {
            return false;
        }
        let tier = procs[slot].priority;
        self.get_mut(tier).remove(procs, slot);
        true
    }

    /// Aging: move everything in medium, then everything in low, to the tail
    /// of high with its tier reset and its medium count cleared.
    pub fn promote_all<P: Platform>(&mut self, procs: &mut [Process<P>]) -> usize {
        let mut moved = 0;
        for tier in [Priority::Medium, Priority::Low] {
            while let Some(slot) = self.get_mut(tier).dequeue(procs) {
                procs[slot].priority = Priority::High;
                procs[slot].mlfq_runs = 0;
                self.high.push(procs, slot);
                moved += 1;
            }
        }
        moved
    }
}

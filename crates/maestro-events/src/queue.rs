//! Priority queue for asynchronously published events.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use maestro_core::Priority;

use crate::event::Event;

/// An event waiting in the async queue.
#[derive(Debug)]
struct QueuedEvent {
    priority: Priority,
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    // Max-heap: higher priority first, then lower sequence number first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority-ordered FIFO of pending events.
///
/// Higher [`Priority`] dequeues first; equal priorities dequeue in enqueue
/// order.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(QueuedEvent {
            priority: event.priority,
            seq,
            event,
        });
    }

    pub(crate) fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|q| q.event)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::EventType;

    fn event(priority: Priority, tag: &str) -> Event {
        Event::new(EventType::UserAction, "test")
            .with_priority(priority)
            .with_field("tag", tag)
    }

    fn tags(queue: &mut EventQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.pop())
            .map(|e| e.data["tag"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_queue_orders_by_priority() {
        let mut queue = EventQueue::new();
        queue.push(event(Priority::Low, "low"));
        queue.push(event(Priority::Urgent, "urgent"));
        queue.push(event(Priority::Normal, "normal"));

        assert_eq!(tags(&mut queue), vec!["urgent", "normal", "low"]);
    }

    #[test]
    fn test_queue_fifo_within_priority() {
        let mut queue = EventQueue::new();
        queue.push(event(Priority::High, "a"));
        queue.push(event(Priority::Low, "z"));
        queue.push(event(Priority::High, "b"));
        queue.push(event(Priority::High, "c"));

        assert_eq!(tags(&mut queue), vec!["a", "b", "c", "z"]);
        assert_eq!(queue.len(), 0);
    }
}

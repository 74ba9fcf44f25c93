//! Priority backlog of requests not yet admitted.

use crate::task::PrefetchRequest;

/// One backlog entry.
#[derive(Debug)]
pub(crate) struct QueueEntry {
    pub id: String,
    pub priority: i32,
    /// Arrival order; breaks priority ties.
    pub seq: u64,
    pub request: PrefetchRequest,
}

/// Entries ordered by priority (higher first), then arrival (earlier first).
#[derive(Debug, Default)]
pub(crate) struct Backlog {
    entries: Vec<QueueEntry>,
    next_seq: u64,
}

impl Backlog {
    /// Append a new arrival.
    pub fn enqueue(&mut self, id: String, priority: i32, request: PrefetchRequest) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.insert(QueueEntry {
            id,
            priority,
            seq,
            request,
        });
    }

    /// Put an entry back, keeping its original place in line.
    pub fn requeue(&mut self, entry: QueueEntry) {
        self.insert(entry);
    }

    fn insert(&mut self, entry: QueueEntry) {
        let at = self
            .entries
            .iter()
            .position(|e| (e.priority, std::cmp::Reverse(e.seq)) < (entry.priority, std::cmp::Reverse(entry.seq)))
            .unwrap_or(self.entries.len());
        self.entries.insert(at, entry);
    }

    /// Highest-priority entry.
    pub fn dequeue(&mut self) -> Option<QueueEntry> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<QueueEntry> {
        let at = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(at))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(b: &mut Backlog) -> Vec<String> {
        std::iter::from_fn(|| b.dequeue()).map(|e| e.id).collect()
    }

    fn req() -> PrefetchRequest {
        PrefetchRequest::new("https://example.com/x")
    }

    #[test]
    fn higher_priority_first() {
        let mut b = Backlog::default();
        b.enqueue("p1".into(), 1, req());
        b.enqueue("p10".into(), 10, req());
        b.enqueue("p5".into(), 5, req());
        assert_eq!(ids(&mut b), ["p10", "p5", "p1"]);
    }

    #[test]
    fn ties_keep_arrival_order() {
        let mut b = Backlog::default();
        for id in ["a", "b", "c"] {
            b.enqueue(id.into(), 0, req());
        }
        b.enqueue("urgent".into(), 3, req());
        b.enqueue("low".into(), -1, req());
        assert_eq!(ids(&mut b), ["urgent", "a", "b", "c", "low"]);
    }

    #[test]
    fn requeue_restores_position() {
        let mut b = Backlog::default();
        b.enqueue("a".into(), 0, req());
        b.enqueue("b".into(), 0, req());
        let first = b.dequeue().unwrap();
        b.enqueue("c".into(), 0, req());
        b.requeue(first);
        assert_eq!(ids(&mut b), ["a", "b", "c"]);
    }

    #[test]
    fn remove_and_contains() {
        let mut b = Backlog::default();
        b.enqueue("a".into(), 0, req());
        b.enqueue("b".into(), 0, req());
        assert!(b.contains("b"));
        assert_eq!(b.remove("b").unwrap().id, "b");
        assert!(!b.contains("b"));
        assert!(b.remove("zzz").is_none());
        assert_eq!(b.len(), 1);
    }
}

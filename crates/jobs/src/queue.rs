use crossbeam_channel::{unbounded, Receiver, Sender};

/// Multi-producer queue drained by exactly one dispatcher.
pub struct EventQueue<E> {
    tx: Sender<E>,
    rx: Receiver<E>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self { Self::new() }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn push(&self, event: E) { let _ = self.tx.send(event); }
    pub fn pop(&self) -> Option<E> { self.rx.try_recv().ok() }
    pub fn len(&self) -> usize { self.rx.len() }
    pub fn is_empty(&self) -> bool { self.rx.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn events_from_other_threads_arrive_in_order() {
        let q = EventQueue::new();
        q.push(0);
        thread::scope(|s| {
            s.spawn(|| { for i in 1..4 { q.push(i); } });
        });
        let mut seen = Vec::new();
        while let Some(e) = q.pop() { seen.push(e); }
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert!(q.is_empty());
    }
}

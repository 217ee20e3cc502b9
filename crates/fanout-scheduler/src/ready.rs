use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Tasks waiting for a free slot, ordered by priority (highest first) and
/// then by the order they were pushed.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    entries: BTreeSet<(Reverse<i32>, u64, usize)>,
    next_seq: u64,
}

impl ReadyQueue {
    /// A re-pushed task lands behind everything already in its priority tier.
    pub(crate) fn push(&mut self, index: usize, priority: i32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((Reverse(priority), seq, index));
    }

    pub(crate) fn pop(&mut self) -> Option<usize> {
        self.entries.pop_first().map(|(_, _, index)| index)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_then_fifo() {
        let mut q = ReadyQueue::default();
        q.push(0, 0);
        q.push(1, 5);
        q.push(2, 0);
        q.push(3, 5);

        let order: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(order, [1, 3, 0, 2]);
    }

    #[test]
    fn requeue_goes_to_back_of_tier() {
        let mut q = ReadyQueue::default();
        q.push(0, 1);
        q.push(1, 1);
        let first = q.pop().unwrap();
        q.push(first, 1);
        q.push(2, 0);

        assert_eq!(q.len(), 3);
        let order: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(order, [1, 0, 2]);
    }
}

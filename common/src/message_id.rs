use std::{fmt, sync::Arc};

use parking_lot::Mutex;

/// An identifier the acks tracker can store and compare.
///
/// The tracker never builds or mutates ids, it only keeps clones of them in
/// receipt order and asks whether one of them may close a cumulative ack.
pub trait MessageId: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Whether acking this id cumulatively would not split a batch that still
    /// has unconsumed fragments after it.
    fn can_ack_cumulative(&self) -> bool;
}

/// Ack state shared by every fragment of one batch entry.
///
/// A set bit means the fragment at that index is still pending.
#[derive(Clone)]
pub struct BatchAckTracker {
    size: u32,
    pending: Arc<Mutex<Vec<u64>>>,
}

impl BatchAckTracker {
    pub fn new(size: u32) -> Self {
        let mut bits = vec![u64::MAX; (size as usize).div_ceil(64)];
        let tail = size % 64;
        if tail != 0 {
            if let Some(last) = bits.last_mut() {
                *last = (1u64 << tail) - 1;
            }
        }
        Self {
            size,
            pending: Arc::new(Mutex::new(bits)),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn pending(&self) -> u32 {
        self.pending.lock().iter().map(|word| word.count_ones()).sum()
    }

    /// Marks one fragment acked, returns whether the whole batch is now acked.
    /// An out of range index changes nothing.
    pub fn ack(&self, index: u32) -> bool {
        let mut bits = self.pending.lock();
        if index < self.size {
            clear(&mut bits, index);
        }
        bits.iter().all(|word| *word == 0)
    }

    /// Marks every fragment up to and including `index` acked, returns whether
    /// the whole batch is now acked.
    pub fn ack_cumulative(&self, index: u32) -> bool {
        let mut bits = self.pending.lock();
        let end = index.saturating_add(1).min(self.size);
        for i in 0..end {
            clear(&mut bits, i);
        }
        bits.iter().all(|word| *word == 0)
    }

    pub fn is_completed(&self) -> bool {
        self.pending.lock().iter().all(|word| *word == 0)
    }

    /// Whether every fragment after `index` is already acked, i.e. a cumulative
    /// ack at `index` would leave nothing of this batch pending.
    pub fn completed_through(&self, index: u32) -> bool {
        let bits = self.pending.lock();
        (index.saturating_add(1)..self.size).all(|i| !is_set(&bits, i))
    }
}

impl fmt::Debug for BatchAckTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAckTracker")
            .field("size", &self.size)
            .field("pending", &self.pending())
            .finish()
    }
}

fn is_set(bits: &[u64], index: u32) -> bool {
    bits[(index / 64) as usize] & (1u64 << (index % 64)) != 0
}

fn clear(bits: &mut [u64], index: u32) {
    bits[(index / 64) as usize] &= !(1u64 << (index % 64));
}

#[derive(Debug, Clone)]
struct BatchPosition {
    index: u32,
    acks: BatchAckTracker,
}

/// Position of a received message, optionally pointing at one fragment of a
/// batch entry.
#[derive(Debug, Clone)]
pub struct TrackingMessageId {
    pub ledger_id: u64,
    pub entry_id: u64,
    pub partition_idx: i32,
    batch: Option<BatchPosition>,
}

impl TrackingMessageId {
    pub fn new(ledger_id: u64, entry_id: u64, partition_idx: i32) -> Self {
        Self {
            ledger_id,
            entry_id,
            partition_idx,
            batch: None,
        }
    }

    /// Ids for every fragment of one batch entry, in batch order, sharing one
    /// ack tracker.
    pub fn batch_ids(ledger_id: u64, entry_id: u64, partition_idx: i32, size: u32) -> Vec<Self> {
        let acks = BatchAckTracker::new(size);
        (0..size)
            .map(|index| Self {
                ledger_id,
                entry_id,
                partition_idx,
                batch: Some(BatchPosition {
                    index,
                    acks: acks.clone(),
                }),
            })
            .collect()
    }

    pub fn batch_index(&self) -> Option<u32> {
        self.batch.as_ref().map(|b| b.index)
    }

    pub fn batch_size(&self) -> Option<u32> {
        self.batch.as_ref().map(|b| b.acks.size())
    }

    pub fn is_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Records an individual ack of this fragment. Returns whether the whole
    /// entry is now acked.
    pub fn ack(&self) -> bool {
        match &self.batch {
            Some(b) => b.acks.ack(b.index),
            None => true,
        }
    }

    /// Records a cumulative ack up to this fragment. Returns whether the whole
    /// entry is now acked.
    pub fn ack_cumulative(&self) -> bool {
        match &self.batch {
            Some(b) => b.acks.ack_cumulative(b.index),
            None => true,
        }
    }
}

impl MessageId for TrackingMessageId {
    fn can_ack_cumulative(&self) -> bool {
        match &self.batch {
            Some(b) => b.acks.completed_through(b.index),
            None => true,
        }
    }
}

// ack state is shared bookkeeping, not identity
impl PartialEq for TrackingMessageId {
    fn eq(&self, other: &Self) -> bool {
        self.ledger_id == other.ledger_id
            && self.entry_id == other.entry_id
            && self.partition_idx == other.partition_idx
            && self.batch_index() == other.batch_index()
    }
}

impl Eq for TrackingMessageId {}

impl fmt::Display for TrackingMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.ledger_id, self.entry_id, self.partition_idx)?;
        if let Some(index) = self.batch_index() {
            write!(f, ":{index}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_tracker_individual_acks() {
        let acks = BatchAckTracker::new(3);
        assert_eq!(acks.pending(), 3);
        assert!(!acks.ack(1));
        assert!(!acks.ack(7));
        assert!(!acks.ack(0));
        assert!(acks.ack(2));
        assert!(acks.is_completed());
    }

    #[test]
    fn batch_tracker_cumulative_acks() {
        let acks = BatchAckTracker::new(70);
        assert!(!acks.ack_cumulative(64));
        assert_eq!(acks.pending(), 5);
        assert!(acks.completed_through(69));
        assert!(!acks.completed_through(64));
        assert!(acks.ack_cumulative(u32::MAX));
    }

    #[test]
    fn only_last_fragment_can_ack_cumulative() {
        let ids = TrackingMessageId::batch_ids(1, 2, 0, 3);
        assert!(!ids[0].can_ack_cumulative());
        assert!(!ids[1].can_ack_cumulative());
        assert!(ids[2].can_ack_cumulative());
        assert!(TrackingMessageId::new(1, 3, 0).can_ack_cumulative());
    }

    #[test]
    fn fragment_completes_once_later_fragments_acked() {
        let ids = TrackingMessageId::batch_ids(1, 2, 0, 3);
        assert!(!ids[2].ack());
        assert!(!ids[0].can_ack_cumulative());
        assert!(ids[1].can_ack_cumulative());
        assert!(ids[1].ack_cumulative());
        assert!(ids[0].can_ack_cumulative());
    }

    #[test]
    fn equality_ignores_ack_state() {
        let a = TrackingMessageId::batch_ids(1, 2, 0, 2);
        let b = TrackingMessageId::batch_ids(1, 2, 0, 2);
        a[0].ack();
        assert_eq!(a[0], b[0]);
        assert_ne!(a[0], a[1]);
        assert_ne!(a[0], TrackingMessageId::new(1, 2, 0));
    }

    #[test]
    fn display() {
        assert_eq!(TrackingMessageId::new(4, 5, -1).to_string(), "4:5:-1");
        assert_eq!(TrackingMessageId::batch_ids(4, 5, 0, 2)[1].to_string(), "4:5:0:1");
    }
}

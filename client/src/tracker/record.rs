use tally_common::message_id::MessageId;

/// Unacked ids in receipt order. Only ever pruned by exact match or by prefix.
#[derive(Debug)]
pub(crate) struct TrackedMessages<M> {
    ids: Vec<M>,
}

impl<M> TrackedMessages<M>
where
    M: MessageId,
{
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn extend(&mut self, ids: Vec<M>) {
        self.ids.extend(ids);
    }

    pub(crate) fn snapshot(&self) -> Vec<M> {
        self.ids.clone()
    }

    /// Position of the first entry equal to `id`.
    pub(crate) fn index_of(&self, id: &M) -> Option<usize> {
        self.ids.iter().position(|tracked| tracked == id)
    }

    pub(crate) fn remove(&mut self, id: &M) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                self.ids.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Drops `id` and everything received before it.
    pub(crate) fn remove_until(&mut self, id: &M) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                self.ids.drain(..=idx);
                true
            }
            None => false,
        }
    }

    /// The latest id at or before `id` that a cumulative ack may target.
    ///
    /// A fragment of an unfinished batch can't be the boundary, so we fall
    /// back to the entry received right before it, which is already consumed.
    pub(crate) fn greatest_cumulative(&self, id: &M) -> Option<M> {
        let idx = self.index_of(id)?;
        if self.ids[idx].can_ack_cumulative() {
            return Some(self.ids[idx].clone());
        }
        idx.checked_sub(1).map(|prev| self.ids[prev].clone())
    }
}

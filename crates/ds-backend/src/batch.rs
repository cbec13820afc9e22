use crate::backend::TokenId;

/// Sequence identifier within a batch. Single-sequence generation uses `0`.
pub type SeqId = i32;

/// Number of token slots a decode step may carry.
pub const DEFAULT_BATCH_CAPACITY: usize = 512;

/// One token slot of a decode step.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSlot {
    pub token: TokenId,
    /// Position of the token in the sequence (KV cache index).
    pub pos: usize,
    pub seq_ids: Vec<SeqId>,
    /// Whether the backend should produce logits for this slot.
    pub logits: bool,
}

/// Fixed-capacity buffer of token slots submitted to the backend for one
/// decode step.
///
/// The buffer is cleared and refilled every step. Exceeding the capacity is
/// a programming error and panics.
#[derive(Debug, Clone)]
pub struct BatchBuffer {
    slots: Vec<BatchSlot>,
    capacity: usize,
}

impl BatchBuffer {
    /// Create an empty batch holding at most `capacity` slots.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "batch capacity must be non-zero");
        BatchBuffer {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a token slot.
    ///
    /// # Panics
    /// Panics if the batch is already full.
    pub fn append(&mut self, token: TokenId, pos: usize, seq_ids: &[SeqId], logits: bool) {
        assert!(
            self.slots.len() < self.capacity,
            "batch capacity {} exceeded",
            self.capacity
        );
        self.slots.push(BatchSlot {
            token,
            pos,
            seq_ids: seq_ids.to_vec(),
            logits,
        });
    }

    /// Remove every slot, keeping the allocation.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of slots currently filled.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Slots in submission order.
    pub fn slots(&self) -> &[BatchSlot] {
        &self.slots
    }

    /// Index of the last slot that requested logits.
    pub fn last_logits_index(&self) -> Option<usize> {
        self.slots.iter().rposition(|slot| slot.logits)
    }
}

impl Default for BatchBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_clear() {
        let mut batch = BatchBuffer::new(4);
        assert!(batch.is_empty());

        batch.append(10, 0, &[0], false);
        batch.append(11, 1, &[0], true);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.slots()[1].token, 11);
        assert_eq!(batch.slots()[1].pos, 1);
        assert_eq!(batch.slots()[1].seq_ids, vec![0]);

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.capacity(), 4);
    }

    #[test]
    fn test_fill_to_capacity() {
        let mut batch = BatchBuffer::new(3);
        for pos in 0..3 {
            batch.append(1, pos, &[0], pos == 2);
        }
        assert!(batch.is_full());
        assert_eq!(batch.last_logits_index(), Some(2));
    }

    #[test]
    #[should_panic(expected = "batch capacity 2 exceeded")]
    fn test_append_past_capacity_panics() {
        let mut batch = BatchBuffer::new(2);
        batch.append(1, 0, &[0], false);
        batch.append(2, 1, &[0], false);
        batch.append(3, 2, &[0], true);
    }

    #[test]
    fn test_last_logits_index_none() {
        let mut batch = BatchBuffer::default();
        assert_eq!(batch.capacity(), DEFAULT_BATCH_CAPACITY);
        batch.append(7, 0, &[0], false);
        assert_eq!(batch.last_logits_index(), None);
    }

    #[test]
    #[should_panic(expected = "batch capacity must be non-zero")]
    fn test_zero_capacity_panics() {
        let _ = BatchBuffer::new(0);
    }
}

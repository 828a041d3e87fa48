use tracing::{debug, info};

use crate::rle::{decode_rle, encode_rle, RleError};

/// Circular history of run-length encoded drawing snapshots.
///
/// The cursor marks the snapshot matching the live drawing. Pushing advances it
/// and evicts the oldest entry once the ledger is full; undo and redo move it
/// without ever stepping past the oldest or newest retained snapshot.
#[derive(Debug, Clone)]
pub struct UndoLedger {
    slots: Vec<Vec<u8>>,
    cursor: usize,
    older: usize,
    newer: usize,
}

impl UndoLedger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![Vec::new(); capacity],
            cursor: capacity,
            older: 0,
            newer: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= self.slots.len()
    }

    /// Number of retained snapshots, including ones reachable by redo.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.older + 1 + self.newer
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.is_empty() && self.older > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.is_empty() && self.newer > 0
    }

    /// Drops every snapshot; the next push lands in slot 0.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = Vec::new();
        }
        self.cursor = self.slots.len();
        self.older = 0;
        self.newer = 0;
    }

    pub fn push(&mut self, bitmap: &[u8]) {
        let capacity = self.slots.len();
        let (next, older) = if self.is_empty() {
            (0, 0)
        } else {
            ((self.cursor + 1) % capacity, (self.older + 1).min(capacity - 1))
        };
        self.slots[next] = encode_rle(bitmap);
        self.cursor = next;
        self.older = older;
        self.newer = 0;
        debug!(
            "undo snapshot {} stored ({} bytes, {} older)",
            next,
            self.slots[next].len(),
            self.older
        );
    }

    /// Keeps labels from the current snapshot where it is nonzero, then pushes.
    /// The merged result is written back into `bitmap`.
    pub fn push_preserving(&mut self, bitmap: &mut [u8]) -> Result<(), RleError> {
        if let Some(previous) = self.current(bitmap.len())? {
            for (value, &kept) in bitmap.iter_mut().zip(previous.iter()) {
                if kept != 0 {
                    *value = kept;
                }
            }
        }
        self.push(bitmap);
        Ok(())
    }

    pub fn current(&self, len: usize) -> Result<Option<Vec<u8>>, RleError> {
        if self.is_empty() {
            return Ok(None);
        }
        decode_rle(&self.slots[self.cursor], len).map(Some)
    }

    /// Restores the snapshot before the cursor. Returns `current` unchanged
    /// when nothing was ever recorded, and the oldest snapshot once the
    /// history is exhausted.
    pub fn undo(&mut self, current: &[u8]) -> Result<Vec<u8>, RleError> {
        if self.is_empty() {
            info!("undo history is empty");
            return Ok(current.to_vec());
        }
        if self.older == 0 {
            debug!("undo reached the oldest snapshot");
            return decode_rle(&self.slots[self.cursor], current.len());
        }
        let capacity = self.slots.len();
        let previous = (self.cursor + capacity - 1) % capacity;
        let restored = decode_rle(&self.slots[previous], current.len())?;
        self.cursor = previous;
        self.older -= 1;
        self.newer += 1;
        Ok(restored)
    }

    /// Re-applies the snapshot after the cursor, or returns `None` when there is
    /// nothing to redo.
    pub fn redo(&mut self, current: &[u8]) -> Result<Option<Vec<u8>>, RleError> {
        if !self.can_redo() {
            return Ok(None);
        }
        let next = (self.cursor + 1) % self.slots.len();
        let restored = decode_rle(&self.slots[next], current.len())?;
        self.cursor = next;
        self.older += 1;
        self.newer -= 1;
        Ok(Some(restored))
    }
}

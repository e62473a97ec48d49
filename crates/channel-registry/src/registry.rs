use crate::{AllocationMetrics, ChannelLayout, RegistryError, ResourceKind, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

const WORD_BITS: usize = u64::BITS as usize;

/// Exclusive-allocation table for one resource class.
///
/// The table is a fixed-size bitset guarded by a mutex so `allocate`/`free`
/// on the same registry are mutually exclusive across threads. It never grows
/// or shrinks after construction.
pub struct ChannelRegistry {
    kind: ResourceKind,
    layout: ChannelLayout,
    words: Mutex<Vec<u64>>,
    metrics: Option<AllocationMetrics>,
}

impl ChannelRegistry {
    pub fn new(kind: ResourceKind, layout: ChannelLayout) -> Self {
        let words = layout.capacity().div_ceil(WORD_BITS);
        debug!(%kind, capacity = layout.capacity(), "created channel registry");
        Self {
            kind,
            layout,
            words: Mutex::new(vec![0; words]),
            metrics: None,
        }
    }

    /// Attach allocation counters. Grants, rejections and frees from this
    /// point on are recorded under this registry's [`ResourceKind`].
    pub fn with_metrics(mut self, metrics: AllocationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn capacity(&self) -> usize {
        self.layout.capacity()
    }

    /// Mark `index` as allocated.
    ///
    /// # Panics
    ///
    /// An index outside `[0, capacity)` is a caller bug, not an allocation
    /// failure, and aborts the call.
    pub fn allocate(&self, index: usize) -> Result<()> {
        self.check_bounds(index);
        let (word, bit) = split(index);
        let mut words = self.words.lock();
        if words[word] & bit != 0 {
            drop(words);
            warn!(kind = %self.kind, index, "allocation rejected: already allocated");
            if let Some(m) = &self.metrics {
                m.record_rejection(self.kind);
            }
            return Err(RegistryError::AlreadyAllocated {
                kind: self.kind,
                index,
            });
        }
        words[word] |= bit;
        drop(words);
        debug!(kind = %self.kind, index, "allocated");
        if let Some(m) = &self.metrics {
            m.record_grant(self.kind);
        }
        Ok(())
    }

    /// Clear the mark on `index`. Clearing an index that was never allocated
    /// is a no-op.
    ///
    /// # Panics
    ///
    /// Same bounds precondition as [`ChannelRegistry::allocate`].
    pub fn free(&self, index: usize) {
        self.check_bounds(index);
        let (word, bit) = split(index);
        let mut words = self.words.lock();
        let was_set = words[word] & bit != 0;
        words[word] &= !bit;
        drop(words);
        if was_set {
            debug!(kind = %self.kind, index, "freed");
            if let Some(m) = &self.metrics {
                m.record_free(self.kind);
            }
        }
    }

    pub fn is_allocated(&self, index: usize) -> bool {
        if index >= self.capacity() {
            return false;
        }
        let (word, bit) = split(index);
        self.words.lock()[word] & bit != 0
    }

    /// Number of indices currently held.
    pub fn allocated_count(&self) -> usize {
        self.words
            .lock()
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    /// Allocate `index` and return a guard that frees it when dropped.
    pub fn claim(self: &Arc<Self>, index: usize) -> Result<ChannelSlot> {
        self.allocate(index)?;
        Ok(ChannelSlot {
            registry: Arc::clone(self),
            index,
        })
    }

    fn check_bounds(&self, index: usize) {
        assert!(
            index < self.capacity(),
            "{} index {index} outside registry capacity {}",
            self.kind,
            self.capacity()
        );
    }
}

fn split(index: usize) -> (usize, u64) {
    (index / WORD_BITS, 1u64 << (index % WORD_BITS))
}

/// Ownership of one allocated index. Dropping the slot frees the index.
pub struct ChannelSlot {
    registry: Arc<ChannelRegistry>,
    index: usize,
}

impl ChannelSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> ResourceKind {
        self.registry.kind()
    }
}

impl core::fmt::Debug for ChannelSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelSlot")
            .field("kind", &self.registry.kind())
            .field("index", &self.index)
            .finish()
    }
}

impl Drop for ChannelSlot {
    fn drop(&mut self) {
        self.registry.free(self.index);
    }
}

//! Compaction debt estimation from level sizes
//!
//! The engine side of compaction pacing: turns a snapshot of per-level byte
//! sizes into the [`CompactionPacerInfo`] a [`CompactionPacer`] pulls on each
//! refresh.
//!
//! Level sizing: L0 is always compacted away, L1+ have a 10x size ratio.
//!
//! [`CompactionPacer`]: crate::pacer::CompactionPacer

use crate::pacer::CompactionPacerInfo;

/// Size ratio between levels (10x)
pub const LEVEL_SIZE_RATIO: u64 = 10;

/// Base size for L1 (10MB)
pub const L1_BASE_SIZE: u64 = 10 * 1024 * 1024;

/// Target size for a level; L0 has no byte target
pub fn level_target_size(level: usize) -> u64 {
    if level == 0 {
        return 0;
    }
    L1_BASE_SIZE.saturating_mul(LEVEL_SIZE_RATIO.saturating_pow(level as u32 - 1))
}

/// Bytes per level, L0 first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelSizes {
    sizes: Vec<u64>,
}

impl LevelSizes {
    pub fn new(sizes: Vec<u64>) -> Self {
        Self { sizes }
    }

    pub fn sizes(&self) -> &[u64] {
        &self.sizes
    }

    /// Levels holding at least one byte
    pub fn non_empty_levels(&self) -> usize {
        self.sizes.iter().filter(|&&size| size > 0).count()
    }

    /// Estimate outstanding compaction work
    ///
    /// Every L0 byte must move down. Bytes pushed into a level that then
    /// exceeds its target cascade: the excess is debt and is pushed further.
    pub fn estimated_compaction_debt(&self) -> u64 {
        let Some((&l0, rest)) = self.sizes.split_first() else {
            return 0;
        };

        let mut debt = l0;
        let mut incoming = l0;
        for (i, &size) in rest.iter().enumerate() {
            let level = i + 1;
            let projected = size.saturating_add(incoming);
            let target = level_target_size(level);
            if projected > target {
                let excess = projected - target;
                debt = debt.saturating_add(excess);
                incoming = excess;
            } else {
                incoming = 0;
            }
        }
        debt
    }

    /// Debt level below which compactions are slowed
    ///
    /// One flush adds a memtable's worth of debt to every non-empty level on
    /// its way down, plus L0 itself.
    pub fn slowdown_threshold(&self, mem_table_size: u64) -> u64 {
        mem_table_size.saturating_mul(self.non_empty_levels() as u64 + 1)
    }

    /// Snapshot for the compaction pacer
    pub fn pacer_info(&self, mem_table_size: u64) -> CompactionPacerInfo {
        CompactionPacerInfo {
            slowdown_threshold: self.slowdown_threshold(mem_table_size),
            total_compaction_debt: self.estimated_compaction_debt(),
        }
    }
}

impl From<Vec<u64>> for LevelSizes {
    fn from(sizes: Vec<u64>) -> Self {
        Self::new(sizes)
    }
}

//! Kernel row cache
//!
//! The SMO solver repeatedly needs whole rows of the training kernel matrix
//! (K(i, 0..n)) when updating its error cache. Rows are cached in an LRU so
//! revisited working-set variables do not recompute their kernel row.

use crate::core::SparseVector;
use crate::kernel::Kernel;
use lru::LruCache;
use std::num::NonZeroUsize;

/// LRU cache of training kernel matrix rows
pub struct KernelRowCache {
    cache: LruCache<usize, Vec<f64>>,
    hits: u64,
    misses: u64,
}

impl KernelRowCache {
    /// Create a cache holding up to `capacity` rows
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Create a cache sized from a memory budget in bytes
    ///
    /// Each cached row of an n-sample problem costs roughly 8 * n bytes.
    pub fn with_memory_limit(memory_bytes: usize, n_samples: usize) -> Self {
        let row_bytes = (8 * n_samples).max(1);
        Self::new((memory_bytes / row_bytes).max(1))
    }

    /// Kernel row K(i, 0..n), computed on miss and cloned out of the cache
    pub fn row(&mut self, i: usize, kernel: &dyn Kernel, rows: &[SparseVector]) -> Vec<f64> {
        if let Some(row) = self.cache.get(&i) {
            self.hits += 1;
            return row.clone();
        }

        self.misses += 1;
        let row: Vec<f64> = rows.iter().map(|r| kernel.compute(&rows[i], r)).collect();
        self.cache.put(i, row.clone());
        row
    }

    /// Cache hit rate over all lookups so far
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Hit/miss/occupancy counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity: self.cache.cap().get(),
            size: self.cache.len(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::LinearKernel;

    fn rows() -> Vec<SparseVector> {
        vec![
            SparseVector::new(vec![0], vec![1.0]),
            SparseVector::new(vec![0], vec![2.0]),
            SparseVector::new(vec![0], vec![3.0]),
        ]
    }

    #[test]
    fn test_row_values() {
        let kernel = LinearKernel::new();
        let rows = rows();
        let mut cache = KernelRowCache::new(4);

        assert_eq!(cache.row(1, &kernel, &rows), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_hit_and_miss_accounting() {
        let kernel = LinearKernel::new();
        let rows = rows();
        let mut cache = KernelRowCache::new(4);

        cache.row(0, &kernel, &rows);
        cache.row(0, &kernel, &rows);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(cache.hit_rate(), 0.5);
    }

    #[test]
    fn test_lru_eviction() {
        let kernel = LinearKernel::new();
        let rows = rows();
        let mut cache = KernelRowCache::new(1);

        cache.row(0, &kernel, &rows);
        cache.row(1, &kernel, &rows); // evicts row 0
        cache.row(0, &kernel, &rows);

        assert_eq!(cache.stats().misses, 3);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_memory_limit_sizing() {
        let cache = KernelRowCache::with_memory_limit(8 * 3 * 10, 3);
        assert_eq!(cache.stats().capacity, 10);

        // Always at least one row, even under a tiny budget
        let tiny = KernelRowCache::with_memory_limit(1, 1000);
        assert_eq!(tiny.stats().capacity, 1);
    }
}

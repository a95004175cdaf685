use std::collections::VecDeque;

use alloy::primitives::B256;

/// Bounded most-recently-used store of `(height, hash)` pairs.
///
/// Scoped to a single follow-loop run: populated as blocks are fetched, evicted oldest
/// first on capacity pressure, dropped when the loop returns. A capacity of `0` disables
/// storage and with it reorg detection.
#[derive(Debug)]
pub(crate) struct BlockCache {
    inner: VecDeque<(u64, B256)>,
    capacity: usize,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self { inner: VecDeque::with_capacity(capacity.min(4096)), capacity }
    }

    /// Returns the hash last observed at `number`, if still cached.
    pub fn get(&self, number: u64) -> Option<B256> {
        // Heights arrive mostly in increasing order, so scan from the newest end.
        self.inner.iter().rev().find(|(n, _)| *n == number).map(|(_, h)| *h)
    }

    pub fn insert(&mut self, number: u64, hash: B256) {
        if self.capacity == 0 {
            return;
        }
        if self.inner.len() == self.capacity {
            self.inner.pop_front();
        }
        self.inner.push_back((number, hash));
    }

    /// Drops every entry at height `number` and above.
    pub fn purge_from(&mut self, number: u64) {
        self.inner.retain(|(n, _)| *n < number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    const H1: B256 = b256!("0x1111111111111111111111111111111111111111111111111111111111111111");
    const H2: B256 = b256!("0x2222222222222222222222222222222222222222222222222222222222222222");

    #[test]
    fn zero_capacity_ignores_inserts() {
        let mut cache = BlockCache::new(0);
        cache.insert(1, H1);
        assert_eq!(cache.get(1), None);
    }

    #[test]
    fn evicts_oldest_on_capacity_pressure() {
        let mut cache = BlockCache::new(2);
        cache.insert(1, H1);
        cache.insert(2, H2);
        cache.insert(3, H1);
        assert_eq!(cache.get(1), None);
        assert_eq!(cache.get(2), Some(H2));
        assert_eq!(cache.get(3), Some(H1));
    }

    #[test]
    fn purge_drops_height_and_above() {
        let mut cache = BlockCache::new(8);
        cache.insert(1, H1);
        cache.insert(2, H2);
        cache.insert(3, H1);
        cache.purge_from(2);
        assert_eq!(cache.get(1), Some(H1));
        assert_eq!(cache.get(2), None);
        assert_eq!(cache.get(3), None);
    }
}

use lwd_proto::types::{ChainMetadata, CompactBlock};
use proptest::prelude::*;

fn block(height: u64, hash: u8, prev_hash: u8) -> CompactBlock {
    CompactBlock {
        height,
        hash: vec![hash; 32],
        prev_hash: vec![prev_hash; 32],
        time: height as u32,
        chain_metadata: Some(ChainMetadata {
            sapling_commitment_tree_size: 0,
            orchard_commitment_tree_size: 0,
        }),
        txs: vec![],
    }
}

proptest! {
    /// Invariant 2 from the design notes: for every height appended in
    /// order, `get(h).prev_hash == get(h - 1).hash`.
    #[test]
    fn chained_appends_preserve_prev_hash_linkage(n in 1usize..40, first in 0u64..1000) {
        let dir = tempfile::tempdir().unwrap();
        let cache = lwd_cache::BlockCache::open(dir.path(), "chain", first, None).unwrap();
        for i in 0..n {
            let h = first + i as u64;
            let hash = (i as u8).wrapping_add(1);
            let prev = i as u8;
            cache.append(h, &block(h, hash, prev)).unwrap();
        }
        for i in 1..n {
            let h = first + i as u64;
            let cur = cache.get(h).unwrap();
            let prev = cache.get(h - 1).unwrap();
            prop_assert_eq!(cur.prev_hash, prev.hash);
        }
        prop_assert_eq!(cache.latest_height(), (first + n as u64 - 1) as i64);
    }

    /// Invariant 3: after `reorg(t)`, heights >= t are gone and heights
    /// below t are untouched.
    #[test]
    fn reorg_truncates_exactly_at_boundary(n in 2usize..40, cut in 0usize..40) {
        let dir = tempfile::tempdir().unwrap();
        let cache = lwd_cache::BlockCache::open(dir.path(), "chain", 0, None).unwrap();
        for i in 0..n {
            cache.append(i as u64, &block(i as u64, i as u8, i.wrapping_sub(1) as u8)).unwrap();
        }
        let cut = cut.min(n);
        let before: Vec<_> = (0..cut as u64).map(|h| cache.get(h)).collect();

        cache.reorg(cut as u64).unwrap();

        for h in 0..cut as u64 {
            prop_assert_eq!(cache.get(h), before[h as usize].clone());
        }
        for h in cut as u64..n as u64 {
            prop_assert!(cache.get(h).is_none());
        }
        prop_assert_eq!(cache.next_block(), cut as u64);
    }
}


// splitmix64 finalizer
#[inline]
pub fn hash_u64(mut v: u64) -> u64 {
    v ^= v >> 30;
    v = v.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    v ^= v >> 27;
    v = v.wrapping_mul(0x94d0_49bb_1331_11eb);
    v ^= v >> 31;
    v
}

/// Seed for a sample-space chunk. Must only ever be fed sample-space indices.
#[inline]
pub fn chunk_seed(seed: u64, x: i32, z: i32) -> u64 {
    let a = (x as u32 as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    let b = (z as u32 as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f);
    hash_u64(seed ^ a ^ b.rotate_left(32))
}

#[inline]
pub fn category_seed(chunk_seed: u64, index: usize) -> u64 {
    hash_u64(chunk_seed ^ (index as u64 + 1).wrapping_mul(0x85eb_ca6b_27d4_eb2f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet as HashSet;

    #[test]
    fn chunk_seed_is_stable() {
        assert_eq!(chunk_seed(7, 3, -4), chunk_seed(7, 3, -4));
    }

    #[test]
    fn nearby_chunks_get_distinct_seeds() {
        let mut seen = HashSet::default();
        for z in -8..=8 {
            for x in -8..=8 {
                assert!(seen.insert(chunk_seed(42, x, z)), "collision at ({x}, {z})");
            }
        }
    }

    #[test]
    fn global_seed_changes_everything() {
        assert_ne!(chunk_seed(1, 0, 0), chunk_seed(2, 0, 0));
        assert_ne!(category_seed(99, 0), category_seed(99, 1));
    }
}

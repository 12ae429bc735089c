//! Property tests for the block allocator's hard invariants.

use proptest::prelude::*;

use tessera::graphics::block_alloc::{Block, BlockAllocator};

const DOMAIN: u32 = 128;

/// One scripted step: try an allocation, then maybe free the oldest live
/// block.
type Step = (u32, u32, bool);

fn steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec((1u32..48, 1u32..48, any::<bool>()), 1..80)
}

fn replay(script: &[Step]) -> (Vec<Option<Block>>, Vec<Block>) {
    let mut alloc = BlockAllocator::new(DOMAIN);
    let mut results = Vec::new();
    let mut live: Vec<Block> = Vec::new();
    for &(w, h, free_one) in script {
        let block = alloc.alloc(w, h);
        results.push(block);
        if let Some(block) = block {
            live.push(block);
        }
        if free_one && !live.is_empty() {
            let victim = live.remove(0);
            alloc.free(victim.left, victim.top, victim.width, victim.height);
        }
    }
    (results, live)
}

proptest! {
    #[test]
    fn identical_scripts_yield_identical_blocks(script in steps()) {
        let (first, _) = replay(&script);
        let (second, _) = replay(&script);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn live_blocks_never_overlap(script in steps()) {
        let (_, live) = replay(&script);
        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                prop_assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn blocks_stay_inside_the_domain(script in steps()) {
        let (results, _) = replay(&script);
        for block in results.into_iter().flatten() {
            prop_assert!(block.right() <= DOMAIN);
            prop_assert!(block.bottom() <= DOMAIN);
        }
    }

    #[test]
    fn freed_space_is_immediately_reusable(
        w in 1u32..DOMAIN,
        h in 1u32..DOMAIN,
        shrink_w in 0u32..16,
        shrink_h in 0u32..16,
    ) {
        let mut alloc = BlockAllocator::new(DOMAIN);
        let block = alloc.alloc(w, h).unwrap();
        alloc.free(block.left, block.top, block.width, block.height);

        let w2 = (w - shrink_w.min(w - 1)).max(1);
        let h2 = (h - shrink_h.min(h - 1)).max(1);
        let reused = alloc.alloc(w2, h2);
        prop_assert!(reused.is_some(), "same-or-smaller realloc must succeed");
        prop_assert_eq!(reused.unwrap().left, block.left);
        prop_assert_eq!(reused.unwrap().top, block.top);
    }
}

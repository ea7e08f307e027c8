//! Forward move counting and immediate terminal detection (spec.md
//! §4.E): the first pass over every index, run before any futurebase or
//! intra-table propagation.

use std::collections::HashSet;

use tbgen_core::{count_forward_moves, futuremove_ids, index_to_local, Entry, ForwardOutcome, MobileList};

/// Initializes one index's entry. Returns the entry plus, when the
/// position is legal and has futuremoves, the set of possible
/// futuremove ids (spec.md §4.H's `possible_futuremoves`, consumed by
/// the futurebase commit pass to detect unhandled/double-handled
/// futuremoves).
pub fn initialize_index(
    mobiles: &MobileList,
    index: u64,
    promotion_possibilities: u8,
) -> (Entry, HashSet<u32>) {
    let local = match index_to_local(mobiles, index) {
        Ok(local) => local,
        Err(_) => return (Entry::illegal(), HashSet::new()),
    };

    match count_forward_moves(mobiles, &local, promotion_possibilities) {
        ForwardOutcome::KingCaptured => (Entry::immediate_mate(), HashSet::new()),
        ForwardOutcome::Stalemate => (Entry::stalemate(), HashSet::new()),
        ForwardOutcome::Counted { movecnt, futuremove_cnt } => {
            let possible = if futuremove_cnt > 0 {
                futuremove_ids(mobiles, &local, promotion_possibilities)
                    .into_iter()
                    .collect()
            } else {
                HashSet::new()
            };
            (Entry::unresolved(movecnt, futuremove_cnt), possible)
        }
    }
}

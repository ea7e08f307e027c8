//! Intra-table back-propagation (spec.md §4.G): once every futurebase
//! has been folded in, sweep the table in increasing mate distance,
//! reconstruct the quiet-move predecessors of every index just resolved
//! at that distance, and feed them the same win/loss transfer the
//! futurebase pass uses. Unlike §4.F, both ends of this edge live in the
//! same indexed array already held in memory, so this writes
//! [`EntryStore`] directly rather than routing through a [`Proptable`] —
//! the proptable's value is in turning *cross-file* random access into a
//! sequential pass, which doesn't apply here.

use tbgen_core::{
    backward_quiet_destinations, index_to_local, local_to_index, Entry, EntryStore, MobileList,
    UNKNOWN_MATE_IN,
};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationStats {
    pub positions_resolved: u64,
    pub edges_applied: u64,
    pub sweeps: u32,
}

/// Runs every sweep of spec.md §4.G to a fixed point: increasing
/// `target_dtm` from 0, propagating every `NEEDS_PROPAGATION` entry
/// whose `mate_in == target_dtm` to its quiet-move predecessors, until a
/// full sweep makes no progress past the highest `mate_in` observed so
/// far.
pub fn propagate_intra_table(
    mobiles: &MobileList,
    store: &EntryStore,
    stalemate_count: u8,
) -> PropagationStats {
    let max_index = tbgen_core::max_index(mobiles);
    let mut stats = PropagationStats::default();
    let mut target_dtm: u16 = 0;
    let mut ceiling: u16 = 0;

    loop {
        let mut progressed = false;
        for index in 0..max_index {
            let mut entry = store.get(index);
            if !entry.needs_propagation() || entry.mate_in as u16 != target_dtm {
                continue;
            }
            progressed = true;
            stats.positions_resolved += 1;
            propagate_one(mobiles, store, index, &entry, stalemate_count, &mut stats, &mut ceiling);
            entry.mark_propagated();
            store.set(index, entry);
        }
        stats.sweeps += 1;
        if !progressed && target_dtm as u16 >= ceiling {
            break;
        }
        target_dtm += 1;
        if target_dtm == UNKNOWN_MATE_IN as u16 {
            break;
        }
    }

    stats
}

fn propagate_one(
    mobiles: &MobileList,
    store: &EntryStore,
    index: u64,
    entry: &Entry,
    stalemate_count: u8,
    stats: &mut PropagationStats,
    ceiling: &mut u16,
) {
    let Ok(local) = index_to_local(mobiles, index) else { return };
    let successor_side = local.side_to_move;
    let mate_in = entry.mate_in;
    let new_mate_in = mate_in.saturating_add(1);

    for mover_index in mobiles.indices_of_color(!successor_side) {
        for origin in backward_quiet_destinations(mobiles, &local, mover_index) {
            let mut predecessor_squares = local.squares;
            predecessor_squares[mover_index] = origin;
            let predecessor = match tbgen_core::LocalPosition::new(mobiles, !successor_side, predecessor_squares) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let predecessor_index = local_to_index(mobiles, &predecessor);

            let new_stalemate_cnt = entry.stalemate_cnt.saturating_add(1);
            let mut predecessor_entry = store.get(predecessor_index);
            if predecessor_entry.is_illegal() || predecessor_entry.is_stalemate() {
                continue;
            }

            if new_stalemate_cnt >= stalemate_count {
                // Too many reversible moves without progress: propagation
                // stops here rather than crediting either side with a
                // distance that crosses the fifty-move-style cap.
                continue;
            }

            // The successor's side to move is the predecessor's mover's
            // opponent. PTM_wins there means that opponent wins, so the
            // predecessor's quiet move was bad for its mover.
            // PNTM_wins there means the side NOT to move (the
            // predecessor's own mover) already wins, so the move was good.
            let result = if entry.is_ptm_wins() {
                predecessor_entry.apply_add_one_to_pntm_wins(new_mate_in, new_stalemate_cnt)
            } else {
                predecessor_entry.apply_ptm_wins(new_mate_in, new_stalemate_cnt)
            };
            if result.is_err() {
                // Conflict/AlreadyResolved: another edge already settled
                // this predecessor more favorably for it. MateInRegression:
                // the predecessor is already PROPAGATION_DONE and this
                // sweep's distance is no shorter than the one already
                // emitted for it. Either way, nothing to do.
                continue;
            }
            store.set(predecessor_index, predecessor_entry);
            stats.edges_applied += 1;
            if predecessor_entry.mate_in != UNKNOWN_MATE_IN {
                *ceiling = (*ceiling).max(predecessor_entry.mate_in as u16);
            }
        }
    }
}

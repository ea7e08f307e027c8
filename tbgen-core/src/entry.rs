//! The bit-packed per-index entry: `movecnt`, `mate_in`,
//! `stalemate_cnt`, `futuremove_cnt`, four bytes packed into one `u32` so
//! the store can update entries with a single atomic word op.

use std::fmt::Display;
use std::sync::atomic::{AtomicU32, Ordering};

pub const ILLEGAL: u8 = 255;
pub const PTM_WINS_PROPAGATION_DONE: u8 = 254;
pub const PNTM_WINS_PROPAGATION_DONE: u8 = 253;
pub const PTM_WINS_PROPAGATION_NEEDED: u8 = 252;
pub const PNTM_WINS_PROPAGATION_NEEDED: u8 = 0;
pub const STALEMATE: u8 = 251;
/// The highest `movecnt` an actual unresolved position can carry; 251 is
/// reserved for the stalemate sentinel, never produced by real counting
/// (no mobile-piece list this system supports can generate that many
/// pseudo-legal moves from one position).
pub const MAX_MOVECNT: u8 = 250;
pub const UNKNOWN_MATE_IN: u8 = 255;

/// Half-moves since the last irreversible move, capped at this before
/// propagation stops.
pub const STALEMATE_COUNT: u8 = 100;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Entry {
    pub movecnt: u8,
    pub mate_in: u8,
    pub stalemate_cnt: u8,
    pub futuremove_cnt: u8,
}

#[derive(Debug, PartialEq, Eq)]
pub enum EntryTransitionError {
    /// `PTM_wins` called on a position where PNTM already won, or vice
    /// versa: PTM-WINS states never regress to PNTM-WINS or vice versa.
    Conflict,
    /// `add_one_to_PNTM_wins` called on a position already fully
    /// resolved as PNTM-WINS (movecnt already at 0 or propagated).
    AlreadyResolved,
    /// `PTM_wins` called on a position already marked
    /// `PTM_WINS_PROPAGATION_DONE` with a smaller `mate_in` than the one
    /// already recorded: every predecessor of a DONE entry has already
    /// been emitted at its current `mate_in`, so a later, shorter
    /// distance arriving for it can't be folded in without invalidating
    /// those emissions.
    MateInRegression { from: u8, to: u8 },
}

impl Display for EntryTransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict => write!(f, "PTM_wins applied to a position where PNTM already won"),
            Self::AlreadyResolved => {
                write!(f, "add_one_to_PNTM_wins applied to an already-won position")
            }
            Self::MateInRegression { from, to } => write!(
                f,
                "PTM_wins applied to an already-propagated position with a shorter mate_in ({from} -> {to})"
            ),
        }
    }
}
impl std::error::Error for EntryTransitionError {}

impl Entry {
    pub fn illegal() -> Self {
        Self {
            movecnt: ILLEGAL,
            mate_in: UNKNOWN_MATE_IN,
            stalemate_cnt: 0,
            futuremove_cnt: 0,
        }
    }

    pub fn stalemate() -> Self {
        Self {
            movecnt: STALEMATE,
            mate_in: UNKNOWN_MATE_IN,
            stalemate_cnt: 0,
            futuremove_cnt: 0,
        }
    }

    pub fn unresolved(movecnt: u8, futuremove_cnt: u8) -> Self {
        debug_assert!(movecnt >= 1 && movecnt <= MAX_MOVECNT);
        Self {
            movecnt,
            mate_in: UNKNOWN_MATE_IN,
            stalemate_cnt: 0,
            futuremove_cnt,
        }
    }

    /// Checkmate detected during initialization: PTM has already won
    /// with `mate_in = 0`.
    pub fn immediate_mate() -> Self {
        Self {
            movecnt: PTM_WINS_PROPAGATION_NEEDED,
            mate_in: 0,
            stalemate_cnt: 0,
            futuremove_cnt: 0,
        }
    }

    pub fn is_illegal(&self) -> bool {
        self.movecnt == ILLEGAL
    }

    pub fn is_stalemate(&self) -> bool {
        self.movecnt == STALEMATE
    }

    pub fn is_ptm_wins(&self) -> bool {
        matches!(self.movecnt, PTM_WINS_PROPAGATION_NEEDED | PTM_WINS_PROPAGATION_DONE)
    }

    pub fn is_pntm_wins(&self) -> bool {
        matches!(self.movecnt, PNTM_WINS_PROPAGATION_NEEDED | PNTM_WINS_PROPAGATION_DONE)
    }

    pub fn needs_propagation(&self) -> bool {
        matches!(self.movecnt, PTM_WINS_PROPAGATION_NEEDED | PNTM_WINS_PROPAGATION_NEEDED)
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self.movecnt, 1..=MAX_MOVECNT)
    }

    /// §4.G step 1: once a WINS-needed entry's predecessors have all
    /// been emitted, it becomes WINS-done.
    pub fn mark_propagated(&mut self) {
        match self.movecnt {
            PTM_WINS_PROPAGATION_NEEDED => self.movecnt = PTM_WINS_PROPAGATION_DONE,
            PNTM_WINS_PROPAGATION_NEEDED => self.movecnt = PNTM_WINS_PROPAGATION_DONE,
            _ => {}
        }
    }

    /// The move that just arrived here wins for PTM (`PTM_wins`). Never
    /// regresses an already-PTM-WINS `mate_in` upward; takes the smaller
    /// distance. A position already marked `PTM_WINS_PROPAGATION_DONE`
    /// is finalized: its own predecessors have already been emitted at
    /// its current `mate_in`, so this never mutates it, and a shorter
    /// distance arriving this late is a [`EntryTransitionError::MateInRegression`]
    /// rather than a silent update.
    pub fn apply_ptm_wins(
        &mut self,
        mate_in: u8,
        stalemate_cnt: u8,
    ) -> Result<(), EntryTransitionError> {
        if self.is_pntm_wins() {
            return Err(EntryTransitionError::Conflict);
        }
        if self.movecnt == PTM_WINS_PROPAGATION_DONE {
            if self.mate_in != UNKNOWN_MATE_IN && mate_in < self.mate_in {
                return Err(EntryTransitionError::MateInRegression { from: self.mate_in, to: mate_in });
            }
            return Ok(());
        }
        if self.movecnt == PTM_WINS_PROPAGATION_NEEDED {
            if self.mate_in == UNKNOWN_MATE_IN || mate_in < self.mate_in {
                self.mate_in = mate_in;
                self.stalemate_cnt = stalemate_cnt;
            }
            return Ok(());
        }
        self.movecnt = PTM_WINS_PROPAGATION_NEEDED;
        self.mate_in = mate_in;
        self.stalemate_cnt = stalemate_cnt;
        Ok(())
    }

    /// One more of this position's forward moves has been shown to lose
    /// for PTM (`add_one_to_PNTM_wins`). Decrements `movecnt`; flips to
    /// PNTM-WINS-needed only once every move has been accounted for.
    /// PNTM (who is losing no matter what) always delays as long as
    /// possible, so `mate_in` tracks the *running maximum* across every
    /// move seen so far, not just the value in effect when `movecnt`
    /// finally reaches zero.
    pub fn apply_add_one_to_pntm_wins(
        &mut self,
        mate_in: u8,
        stalemate_cnt: u8,
    ) -> Result<(), EntryTransitionError> {
        if self.is_ptm_wins() {
            // PTM already has a winning reply elsewhere; this losing
            // move for PTM doesn't change that.
            return Ok(());
        }
        if !self.is_unresolved() {
            return Err(EntryTransitionError::AlreadyResolved);
        }
        self.movecnt -= 1;
        if self.mate_in == UNKNOWN_MATE_IN || mate_in > self.mate_in {
            self.mate_in = mate_in;
            self.stalemate_cnt = stalemate_cnt;
        }
        if self.movecnt == 0 {
            self.movecnt = PNTM_WINS_PROPAGATION_NEEDED;
        }
        Ok(())
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [self.movecnt, self.mate_in, self.stalemate_cnt, self.futuremove_cnt]
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            movecnt: bytes[0],
            mate_in: bytes[1],
            stalemate_cnt: bytes[2],
            futuremove_cnt: bytes[3],
        }
    }

    fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.to_bytes())
    }

    fn from_u32(word: u32) -> Self {
        Self::from_bytes(word.to_le_bytes())
    }
}

/// Flat array of `max_index(config)` entries, one atomic word each.
pub struct EntryStore {
    entries: Vec<AtomicU32>,
}

impl EntryStore {
    pub fn new(len: usize) -> Self {
        let mut entries = Vec::with_capacity(len);
        entries.resize_with(len, || AtomicU32::new(0));
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, index: u64) -> Entry {
        Entry::from_u32(self.entries[index as usize].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, index: u64, entry: Entry) {
        self.entries[index as usize].store(entry.to_u32(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ptm_wins_never_regresses_to_larger_mate_in() {
        let mut entry = Entry::unresolved(3, 0);
        entry.apply_ptm_wins(5, 1).unwrap();
        assert_eq!(entry.mate_in, 5);
        entry.apply_ptm_wins(3, 1).unwrap();
        assert_eq!(entry.mate_in, 3);
        entry.apply_ptm_wins(9, 1).unwrap();
        assert_eq!(entry.mate_in, 3);
    }

    #[test]
    fn ptm_wins_conflicts_with_pntm_wins() {
        let mut entry = Entry {
            movecnt: PNTM_WINS_PROPAGATION_NEEDED,
            mate_in: 4,
            stalemate_cnt: 0,
            futuremove_cnt: 0,
        };
        assert_eq!(
            entry.apply_ptm_wins(1, 0),
            Err(EntryTransitionError::Conflict)
        );
    }

    #[test]
    fn ptm_wins_on_a_done_entry_ignores_a_longer_mate_in_and_rejects_a_shorter_one() {
        let mut entry = Entry {
            movecnt: PTM_WINS_PROPAGATION_DONE,
            mate_in: 4,
            stalemate_cnt: 1,
            futuremove_cnt: 0,
        };
        entry.apply_ptm_wins(9, 2).unwrap();
        assert_eq!(entry.mate_in, 4, "a DONE entry never mutates on a later, longer distance");

        assert_eq!(
            entry.apply_ptm_wins(2, 0),
            Err(EntryTransitionError::MateInRegression { from: 4, to: 2 })
        );
        assert_eq!(entry.mate_in, 4, "a rejected regression leaves the entry untouched");
    }

    #[test]
    fn pntm_wins_takes_the_larger_mate_in_and_flips_at_zero() {
        let mut entry = Entry::unresolved(2, 0);
        entry.apply_add_one_to_pntm_wins(3, 1).unwrap();
        assert!(entry.is_unresolved());
        assert_eq!(entry.mate_in, 3);
        entry.apply_add_one_to_pntm_wins(7, 2).unwrap();
        assert!(entry.is_pntm_wins());
        assert_eq!(entry.mate_in, 7);
        assert_eq!(entry.stalemate_cnt, 2);
    }

    #[test]
    fn pntm_wins_noop_if_ptm_already_won() {
        let mut entry = Entry {
            movecnt: PTM_WINS_PROPAGATION_DONE,
            mate_in: 2,
            stalemate_cnt: 0,
            futuremove_cnt: 0,
        };
        entry.apply_add_one_to_pntm_wins(9, 9).unwrap();
        assert_eq!(entry.mate_in, 2);
    }

    #[test]
    fn store_round_trips_through_atomic_word() {
        let store = EntryStore::new(4);
        let entry = Entry::unresolved(7, 2);
        store.set(2, entry);
        assert_eq!(store.get(2), entry);
        assert_eq!(store.get(0), Entry::default());
    }
}

//! Process-init data with no run-time parameters: per-square knight/king
//! attack masks (generated by `build.rs`, the way `cheers_pregen` generates
//! its magic-bitboard tables) and the small static tables describing how
//! piece kinds print and which kinds a pawn may promote into.

mod knight_king_tables;

pub use knight_king_tables::{KING_TABLE, KNIGHT_TABLE};

use tbgen_bitboard::{BitBoard, Square};

#[inline(always)]
pub fn lookup_knight(square: Square) -> BitBoard {
    BitBoard(KNIGHT_TABLE[*square as usize])
}

#[inline(always)]
pub fn lookup_king(square: Square) -> BitBoard {
    BitBoard(KING_TABLE[*square as usize])
}

/// All promotion kinds a pawn may become, ordered so the default
/// `PROMOTION_POSSIBILITIES = 3` (spec.md §9) keeps queen/rook/knight and
/// a 4-possibility configuration adds bishop.
pub const PROMOTION_KINDS: [&str; 4] = ["queen", "rook", "knight", "bishop"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knight_table_is_symmetric() {
        // if a -> b is a knight move then b -> a is too
        for from in 0u8..64 {
            let targets = lookup_knight(Square::from(from));
            for to in targets {
                let back = lookup_knight(to);
                assert!(back.contains(Square::from(from)));
            }
        }
    }

    #[test]
    fn king_table_has_no_wraparound() {
        for from in 0u8..64 {
            let square = Square::from(from);
            for to in lookup_king(square) {
                let file_delta = (to.file() as i8 - square.file() as i8).abs();
                let rank_delta = (to.rank() as i8 - square.rank() as i8).abs();
                assert!(file_delta <= 1 && rank_delta <= 1);
            }
        }
    }
}

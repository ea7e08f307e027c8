//! The position <-> index bijection: deliberately
//! unminimized "naive" indexing, `side | sq[0] << 1 | sq[1] << 7 | ...`,
//! so `max_index = 2 * 64^N` for N mobiles. Illegal positions exist in
//! the index space and are caught here (collisions, pawn back-ranks) or
//! later by the initializer (king left en prise).

use tbgen_bitboard::Square;

use crate::position::{DecodeError, GlobalPosition, LocalPosition};
use crate::types::{MobileList, Side, MAX_MOBILES};

const SQUARE_BITS: u32 = 6;

pub fn max_index(mobiles: &MobileList) -> u64 {
    2u64 * 64u64.pow(mobiles.len() as u32)
}

pub fn local_to_index(mobiles: &MobileList, pos: &LocalPosition) -> u64 {
    let mut index = pos.side_to_move as u64;
    for i in 0..mobiles.len() {
        let sq = *pos.squares[i] as u64;
        index |= sq << (1 + SQUARE_BITS * i as u32);
    }
    index
}

/// Fails (returns `DecodeError`) for index values that decode to square
/// collisions or pawns outside rows 1..6. Validity beyond that (e.g. a
/// side-not-to-move in check) is the initializer's job.
pub fn index_to_local(mobiles: &MobileList, index: u64) -> Result<LocalPosition, DecodeError> {
    let side_to_move = if index & 1 == 0 { Side::White } else { Side::Black };
    let mut squares = [Square::NULL; MAX_MOBILES];
    for i in 0..mobiles.len() {
        let raw = (index >> (1 + SQUARE_BITS * i as u32)) & 0x3f;
        squares[i] = Square::from(raw as u8);
    }
    LocalPosition::new(mobiles, side_to_move, squares)
}

pub fn index_to_global(mobiles: &MobileList, index: u64) -> Result<GlobalPosition, DecodeError> {
    let local = index_to_local(mobiles, index)?;
    let en_passant = en_passant_square(mobiles, &local);
    Ok(crate::position::local_to_global(mobiles, &local, en_passant))
}

/// Derives the FEN-style en-passant target square from any `PawnEp`
/// mobile present: one square behind it, in the direction it arrived
/// from.
fn en_passant_square(mobiles: &MobileList, pos: &LocalPosition) -> Option<Square> {
    use crate::types::PieceKind;
    for (i, color, kind) in mobiles.iter() {
        if kind != PieceKind::PawnEp {
            continue;
        }
        let square = pos.squares[i];
        if square == Square::NULL {
            continue;
        }
        let dir = match color {
            Side::White => -1i8,
            Side::Black => 1i8,
        };
        return square.try_offset(0, dir);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PieceKind::*;
    use crate::types::Side::*;

    fn kr_vs_k() -> MobileList {
        MobileList::new(vec![(White, King), (Black, King), (White, Rook)]).unwrap()
    }

    #[test]
    fn round_trips_for_every_legal_index() {
        let mobiles = kr_vs_k();
        let mut checked = 0;
        for index in 0..max_index(&mobiles) {
            if let Ok(local) = index_to_local(&mobiles, index) {
                assert_eq!(local_to_index(&mobiles, &local), index);
                checked += 1;
            }
        }
        assert!(checked > 0);
    }

    #[test]
    fn pawn_on_rank_one_or_eight_fails() {
        let mobiles = MobileList::new(vec![(White, King), (Black, King), (White, Pawn)]).unwrap();
        // side=0, wk=a1(0), bk=a8(56), pawn=a1(0) -> collision, try a distinct illegal pawn square instead
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("h8");
        squares[2] = Square::from_coord("d8"); // rank 7 -> illegal for a pawn
        let index = {
            let mut idx = 0u64; // white to move
            for i in 0..mobiles.len() {
                idx |= (*squares[i] as u64) << (1 + 6 * i as u64);
            }
            idx
        };
        assert_eq!(
            index_to_local(&mobiles, index),
            Err(DecodeError::PawnOnBackRank)
        );
    }

    #[test]
    fn max_index_matches_naive_formula() {
        let mobiles = kr_vs_k();
        assert_eq!(max_index(&mobiles), 2 * 64u64.pow(3));
    }
}

//! Local (index-tied) and global (portable) position representations,
//! and the conversions between them (spec.md §4.B).

use std::fmt::Display;

use tbgen_bitboard::{BitBoard, Square};

use crate::types::{MobileList, PieceKind, Side, MAX_MOBILES};

/// `(side-to-move, per-mobile square[MAX_MOBILES])` plus the three
/// derived occupancy masks. The mobile list that gives squares[i] a
/// piece kind lives in the `Configuration`, not here — a `LocalPosition`
/// is only meaningful alongside the `MobileList` it was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalPosition {
    pub side_to_move: Side,
    pub squares: [Square; MAX_MOBILES],
    pub occupancy: BitBoard,
    pub white: BitBoard,
    pub black: BitBoard,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    SquareCollision,
    PawnOnBackRank,
    PawnEpWrongRank,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::SquareCollision => "two mobile pieces occupy the same square",
                Self::PawnOnBackRank => "a pawn occupies rank 0 or rank 7",
                Self::PawnEpWrongRank => "a PawnEp mobile occupies a rank other than the one its double push reaches",
            }
        )
    }
}
impl std::error::Error for DecodeError {}

impl LocalPosition {
    /// Validates §3's "blatant illegality" invariants (collisions, pawns
    /// off ranks 1..6) and derives the occupancy masks. Anything subtler
    /// (e.g. a king left in check) is left for the initializer to mark
    /// ILLEGAL lazily.
    pub fn new(
        mobiles: &MobileList,
        side_to_move: Side,
        squares: [Square; MAX_MOBILES],
    ) -> Result<Self, DecodeError> {
        let mut occupancy = BitBoard::empty();
        let mut white = BitBoard::empty();
        let mut black = BitBoard::empty();

        for (i, color, kind) in mobiles.iter() {
            let square = squares[i];
            if square == Square::NULL {
                continue;
            }
            if occupancy.contains(square) {
                return Err(DecodeError::SquareCollision);
            }
            if kind.is_pawn() && (square.rank() == 0 || square.rank() == 7) {
                return Err(DecodeError::PawnOnBackRank);
            }
            if kind == PieceKind::PawnEp && square.rank() != PieceKind::pawn_ep_rank(color) as usize {
                return Err(DecodeError::PawnEpWrongRank);
            }
            occupancy.set(square);
            match color {
                Side::White => white.set(square),
                Side::Black => black.set(square),
            }
        }

        Ok(Self {
            side_to_move,
            squares,
            occupancy,
            white,
            black,
        })
    }

    pub fn color_mask(&self, side: Side) -> BitBoard {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }
}

/// Portable 64-square board used only to translate between tablebases
/// with different mobile lists. `' '` for empty, otherwise a FEN letter
/// (uppercase = white).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalPosition {
    pub board: [u8; 64],
    pub side_to_move: Side,
    pub en_passant: Option<Square>,
}

impl GlobalPosition {
    pub fn empty(side_to_move: Side) -> Self {
        Self {
            board: [b' '; 64],
            side_to_move,
            en_passant: None,
        }
    }

    fn letter(color: Side, kind: PieceKind) -> u8 {
        let letter = kind.letter() as u8;
        if color == Side::White {
            letter.to_ascii_uppercase()
        } else {
            letter
        }
    }

    /// Exchanges cases and reflects the board around the horizontal
    /// centerline, preserving pawn legality (spec.md §4.B). Applying
    /// this twice is the identity.
    pub fn invert_colors(&self) -> Self {
        let mut board = [b' '; 64];
        for sq in 0u8..64 {
            let square = Square::from(sq);
            let mirrored = Square::from(((7 - square.rank()) * 8 + square.file()) as u8);
            let piece = self.board[sq as usize];
            board[*mirrored as usize] = match piece {
                b' ' => b' ',
                c if c.is_ascii_uppercase() => c.to_ascii_lowercase(),
                c => c.to_ascii_uppercase(),
            };
        }
        let en_passant = self.en_passant.map(|sq| {
            Square::from(((7 - sq.rank()) * 8 + sq.file()) as u8)
        });
        Self {
            board,
            side_to_move: !self.side_to_move,
            en_passant,
        }
    }
}

/// `local_to_global`: places each mobile piece's letter on the board.
/// §4.B's bijection is with the index space, not with the global board —
/// multiple locals (e.g. identical knights swapped) can map to the same
/// global position, which is fine: globals are only used to cross a
/// futurebase boundary.
pub fn local_to_global(mobiles: &MobileList, pos: &LocalPosition, en_passant: Option<Square>) -> GlobalPosition {
    let mut global = GlobalPosition::empty(pos.side_to_move);
    global.en_passant = en_passant;
    for (i, color, kind) in mobiles.iter() {
        let square = pos.squares[i];
        if square == Square::NULL {
            continue;
        }
        global.board[*square as usize] = GlobalPosition::letter(color, kind);
    }
    global
}

/// `global_to_local`: matches mobile kinds+colors to board letters in
/// mobile-list order. Leaves unmatched mobiles at `Square::NULL` — the
/// sentinel "not yet placed" the futurebase back-propagator fills in.
///
/// `GlobalPosition::letter` folds `PawnEp` to the same letter as an
/// ordinary pawn, so the board alone can never tell the two apart —
/// `global.en_passant` is what distinguishes them. A `PawnEp` mobile is
/// placed first, directly from that target square, and only then does
/// the generic letter search run for everything else (including plain
/// `Pawn` mobiles of the same color), so it can never steal the
/// en-passant pawn's square out from under the `PawnEp` mobile.
pub fn global_to_local(mobiles: &MobileList, global: &GlobalPosition) -> LocalPosition {
    let mut squares = [Square::NULL; MAX_MOBILES];
    let mut claimed = BitBoard::empty();

    for (i, color, kind) in mobiles.iter() {
        if kind != PieceKind::PawnEp {
            continue;
        }
        let Some(target) = global.en_passant else { continue };
        let dir = match color {
            Side::White => 1i8,
            Side::Black => -1i8,
        };
        let Some(square) = target.try_offset(0, dir) else { continue };
        if claimed.contains(square) || global.board[*square as usize] != GlobalPosition::letter(color, kind) {
            continue;
        }
        squares[i] = square;
        claimed.set(square);
    }

    for (i, color, kind) in mobiles.iter() {
        if kind == PieceKind::PawnEp {
            continue;
        }
        let wanted = GlobalPosition::letter(color, kind);
        let found = (0u8..64).find(|&sq| {
            !claimed.contains(Square::from(sq)) && global.board[sq as usize] == wanted
        });
        if let Some(sq) = found {
            let square = Square::from(sq);
            squares[i] = square;
            claimed.set(square);
        }
    }

    let mut occupancy = BitBoard::empty();
    let mut white = BitBoard::empty();
    let mut black = BitBoard::empty();
    for (i, color, _kind) in mobiles.iter() {
        let square = squares[i];
        if square == Square::NULL {
            continue;
        }
        occupancy.set(square);
        match color {
            Side::White => white.set(square),
            Side::Black => black.set(square),
        }
    }

    LocalPosition {
        side_to_move: global.side_to_move,
        squares,
        occupancy,
        white,
        black,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PieceKind::*;
    use crate::types::Side::*;

    fn kq_vs_k() -> MobileList {
        MobileList::new(vec![(White, King), (Black, King), (White, Queen)]).unwrap()
    }

    #[test]
    fn invert_colors_is_an_involution() {
        let mobiles = kq_vs_k();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("e1");
        squares[1] = Square::from_coord("e8");
        squares[2] = Square::from_coord("d4");
        let pos = LocalPosition::new(&mobiles, White, squares).unwrap();
        let global = local_to_global(&mobiles, &pos, None);

        let inverted_twice = global.invert_colors().invert_colors();
        assert_eq!(inverted_twice, global);
    }

    #[test]
    fn global_round_trip_for_fully_placed_mobiles() {
        let mobiles = kq_vs_k();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("h1");
        squares[1] = Square::from_coord("d3");
        squares[2] = Square::from_coord("g2");
        let pos = LocalPosition::new(&mobiles, Black, squares).unwrap();
        let global = local_to_global(&mobiles, &pos, None);
        let back = global_to_local(&mobiles, &global);
        assert_eq!(back.squares, pos.squares);
        assert_eq!(back.side_to_move, pos.side_to_move);
    }

    #[test]
    fn global_round_trip_distinguishes_pawn_ep_from_a_same_color_pawn() {
        // two white pawns on the board, letter 'P' either way: d4 just
        // double-pushed (PawnEp), f2 never moved (plain Pawn). Only
        // `global.en_passant` can tell `global_to_local` which is which.
        let mobiles =
            MobileList::new(vec![(White, King), (Black, King), (White, PawnEp), (White, Pawn)])
                .unwrap();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("a8");
        squares[2] = Square::from_coord("d4");
        squares[3] = Square::from_coord("f2");
        let pos = LocalPosition::new(&mobiles, Black, squares).unwrap();
        let en_passant = Some(Square::from_coord("d3"));
        let global = local_to_global(&mobiles, &pos, en_passant);
        assert_eq!(global.en_passant, en_passant);

        let back = global_to_local(&mobiles, &global);
        assert_eq!(back.squares[2], Square::from_coord("d4"));
        assert_eq!(back.squares[3], Square::from_coord("f2"));
    }

    #[test]
    fn collision_is_rejected() {
        let mobiles = kq_vs_k();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("e1");
        squares[1] = Square::from_coord("e8");
        squares[2] = Square::from_coord("e1");
        assert_eq!(
            LocalPosition::new(&mobiles, White, squares),
            Err(DecodeError::SquareCollision)
        );
    }

    #[test]
    fn pawn_on_back_rank_is_rejected() {
        let mobiles = MobileList::new(vec![(White, King), (Black, King), (White, Pawn)]).unwrap();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("a8");
        squares[2] = Square::from_coord("d8");
        assert_eq!(
            LocalPosition::new(&mobiles, White, squares),
            Err(DecodeError::PawnOnBackRank)
        );
    }

    #[test]
    fn pawn_ep_off_its_double_push_rank_is_rejected() {
        let mobiles = MobileList::new(vec![(White, King), (Black, King), (White, PawnEp)]).unwrap();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("a8");
        squares[2] = Square::from_coord("d5"); // rank 4, not rank 3 where a white double push lands
        assert_eq!(
            LocalPosition::new(&mobiles, White, squares),
            Err(DecodeError::PawnEpWrongRank)
        );
    }

    #[test]
    fn pawn_ep_on_its_double_push_rank_is_accepted() {
        let mobiles = MobileList::new(vec![(White, King), (Black, King), (Black, PawnEp)]).unwrap();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("a8");
        squares[2] = Square::from_coord("d5"); // rank 4: where a black double push lands
        assert!(LocalPosition::new(&mobiles, White, squares).is_ok());
    }
}

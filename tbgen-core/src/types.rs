use std::fmt::Display;

/// Maximum number of mobile pieces a configuration may declare
/// (spec.md §3: "An ordered list of at most 8 mobile pieces").
pub const MAX_MOBILES: usize = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    White = 0,
    Black = 1,
}

use self::Side::*;

impl std::ops::Not for Side {
    type Output = Self;
    fn not(self) -> Self::Output {
        match self {
            White => Black,
            Black => White,
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", if *self == White { "white" } else { "black" })
    }
}

/// Seven-valued piece kind. `PawnEp` is a pawn capturable en passant,
/// occupying rank 3 (white) or rank 4 (black), spec.md §9.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PieceKind {
    King = 0,
    Queen = 1,
    Rook = 2,
    Bishop = 3,
    Knight = 4,
    Pawn = 5,
    PawnEp = 6,
}

impl PieceKind {
    pub fn is_slider(self) -> bool {
        matches!(self, Self::Queen | Self::Rook | Self::Bishop)
    }

    pub fn is_pawn(self) -> bool {
        matches!(self, Self::Pawn | Self::PawnEp)
    }

    /// The rank a `PawnEp` mobile of `side` must occupy: the one a pawn
    /// reaches by a double push and nowhere else (spec.md §9).
    pub fn pawn_ep_rank(side: Side) -> u8 {
        match side {
            Side::White => 3,
            Side::Black => 4,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::King => 'k',
            Self::Queen => 'q',
            Self::Rook => 'r',
            Self::Bishop => 'b',
            Self::Knight => 'n',
            Self::Pawn | Self::PawnEp => 'p',
        }
    }
}

impl Display for PieceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::King => "king",
                Self::Queen => "queen",
                Self::Rook => "rook",
                Self::Bishop => "bishop",
                Self::Knight => "knight",
                Self::Pawn => "pawn",
                Self::PawnEp => "pawn-ep",
            }
        )
    }
}

/// The fixed, never-mutated list of mobile pieces a configuration
/// declares. Position 0 is always the white king, position 1 the black
/// king (spec.md §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MobileList {
    pieces: Vec<(Side, PieceKind)>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MobileListError {
    TooFew,
    TooMany,
    MissingWhiteKing,
    MissingBlackKing,
}

impl Display for MobileListError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::TooFew => "mobile list needs at least a white king and a black king",
                Self::TooMany => "mobile list exceeds MAX_MOBILES",
                Self::MissingWhiteKing => "position 0 of the mobile list must be the white king",
                Self::MissingBlackKing => "position 1 of the mobile list must be the black king",
            }
        )
    }
}
impl std::error::Error for MobileListError {}

impl MobileList {
    pub fn new(pieces: Vec<(Side, PieceKind)>) -> Result<Self, MobileListError> {
        if pieces.len() < 2 {
            return Err(MobileListError::TooFew);
        }
        if pieces.len() > MAX_MOBILES {
            return Err(MobileListError::TooMany);
        }
        if pieces[0] != (White, PieceKind::King) {
            return Err(MobileListError::MissingWhiteKing);
        }
        if pieces[1] != (Black, PieceKind::King) {
            return Err(MobileListError::MissingBlackKing);
        }
        Ok(Self { pieces })
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn kind(&self, i: usize) -> PieceKind {
        self.pieces[i].1
    }

    pub fn color(&self, i: usize) -> Side {
        self.pieces[i].0
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Side, PieceKind)> + '_ {
        self.pieces
            .iter()
            .enumerate()
            .map(|(i, &(c, k))| (i, c, k))
    }

    pub fn indices_of_color(&self, side: Side) -> impl Iterator<Item = usize> + '_ {
        self.pieces
            .iter()
            .enumerate()
            .filter(move |(_, &(c, _))| c == side)
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_kings() {
        assert_eq!(
            MobileList::new(vec![(White, PieceKind::King)]),
            Err(MobileListError::TooFew)
        );
        assert_eq!(
            MobileList::new(vec![(White, PieceKind::Queen), (Black, PieceKind::King)]),
            Err(MobileListError::MissingWhiteKing)
        );
    }

    #[test]
    fn accepts_kq_vs_k() {
        let list = MobileList::new(vec![
            (White, PieceKind::King),
            (Black, PieceKind::King),
            (White, PieceKind::Queen),
        ])
        .unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.kind(2), PieceKind::Queen);
    }
}

//! Precomputed movement rays. Every piece's reachable squares from every
//! origin are lazy lists ordered by distance and terminated by a
//! sentinel step whose mask always "hits" occupancy, so a caller can
//! walk a ray with a single loop:
//!
//! ```ignore
//! for step in lookup_tables().rays(piece, from) {
//!     if (step.mask.as_u64() & occupancy.as_u64()) != 0 {
//!         if !step.is_sentinel() { /* move or capture onto step.square */ }
//!         break;
//!     }
//!     /* step.square is a quiet move */
//! }
//! ```
//!
//! Built once, lazily, as a process-wide singleton — the tables never
//! change once computed, and every position evaluated in a run shares
//! the same one.

use std::sync::OnceLock;

use tbgen_bitboard::{BitBoard, Square};
use tbgen_pregen::{lookup_king, lookup_knight};

use crate::types::{PieceKind, Side};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RayStep {
    pub square: Square,
    pub mask: BitBoard,
}

impl RayStep {
    pub const SENTINEL: RayStep = RayStep {
        square: Square::NULL,
        mask: BitBoard(u64::MAX),
    };

    #[inline(always)]
    pub fn is_sentinel(&self) -> bool {
        self.square == Square::NULL
    }
}

fn step_for(square: Square) -> RayStep {
    RayStep {
        square,
        mask: square.bitboard(),
    }
}

const ROOK_OFFSETS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_OFFSETS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
const QUEEN_OFFSETS: [(i8, i8); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];
const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

/// Builds, for every origin square, one ray per direction offset: the
/// squares reachable walking that direction up to `max_steps` times,
/// terminated by the sentinel.
fn build_rays(offsets: &[(i8, i8)], max_steps: u8) -> Vec<Vec<Vec<RayStep>>> {
    (0u8..64)
        .map(|sq| {
            let origin = Square::from(sq);
            offsets
                .iter()
                .map(|&(df, dr)| {
                    let mut ray = Vec::new();
                    let mut cur = origin;
                    for _ in 0..max_steps {
                        match cur.try_offset(df, dr) {
                            Some(next) => {
                                ray.push(step_for(next));
                                cur = next;
                            }
                            None => break,
                        }
                    }
                    ray.push(RayStep::SENTINEL);
                    ray
                })
                .collect()
        })
        .collect()
}

fn pawn_push_ray(square: Square, side: Side) -> Vec<RayStep> {
    let rank = square.rank();
    // pawns never live on rank 0 or 7
    if rank == 0 || rank == 7 {
        return vec![RayStep::SENTINEL];
    }
    let (start_rank, dir) = match side {
        Side::White => (1usize, 1i8),
        Side::Black => (6usize, -1i8),
    };
    let mut ray = Vec::new();
    if let Some(one) = square.try_offset(0, dir) {
        ray.push(step_for(one));
        if rank == start_rank {
            if let Some(two) = square.try_offset(0, 2 * dir) {
                ray.push(step_for(two));
            }
        }
    }
    ray.push(RayStep::SENTINEL);
    ray
}

fn pawn_capture_dirs(square: Square, side: Side) -> Vec<Vec<RayStep>> {
    let rank = square.rank();
    if rank == 0 || rank == 7 {
        return Vec::new();
    }
    let dir = match side {
        Side::White => 1i8,
        Side::Black => -1i8,
    };
    [-1i8, 1i8]
        .into_iter()
        .filter_map(|df| square.try_offset(df, dir))
        .map(|target| vec![step_for(target), RayStep::SENTINEL])
        .collect()
}

/// The backward dual of [`pawn_push_ray`]: candidate squares a pawn
/// resting on `square` could have arrived from, ordered nearest-first so
/// the same occupied-square-halts-the-ray contract applies (a blocked
/// single-push square also rules out the double-push predecessor).
fn pawn_push_ray_backward(square: Square, side: Side) -> Vec<RayStep> {
    let rank = square.rank();
    if rank == 0 || rank == 7 {
        return vec![RayStep::SENTINEL];
    }
    // the rank a double-push *lands* on, for each side
    let (double_push_rank, dir) = match side {
        Side::White => (3usize, -1i8),
        Side::Black => (4usize, 1i8),
    };
    let mut ray = Vec::new();
    if let Some(one_back) = square.try_offset(0, dir) {
        if one_back.rank() >= 1 && one_back.rank() <= 6 {
            ray.push(step_for(one_back));
            if rank == double_push_rank {
                if let Some(two_back) = square.try_offset(0, 2 * dir) {
                    ray.push(step_for(two_back));
                }
            }
        }
    }
    ray.push(RayStep::SENTINEL);
    ray
}

fn pawn_capture_dirs_backward(square: Square, side: Side) -> Vec<Vec<RayStep>> {
    let rank = square.rank();
    if rank == 0 || rank == 7 {
        return Vec::new();
    }
    let dir = match side {
        Side::White => -1i8,
        Side::Black => 1i8,
    };
    [-1i8, 1i8]
        .into_iter()
        .filter_map(|df| square.try_offset(df, dir))
        .map(|target| vec![step_for(target), RayStep::SENTINEL])
        .collect()
}

pub struct MovementTables {
    knight: Vec<Vec<Vec<RayStep>>>,
    king: Vec<Vec<Vec<RayStep>>>,
    rook: Vec<Vec<Vec<RayStep>>>,
    bishop: Vec<Vec<Vec<RayStep>>>,
    queen: Vec<Vec<Vec<RayStep>>>,
    pawn_fwd: Vec<[Vec<RayStep>; 2]>,
    pawn_cap: Vec<[Vec<Vec<RayStep>>; 2]>,
    pawn_fwd_bkwd: Vec<[Vec<RayStep>; 2]>,
    pawn_cap_bkwd: Vec<[Vec<Vec<RayStep>>; 2]>,
}

impl MovementTables {
    fn generate() -> Self {
        let pawn_fwd = (0u8..64)
            .map(|sq| {
                let square = Square::from(sq);
                [
                    pawn_push_ray(square, Side::White),
                    pawn_push_ray(square, Side::Black),
                ]
            })
            .collect();
        let pawn_cap = (0u8..64)
            .map(|sq| {
                let square = Square::from(sq);
                [
                    pawn_capture_dirs(square, Side::White),
                    pawn_capture_dirs(square, Side::Black),
                ]
            })
            .collect();
        let pawn_fwd_bkwd = (0u8..64)
            .map(|sq| {
                let square = Square::from(sq);
                [
                    pawn_push_ray_backward(square, Side::White),
                    pawn_push_ray_backward(square, Side::Black),
                ]
            })
            .collect();
        let pawn_cap_bkwd = (0u8..64)
            .map(|sq| {
                let square = Square::from(sq);
                [
                    pawn_capture_dirs_backward(square, Side::White),
                    pawn_capture_dirs_backward(square, Side::Black),
                ]
            })
            .collect();

        Self {
            knight: build_rays(&KNIGHT_OFFSETS, 1),
            king: build_rays(&QUEEN_OFFSETS, 1),
            rook: build_rays(&ROOK_OFFSETS, 7),
            bishop: build_rays(&BISHOP_OFFSETS, 7),
            queen: build_rays(&QUEEN_OFFSETS, 7),
            pawn_fwd,
            pawn_cap,
            pawn_fwd_bkwd,
            pawn_cap_bkwd,
        }
    }

    /// Rays for a non-pawn piece. Backward enumeration (reconstructing a
    /// predecessor from a destination square during propagation) reuses
    /// this same table from the destination square: the offset
    /// set for every non-pawn piece is symmetric, so the reverse of a
    /// move already appears among the destination's own rays.
    pub fn rays(&self, piece: PieceKind, square: Square) -> &[Vec<RayStep>] {
        let sq = *square as usize;
        match piece {
            PieceKind::Knight => &self.knight[sq],
            PieceKind::King => &self.king[sq],
            PieceKind::Rook => &self.rook[sq],
            PieceKind::Bishop => &self.bishop[sq],
            PieceKind::Queen => &self.queen[sq],
            PieceKind::Pawn | PieceKind::PawnEp => {
                panic!("rays() does not cover pawns, use pawn_fwd/pawn_cap")
            }
        }
    }

    pub fn pawn_fwd(&self, square: Square, side: Side) -> &[RayStep] {
        &self.pawn_fwd[*square as usize][side as usize]
    }

    pub fn pawn_cap(&self, square: Square, side: Side) -> &[Vec<RayStep>] {
        &self.pawn_cap[*square as usize][side as usize]
    }

    pub fn pawn_fwd_bkwd(&self, square: Square, side: Side) -> &[RayStep] {
        &self.pawn_fwd_bkwd[*square as usize][side as usize]
    }

    pub fn pawn_cap_bkwd(&self, square: Square, side: Side) -> &[Vec<RayStep>] {
        &self.pawn_cap_bkwd[*square as usize][side as usize]
    }

    /// Self-test: for every non-pawn (piece, A, B), if A -> B is
    /// enumerated then B -> A is enumerated in some direction;
    /// no direction ever re-enumerates the same target; the sentinel
    /// always carries the all-ones mask. For pawns, the four table
    /// variants are checked pairwise.
    pub fn self_test(&self) -> Result<(), SelfTestError> {
        for &piece in &[
            PieceKind::Knight,
            PieceKind::King,
            PieceKind::Rook,
            PieceKind::Bishop,
            PieceKind::Queen,
        ] {
            for sq in 0u8..64 {
                let origin = Square::from(sq);
                let mut seen = std::collections::HashSet::new();
                for dir in self.rays(piece, origin) {
                    if dir.last() != Some(&RayStep::SENTINEL) {
                        return Err(SelfTestError::MissingSentinel(piece, origin));
                    }
                    for step in dir.iter().filter(|s| !s.is_sentinel()) {
                        if !seen.insert(step.square) {
                            return Err(SelfTestError::DuplicateTarget(piece, origin, step.square));
                        }
                        let reverse = self.rays(piece, step.square);
                        let reachable = reverse
                            .iter()
                            .flat_map(|d| d.iter())
                            .any(|s| s.square == origin);
                        if !reachable {
                            return Err(SelfTestError::NotReversible(piece, origin, step.square));
                        }
                    }
                }
            }
        }

        for side in [Side::White, Side::Black] {
            for sq in 0u8..64 {
                let square = Square::from(sq);
                for target in self
                    .pawn_fwd(square, side)
                    .iter()
                    .filter(|s| !s.is_sentinel())
                {
                    let back = self.pawn_fwd_bkwd(target.square, side);
                    if !back.iter().any(|s| s.square == square) {
                        return Err(SelfTestError::PawnPairMismatch(square, target.square));
                    }
                }
                for target in self
                    .pawn_cap(square, side)
                    .iter()
                    .flat_map(|d| d.iter())
                    .filter(|s| !s.is_sentinel())
                {
                    let back = self.pawn_cap_bkwd(target.square, side);
                    if !back.iter().flat_map(|d| d.iter()).any(|s| s.square == square) {
                        return Err(SelfTestError::PawnPairMismatch(square, target.square));
                    }
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum SelfTestError {
    MissingSentinel(PieceKind, Square),
    DuplicateTarget(PieceKind, Square, Square),
    NotReversible(PieceKind, Square, Square),
    PawnPairMismatch(Square, Square),
}

impl std::fmt::Display for SelfTestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSentinel(piece, sq) => {
                write!(f, "{piece} ray from {} is missing its sentinel", sq.coord())
            }
            Self::DuplicateTarget(piece, from, to) => write!(
                f,
                "{piece} from {} reaches {} in more than one direction",
                from.coord(),
                to.coord()
            ),
            Self::NotReversible(piece, from, to) => write!(
                f,
                "{piece} move {}->{} has no reverse in {}'s rays",
                from.coord(),
                to.coord(),
                to.coord()
            ),
            Self::PawnPairMismatch(from, to) => write!(
                f,
                "pawn move {}->{} has no matching backward table entry",
                from.coord(),
                to.coord()
            ),
        }
    }
}
impl std::error::Error for SelfTestError {}

static TABLES: OnceLock<MovementTables> = OnceLock::new();

/// Process-wide lazily-initialized singleton owning the movement rays.
pub fn movement_tables() -> &'static MovementTables {
    TABLES.get_or_init(MovementTables::generate)
}

/// Cross-check against the independently generated knight/king masks in
/// `tbgen-pregen` — the two representations must agree.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knight_rays_agree_with_pregen_table() {
        let tables = movement_tables();
        for sq in 0u8..64 {
            let square = Square::from(sq);
            let from_rays: BitBoard = tables
                .rays(PieceKind::Knight, square)
                .iter()
                .flat_map(|d| d.iter())
                .filter(|s| !s.is_sentinel())
                .fold(BitBoard::empty(), |acc, s| acc | s.square.bitboard());
            assert_eq!(from_rays, lookup_knight(square));
        }
    }

    #[test]
    fn king_rays_agree_with_pregen_table() {
        let tables = movement_tables();
        for sq in 0u8..64 {
            let square = Square::from(sq);
            let from_rays: BitBoard = tables
                .rays(PieceKind::King, square)
                .iter()
                .flat_map(|d| d.iter())
                .filter(|s| !s.is_sentinel())
                .fold(BitBoard::empty(), |acc, s| acc | s.square.bitboard());
            assert_eq!(from_rays, lookup_king(square));
        }
    }

    #[test]
    fn self_test_passes() {
        movement_tables().self_test().unwrap();
    }

    #[test]
    fn rook_ray_halts_on_sentinel_with_all_ones_mask() {
        let tables = movement_tables();
        let ray = &tables.rays(PieceKind::Rook, Square::A1)[0];
        assert_eq!(ray.last().unwrap().mask, BitBoard(u64::MAX));
    }

    #[test]
    fn pawn_double_push_only_from_start_rank() {
        let tables = movement_tables();
        // a2 (rank index 1): single + double push
        let a2 = Square::from_coord("a2");
        let ray = tables.pawn_fwd(a2, Side::White);
        assert_eq!(ray.len(), 3); // a3, a4, sentinel

        // a3 (rank index 2): single push only
        let a3 = Square::from_coord("a3");
        let ray = tables.pawn_fwd(a3, Side::White);
        assert_eq!(ray.len(), 2); // a4, sentinel
    }
}

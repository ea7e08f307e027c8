//! Futurebase back-propagation (spec.md §4.F): walks every resolved
//! index of an already-generated futurebase, reconstructs the
//! predecessor positions in the *current* configuration that could have
//! reached it by one capture, one promotion, or both, and emits a
//! propagation event for each into a [`Proptable`].
//!
//! The futurebase's mobile list differs from the current one by exactly
//! the piece(s) the move consumed; [`correlate`] works out which piece
//! that is (and, for a promotion, what it became) by diffing the two
//! mobile lists as multisets, rather than trusting the futurebase's
//! declared type blindly — a mismatch between the two is a control-file
//! error, not a silent misread.

use std::collections::{HashMap, HashSet};

use tbgen_bitboard::{BitBoard, Square};
use tbgen_core::{
    futuremove_id, global_to_local, index_to_global, index_to_local, local_to_index,
    movement_tables, GlobalPosition, MobileList, PieceKind, Side,
};

use crate::artifact::OpenArtifact;
use crate::config::{Configuration, FuturebaseRef, FuturebaseType};
use crate::errors::FuturebaseError;
use crate::proptable::{Outcome, Proptable, ProptableEntry};

/// What a futurebase's mobile-list difference says happened on the move
/// that crossed into it: a capture, a promotion, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlation {
    pub captured: Option<(Side, PieceKind)>,
    pub promoted_side: Option<Side>,
    pub promoted_to_kind: Option<PieceKind>,
}

fn folded_kind(kind: PieceKind) -> PieceKind {
    if kind == PieceKind::PawnEp {
        PieceKind::Pawn
    } else {
        kind
    }
}

fn piece_counts(mobiles: &MobileList) -> HashMap<(Side, PieceKind), i32> {
    let mut counts = HashMap::new();
    for (_, color, kind) in mobiles.iter() {
        *counts.entry((color, folded_kind(kind))).or_insert(0) += 1;
    }
    counts
}

fn type_name(kind: FuturebaseType) -> &'static str {
    match kind {
        FuturebaseType::Capture => "capture",
        FuturebaseType::Promotion => "promotion",
        FuturebaseType::PromotionCapture => "promotion-capture",
    }
}

/// Diffs `current`'s mobile list against `future`'s as a multiset of
/// `(side, kind)` and resolves the difference into a capture and/or a
/// promotion. Errors if the difference doesn't match `declared`, or
/// doesn't reduce to one capture and/or one promotion at all.
pub fn correlate(
    current: &MobileList,
    future: &MobileList,
    declared: FuturebaseType,
) -> Result<Correlation, FuturebaseError> {
    let current_counts = piece_counts(current);
    let future_counts = piece_counts(future);

    let mut keys: HashSet<(Side, PieceKind)> = current_counts.keys().copied().collect();
    keys.extend(future_counts.keys().copied());

    let mut deltas: Vec<((Side, PieceKind), i32)> = keys
        .into_iter()
        .map(|key| {
            let delta = current_counts.get(&key).copied().unwrap_or(0)
                - future_counts.get(&key).copied().unwrap_or(0);
            (key, delta)
        })
        .filter(|&(_, delta)| delta != 0)
        .collect();

    let mut promoted_side = None;
    let mut promoted_to_kind = None;
    if let Some(pawn_pos) = deltas
        .iter()
        .position(|&((_, kind), delta)| kind == PieceKind::Pawn && delta == 1)
    {
        let (pawn_side, _) = deltas[pawn_pos].0;
        if let Some(promo_pos) = deltas.iter().position(|&((side, kind), delta)| {
            side == pawn_side && kind != PieceKind::Pawn && kind != PieceKind::King && delta == -1
        }) {
            promoted_side = Some(pawn_side);
            promoted_to_kind = Some(deltas[promo_pos].0 .1);
            let (first, second) = if pawn_pos > promo_pos {
                (pawn_pos, promo_pos)
            } else {
                (promo_pos, pawn_pos)
            };
            deltas.remove(first);
            deltas.remove(second);
        }
    }

    let mut captured = None;
    if deltas.len() == 1 && deltas[0].1 == 1 {
        captured = Some(deltas[0].0);
        deltas.clear();
    }

    if !deltas.is_empty() {
        return Err(FuturebaseError::HeaderMismatch(format!(
            "futurebase mobile list differs from the current configuration by more than a \
             single capture and/or promotion ({} unexplained piece-count difference(s))",
            deltas.len()
        )));
    }

    let actual = match (captured.is_some(), promoted_to_kind.is_some()) {
        (true, false) => FuturebaseType::Capture,
        (false, true) => FuturebaseType::Promotion,
        (true, true) => FuturebaseType::PromotionCapture,
        (false, false) => {
            return Err(FuturebaseError::HeaderMismatch(
                "futurebase mobile list is identical to the current configuration".to_string(),
            ))
        }
    };

    if actual != declared {
        return Err(FuturebaseError::TypeMismatch {
            declared: type_name(declared),
            expected_mobile_delta: type_name(actual),
        });
    }

    Ok(Correlation { captured, promoted_side, promoted_to_kind })
}

fn letter_for(side: Side, kind: PieceKind) -> u8 {
    let letter = kind.letter() as u8;
    if side == Side::White {
        letter.to_ascii_uppercase()
    } else {
        letter
    }
}

fn letter_side(c: u8) -> Option<Side> {
    if c == b' ' {
        None
    } else if c.is_ascii_uppercase() {
        Some(Side::White)
    } else {
        Some(Side::Black)
    }
}

fn letter_kind(c: u8) -> Option<PieceKind> {
    match c.to_ascii_lowercase() {
        b'k' => Some(PieceKind::King),
        b'q' => Some(PieceKind::Queen),
        b'r' => Some(PieceKind::Rook),
        b'b' => Some(PieceKind::Bishop),
        b'n' => Some(PieceKind::Knight),
        b'p' => Some(PieceKind::Pawn),
        _ => None,
    }
}

/// [`tbgen_pregen::PROMOTION_KINDS`] order, 1-indexed to match
/// [`tbgen_core::futuremove_id`]'s `promotion_choice` convention (0 means
/// "not a promotion").
fn promotion_choice_index(kind: PieceKind) -> u8 {
    let name = match kind {
        PieceKind::Queen => "queen",
        PieceKind::Rook => "rook",
        PieceKind::Knight => "knight",
        PieceKind::Bishop => "bishop",
        _ => return 0,
    };
    tbgen_pregen::PROMOTION_KINDS
        .iter()
        .position(|&k| k == name)
        .map(|i| i as u8 + 1)
        .unwrap_or(0)
}

/// One reconstructed predecessor: the full board before the move, whose
/// side to move, and enough about the move itself (mover identity,
/// destination, promotion choice) to recompute a [`futuremove_id`] in
/// the current configuration once the predecessor's mobile squares are
/// known.
struct Candidate {
    board: [u8; 64],
    side_to_move: Side,
    mover_kind: PieceKind,
    mover_color: Side,
    from_square: Square,
    to_square: Square,
    promotion_choice: u8,
    en_passant: Option<Square>,
}

fn has_pawn_ep_mobile(mobiles: &MobileList, side: Side) -> bool {
    mobiles.iter().any(|(_, color, kind)| color == side && kind == PieceKind::PawnEp)
}

/// The FEN-style en-passant target square behind a `PawnEp` victim of
/// `victim_color`, matching [`tbgen_core::index`]'s own convention: one
/// rank back towards the victim's own side.
fn en_passant_target(victim_square: Square, victim_color: Side) -> Option<Square> {
    let dir = match victim_color {
        Side::White => -1i8,
        Side::Black => 1i8,
    };
    victim_square.try_offset(0, dir)
}

fn capture_candidates(
    future_board: &[u8; 64],
    capturing_side: Side,
    captured: (Side, PieceKind),
    current_mobiles: &MobileList,
) -> Vec<Candidate> {
    let mut occ = BitBoard::empty();
    for sq in 0u8..64 {
        if future_board[sq as usize] != b' ' {
            occ.set(Square::from(sq));
        }
    }
    let tables = movement_tables();
    let mut out = Vec::new();

    for sq in 0u8..64 {
        let to = Square::from(sq);
        let c = future_board[to];
        let Some(side) = letter_side(c) else { continue };
        if side != capturing_side {
            continue;
        }
        let Some(kind) = letter_kind(c) else { continue };

        if kind.is_pawn() {
            for dir in tables.pawn_cap_bkwd(to, capturing_side) {
                let step = dir[0];
                if step.is_sentinel() || occ.contains(step.square) {
                    continue;
                }
                let mut board = *future_board;
                board[to] = letter_for(captured.0, captured.1);
                board[step.square] = c;
                out.push(Candidate {
                    board,
                    side_to_move: capturing_side,
                    mover_kind: kind,
                    mover_color: side,
                    from_square: step.square,
                    to_square: to,
                    promotion_choice: 0,
                    en_passant: None,
                });

                // En passant: the captured pawn never stood on `to` at
                // all — it stood beside the capturer's own origin
                // square, on the rank its double push reached, and
                // vanished from the board entirely rather than being
                // replaced. Only a shape this configuration's mobile
                // list can actually represent (a PawnEp slot for the
                // victim's color) is worth reconstructing.
                if captured.1 == PieceKind::Pawn && has_pawn_ep_mobile(current_mobiles, captured.0) {
                    let victim_square = Square::from((step.square.rank() * 8 + to.file()) as u8);
                    if victim_square != to && !occ.contains(victim_square) {
                        if let Some(target) = en_passant_target(victim_square, captured.0) {
                            let mut ep_board = *future_board;
                            ep_board[to] = b' ';
                            ep_board[step.square] = c;
                            ep_board[victim_square] = letter_for(captured.0, PieceKind::Pawn);
                            out.push(Candidate {
                                board: ep_board,
                                side_to_move: capturing_side,
                                mover_kind: kind,
                                mover_color: side,
                                from_square: step.square,
                                to_square: to,
                                promotion_choice: 0,
                                en_passant: Some(target),
                            });
                        }
                    }
                }
            }
        } else {
            for dir in tables.rays(kind, to) {
                for step in dir {
                    if step.is_sentinel() || occ.contains(step.square) {
                        break;
                    }
                    let mut board = *future_board;
                    board[to] = letter_for(captured.0, captured.1);
                    board[step.square] = c;
                    out.push(Candidate {
                        board,
                        side_to_move: capturing_side,
                        mover_kind: kind,
                        mover_color: side,
                        from_square: step.square,
                        to_square: to,
                        promotion_choice: 0,
                        en_passant: None,
                    });
                }
            }
        }
    }
    out
}

fn promotion_candidates(
    future_board: &[u8; 64],
    promoting_side: Side,
    promoted_to_kind: PieceKind,
) -> Vec<Candidate> {
    let mut occ = BitBoard::empty();
    for sq in 0u8..64 {
        if future_board[sq as usize] != b' ' {
            occ.set(Square::from(sq));
        }
    }
    let last_rank = match promoting_side {
        Side::White => 7usize,
        Side::Black => 0usize,
    };
    let behind_rank = match promoting_side {
        Side::White => 6usize,
        Side::Black => 1usize,
    };
    let wanted = letter_for(promoting_side, promoted_to_kind);
    let mut out = Vec::new();
    for file in 0usize..8 {
        let to = Square::from((last_rank * 8 + file) as u8);
        if future_board[to] != wanted {
            continue;
        }
        let behind = Square::from((behind_rank * 8 + file) as u8);
        if occ.contains(behind) {
            continue;
        }
        let mut board = *future_board;
        board[to] = b' ';
        board[behind] = letter_for(promoting_side, PieceKind::Pawn);
        out.push(Candidate {
            board,
            side_to_move: promoting_side,
            mover_kind: PieceKind::Pawn,
            mover_color: promoting_side,
            from_square: behind,
            to_square: to,
            promotion_choice: promotion_choice_index(promoted_to_kind),
            en_passant: None,
        });
    }
    out
}

fn promotion_capture_candidates(
    future_board: &[u8; 64],
    promoting_side: Side,
    promoted_to_kind: PieceKind,
    captured: (Side, PieceKind),
) -> Vec<Candidate> {
    let mut occ = BitBoard::empty();
    for sq in 0u8..64 {
        if future_board[sq as usize] != b' ' {
            occ.set(Square::from(sq));
        }
    }
    let last_rank = match promoting_side {
        Side::White => 7usize,
        Side::Black => 0usize,
    };
    let behind_rank = match promoting_side {
        Side::White => 6usize,
        Side::Black => 1usize,
    };
    let wanted = letter_for(promoting_side, promoted_to_kind);
    let mut out = Vec::new();
    for file in 0i8..8 {
        let to = Square::from((last_rank * 8 + file as usize) as u8);
        if future_board[to] != wanted {
            continue;
        }
        for df in [-1i8, 1i8] {
            let behind_file = file + df;
            if !(0..8).contains(&behind_file) {
                continue;
            }
            let behind = Square::from((behind_rank * 8 + behind_file as usize) as u8);
            if occ.contains(behind) {
                continue;
            }
            let mut board = *future_board;
            board[to] = letter_for(captured.0, captured.1);
            board[behind] = letter_for(promoting_side, PieceKind::Pawn);
            out.push(Candidate {
                board,
                side_to_move: promoting_side,
                mover_kind: PieceKind::Pawn,
                mover_color: promoting_side,
                from_square: behind,
                to_square: to,
                promotion_choice: promotion_choice_index(promoted_to_kind),
                en_passant: None,
            });
        }
    }
    out
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackPropagationStats {
    pub futurebase_indices_visited: u64,
    pub events_emitted: u64,
    pub illegal_predecessors_dropped: u64,
}

/// Back-propagates one futurebase into `proptable` (spec.md §4.F): for
/// every resolved, legal index in `futurebase`, reconstructs every
/// predecessor reachable in the current configuration and emits the win
/// transfer (`PTM_wins`/`add_one_to_PNTM_wins`/draw) the futurebase's
/// verdict implies for it.
///
/// A capturing pawn's predecessor is ambiguous whenever the captured
/// piece folds to a plain pawn: the captured pawn could have been
/// standing on the landing square (an ordinary diagonal capture), or
/// beside the capturer's own origin square in a `PawnEp` state (en
/// passant) — [`capture_candidates`] reconstructs both shapes whenever
/// the current configuration's mobile list has a `PawnEp` slot for the
/// victim's color, and [`index_to_local`] rejects whichever of the two
/// turns out not to decode to a legal index (spec.md §9).
pub fn back_propagate(
    current_config: &Configuration,
    futurebase: &OpenArtifact,
    futurebase_ref: &FuturebaseRef,
    proptable: &mut Proptable,
) -> Result<BackPropagationStats, crate::errors::GenerationError> {
    let correlation = correlate(&current_config.mobiles, &futurebase.header.mobiles, futurebase_ref.kind)?;
    let mut stats = BackPropagationStats::default();
    let max_index = futurebase.max_index();

    for future_index in 0..max_index {
        let future_entry = futurebase.entry(future_index);
        if future_entry.is_illegal() {
            continue;
        }
        stats.futurebase_indices_visited += 1;

        let outcome = if future_entry.is_ptm_wins() {
            Outcome::PntmWins
        } else if future_entry.is_pntm_wins() {
            Outcome::PtmWins
        } else if future_entry.is_stalemate() {
            Outcome::Draw
        } else {
            return Err(crate::errors::FuturebaseError::HeaderMismatch(format!(
                "futurebase index {future_index} is unresolved; futurebases must be fully generated before use"
            ))
            .into());
        };

        let Ok(mut future_global) = index_to_global(&futurebase.header.mobiles, future_index) else {
            continue;
        };
        if futurebase_ref.invert_colors {
            future_global = future_global.invert_colors();
        }
        let mover_side = !future_global.side_to_move;

        let candidates = match futurebase_ref.kind {
            FuturebaseType::Capture => {
                let captured = correlation.captured.expect("correlate validated Capture");
                capture_candidates(&future_global.board, mover_side, captured, &current_config.mobiles)
            }
            FuturebaseType::Promotion => {
                let promoted_to_kind = correlation.promoted_to_kind.expect("correlate validated Promotion");
                promotion_candidates(&future_global.board, mover_side, promoted_to_kind)
            }
            FuturebaseType::PromotionCapture => {
                let captured = correlation.captured.expect("correlate validated PromotionCapture");
                let promoted_to_kind = correlation.promoted_to_kind.expect("correlate validated PromotionCapture");
                promotion_capture_candidates(&future_global.board, mover_side, promoted_to_kind, captured)
            }
        };

        for candidate in candidates {
            let predecessor_global = GlobalPosition {
                board: candidate.board,
                side_to_move: candidate.side_to_move,
                en_passant: candidate.en_passant,
            };
            let predecessor_local = global_to_local(&current_config.mobiles, &predecessor_global);
            // A mobile left at `Square::NULL` means this candidate's board
            // doesn't actually have a piece this configuration's mobile
            // list could match to that slot (e.g. the "ordinary" capture
            // shape of a pawn whose only representation here is `PawnEp`)
            // — not a real predecessor of this configuration at all.
            // `local_to_index` can't represent `Square::NULL` (it only has
            // 6 bits per mobile), so this has to be caught here rather
            // than by round-tripping the index.
            if predecessor_local.squares[..current_config.mobiles.len()]
                .contains(&Square::NULL)
            {
                stats.illegal_predecessors_dropped += 1;
                continue;
            }
            let predecessor_index = local_to_index(&current_config.mobiles, &predecessor_local);

            if index_to_local(&current_config.mobiles, predecessor_index).is_err() {
                stats.illegal_predecessors_dropped += 1;
                continue;
            }

            let mover_index = current_config.mobiles.iter().find_map(|(i, color, kind)| {
                (color == candidate.mover_color
                    && kind == candidate.mover_kind
                    && predecessor_local.squares[i] == candidate.from_square)
                    .then_some(i)
            });
            let Some(mover_index) = mover_index else {
                stats.illegal_predecessors_dropped += 1;
                continue;
            };

            let id = futuremove_id(mover_index, candidate.to_square, candidate.promotion_choice);
            // crossing a futurebase boundary is always a capture and/or a
            // pawn move, both irreversible: the predecessor's fifty-move
            // clock restarts at zero regardless of the futurebase's own.
            proptable.insert_new_propentry(ProptableEntry {
                index: predecessor_index,
                dtm: future_entry.mate_in,
                stalemate_cnt: 0,
                outcome,
                futuremove_id: Some(id),
            })?;
            stats.events_emitted += 1;
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tbgen_core::PieceKind::*;
    use tbgen_core::Side::*;

    fn kr_vs_k() -> MobileList {
        MobileList::new(vec![(White, King), (Black, King), (White, Rook)]).unwrap()
    }

    fn k_vs_k() -> MobileList {
        MobileList::new(vec![(White, King), (Black, King)]).unwrap()
    }

    #[test]
    fn correlate_identifies_a_plain_capture() {
        let correlation = correlate(&kr_vs_k(), &k_vs_k(), FuturebaseType::Capture).unwrap();
        assert_eq!(correlation.captured, Some((White, Rook)));
        assert_eq!(correlation.promoted_to_kind, None);
    }

    #[test]
    fn correlate_rejects_mismatched_declared_type() {
        let err = correlate(&kr_vs_k(), &k_vs_k(), FuturebaseType::Promotion).unwrap_err();
        assert!(matches!(err, FuturebaseError::TypeMismatch { .. }));
    }

    #[test]
    fn correlate_identifies_a_promotion() {
        let with_pawn = MobileList::new(vec![(White, King), (Black, King), (White, Pawn)]).unwrap();
        let with_queen = MobileList::new(vec![(White, King), (Black, King), (White, Queen)]).unwrap();
        let correlation = correlate(&with_pawn, &with_queen, FuturebaseType::Promotion).unwrap();
        assert_eq!(correlation.promoted_side, Some(White));
        assert_eq!(correlation.promoted_to_kind, Some(Queen));
        assert_eq!(correlation.captured, None);
    }

    #[test]
    fn correlate_identifies_a_promotion_capture() {
        let current = MobileList::new(vec![(White, King), (Black, King), (White, Pawn), (Black, Rook)]).unwrap();
        let future = MobileList::new(vec![(White, King), (Black, King), (White, Queen)]).unwrap();
        let correlation = correlate(&current, &future, FuturebaseType::PromotionCapture).unwrap();
        assert_eq!(correlation.promoted_to_kind, Some(Queen));
        assert_eq!(correlation.captured, Some((Black, Rook)));
    }

    #[test]
    fn capture_candidates_reconstruct_a_rook_that_just_took_a_knight() {
        // future: white rook just landed on d4, taking a black knight.
        let mut board = [b' '; 64];
        board[*Square::from_coord("a1")] = b'K';
        board[*Square::from_coord("h8")] = b'k';
        board[*Square::from_coord("d4")] = b'R';
        let candidates = capture_candidates(&board, White, (Black, Knight), &kr_vs_k());
        // rook could have come from anywhere along rank 4 or file d, clear to d4
        assert!(candidates.iter().any(|c| c.from_square == Square::from_coord("d1")));
        assert!(candidates.iter().any(|c| c.from_square == Square::from_coord("a4")));
        for c in &candidates {
            assert_eq!(c.board[Square::from_coord("d4")], b'n');
        }
    }

    #[test]
    fn capture_candidates_reconstructs_an_en_passant_predecessor_when_the_mobile_list_tracks_it() {
        // future: black pawn just captured on d3 after white's double push
        // d2-d4; the captured white pawn is gone entirely, not sitting on
        // d3. Current config (white king, black king, white PawnEp, black
        // pawn) can represent exactly that predecessor shape.
        let mut board = [b' '; 64];
        board[*Square::from_coord("a1")] = b'K';
        board[*Square::from_coord("h8")] = b'k';
        board[*Square::from_coord("d3")] = b'p';
        let with_pawn_ep =
            MobileList::new(vec![(White, King), (Black, King), (White, PawnEp), (Black, Pawn)]).unwrap();
        let candidates = capture_candidates(&board, Black, (White, Pawn), &with_pawn_ep);

        let ep = candidates
            .iter()
            .find(|c| c.en_passant.is_some())
            .expect("an en-passant reconstruction must be present");
        assert_eq!(ep.from_square, Square::from_coord("e4"));
        assert_eq!(ep.to_square, Square::from_coord("d3"));
        assert_eq!(ep.en_passant, Some(Square::from_coord("d3")));
        assert_eq!(ep.board[Square::from_coord("d4")], b'P');
        assert_eq!(ep.board[Square::from_coord("d3")], b' ');

        // the ordinary (non-en-passant) reconstruction is still produced
        // alongside it, with the captured pawn back on the landing square.
        assert!(candidates.iter().any(|c| {
            c.en_passant.is_none() && c.board[Square::from_coord("d3")] == b'P'
        }));
    }

    #[test]
    fn capture_candidates_skips_en_passant_when_the_mobile_list_has_no_pawn_ep_slot() {
        let mut board = [b' '; 64];
        board[*Square::from_coord("a1")] = b'K';
        board[*Square::from_coord("h8")] = b'k';
        board[*Square::from_coord("d3")] = b'p';
        let without_pawn_ep =
            MobileList::new(vec![(White, King), (Black, King), (White, Pawn), (Black, Pawn)]).unwrap();
        let candidates = capture_candidates(&board, Black, (White, Pawn), &without_pawn_ep);
        assert!(candidates.iter().all(|c| c.en_passant.is_none()));
    }

    #[test]
    fn promotion_candidates_reconstruct_the_pawn_push() {
        let mut board = [b' '; 64];
        board[*Square::from_coord("a1")] = b'K';
        board[*Square::from_coord("h8")] = b'k';
        board[*Square::from_coord("d8")] = b'Q';
        let candidates = promotion_candidates(&board, White, Queen);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].from_square, Square::from_coord("d7"));
        assert_eq!(candidates[0].board[Square::from_coord("d7")], b'P');
        assert_eq!(candidates[0].board[Square::from_coord("d8")], b' ');
    }
}

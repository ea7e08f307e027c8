//! Pseudo-legal move counting and backward quiet-move reconstruction,
//! built on the ray tables in [`crate::movement`]. Both operations stay
//! inside a single configuration: crossing a futurebase boundary
//! (captures, promotions) is the engine's job, since it has to bridge
//! two different mobile lists.

use tbgen_bitboard::Square;

use crate::movement::movement_tables;
use crate::position::LocalPosition;
use crate::types::{MobileList, PieceKind, Side};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// A pseudo-legal move captures the enemy king: PTM already mated
    /// PNTM, so the index is PTM-WINS with `mate_in = 0`.
    KingCaptured,
    /// No pseudo-legal moves at all.
    Stalemate,
    Counted { movecnt: u8, futuremove_cnt: u8 },
}

/// Counts forward pseudo-legal moves for `pos.side_to_move`. Every
/// capture and every promotion push/capture is also a
/// futuremove (`futuremove_cnt`), and contributes the same amount to
/// `movecnt` — a promotion push or capture contributes
/// `promotion_possibilities` to both counters, since each underpromotion
/// choice is a distinct move resolved independently later.
pub fn count_forward_moves(
    mobiles: &MobileList,
    pos: &LocalPosition,
    promotion_possibilities: u8,
) -> ForwardOutcome {
    let side = pos.side_to_move;
    let enemy_side = !side;
    let friendly = pos.color_mask(side);
    let enemy = pos.color_mask(enemy_side);
    let enemy_king_square = pos.squares[enemy_king_index(side)];

    let tables = movement_tables();
    let mut movecnt: u32 = 0;
    let mut futuremove_cnt: u32 = 0;

    for i in mobiles.indices_of_color(side) {
        let kind = mobiles.kind(i);
        let square = pos.squares[i];
        if square == Square::NULL {
            continue;
        }

        if kind.is_pawn() {
            for step in tables.pawn_fwd(square, side) {
                if step.is_sentinel() || pos.occupancy.contains(step.square) {
                    break;
                }
                if is_last_rank(step.square) {
                    movecnt += promotion_possibilities as u32;
                    futuremove_cnt += promotion_possibilities as u32;
                } else {
                    movecnt += 1;
                }
            }
            for dir in tables.pawn_cap(square, side) {
                let step = dir[0];
                if step.is_sentinel() {
                    continue;
                }
                if enemy.contains(step.square) {
                    if step.square == enemy_king_square {
                        return ForwardOutcome::KingCaptured;
                    }
                    if is_last_rank(step.square) {
                        movecnt += promotion_possibilities as u32;
                        futuremove_cnt += promotion_possibilities as u32;
                    } else {
                        movecnt += 1;
                        futuremove_cnt += 1;
                    }
                } else if en_passant_victim(mobiles, pos, enemy_side, square, step.square).is_some() {
                    // en passant always lands off the last rank and
                    // always crosses into a smaller configuration.
                    movecnt += 1;
                    futuremove_cnt += 1;
                }
            }
            continue;
        }

        for dir in tables.rays(kind, square) {
            for step in dir {
                if step.is_sentinel() {
                    break;
                }
                if friendly.contains(step.square) {
                    break;
                }
                if enemy.contains(step.square) {
                    if step.square == enemy_king_square {
                        return ForwardOutcome::KingCaptured;
                    }
                    movecnt += 1;
                    futuremove_cnt += 1;
                    break;
                }
                movecnt += 1;
            }
        }
    }

    if movecnt == 0 {
        ForwardOutcome::Stalemate
    } else {
        ForwardOutcome::Counted {
            movecnt: movecnt as u8,
            futuremove_cnt: futuremove_cnt as u8,
        }
    }
}

/// A stable identity for one forward futuremove out of a position:
/// which mobile moved, which square it landed on, and (for promotions)
/// which piece it became. Packed as `mover_index:3 | to_square:6 |
/// promotion_choice:3` — small enough that the engine can recompute the
/// same id independently while back-propagating a futurebase, so the
/// two sides of the "possible vs. emitted" comparison agree on what a
/// given futuremove *is* without threading extra state
/// through the proptable. `promotion_choice` is 0 for a plain capture,
/// `1 + index into the promotion-kind order` for a promotion.
pub fn futuremove_id(mover_index: usize, to: Square, promotion_choice: u8) -> u32 {
    (mover_index as u32) << 9 | (*to as u32) << 3 | promotion_choice as u32
}

/// Every forward futuremove out of `pos`, as a [`futuremove_id`]. Mirrors
/// [`count_forward_moves`]'s enumeration exactly so the two stay in sync;
/// used by the engine's initializer (to report which futuremove ids are
/// *possible*) and is recomputed independently by the futurebase
/// back-propagator (to say which one it just *resolved*), so the two
/// sides of the "possible vs emitted" futuremove bookkeeping agree.
pub fn futuremove_ids(
    mobiles: &MobileList,
    pos: &LocalPosition,
    promotion_possibilities: u8,
) -> Vec<u32> {
    let side = pos.side_to_move;
    let enemy_side = !side;
    let friendly = pos.color_mask(side);
    let enemy = pos.color_mask(enemy_side);
    let enemy_king_square = pos.squares[enemy_king_index(side)];

    let tables = movement_tables();
    let mut ids = Vec::new();

    for i in mobiles.indices_of_color(side) {
        let kind = mobiles.kind(i);
        let square = pos.squares[i];
        if square == Square::NULL {
            continue;
        }

        if kind.is_pawn() {
            for step in tables.pawn_fwd(square, side) {
                if step.is_sentinel() || pos.occupancy.contains(step.square) {
                    break;
                }
                if is_last_rank(step.square) {
                    for choice in 1..=promotion_possibilities {
                        ids.push(futuremove_id(i, step.square, choice));
                    }
                }
            }
            for dir in tables.pawn_cap(square, side) {
                let step = dir[0];
                if step.is_sentinel() {
                    continue;
                }
                if enemy.contains(step.square) {
                    if step.square == enemy_king_square {
                        return Vec::new();
                    }
                    if is_last_rank(step.square) {
                        for choice in 1..=promotion_possibilities {
                            ids.push(futuremove_id(i, step.square, choice));
                        }
                    } else {
                        ids.push(futuremove_id(i, step.square, 0));
                    }
                } else if en_passant_victim(mobiles, pos, enemy_side, square, step.square).is_some() {
                    ids.push(futuremove_id(i, step.square, 0));
                }
            }
            continue;
        }

        for dir in tables.rays(kind, square) {
            for step in dir {
                if step.is_sentinel() {
                    break;
                }
                if friendly.contains(step.square) {
                    break;
                }
                if enemy.contains(step.square) {
                    if step.square == enemy_king_square {
                        return Vec::new();
                    }
                    ids.push(futuremove_id(i, step.square, 0));
                    break;
                }
            }
        }
    }

    ids
}

/// Locates an enemy `PawnEp` mobile standing beside a capturing pawn:
/// the victim shares the capturer's rank and the
/// diagonal-capture target's file, since en passant's landing square
/// (`target`) is the square the victim passed over, not the square it
/// occupies.
fn en_passant_victim(
    mobiles: &MobileList,
    pos: &LocalPosition,
    enemy_side: Side,
    capturer_square: Square,
    target: Square,
) -> Option<usize> {
    let victim_square = Square::from((capturer_square.rank() * 8 + target.file()) as u8);
    mobiles
        .indices_of_color(enemy_side)
        .find(|&i| mobiles.kind(i) == PieceKind::PawnEp && pos.squares[i] == victim_square)
}

fn enemy_king_index(side_to_move: Side) -> usize {
    match side_to_move {
        Side::White => 1,
        Side::Black => 0,
    }
}

fn is_last_rank(square: Square) -> bool {
    square.rank() == 0 || square.rank() == 7
}

/// Backward quiet destinations for one mobile piece already sitting at
/// its current square: squares it could have moved from to reach here
/// without capturing anything. Occupancy is
/// checked against the forward position `pos` — since every other
/// mobile keeps the same square between predecessor and successor, any
/// square already occupied (by friend or foe) cannot have held this
/// piece too, so the ray halts there without emitting it.
pub fn backward_quiet_destinations(
    mobiles: &MobileList,
    pos: &LocalPosition,
    mobile_index: usize,
) -> Vec<Square> {
    let kind = mobiles.kind(mobile_index);
    let color = mobiles.color(mobile_index);
    let square = pos.squares[mobile_index];
    if square == Square::NULL {
        return Vec::new();
    }

    let tables = movement_tables();
    let mut destinations = Vec::new();

    if kind.is_pawn() {
        for step in tables.pawn_fwd_bkwd(square, color) {
            if step.is_sentinel() || pos.occupancy.contains(step.square) {
                break;
            }
            destinations.push(step.square);
        }
        return destinations;
    }

    for dir in tables.rays(kind, square) {
        for step in dir {
            if step.is_sentinel() || pos.occupancy.contains(step.square) {
                break;
            }
            destinations.push(step.square);
        }
    }
    destinations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::LocalPosition;
    use crate::types::{MobileList, PieceKind::*, Side::*, MAX_MOBILES};
    use tbgen_bitboard::Square;

    fn k_vs_k() -> MobileList {
        MobileList::new(vec![(White, King), (Black, King)]).unwrap()
    }

    #[test]
    fn adjacent_kings_is_illegal_elsewhere_but_movegen_sees_a_capture() {
        let mobiles = k_vs_k();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("e1");
        squares[1] = Square::from_coord("e2");
        let pos = LocalPosition::new(&mobiles, White, squares).unwrap();
        assert_eq!(count_forward_moves(&mobiles, &pos, 3), ForwardOutcome::KingCaptured);
    }

    #[test]
    fn lone_king_far_apart_has_eight_moves() {
        let mobiles = k_vs_k();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("d4");
        squares[1] = Square::from_coord("a8");
        let pos = LocalPosition::new(&mobiles, White, squares).unwrap();
        assert_eq!(
            count_forward_moves(&mobiles, &pos, 3),
            ForwardOutcome::Counted { movecnt: 8, futuremove_cnt: 0 }
        );
    }

    #[test]
    fn corner_king_stalemate_like_count_is_five() {
        let mobiles = k_vs_k();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("a8");
        let pos = LocalPosition::new(&mobiles, White, squares).unwrap();
        assert_eq!(
            count_forward_moves(&mobiles, &pos, 3),
            ForwardOutcome::Counted { movecnt: 3, futuremove_cnt: 0 }
        );
    }

    #[test]
    fn pawn_push_to_last_rank_counts_as_promotion_futuremoves() {
        let mobiles = MobileList::new(vec![(White, King), (Black, King), (White, Pawn)]).unwrap();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("h8");
        squares[2] = Square::from_coord("a7");
        let pos = LocalPosition::new(&mobiles, White, squares).unwrap();
        match count_forward_moves(&mobiles, &pos, 3) {
            ForwardOutcome::Counted { movecnt, futuremove_cnt } => {
                // king a1 (3 moves, a8/h8 far away) + pawn promotion (3 futuremoves)
                assert_eq!(futuremove_cnt, 3);
                assert_eq!(movecnt, 3 + 3);
            }
            other => panic!("expected Counted, got {other:?}"),
        }
    }

    #[test]
    fn en_passant_capture_is_counted_as_a_futuremove() {
        // White just double-pushed to d4 (PawnEp); black's pawn on e4 can
        // take en passant, landing on d3 where nothing stands.
        let mobiles =
            MobileList::new(vec![(White, King), (Black, King), (White, PawnEp), (Black, Pawn)])
                .unwrap();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("h8");
        squares[2] = Square::from_coord("d4");
        squares[3] = Square::from_coord("e4");
        let pos = LocalPosition::new(&mobiles, Black, squares).unwrap();

        match count_forward_moves(&mobiles, &pos, 3) {
            ForwardOutcome::Counted { futuremove_cnt, .. } => {
                assert_eq!(futuremove_cnt, 1, "only the en passant capture is a futuremove");
            }
            other => panic!("expected Counted, got {other:?}"),
        }

        let ids = futuremove_ids(&mobiles, &pos, 3);
        assert_eq!(ids, vec![futuremove_id(3, Square::from_coord("d3"), 0)]);
    }

    #[test]
    fn no_en_passant_victim_means_diagonal_square_is_just_empty() {
        let mobiles = MobileList::new(vec![(White, King), (Black, King), (Black, Pawn)]).unwrap();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("h8");
        squares[2] = Square::from_coord("e4");
        let pos = LocalPosition::new(&mobiles, Black, squares).unwrap();
        let ids = futuremove_ids(&mobiles, &pos, 3);
        assert!(ids.is_empty());
    }

    #[test]
    fn futuremove_ids_count_matches_futuremove_cnt() {
        let mobiles = MobileList::new(vec![(White, King), (Black, King), (White, Pawn)]).unwrap();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("h8");
        squares[2] = Square::from_coord("a7");
        let pos = LocalPosition::new(&mobiles, White, squares).unwrap();
        let ids = futuremove_ids(&mobiles, &pos, 3);
        assert_eq!(ids.len(), 3);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 3, "promotion choices must produce distinct ids");
    }

    #[test]
    fn backward_quiet_destinations_stop_at_blockers() {
        let mobiles = k_vs_k();
        let mut squares = [Square::NULL; MAX_MOBILES];
        squares[0] = Square::from_coord("a1");
        squares[1] = Square::from_coord("h8");
        let pos = LocalPosition::new(&mobiles, White, squares).unwrap();
        let dests = backward_quiet_destinations(&mobiles, &pos, 0);
        assert!(dests.contains(&Square::from_coord("a2")));
        assert!(dests.contains(&Square::from_coord("b1")));
        assert!(dests.contains(&Square::from_coord("b2")));
        assert_eq!(dests.len(), 3);
    }
}

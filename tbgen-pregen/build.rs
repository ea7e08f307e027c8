use std::{fs, path::Path};

use tbgen_bitboard::{BitBoard, Square};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let knight_out = Path::new("src/knight_king_tables.rs");
    fs::write(
        knight_out,
        format!(
            "pub static KNIGHT_TABLE: [u64; 64] = {:?};\npub static KING_TABLE: [u64; 64] = {:?};\n",
            generate_knight_table(),
            generate_king_table(),
        ),
    )
    .unwrap();
}

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

const KING_OFFSETS: [(i8, i8); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

fn generate_knight_table() -> [u64; 64] {
    let mut table = [0u64; 64];
    for sq in 0u8..64 {
        let square = Square::from(sq);
        let mut mask = BitBoard::empty();
        for (file, rank) in KNIGHT_OFFSETS {
            if let Some(target) = square.try_offset(file, rank) {
                mask.set(target);
            }
        }
        table[sq as usize] = mask.as_u64();
    }
    table
}

fn generate_king_table() -> [u64; 64] {
    let mut table = [0u64; 64];
    for sq in 0u8..64 {
        let square = Square::from(sq);
        let mut mask = BitBoard::empty();
        for (file, rank) in KING_OFFSETS {
            if let Some(target) = square.try_offset(file, rank) {
                mask.set(target);
            }
        }
        table[sq as usize] = mask.as_u64();
    }
    table
}

//! Output artifact I/O (spec.md §6): a text header padded to a declared
//! offset, followed by the `max_index * 4`-byte entry blob
//! (`[movecnt, mate_in, stalemate_cnt, futuremove_cnt]` per index,
//! ascending). The same format is read back to open a futurebase
//! (memory-mapped, read-only).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use tbgen_core::{Entry, MobileList, MobileListError, PieceKind, Side};

use crate::config::{Configuration, FuturebaseRef, MoveRestriction};
use crate::errors::ArtifactError;

/// Header pads with `\n` up to this byte offset by default (spec.md §6).
pub const DEFAULT_ENTRY_BLOB_OFFSET: u64 = 0x1000;

fn mobile_letter(kind: PieceKind) -> char {
    match kind {
        PieceKind::King => 'k',
        PieceKind::Queen => 'q',
        PieceKind::Rook => 'r',
        PieceKind::Bishop => 'b',
        PieceKind::Knight => 'n',
        PieceKind::Pawn => 'p',
        PieceKind::PawnEp => 'e',
    }
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::White => "white",
        Side::Black => "black",
    }
}

fn restriction_name(r: MoveRestriction) -> &'static str {
    match r {
        MoveRestriction::None => "none",
        MoveRestriction::Discard => "discard",
        MoveRestriction::Concede => "concede",
    }
}

/// Best-effort host identity. No crate in this workspace's dependency
/// stack exposes `gethostname`, and pulling one in for a single header
/// field isn't worth a new dependency (DESIGN.md records this): fall
/// back through the environment variables a process typically inherits,
/// then to a fixed placeholder.
fn host_identity() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-host".to_string())
}

fn build_header(config: &Configuration, entry_blob_offset: u64, generated_at: u64) -> String {
    let mut header = String::new();
    header.push_str("tbgen-artifact: 1\n");
    header.push_str(&format!("generator: tbgen {}\n", env!("CARGO_PKG_VERSION")));
    header.push_str(&format!("generated-at: {generated_at}\n"));
    header.push_str(&format!("generated-by: {}\n", host_identity()));
    header.push_str(&format!("entry-blob-offset: {entry_blob_offset}\n"));
    header.push_str(&format!(
        "promotion-possibilities: {}\n",
        config.promotion_possibilities
    ));
    header.push_str(&format!("stalemate-count: {}\n", config.stalemate_count));
    for (_, color, kind) in config.mobiles.iter() {
        header.push_str(&format!("mobile: {},{}\n", side_name(color), mobile_letter(kind)));
    }
    for side in [Side::White, Side::Black] {
        let restriction = config.restriction(side);
        if restriction != MoveRestriction::None {
            header.push_str(&format!(
                "move-restriction: {},{}\n",
                side_name(side),
                restriction_name(restriction)
            ));
        }
    }
    header
}

/// Writes the artifact atomically per spec.md §7: build under a `.tmp`
/// sibling in the same directory, then rename into place. No partial
/// file is ever left at `path`.
pub fn write_artifact(
    path: &Path,
    config: &Configuration,
    entries: &[Entry],
    generated_at: u64,
) -> Result<(), ArtifactError> {
    let entry_blob_offset = DEFAULT_ENTRY_BLOB_OFFSET;
    let header = build_header(config, entry_blob_offset, generated_at);
    if header.len() as u64 >= entry_blob_offset {
        return Err(ArtifactError::Header(format!(
            "header ({} bytes) does not fit before the entry-blob offset ({entry_blob_offset})",
            header.len()
        )));
    }

    let tmp_path = tmp_sibling(path);
    {
        let file = File::create(&tmp_path).map_err(|e| ArtifactError::Io(tmp_path.clone(), e))?;
        let mut writer = std::io::BufWriter::new(file);
        writer
            .write_all(header.as_bytes())
            .map_err(|e| ArtifactError::Io(tmp_path.clone(), e))?;
        let padding = entry_blob_offset - header.len() as u64;
        writer
            .write_all(&vec![b'\n'; padding as usize])
            .map_err(|e| ArtifactError::Io(tmp_path.clone(), e))?;
        for entry in entries {
            writer
                .write_all(&entry.to_bytes())
                .map_err(|e| ArtifactError::Io(tmp_path.clone(), e))?;
        }
        writer
            .flush()
            .map_err(|e| ArtifactError::Io(tmp_path.clone(), e))?;
    }
    fs::rename(&tmp_path, path).map_err(|e| ArtifactError::Io(path.to_path_buf(), e))?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// A parsed header, independent of whether the entry blob has been
/// mapped yet.
pub struct ArtifactHeader {
    pub mobiles: MobileList,
    pub move_restrictions: [MoveRestriction; 2],
    pub promotion_possibilities: u8,
    pub stalemate_count: u8,
    pub entry_blob_offset: u64,
}

fn parse_header(text: &str) -> Result<ArtifactHeader, ArtifactError> {
    let mut pieces = Vec::new();
    let mut move_restrictions = [MoveRestriction::None; 2];
    let mut promotion_possibilities = 3u8;
    let mut stalemate_count = 100u8;
    let mut entry_blob_offset = None;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "entry-blob-offset" => {
                entry_blob_offset = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| ArtifactError::Header(format!("bad entry-blob-offset '{value}'")))?,
                );
            }
            "promotion-possibilities" => {
                promotion_possibilities = value
                    .parse()
                    .map_err(|_| ArtifactError::Header(format!("bad promotion-possibilities '{value}'")))?;
            }
            "stalemate-count" => {
                stalemate_count = value
                    .parse()
                    .map_err(|_| ArtifactError::Header(format!("bad stalemate-count '{value}'")))?;
            }
            "mobile" => {
                let (side, letter) = value
                    .split_once(',')
                    .ok_or_else(|| ArtifactError::Header(format!("bad mobile line '{value}'")))?;
                let side = match side {
                    "white" => Side::White,
                    "black" => Side::Black,
                    other => return Err(ArtifactError::Header(format!("bad side '{other}'"))),
                };
                let kind = match letter.chars().next() {
                    Some('k') => PieceKind::King,
                    Some('q') => PieceKind::Queen,
                    Some('r') => PieceKind::Rook,
                    Some('b') => PieceKind::Bishop,
                    Some('n') => PieceKind::Knight,
                    Some('p') => PieceKind::Pawn,
                    Some('e') => PieceKind::PawnEp,
                    other => {
                        return Err(ArtifactError::Header(format!("bad piece letter '{other:?}'")))
                    }
                };
                pieces.push((side, kind));
            }
            "move-restriction" => {
                let (side, restriction) = value
                    .split_once(',')
                    .ok_or_else(|| ArtifactError::Header(format!("bad move-restriction line '{value}'")))?;
                let side = match side {
                    "white" => Side::White,
                    "black" => Side::Black,
                    other => return Err(ArtifactError::Header(format!("bad side '{other}'"))),
                };
                let restriction = match restriction {
                    "none" => MoveRestriction::None,
                    "discard" => MoveRestriction::Discard,
                    "concede" => MoveRestriction::Concede,
                    other => {
                        return Err(ArtifactError::Header(format!("bad move-restriction '{other}'")))
                    }
                };
                move_restrictions[side as usize] = restriction;
            }
            _ => {}
        }
    }

    let entry_blob_offset =
        entry_blob_offset.ok_or_else(|| ArtifactError::Header("missing entry-blob-offset".into()))?;
    let mobiles = MobileList::new(pieces).map_err(|e: MobileListError| {
        ArtifactError::Header(format!("invalid mobile list in header: {e}"))
    })?;

    Ok(ArtifactHeader {
        mobiles,
        move_restrictions,
        promotion_possibilities,
        stalemate_count,
        entry_blob_offset,
    })
}

/// A memory-mapped, read-only artifact opened as a futurebase (spec.md
/// §6 "Futurebase input"): header parsed, entry blob pointer derived
/// from the declared offset.
pub struct OpenArtifact {
    pub header: ArtifactHeader,
    mmap: Mmap,
}

impl OpenArtifact {
    pub fn open(path: &Path) -> Result<Self, ArtifactError> {
        let file = File::open(path).map_err(|e| ArtifactError::Io(path.to_path_buf(), e))?;
        // SAFETY: the file is treated as read-only and not concurrently
        // truncated by this process; standard for mmap-based tablebase
        // readers (cosmobobak-viridithas's tablebase probe uses the same
        // pattern via `memmap2`).
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| ArtifactError::Io(path.to_path_buf(), e))?;
        let header_text = std::str::from_utf8(&mmap[..mmap.len().min(DEFAULT_ENTRY_BLOB_OFFSET as usize * 2)])
            .map_err(|_| ArtifactError::Header("header is not valid utf-8".into()))?;
        let header = parse_header(header_text)?;
        Ok(Self { header, mmap })
    }

    pub fn entry(&self, index: u64) -> Entry {
        let offset = self.header.entry_blob_offset as usize + index as usize * 4;
        let bytes: [u8; 4] = self.mmap[offset..offset + 4].try_into().unwrap();
        Entry::from_bytes(bytes)
    }

    pub fn max_index(&self) -> u64 {
        tbgen_core::max_index(&self.header.mobiles)
    }
}

/// Resolves a configured [`FuturebaseRef`] against the control file's
/// directory, the way a relative path in a control file is expected to
/// resolve (spec.md §6).
pub fn resolve_futurebase_path(control_dir: &Path, reference: &FuturebaseRef) -> PathBuf {
    if reference.filename.is_absolute() {
        reference.filename.clone()
    } else {
        control_dir.join(&reference.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tbgen_core::{MobileList, PieceKind::*, Side::*};

    fn kr_vs_k() -> Configuration {
        Configuration {
            mobiles: MobileList::new(vec![(White, King), (Black, King), (White, Rook)]).unwrap(),
            move_restrictions: [MoveRestriction::None, MoveRestriction::Discard],
            futurebases: Vec::new(),
            promotion_possibilities: 3,
            stalemate_count: 100,
        }
    }

    #[test]
    fn write_then_open_round_trips_header_and_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kr_vs_k.tb");
        let config = kr_vs_k();
        let max_index = tbgen_core::max_index(&config.mobiles);
        let entries = vec![Entry::default(); max_index as usize];

        write_artifact(&path, &config, &entries, 1_700_000_000).unwrap();
        assert!(!tmp_sibling(&path).exists());

        let opened = OpenArtifact::open(&path).unwrap();
        assert_eq!(opened.header.mobiles.len(), 3);
        assert_eq!(
            opened.header.move_restrictions[Black as usize],
            MoveRestriction::Discard
        );
        assert_eq!(opened.max_index(), max_index);
        assert_eq!(opened.entry(0), Entry::default());
    }

    #[test]
    fn entry_blob_round_trips_nondefault_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kr_vs_k.tb");
        let config = kr_vs_k();
        let max_index = tbgen_core::max_index(&config.mobiles);
        let mut entries = vec![Entry::default(); max_index as usize];
        entries[5] = Entry::unresolved(7, 1);

        write_artifact(&path, &config, &entries, 1_700_000_000).unwrap();
        let opened = OpenArtifact::open(&path).unwrap();
        assert_eq!(opened.entry(5), Entry::unresolved(7, 1));
    }
}

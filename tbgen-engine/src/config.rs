//! The `Configuration` interface spec.md §1 places XML/DTD parsing behind
//! ("produces a populated *configuration*") plus a minimal line-oriented
//! loader standing in for that front end (SPEC_FULL.md §3): good enough to
//! drive `generate` end to end without an XML dependency that has no
//! grounding in the teacher's stack.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use tbgen_core::{MobileList, MobileListError, PieceKind, Side};

/// Per-color policy governing futuremoves left unresolved after the
/// futurebase pass (spec.md §4.I).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MoveRestriction {
    None,
    Discard,
    Concede,
}

impl Display for MoveRestriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "none",
                Self::Discard => "discard",
                Self::Concede => "concede",
            }
        )
    }
}

/// One of the three ways a futurebase's mobile list can differ from the
/// current configuration's (spec.md §4.F).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FuturebaseType {
    Capture,
    Promotion,
    PromotionCapture,
}

impl Display for FuturebaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Capture => "capture",
                Self::Promotion => "promotion",
                Self::PromotionCapture => "promotion-capture",
            }
        )
    }
}

#[derive(Clone, Debug)]
pub struct FuturebaseRef {
    pub filename: PathBuf,
    pub invert_colors: bool,
    pub kind: FuturebaseType,
}

/// The populated interface `spec.md` treats as a collaborator's output:
/// mobile list, per-color move restrictions, futurebase references, and
/// the two tunable constants named in spec.md §9.
#[derive(Clone, Debug)]
pub struct Configuration {
    pub mobiles: MobileList,
    pub move_restrictions: [MoveRestriction; 2],
    pub futurebases: Vec<FuturebaseRef>,
    /// spec.md §9: default 3 (Q/R/N); 4 adds bishop.
    pub promotion_possibilities: u8,
    /// spec.md §3/§4.G: default 100.
    pub stalemate_count: u8,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    MobileList(MobileListError),
    UnknownPieceLetter(char),
    UnknownSide(String),
    UnknownMoveRestriction(String),
    UnknownFuturebaseType(String),
    MissingField(&'static str),
    InconsistentMoveRestriction { color: &'static str },
    BadInteger(String),
    Io(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MobileList(e) => write!(f, "{e}"),
            Self::UnknownPieceLetter(c) => write!(f, "unknown piece letter '{c}'"),
            Self::UnknownSide(s) => write!(f, "unknown side '{s}', expected white or black"),
            Self::UnknownMoveRestriction(s) => {
                write!(f, "unknown move-restriction '{s}', expected none/discard/concede")
            }
            Self::UnknownFuturebaseType(s) => write!(
                f,
                "unknown futurebase type '{s}', expected capture/promotion/promotion-capture"
            ),
            Self::MissingField(name) => write!(f, "control file missing required field '{name}'"),
            Self::InconsistentMoveRestriction { color } => write!(
                f,
                "a futurebase declares a move restriction for {color} that conflicts with this configuration's"
            ),
            Self::BadInteger(s) => write!(f, "expected an integer, got '{s}'"),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for ConfigError {}

impl From<MobileListError> for ConfigError {
    fn from(e: MobileListError) -> Self {
        Self::MobileList(e)
    }
}

fn parse_side(s: &str) -> Result<Side, ConfigError> {
    match s {
        "white" => Ok(Side::White),
        "black" => Ok(Side::Black),
        other => Err(ConfigError::UnknownSide(other.to_string())),
    }
}

fn parse_piece_kind(c: char) -> Result<PieceKind, ConfigError> {
    match c.to_ascii_lowercase() {
        'k' => Ok(PieceKind::King),
        'q' => Ok(PieceKind::Queen),
        'r' => Ok(PieceKind::Rook),
        'b' => Ok(PieceKind::Bishop),
        'n' => Ok(PieceKind::Knight),
        'p' => Ok(PieceKind::Pawn),
        'e' => Ok(PieceKind::PawnEp),
        other => Err(ConfigError::UnknownPieceLetter(other)),
    }
}

fn parse_move_restriction(s: &str) -> Result<MoveRestriction, ConfigError> {
    match s {
        "none" => Ok(MoveRestriction::None),
        "discard" => Ok(MoveRestriction::Discard),
        "concede" => Ok(MoveRestriction::Concede),
        other => Err(ConfigError::UnknownMoveRestriction(other.to_string())),
    }
}

fn parse_futurebase_type(s: &str) -> Result<FuturebaseType, ConfigError> {
    match s {
        "capture" => Ok(FuturebaseType::Capture),
        "promotion" => Ok(FuturebaseType::Promotion),
        "promotion-capture" => Ok(FuturebaseType::PromotionCapture),
        other => Err(ConfigError::UnknownFuturebaseType(other.to_string())),
    }
}

impl Configuration {
    /// `mobile`: one line per piece, `color,kind` (e.g. `white,king`).
    /// `move-restriction`: `color,type`.
    /// `futurebase`: `filename[,invert][,type]`.
    /// `promotion-possibilities` / `stalemate-count`: bare integers.
    ///
    /// A small `key: value` text format standing in for the XML/DTD
    /// front end spec.md §1 puts out of scope (SPEC_FULL.md §3).
    pub fn from_control_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut pieces: Vec<(Side, PieceKind)> = Vec::new();
        let mut move_restrictions = [MoveRestriction::None; 2];
        let mut futurebases = Vec::new();
        let mut promotion_possibilities: u8 = 3;
        let mut stalemate_count: u8 = 100;

        for raw_line in text.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, rest) = line
                .split_once(':')
                .ok_or_else(|| ConfigError::Io(format!("malformed line: '{line}'")))?;
            let key = key.trim();
            let value = rest.trim();
            let fields: Vec<&str> = value.split(',').map(str::trim).collect();

            match key {
                "mobile" => {
                    let side = parse_side(fields[0])?;
                    let kind = parse_piece_kind(
                        fields.get(1).and_then(|s| s.chars().next()).unwrap_or(' '),
                    )?;
                    pieces.push((side, kind));
                }
                "move-restriction" => {
                    let side = parse_side(fields[0])?;
                    let restriction = parse_move_restriction(
                        fields.get(1).copied().ok_or(ConfigError::MissingField("move-restriction type"))?,
                    )?;
                    move_restrictions[side as usize] = restriction;
                }
                "futurebase" => {
                    let filename = PathBuf::from(fields[0]);
                    let mut invert_colors = false;
                    let mut kind = None;
                    for extra in &fields[1..] {
                        if *extra == "invert" || *extra == "colors=invert" {
                            invert_colors = true;
                        } else if let Ok(t) = parse_futurebase_type(extra) {
                            kind = Some(t);
                        }
                    }
                    let kind = kind.ok_or(ConfigError::MissingField("futurebase type"))?;
                    futurebases.push(FuturebaseRef { filename, invert_colors, kind });
                }
                "promotion-possibilities" => {
                    promotion_possibilities = value
                        .parse()
                        .map_err(|_| ConfigError::BadInteger(value.to_string()))?;
                }
                "stalemate-count" => {
                    stalemate_count = value
                        .parse()
                        .map_err(|_| ConfigError::BadInteger(value.to_string()))?;
                }
                other => {
                    return Err(ConfigError::Io(format!("unknown control-file key '{other}'")));
                }
            }
        }

        let mobiles = MobileList::new(pieces)?;

        Ok(Self {
            mobiles,
            move_restrictions,
            futurebases,
            promotion_possibilities,
            stalemate_count,
        })
    }

    pub fn restriction(&self, side: Side) -> MoveRestriction {
        self.move_restrictions[side as usize]
    }

    /// spec.md §4.I: "validated against each futurebase's declared
    /// restrictions for consistency". A futurebase's restriction for a
    /// color is compatible if it's NONE or matches ours exactly.
    pub fn check_futurebase_restrictions(
        &self,
        futurebase_restrictions: &HashMap<Side, MoveRestriction>,
    ) -> Result<(), ConfigError> {
        for (&side, &restriction) in futurebase_restrictions {
            if restriction != MoveRestriction::None && restriction != self.restriction(side) {
                let color = if side == Side::White { "white" } else { "black" };
                return Err(ConfigError::InconsistentMoveRestriction { color });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kr_vs_k_with_discard_restriction() {
        let text = "\
mobile: white,king
mobile: black,king
mobile: white,rook
move-restriction: black,discard
";
        let config = Configuration::parse(text).unwrap();
        assert_eq!(config.mobiles.len(), 3);
        assert_eq!(config.restriction(Side::Black), MoveRestriction::Discard);
        assert_eq!(config.restriction(Side::White), MoveRestriction::None);
    }

    #[test]
    fn parses_futurebase_reference_with_invert() {
        let text = "\
mobile: white,king
mobile: black,king
mobile: white,queen
futurebase: kq_vs_k.tb, invert, capture
";
        let config = Configuration::parse(text).unwrap();
        assert_eq!(config.futurebases.len(), 1);
        assert!(config.futurebases[0].invert_colors);
        assert_eq!(config.futurebases[0].kind, FuturebaseType::Capture);
    }

    #[test]
    fn rejects_missing_kings() {
        let text = "mobile: white,queen\n";
        assert!(matches!(
            Configuration::parse(text),
            Err(ConfigError::MobileList(MobileListError::MissingWhiteKing))
        ));
    }

    #[test]
    fn promotion_possibilities_defaults_to_three() {
        let text = "\
mobile: white,king
mobile: black,king
";
        let config = Configuration::parse(text).unwrap();
        assert_eq!(config.promotion_possibilities, 3);
        assert_eq!(config.stalemate_count, 100);
    }
}

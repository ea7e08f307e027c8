use std::error::Error;
use std::io::{stdout, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};

use tbgen_core::position::global_to_local;
use tbgen_core::{local_to_index, GlobalPosition, Side};
use tbgen_engine::artifact::{write_artifact, OpenArtifact};
use tbgen_engine::config::Configuration;
use tbgen_engine::run_generation;

#[derive(Parser)]
#[command(name = "tbgen", about = "Retrograde-analysis endgame tablebase generator")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an artifact from a control file
    Generate {
        /// Control file describing the mobile list, restrictions and futurebases
        control_file: PathBuf,

        /// Where to write the finished artifact (defaults to the control file's name with a .tb extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// In-memory proptable budget, in entries, before spilling to disk
        #[arg(long, default_value_t = 1_000_000)]
        proptable_budget: usize,

        /// Directory for proptable spill files (defaults to the control file's directory)
        #[arg(long)]
        spill_dir: Option<PathBuf>,
    },
    /// Look up one position in one or more artifacts
    Probe {
        /// A FEN-ish "placement side-to-move" position, e.g. "8/8/8/4k3/8/8/4K3/8 w"
        position: String,

        /// Artifact files to probe, reported in order
        artifacts: Vec<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    match args.command {
        Command::Generate { control_file, output, proptable_budget, spill_dir } => {
            generate(&control_file, output, proptable_budget, spill_dir)
        }
        Command::Probe { position, artifacts } => probe(&position, &artifacts),
    }
}

fn generate(
    control_file: &Path,
    output: Option<PathBuf>,
    proptable_budget: usize,
    spill_dir: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let config = Configuration::from_control_file(control_file)?;
    let control_dir = control_file.parent().unwrap_or_else(|| Path::new("."));
    let output = output.unwrap_or_else(|| control_file.with_extension("tb"));

    print!("\x1B[2K\rinitializing {} mobiles...", config.mobiles.len());
    stdout().flush()?;

    let start = Instant::now();
    let (entries, stats) = run_generation(&config, control_dir, proptable_budget, spill_dir)?;
    let elapsed = start.elapsed();

    print!(
        "\x1B[2K\r{} positions, {} futurebase(s) folded, {} propagation sweep(s), {:.1}s\n",
        stats.positions_initialized,
        stats.futurebases_folded,
        stats.intra_table_sweeps,
        elapsed.as_secs_f64(),
    );
    stdout().flush()?;

    let generated_at = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    write_artifact(&output, &config, &entries, generated_at)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn probe(position: &str, artifacts: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let global = parse_fen_like(position)?;
    for path in artifacts {
        let artifact = OpenArtifact::open(path)?;
        let local = global_to_local(&artifact.header.mobiles, &global);
        let index = local_to_index(&artifact.header.mobiles, &local);
        let entry = artifact.entry(index);
        println!(
            "{}: index={index} movecnt={} mate_in={} stalemate_cnt={} futuremove_cnt={}",
            path.display(),
            entry.movecnt,
            entry.mate_in,
            entry.stalemate_cnt,
            entry.futuremove_cnt,
        );
    }
    Ok(())
}

/// Parses the piece-placement and side-to-move fields of a FEN string.
/// Castling rights and the move counters aren't part of a `GlobalPosition`
/// and are ignored if present; a `PawnEp` letter in the placement field
/// carries en passant instead of a dedicated FEN field.
fn parse_fen_like(text: &str) -> Result<GlobalPosition, String> {
    let mut fields = text.split_whitespace();
    let placement = fields.next().ok_or_else(|| "empty position".to_string())?;
    let side_to_move = match fields.next().unwrap_or("w") {
        "w" => Side::White,
        "b" => Side::Black,
        other => return Err(format!("unknown side to move '{other}'")),
    };

    let mut global = GlobalPosition::empty(side_to_move);
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(format!("expected 8 ranks of placement, got {}", ranks.len()));
    }
    for (rank_from_top, rank_str) in ranks.iter().enumerate() {
        let rank = 7 - rank_from_top;
        let mut file = 0usize;
        for c in rank_str.chars() {
            if let Some(empties) = c.to_digit(10) {
                file += empties as usize;
                continue;
            }
            if file >= 8 {
                return Err(format!("rank '{rank_str}' overflows the board"));
            }
            global.board[rank * 8 + file] = c as u8;
            file += 1;
        }
    }
    Ok(global)
}

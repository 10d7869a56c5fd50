use clap::{ArgAction, Parser};
use std::path::PathBuf;

const AFTER_HELP: &str = "\
Examples:
  # Copy demos and unlicensed dumps out of a No-Intro folder
  rom-organizer ./snes ./snes-extras -d -u

  # Move prototypes whose name also contains \"Brazil\"
  rom-organizer ./md ./md-proto -p --grep Brazil --move

  # Keep only files whose MD5 is listed in a DAT (plain or zipped)
  rom-organizer ./gba ./gba-verified --dat \"Nintendo - Game Boy Advance.zip\"

  # Copy titles that have RetroAchievements sets (console id 3 = SNES)
  RA_API_KEY=... rom-organizer ./snes ./snes-cheevos --cheevos 3

Flags -d/-b/-u/-p/-P are OR-combined; every --grep term must also match.
--dat and --cheevos cannot be combined with any other filter.";

#[derive(Parser, Debug, serde::Serialize)]
#[command(
    name = "rom-organizer",
    version,
    about = "Copy or move ROM files matching filename markers, a DAT or RetroAchievements",
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Directory containing the ROM files (not searched recursively)
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Directory receiving the selected files (created if missing)
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,

    // Marker filters
    /// Select files marked "(Demo)"
    #[arg(short = 'd', long = "demo")]
    pub demo: bool,
    /// Select files marked "(Beta)" or "(Beta N)"
    #[arg(short = 'b', long = "beta")]
    pub beta: bool,
    /// Select files marked "(Unl)"
    #[arg(short = 'u', long = "unl")]
    pub unlicensed: bool,
    /// Select files marked "(Prototype)", "(Proto)" or "(Proto N)"
    #[arg(short = 'p', long = "proto")]
    pub prototype: bool,
    /// Select files marked "(Pirate)"
    #[arg(short = 'P', long = "pirate")]
    pub pirate: bool,

    /// Require this text in the file name without its extension (case-insensitive, repeatable, all must match)
    #[arg(long = "grep", value_name = "WORD", action = ArgAction::Append)]
    pub grep: Vec<String>,

    // Content filters
    /// Select files whose MD5 appears in this DAT or zipped DAT
    #[arg(long = "dat", value_name = "PATH")]
    pub dat: Option<PathBuf>,
    /// Select files whose MD5 belongs to a RetroAchievements title for this console id (needs RA_API_KEY)
    #[arg(long = "cheevos", value_name = "ID")]
    pub cheevos: Option<u32>,
    /// Timeout in seconds for RetroAchievements requests
    #[arg(long = "timeout", value_name = "SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    // Transfer options
    /// Move files instead of copying them
    #[arg(long = "move")]
    pub move_files: bool,
    /// Evaluate filters and report what would be transferred without touching any file
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    // Output options
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
    /// Print the run report as JSON on stdout
    #[arg(long = "print-summary")]
    pub print_summary: bool,
}

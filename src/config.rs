use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::error::OrganizeError;
use crate::types::{FilterFlag, TransferMode};

pub const API_KEY_VAR: &str = "RA_API_KEY";
pub const API_BASE_VAR: &str = "RA_API_BASE";

/// API key for the achievement service. Never printed or serialized.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Credential(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Config {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub flags: Vec<FilterFlag>,
    pub grep: Vec<String>,
    pub dat: Option<PathBuf>,
    pub cheevos: Option<u32>,
    #[serde(skip)]
    pub api_key: Option<Credential>,
    pub api_base: Option<String>,
    pub timeout_secs: u64,
    pub mode: TransferMode,
    pub dry_run: bool,
    pub verbose: u8,
    pub print_summary: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            flags: Vec::new(),
            grep: Vec::new(),
            dat: None,
            cheevos: None,
            api_key: None,
            api_base: None,
            timeout_secs: 30,
            mode: TransferMode::Copy,
            dry_run: false,
            verbose: 0,
            print_summary: false,
        }
    }
}

impl Config {
    /// Build a config from parsed arguments and the values of the
    /// credential/base-url environment variables.
    pub fn from_cli(
        cli: Cli,
        api_key: Option<String>,
        api_base: Option<String>,
    ) -> Result<Self, OrganizeError> {
        let flags = [
            (cli.demo, FilterFlag::Demo),
            (cli.beta, FilterFlag::Beta),
            (cli.unlicensed, FilterFlag::Unlicensed),
            (cli.prototype, FilterFlag::Prototype),
            (cli.pirate, FilterFlag::Pirate),
        ]
        .into_iter()
        .filter_map(|(on, flag)| on.then_some(flag))
        .collect();

        // The key is only consulted for achievement runs.
        let api_key = match cli.cheevos {
            Some(_) => api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .map(Credential::new),
            None => None,
        };

        let config = Self {
            source: cli.source,
            destination: cli.destination,
            flags,
            grep: cli.grep,
            dat: cli.dat,
            cheevos: cli.cheevos,
            api_key,
            api_base: api_base.filter(|b| !b.trim().is_empty()),
            timeout_secs: cli.timeout_secs,
            mode: if cli.move_files {
                TransferMode::Move
            } else {
                TransferMode::Copy
            },
            dry_run: cli.dry_run,
            verbose: cli.verbose,
            print_summary: cli.print_summary,
        };

        config.validate()?;

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn has_name_filters(&self) -> bool {
        !self.flags.is_empty() || !self.grep.is_empty()
    }

    fn validate_predicates(&self) -> Result<(), OrganizeError> {
        if !self.has_name_filters() && self.dat.is_none() && self.cheevos.is_none() {
            return Err(OrganizeError::config(
                "no filter selected; use -d/-b/-u/-p/-P, --grep, --dat or --cheevos",
            ));
        }

        if self.dat.is_some() && self.cheevos.is_some() {
            return Err(OrganizeError::config(
                "--dat and --cheevos cannot be used together",
            ));
        }

        if let Some(dat) = &self.dat {
            if self.has_name_filters() {
                return Err(OrganizeError::config(format!(
                    "--dat {} cannot be combined with flag or --grep filters",
                    dat.display()
                )));
            }
        }

        if let Some(id) = self.cheevos {
            if self.has_name_filters() {
                return Err(OrganizeError::config(format!(
                    "--cheevos {id} cannot be combined with flag or --grep filters"
                )));
            }
        }

        Ok(())
    }

    fn validate_paths(&self) -> Result<(), OrganizeError> {
        // Resolve `./roms`, `roms/../roms` and symlinked spellings when both exist.
        let same = match (
            fs::canonicalize(&self.source),
            fs::canonicalize(&self.destination),
        ) {
            (Ok(source), Ok(destination)) => source == destination,
            _ => self.source == self.destination,
        };
        if same {
            return Err(OrganizeError::config(format!(
                "source and destination are the same directory: {}",
                self.source.display()
            )));
        }
        Ok(())
    }

    fn validate_grep_terms(&self) -> Result<(), OrganizeError> {
        if let Some(pos) = self.grep.iter().position(|term| term.trim().is_empty()) {
            return Err(OrganizeError::config(format!(
                "--grep term #{} is empty",
                pos + 1
            )));
        }
        Ok(())
    }

    fn validate_lookup_requirements(&self) -> Result<(), OrganizeError> {
        if let Some(id) = self.cheevos {
            if self.api_key.is_none() {
                return Err(OrganizeError::config(format!(
                    "--cheevos {id} requires the {API_KEY_VAR} environment variable"
                )));
            }
            if self.timeout_secs == 0 {
                return Err(OrganizeError::config("--timeout must be at least 1 second"));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), OrganizeError> {
        self.validate_predicates()?;
        self.validate_paths()?;
        self.validate_grep_terms()?;
        self.validate_lookup_requirements()?;
        Ok(())
    }
}

impl TryFrom<Cli> for Config {
    type Error = OrganizeError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let api_key = std::env::var(API_KEY_VAR).ok();
        let api_base = std::env::var(API_BASE_VAR).ok();
        Config::from_cli(cli, api_key, api_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["rom-organizer", "in", "out"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn errors_when_no_filter_provided() {
        let err = Config::from_cli(parse(&[]), None, None).unwrap_err();
        assert!(matches!(err, OrganizeError::Configuration(_)));
        assert!(err.to_string().contains("no filter selected"));
    }

    #[test]
    fn collects_flags_in_declaration_order() {
        let config = Config::from_cli(parse(&["-P", "-d", "-b"]), None, None).unwrap();
        assert_eq!(
            config.flags,
            vec![FilterFlag::Demo, FilterFlag::Beta, FilterFlag::Pirate]
        );
        assert_eq!(config.mode, TransferMode::Copy);
    }

    #[test]
    fn errors_when_dat_combined_with_flag() {
        let err = Config::from_cli(parse(&["--dat", "snes.dat", "-d"]), None, None).unwrap_err();
        assert!(matches!(err, OrganizeError::Configuration(_)));
        assert!(err.to_string().contains("snes.dat"));
    }

    #[test]
    fn errors_when_dat_combined_with_grep() {
        let err =
            Config::from_cli(parse(&["--dat", "snes.dat", "--grep", "USA"]), None, None)
                .unwrap_err();
        assert!(err.to_string().contains("cannot be combined"));
    }

    #[test]
    fn errors_when_cheevos_combined_with_dat() {
        let err = Config::from_cli(
            parse(&["--cheevos", "3", "--dat", "snes.dat"]),
            Some("key".to_string()),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("--dat and --cheevos"));
    }

    #[test]
    fn errors_when_cheevos_combined_with_flag() {
        let err = Config::from_cli(parse(&["--cheevos", "3", "-u"]), Some("key".into()), None)
            .unwrap_err();
        assert!(err.to_string().contains("--cheevos 3"));
    }

    #[test]
    fn errors_when_cheevos_key_missing_or_blank() {
        let err = Config::from_cli(parse(&["--cheevos", "3"]), None, None).unwrap_err();
        assert!(err.to_string().contains(API_KEY_VAR));

        let err =
            Config::from_cli(parse(&["--cheevos", "3"]), Some("   ".into()), None).unwrap_err();
        assert!(err.to_string().contains(API_KEY_VAR));
    }

    #[test]
    fn ignores_key_when_cheevos_not_requested() {
        let config = Config::from_cli(parse(&["-d"]), Some("secret".into()), None).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn credential_is_redacted_in_debug_and_json() {
        let config = Config::from_cli(
            parse(&["--cheevos", "3"]),
            Some("super-secret".into()),
            None,
        )
        .unwrap();
        assert_eq!(config.api_key.as_ref().unwrap().expose(), "super-secret");

        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn errors_on_empty_grep_term() {
        let err = Config::from_cli(parse(&["--grep", "USA", "--grep", ""]), None, None)
            .unwrap_err();
        assert!(err.to_string().contains("#2"));
    }

    #[test]
    fn errors_when_source_is_destination() {
        let cli = Cli::parse_from(["rom-organizer", "roms", "roms", "-d"]);
        let err = Config::from_cli(cli, None, None).unwrap_err();
        assert!(err.to_string().contains("same directory"));
    }

    #[test]
    fn errors_when_paths_resolve_to_same_directory() {
        let dir = tempfile::tempdir().unwrap();
        let roms = dir.path().join("roms");
        fs::create_dir(&roms).unwrap();
        let detour = roms.join("..").join("roms");

        let cli = Cli::parse_from([
            "rom-organizer".to_string(),
            roms.to_string_lossy().to_string(),
            detour.to_string_lossy().to_string(),
            "-d".to_string(),
        ]);
        let err = Config::from_cli(cli, None, None).unwrap_err();
        assert!(err.to_string().contains("same directory"));
    }

    #[test]
    fn move_flag_selects_move_mode() {
        let config = Config::from_cli(parse(&["-p", "--move"]), None, None).unwrap();
        assert_eq!(config.mode, TransferMode::Move);
    }
}

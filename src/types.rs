use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum TransferMode {
    Copy,
    Move,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Copy => write!(f, "copy"),
            TransferMode::Move => write!(f, "move"),
        }
    }
}

/// Fixed filename markers selectable from the command line.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterFlag {
    #[serde(rename = "demo")]
    Demo,
    #[serde(rename = "beta")]
    Beta,
    #[serde(rename = "unl")]
    Unlicensed,
    #[serde(rename = "proto")]
    Prototype,
    #[serde(rename = "pirate")]
    Pirate,
}

impl fmt::Display for FilterFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterFlag::Demo => write!(f, "demo"),
            FilterFlag::Beta => write!(f, "beta"),
            FilterFlag::Unlicensed => write!(f, "unlicensed"),
            FilterFlag::Prototype => write!(f, "prototype"),
            FilterFlag::Pirate => write!(f, "pirate"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    // Only populated when the active selection compares file contents.
    pub md5: Option<String>,
}

impl CandidateFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path,
            name,
            size,
            md5: None,
        }
    }

    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[..idx],
            _ => &self.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    NotSelected,
    Planned { target: PathBuf },
    Transferred { target: PathBuf },
    Collision { target: PathBuf },
    Failed { reason: String },
    Unreadable { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub scanned: usize,
    pub selected: usize,
    pub transferred: usize,
    pub planned: usize,
    pub skipped_collision: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, status: &FileStatus) {
        self.scanned += 1;
        match status {
            FileStatus::NotSelected => {}
            FileStatus::Planned { .. } => {
                self.selected += 1;
                self.planned += 1;
            }
            FileStatus::Transferred { .. } => {
                self.selected += 1;
                self.transferred += 1;
            }
            FileStatus::Collision { .. } => {
                self.selected += 1;
                self.skipped_collision += 1;
            }
            FileStatus::Failed { .. } => {
                self.selected += 1;
                self.failed += 1;
            }
            // Could not be hashed, so never evaluated, but still fails the run.
            FileStatus::Unreadable { .. } => {
                self.failed += 1;
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: TransferMode,
    pub selection: String,
    pub dry_run: bool,
    pub summary: RunSummary,
    pub outcomes: Vec<FileOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_drops_only_the_last_extension() {
        let file = CandidateFile::new(PathBuf::from("in/Game (Proto).v1.nes"), 0);
        assert_eq!(file.name, "Game (Proto).v1.nes");
        assert_eq!(file.stem(), "Game (Proto).v1");

        let dotfile = CandidateFile::new(PathBuf::from("in/.hidden"), 0);
        assert_eq!(dotfile.stem(), ".hidden");
    }

    #[test]
    fn summary_counts_collisions_apart_from_failures() {
        let mut summary = RunSummary::default();
        summary.record(&FileStatus::NotSelected);
        summary.record(&FileStatus::Transferred {
            target: PathBuf::from("out/a"),
        });
        summary.record(&FileStatus::Collision {
            target: PathBuf::from("out/b"),
        });

        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.selected, 2);
        assert_eq!(summary.transferred, 1);
        assert_eq!(summary.skipped_collision, 1);
        assert!(!summary.has_failures());

        summary.record(&FileStatus::Unreadable {
            reason: "permission denied".to_string(),
        });
        assert_eq!(summary.selected, 2);
        assert!(summary.has_failures());

        summary.record(&FileStatus::Failed {
            reason: "disk full".to_string(),
        });
        assert_eq!(summary.selected, 3);
        assert_eq!(summary.failed, 2);
    }
}

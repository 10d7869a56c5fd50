use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while organizing a ROM directory.
///
/// `Transfer` and `Read` are scoped to a single file and are tallied by the
/// orchestrator. Everything else aborts the run.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("reference database {}: {reason}", path.display())]
    ReferenceData { path: PathBuf, reason: String },

    #[error("achievement lookup for console {console_id} failed: {reason}")]
    Lookup { console_id: u32, reason: String },

    #[error("transfer of {} failed: {source}", path.display())]
    Transfer {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reading {} failed: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OrganizeError {
    pub fn config(message: impl Into<String>) -> Self {
        OrganizeError::Configuration(message.into())
    }

    pub fn reference(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        OrganizeError::ReferenceData {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn transfer(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OrganizeError::Transfer {
            path: path.into(),
            source,
        }
    }

    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OrganizeError::Read {
            path: path.into(),
            source,
        }
    }

    /// Fatal errors invalidate the whole selection and stop the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            OrganizeError::Transfer { .. } | OrganizeError::Read { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_errors_are_not_fatal() {
        let err = OrganizeError::transfer(
            "roms/Game (Demo).sfc",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("Game (Demo).sfc"));
    }

    #[test]
    fn reference_errors_name_the_file() {
        let err = OrganizeError::reference("dats/snes.dat", "line 4: bad md5");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "reference database dats/snes.dat: line 4: bad md5"
        );
    }
}

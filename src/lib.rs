// Lightweight verbosity-gated logging helper used throughout the crate.
macro_rules! vprintln {
	($verbose:expr, $level:expr, $($arg:tt)*) => {
		if $verbose >= $level {
			eprintln!($($arg)*);
		}
	};
}

// Public library re-exports for integration tests and the binary.
pub mod actions;
pub mod checksum;
pub mod cheevos;
pub mod cli;
pub mod config;
pub mod dat;
pub mod error;
pub mod filter;
pub mod progress;
pub mod records;
pub mod types;

pub use actions::{organize, prepare_selection, run};
pub use config::Config;
pub use error::OrganizeError;
pub use filter::{Selection, matches};

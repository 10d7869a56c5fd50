use std::io::{IsTerminal, stderr};
use std::path::Path;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::types::TransferMode;

const ACTION_BAR_TEMPLATE: &str =
    "{prefix} [{bar:40}] {pos:>5}/{len:<5} | {percent:>3}% | {elapsed_precise} | {msg}";

fn ellipsize(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut shortened: String = input.chars().take(keep).collect();
    shortened.push_str("...");
    shortened
}

fn file_hint(path: &Path) -> String {
    path.file_name()
        .map(|name| ellipsize(&name.to_string_lossy(), 40))
        .unwrap_or_default()
}

fn stderr_supports_progress() -> bool {
    stderr().is_terminal()
}

/// Per-file progress on stderr. Hidden when stderr is not a terminal or when
/// verbose logging would interleave with the bar.
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(total: usize, mode: TransferMode, dry_run: bool, verbose: u8) -> Self {
        let enabled = verbose == 0 && stderr_supports_progress();
        let bar = if enabled {
            ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template(ACTION_BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        let label = if dry_run {
            "PLAN".to_string()
        } else {
            mode.to_string().to_ascii_uppercase()
        };
        bar.set_prefix(label);
        Self { bar }
    }

    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn begin_file(&self, path: &Path) {
        self.bar.set_message(file_hint(path));
    }

    pub fn finish_file(&self) {
        self.bar.inc(1);
    }

    /// Print a line to stderr without tearing the bar.
    pub fn warn(&self, message: impl AsRef<str>) {
        self.bar.suspend(|| eprintln!("{}", message.as_ref()));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

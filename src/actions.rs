use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::checksum::compute_md5;
use crate::cheevos::{AchievementClient, DEFAULT_API_BASE};
use crate::config::Config;
use crate::dat::load_reference_db;
use crate::error::OrganizeError;
use crate::filter::{Selection, evaluate};
use crate::progress::ProgressReporter;
use crate::records::collect_candidates;
use crate::types::{CandidateFile, FileOutcome, FileStatus, RunReport, RunSummary, TransferMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Transferred(PathBuf),
    /// The target name was already taken; nothing was written or removed.
    Collision(PathBuf),
}

pub fn target_path(file: &CandidateFile, destination: &Path) -> PathBuf {
    destination.join(&file.name)
}

fn target_taken(target: &Path) -> bool {
    // symlink_metadata so that a dangling link still counts as taken
    fs::symlink_metadata(target).is_ok()
}

/// Copy `src` into `dir` under a temporary name, then link it into place
/// only if `target` is still free.
fn copy_no_clobber(src: &Path, target: &Path, dir: &Path) -> Result<TransferOutcome, OrganizeError> {
    let fail = |e: io::Error| OrganizeError::transfer(src, e);

    let mut reader = File::open(src).map_err(fail)?;
    let mut staged = tempfile::Builder::new()
        .prefix(".rom-organizer-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(fail)?;
    io::copy(&mut reader, staged.as_file_mut()).map_err(fail)?;
    staged.as_file().sync_all().map_err(fail)?;
    if let Ok(meta) = reader.metadata() {
        let _ = staged.as_file().set_permissions(meta.permissions());
    }

    match staged.persist_noclobber(target) {
        Ok(_) => Ok(TransferOutcome::Transferred(target.to_path_buf())),
        // Lost a race with another writer; the staged copy is dropped.
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            Ok(TransferOutcome::Collision(target.to_path_buf()))
        }
        Err(err) => Err(fail(err.error)),
    }
}

/// Place `file` at `<destination>/<file name>`.
///
/// An existing target is never overwritten. In move mode the source is only
/// removed once the destination file is complete.
pub fn transfer(
    file: &CandidateFile,
    destination: &Path,
    mode: TransferMode,
) -> Result<TransferOutcome, OrganizeError> {
    fs::create_dir_all(destination).map_err(|e| OrganizeError::transfer(&file.path, e))?;

    let target = target_path(file, destination);
    if target_taken(&target) {
        return Ok(TransferOutcome::Collision(target));
    }

    match mode {
        TransferMode::Copy => copy_no_clobber(&file.path, &target, destination),
        TransferMode::Move => {
            // Renaming a symlink would move the link, not the file it points to.
            let is_link = fs::symlink_metadata(&file.path)
                .map(|meta| meta.file_type().is_symlink())
                .map_err(|e| OrganizeError::transfer(&file.path, e))?;
            if !is_link {
                match fs::rename(&file.path, &target) {
                    Ok(()) => return Ok(TransferOutcome::Transferred(target)),
                    Err(err) if err.kind() == ErrorKind::CrossesDevices => {}
                    Err(err) => return Err(OrganizeError::transfer(&file.path, err)),
                }
            }
            match copy_no_clobber(&file.path, &target, destination)? {
                TransferOutcome::Transferred(target) => {
                    remove_source_or_rollback(&file.path, &target)?;
                    Ok(TransferOutcome::Transferred(target))
                }
                collision => Ok(collision),
            }
        }
    }
}

/// Finish a copy-based move. When the source cannot be removed the fresh
/// copy is deleted again, so a failed move leaves only the source behind.
fn remove_source_or_rollback(source: &Path, target: &Path) -> Result<(), OrganizeError> {
    fs::remove_file(source).map_err(|err| {
        let _ = fs::remove_file(target);
        OrganizeError::transfer(source, err)
    })
}

fn process_file(
    file: &mut CandidateFile,
    config: &Config,
    selection: &Selection,
    progress: &ProgressReporter,
) -> FileStatus {
    if selection.needs_checksum() {
        match compute_md5(&file.path) {
            Ok(md5) => {
                vprintln!(config.verbose, 3, "md5 {} {}", md5, file.name);
                file.md5 = Some(md5);
            }
            Err(err) => {
                progress.warn(format!("error: {err}"));
                return FileStatus::Unreadable {
                    reason: err.to_string(),
                };
            }
        }
    }

    let Some(reason) = evaluate(file, selection) else {
        vprintln!(config.verbose, 2, "skip {}: not selected", file.name);
        return FileStatus::NotSelected;
    };

    if config.dry_run {
        let target = target_path(file, &config.destination);
        if target_taken(&target) {
            progress.warn(format!(
                "warning: {} already exists, {} would be skipped",
                target.display(),
                file.name
            ));
            return FileStatus::Collision { target };
        }
        vprintln!(
            config.verbose,
            1,
            "would {} {} -> {} ({})",
            config.mode,
            file.name,
            target.display(),
            reason
        );
        return FileStatus::Planned { target };
    }

    match transfer(file, &config.destination, config.mode) {
        Ok(TransferOutcome::Transferred(target)) => {
            vprintln!(
                config.verbose,
                1,
                "{} {} -> {} ({})",
                config.mode,
                file.name,
                target.display(),
                reason
            );
            FileStatus::Transferred { target }
        }
        Ok(TransferOutcome::Collision(target)) => {
            progress.warn(format!(
                "warning: {} already exists, skipped {}",
                target.display(),
                file.name
            ));
            FileStatus::Collision { target }
        }
        Err(err) => {
            progress.warn(format!("error: {err}"));
            FileStatus::Failed {
                reason: err.to_string(),
            }
        }
    }
}

/// Evaluate every file directly inside the source directory and transfer
/// the selected ones. Only fatal errors are returned; per-file problems end
/// up in the report.
pub fn organize(config: &Config, selection: &Selection) -> Result<RunReport, OrganizeError> {
    let listing = collect_candidates(&config.source)?;
    vprintln!(
        config.verbose,
        1,
        "{} files in {}, selecting by {}",
        listing.files.len(),
        config.source.display(),
        selection.describe()
    );

    let progress = ProgressReporter::new(
        listing.files.len(),
        config.mode,
        config.dry_run,
        config.verbose,
    );
    let mut summary = RunSummary::default();
    let mut outcomes = Vec::with_capacity(listing.files.len() + listing.unreadable.len());

    for link in &listing.dangling {
        vprintln!(
            config.verbose,
            1,
            "skip {}: symlink target is missing",
            link.display()
        );
    }

    // Name-only selections never read file contents, so an entry that cannot
    // be inspected is only a failure when it would have to be hashed.
    for (path, reason) in listing.unreadable {
        let status = if selection.needs_checksum() {
            progress.warn(format!("error: cannot inspect {}: {reason}", path.display()));
            FileStatus::Unreadable { reason }
        } else {
            progress.warn(format!(
                "warning: cannot inspect {}, skipped: {reason}",
                path.display()
            ));
            FileStatus::NotSelected
        };
        summary.record(&status);
        outcomes.push(FileOutcome { path, status });
    }

    for mut file in listing.files {
        progress.begin_file(&file.path);
        let status = process_file(&mut file, config, selection, &progress);
        summary.record(&status);
        outcomes.push(FileOutcome {
            path: file.path,
            status,
        });
        progress.finish_file();
    }
    progress.finish();

    Ok(RunReport {
        source: config.source.clone(),
        destination: config.destination.clone(),
        mode: config.mode,
        selection: selection.describe(),
        dry_run: config.dry_run,
        summary,
        outcomes,
    })
}

/// Build the selection for a validated config, loading the reference DB or
/// fetching the achievement index when those modes are active.
pub fn prepare_selection(config: &Config) -> Result<Selection, OrganizeError> {
    if let Some(dat) = &config.dat {
        return Ok(Selection::Reference(load_reference_db(dat, config.verbose)?));
    }

    if let Some(console_id) = config.cheevos {
        let api_key = config.api_key.clone().ok_or_else(|| {
            OrganizeError::config(format!("--cheevos {console_id} requires an API key"))
        })?;
        let base = config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE);
        let client = AchievementClient::new(api_key, config.timeout())?
            .with_base_url(base)
            .with_verbose(config.verbose);
        return Ok(Selection::Achievements(client.fetch_index(console_id)?));
    }

    Selection::markers(&config.flags, &config.grep)
}

/// Full run: check the source, build the selection, then organize.
pub fn run(config: &Config) -> Result<RunReport, OrganizeError> {
    if !config.source.is_dir() {
        return Err(OrganizeError::config(format!(
            "source {} is not a directory",
            config.source.display()
        )));
    }
    let selection = prepare_selection(config)?;
    organize(config, &selection)
}

pub fn emit_summary(report: &RunReport, verbose: u8) {
    let summary = &report.summary;
    eprintln!("\n=== ROM Organizer Summary ===");
    eprintln!(
        "{} -> {} ({}{})",
        report.source.display(),
        report.destination.display(),
        report.mode,
        if report.dry_run { ", dry run" } else { "" }
    );
    eprintln!("Selection: {}", report.selection);
    if report.dry_run {
        eprintln!(
            "Files -> scanned: {} | selected: {} | planned: {} | skipped (exists): {} | failed: {}",
            summary.scanned,
            summary.selected,
            summary.planned,
            summary.skipped_collision,
            summary.failed
        );
    } else {
        eprintln!(
            "Files -> scanned: {} | selected: {} | transferred: {} | skipped (exists): {} | failed: {}",
            summary.scanned,
            summary.selected,
            summary.transferred,
            summary.skipped_collision,
            summary.failed
        );
    }

    if summary.failed > 0 {
        eprintln!("Failures:");
        let max_entries = 10usize;
        let failures: Vec<&FileOutcome> = report
            .outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.status,
                    FileStatus::Failed { .. } | FileStatus::Unreadable { .. }
                )
            })
            .collect();
        for outcome in failures.iter().take(max_entries) {
            if let FileStatus::Failed { reason } | FileStatus::Unreadable { reason } =
                &outcome.status
            {
                eprintln!("  - {}: {}", outcome.path.display(), reason);
            }
        }
        if failures.len() > max_entries {
            eprintln!("  ... and {} more", failures.len() - max_entries);
        }
    }

    if verbose == 0 && summary.selected > 0 {
        eprintln!("(increase --verbose for per-file details)");
    }
}

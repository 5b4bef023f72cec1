//! Fan-out staging: lay out per-rank input directories for a launch.
//!
//! Given an `index.dfi` and a destination process count, staging plans one
//! directory per destination rank (`<output>/<rank as %06d>`, the layout
//! launch tooling depends on) and copies the configuration and field files
//! each rank needs: the index file, the process file it references, the
//! optional `udmlib.tp`, and the time-slice field files (optionally
//! restricted to a single step).
//!
//! Planning ([`plan`]) is separated from execution ([`execute`]) so a dry
//! run can trace the copy list without touching the filesystem.

use crate::config::DfiConfig;
use crate::error::{ErrorKind, Result};
use crate::naming;
use crate::udm_error;
use std::path::{Path, PathBuf};

/// Options of one staging run.
#[derive(Clone, Debug)]
pub struct StagingOptions {
    /// The source `index.dfi`.
    pub input: PathBuf,
    /// Destination process count.
    pub np: u32,
    /// Output root; rank directories are created beneath it.
    pub output: PathBuf,
    /// Copy a `udmlib.tp`: `Some(None)` takes the file next to the index,
    /// `Some(Some(path))` an explicit one, `None` skips it.
    pub with_udmlib: Option<Option<PathBuf>>,
    /// Restrict field files to one time-slice step.
    pub step: Option<u32>,
}

/// One planned file copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyEntry {
    /// Existing source file.
    pub source: PathBuf,
    /// Destination path inside a rank directory.
    pub dest: PathBuf,
}

/// The full copy plan of a staging run.
#[derive(Clone, Debug, Default)]
pub struct StagingPlan {
    /// Rank directories to create, in rank order.
    pub rank_dirs: Vec<PathBuf>,
    /// File copies, in deterministic order.
    pub copies: Vec<CopyEntry>,
}

impl StagingPlan {
    /// Human-readable trace of the plan, one line per action.
    pub fn trace(&self) -> String {
        let mut out = String::new();
        for dir in &self.rank_dirs {
            out.push_str(&format!("mkdir {}\n", dir.display()));
        }
        for copy in &self.copies {
            out.push_str(&format!(
                "copy  {} -> {}\n",
                copy.source.display(),
                copy.dest.display()
            ));
        }
        out
    }
}

/// Compute the copy plan for `options`.
pub fn plan(options: &StagingOptions) -> Result<StagingPlan> {
    if options.np == 0 {
        return Err(udm_error!(
            ErrorKind::ConfigParse,
            "destination process count must be at least 1"
        ));
    }
    let config = DfiConfig::load(&options.input)?;
    let base = options
        .input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    // files every rank receives
    let mut shared: Vec<(PathBuf, PathBuf)> = Vec::new();
    let index_name = options
        .input
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("index.dfi"));
    shared.push((options.input.clone(), index_name));

    let process_name = config.process_file.clone().unwrap_or_else(|| "proc.dfi".into());
    let process_path = base.join(&process_name);
    if process_path.is_file() {
        shared.push((process_path, PathBuf::from(&process_name)));
    }

    if let Some(udmlib) = &options.with_udmlib {
        let source = match udmlib {
            Some(explicit) => explicit.clone(),
            None => base.join("udmlib.tp"),
        };
        if !source.is_file() {
            return Err(udm_error!(
                ErrorKind::ContainerIo,
                "udmlib file `{}` does not exist",
                source.display()
            ));
        }
        shared.push((source, PathBuf::from("udmlib.tp")));
    }

    // field files, optionally restricted to one step
    let field_dir = base.join(&config.file_info.directory_path);
    let mut field_files: Vec<PathBuf> = Vec::new();
    if field_dir.is_dir() {
        for entry in std::fs::read_dir(&field_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(step) = options.step {
                let stamp = format!("{step:010}");
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if !name.contains(&stamp) {
                    continue;
                }
            }
            field_files.push(path);
        }
        field_files.sort();
    }

    let mut plan = StagingPlan::default();
    for rank in 0..options.np {
        let dir = naming::rank_directory(&options.output, rank);
        for (source, name) in &shared {
            plan.copies.push(CopyEntry {
                source: source.clone(),
                dest: dir.join(name),
            });
        }
        let field_dest = dir.join(&config.file_info.directory_path);
        for file in &field_files {
            let name = file.file_name().map(PathBuf::from).unwrap_or_default();
            plan.copies.push(CopyEntry {
                source: file.clone(),
                dest: field_dest.join(name),
            });
        }
        plan.rank_dirs.push(dir);
    }
    Ok(plan)
}

/// Execute a plan: create rank directories and copy every file. Returns the
/// number of files copied.
pub fn execute(plan: &StagingPlan) -> Result<usize> {
    for dir in &plan.rank_dirs {
        std::fs::create_dir_all(dir)?;
    }
    for copy in &plan.copies {
        if let Some(parent) = copy.dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&copy.source, &copy.dest).map_err(|e| {
            udm_error!(
                ErrorKind::ContainerIo,
                "cannot copy `{}` to `{}`: {e}",
                copy.source.display(),
                copy.dest.display()
            )
        })?;
    }
    tracing::info!(
        files = plan.copies.len(),
        ranks = plan.rank_dirs.len(),
        "staging complete"
    );
    Ok(plan.copies.len())
}

//! `udm-frm`: stage a distributed-mesh case for an N-rank launch.
//!
//! Reads an `index.dfi`, creates one `%06d` directory per destination rank
//! under the output path, and copies the configuration and field files each
//! rank needs. `--view` traces the plan without copying anything.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use udmesh::staging::{self, StagingOptions};

#[derive(Parser, Debug)]
#[command(
    name = "udm-frm",
    version,
    about = "Stage a distributed unstructured-mesh case for an N-rank launch"
)]
struct Args {
    /// DFI index file of the source case.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// Destination process count.
    #[arg(long, value_name = "N")]
    np: u32,

    /// Output root; rank directories are created beneath it.
    #[arg(long, value_name = "PATH", default_value = "./")]
    output: PathBuf,

    /// Also copy udmlib.tp (optionally from an explicit path).
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    with_udmlib: Option<Option<PathBuf>>,

    /// Copy only the field files of one time-slice step.
    #[arg(long, value_name = "N")]
    step: Option<u32>,

    /// Trace the copy plan without touching the filesystem.
    #[arg(long)]
    view: bool,
}

fn run(args: &Args) -> anyhow::Result<()> {
    let options = StagingOptions {
        input: args.input.clone(),
        np: args.np,
        output: args.output.clone(),
        with_udmlib: args.with_udmlib.clone(),
        step: args.step,
    };
    let plan = staging::plan(&options)
        .with_context(|| format!("cannot stage `{}`", args.input.display()))?;
    if args.view {
        print!("{}", plan.trace());
        return Ok(());
    }
    let copied = staging::execute(&plan).context("staging failed")?;
    println!(
        "staged {} file(s) into {} rank director{}",
        copied,
        plan.rank_dirs.len(),
        if plan.rank_dirs.len() == 1 { "y" } else { "ies" }
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let default_level = udmesh::error::stderr_filter(if args.view { 4 } else { 2 });
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("udm-frm: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#![forbid(unsafe_code)]

//! Backs up every configured playlist category into the backup repository as
//! a single commit. Meant to be run from cron; re-running is the recovery
//! path for any failure.

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use video_backups::{
    backup::{BackupRun, CategoryReport, CommitStatus, RunReport},
    commit::CommitOutcome,
    config::{Overrides, Settings, load_settings},
    export::export_changes,
    playlists::FeedClient,
    store::{github::GithubStore, memory::MemoryStore},
    youtube::YoutubeClient,
};

const USAGE: &str = "\
Usage: video_backup [options]

Options:
  --config <file>       settings file (default: config/backup.toml)
  --env-file <file>     credentials file (default: .env)
  --category <name>     back up only this category; repeatable
  --branch <name>       branch to commit to
  --dry-run             run against an in-memory repository, commit nothing
  --export-dir <dir>    write the files to <dir> instead of committing
  -h, --help            show this help";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Commit,
    DryRun,
    Export(PathBuf),
}

#[derive(Debug, Clone)]
struct BackupArgs {
    overrides: Overrides,
    mode: Mode,
    help: bool,
}

impl BackupArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        Self::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut overrides = Overrides::default();
        let mut dry_run = false;
        let mut export_dir: Option<PathBuf> = None;
        let mut help = false;
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };
            let mut value = |name: &str| -> Result<String> {
                match inline.clone() {
                    Some(value) => Ok(value),
                    None => args
                        .next()
                        .ok_or_else(|| anyhow!("{name} requires a value")),
                }
            };

            match flag.as_str() {
                "--config" => overrides.config_path = Some(PathBuf::from(value("--config")?)),
                "--env-file" => overrides.env_path = Some(PathBuf::from(value("--env-file")?)),
                "--category" => overrides.categories.push(value("--category")?),
                "--branch" => overrides.branch = Some(value("--branch")?),
                "--export-dir" => export_dir = Some(PathBuf::from(value("--export-dir")?)),
                "--dry-run" => dry_run = true,
                "-h" | "--help" => help = true,
                _ => bail!("unknown argument: {arg}"),
            }
        }

        let mode = match (dry_run, export_dir) {
            (true, Some(_)) => bail!("--dry-run and --export-dir cannot be combined"),
            (true, None) => Mode::DryRun,
            (false, Some(dir)) => Mode::Export(dir),
            (false, None) => Mode::Commit,
        };

        Ok(Self {
            overrides,
            mode,
            help,
        })
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every category and the commit succeeded.
fn run() -> Result<bool> {
    let args = BackupArgs::parse()?;
    if args.help {
        println!("{USAGE}");
        return Ok(true);
    }

    let settings = load_settings(args.overrides)?;
    let plan = settings.run_plan();
    let feed = FeedClient::new(&settings.feed_base_url);
    let videos = YoutubeClient::new(&settings.youtube_api_url, settings.youtube_api_key()?);
    let backup = BackupRun::new(&plan, &feed, &videos);
    let today = Utc::now().date_naive();

    println!("Categories: {}", plan.categories.join(", "));

    match args.mode {
        Mode::Commit => {
            let store = GithubStore::new(
                &settings.repository.api_url,
                settings.repo()?,
                settings.github_token()?,
            );
            println!("Repository: {} ({})", settings.repo()?, settings.repository.branch);
            let report = backup
                .commit_run(&store, &settings.repository.branch, today)
                .context("reading the branch head")?;
            print_report(&report, &settings);
            Ok(report.succeeded())
        }
        Mode::DryRun => {
            let store = MemoryStore::new(&settings.repository.branch);
            println!("Dry run: nothing will be pushed.");
            let report = backup.commit_run(&store, &settings.repository.branch, today)?;
            print_report(&report, &settings);
            if let CommitStatus::Done(CommitOutcome::Committed { tree, .. }) = &report.commit {
                println!();
                println!("Files that would be committed:");
                for (path, content) in store.tree_files(tree).unwrap_or_default() {
                    println!("  {path} ({} bytes)", content.len());
                }
            }
            Ok(report.succeeded())
        }
        Mode::Export(dir) => {
            let collected = backup.collect();
            print_categories(&collected.categories);
            let written = export_changes(&dir, collected.batch.snapshot())
                .with_context(|| format!("exporting to {}", dir.display()))?;
            println!();
            println!("Wrote {written} file(s) to {}", dir.display());
            Ok(collected.categories.iter().all(CategoryReport::succeeded))
        }
    }
}

fn print_categories(categories: &[CategoryReport]) {
    println!();
    for report in categories {
        match &report.failure {
            None => {
                println!(
                    "  {}: {} playlist(s), {} file(s)",
                    report.category, report.playlists, report.files
                );
                for path in &report.overwritten {
                    eprintln!("    {path} written more than once; only the last playlist kept");
                }
            }
            Some(failure) => {
                eprintln!("  Failed {} while {}", report.category, failure);
                if report.files > 0 {
                    eprintln!("    (manifest kept: {} file(s))", report.files);
                }
            }
        }
    }
}

fn print_report(report: &RunReport, settings: &Settings) {
    print_categories(&report.categories);
    println!();
    let branch = &settings.repository.branch;
    match &report.commit {
        CommitStatus::NothingToCommit => println!("Nothing to commit; {branch} left unchanged."),
        CommitStatus::Done(CommitOutcome::Unchanged { tree }) => {
            println!("No changes (tree {tree}); {branch} left unchanged.")
        }
        CommitStatus::Done(CommitOutcome::Committed { commit, files, .. }) => {
            println!("Committed {commit} with {files} file(s) to {branch}.")
        }
        CommitStatus::Failed(err) => eprintln!("Commit failed, {branch} left unchanged: {err}"),
    }

    let failed = report.failed_categories().count();
    if failed > 0 {
        eprintln!("{failed} of {} categories failed.", report.categories.len());
    }
}

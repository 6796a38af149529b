//! Drives one backup run: every category in order, then a single commit.
//!
//! Categories are processed strictly one after another. A category's files are
//! staged in their own batch and only join the run's change-set once every
//! playlist of that category resolved, so a failed category never lands a
//! truncated or empty entry in the commit.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::{info, warn};

use crate::batch::TreeBatch;
use crate::commit::{CommitBuilder, CommitOutcome, commit_message};
use crate::error::{BackupError, Result};
use crate::model::{PlaylistFile, RunSnapshot};
use crate::playlists::{FeedShape, FeedSource, manifest_path, normalize, playlist_path};
use crate::store::ObjectStore;
use crate::youtube::{PageFetcher, collect_videos};

/// What happens to a category's `playlist.json` when resolving its playlists
/// fails afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestPolicy {
    /// Drop the manifest together with the rest of the category.
    #[default]
    WithCategory,
    /// Commit the manifest whenever it was fetched.
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub categories: Vec<String>,
    pub org_category: String,
    pub manifest_policy: ManifestPolicy,
}

/// Why a category was left out, and at which step.
#[derive(Debug)]
pub struct CategoryFailure {
    pub step: String,
    pub error: BackupError,
}

impl CategoryFailure {
    fn new(step: impl Into<String>, error: BackupError) -> Self {
        Self {
            step: step.into(),
            error,
        }
    }
}

impl std::fmt::Display for CategoryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.step, self.error)
    }
}

#[derive(Debug)]
pub struct CategoryReport {
    pub category: String,
    pub playlists: usize,
    /// Files this category contributed to the change-set.
    pub files: usize,
    /// Paths written by more than one entry of the manifest. Only the last
    /// writer's content survives, so the category is not counted as a success.
    pub overwritten: Vec<String>,
    pub failure: Option<CategoryFailure>,
}

impl CategoryReport {
    fn failed(category: &str, files: usize, failure: CategoryFailure) -> Self {
        Self {
            category: category.to_string(),
            playlists: 0,
            files,
            overwritten: Vec::new(),
            failure: Some(failure),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.overwritten.is_empty()
    }
}

/// Playlists resolved for one category, and the paths more than one of them
/// mapped to.
struct Resolved {
    playlists: usize,
    overwritten: Vec<String>,
}

#[derive(Debug)]
pub enum CommitStatus {
    /// No category produced any file.
    NothingToCommit,
    Done(CommitOutcome),
    Failed(BackupError),
}

#[derive(Debug)]
pub struct RunReport {
    pub snapshot: Option<RunSnapshot>,
    pub categories: Vec<CategoryReport>,
    pub commit: CommitStatus,
}

impl RunReport {
    pub fn failed_categories(&self) -> impl Iterator<Item = &CategoryReport> {
        self.categories.iter().filter(|report| !report.succeeded())
    }

    pub fn succeeded(&self) -> bool {
        self.failed_categories().next().is_none()
            && !matches!(self.commit, CommitStatus::Failed(_))
    }
}

/// Result of walking every category, before anything is committed.
#[derive(Debug)]
pub struct Collected {
    pub batch: TreeBatch,
    pub categories: Vec<CategoryReport>,
}

impl Collected {
    /// Categories whose files made it into the batch, in run order.
    pub fn contributing_categories(&self) -> Vec<String> {
        self.categories
            .iter()
            .filter(|report| report.files > 0)
            .map(|report| report.category.clone())
            .collect()
    }
}

pub struct BackupRun<'a, F: ?Sized, P: ?Sized> {
    plan: &'a RunPlan,
    feed: &'a F,
    videos: &'a P,
}

impl<'a, F, P> BackupRun<'a, F, P>
where
    F: FeedSource + ?Sized,
    P: PageFetcher + ?Sized,
{
    pub fn new(plan: &'a RunPlan, feed: &'a F, videos: &'a P) -> Self {
        Self { plan, feed, videos }
    }

    /// Snapshot, collect every category, then commit the whole change-set once.
    ///
    /// Only a failing snapshot aborts with `Err`; category and commit failures
    /// are carried in the report.
    pub fn commit_run<S>(&self, store: &S, branch: &str, date: NaiveDate) -> Result<RunReport>
    where
        S: ObjectStore + ?Sized,
    {
        let builder = CommitBuilder::new(store, branch);
        let snapshot = builder.snapshot()?;

        let collected = self.collect();
        let commit = if collected.batch.is_empty() {
            info!("no files to commit");
            CommitStatus::NothingToCommit
        } else {
            let message = commit_message(&collected.contributing_categories(), date);
            match builder.commit(&snapshot, collected.batch.snapshot(), &message) {
                Ok(outcome) => CommitStatus::Done(outcome),
                Err(err) => {
                    warn!("commit failed: {err}");
                    CommitStatus::Failed(err)
                }
            }
        };

        Ok(RunReport {
            snapshot: Some(snapshot),
            categories: collected.categories,
            commit,
        })
    }

    /// Walks every category in plan order and gathers their files.
    pub fn collect(&self) -> Collected {
        let mut batch = TreeBatch::new();
        let mut categories = Vec::with_capacity(self.plan.categories.len());
        for category in &self.plan.categories {
            let report = self.process_category(category, &mut batch);
            match &report.failure {
                None if report.overwritten.is_empty() => info!(
                    "category {category}: {} playlist(s), {} file(s)",
                    report.playlists, report.files
                ),
                None => warn!(
                    "category {category}: {} path(s) written more than once: {}",
                    report.overwritten.len(),
                    report.overwritten.join(", ")
                ),
                Some(failure) => warn!("category {category} failed while {failure}"),
            }
            categories.push(report);
        }
        Collected { batch, categories }
    }

    fn process_category(&self, category: &str, batch: &mut TreeBatch) -> CategoryReport {
        info!("category {category}");
        let manifest = match self.feed.fetch_manifest(category) {
            Ok(manifest) => manifest,
            Err(error) => {
                return CategoryReport::failed(
                    category,
                    0,
                    CategoryFailure::new("fetching manifest", error),
                );
            }
        };

        let mut staged = TreeBatch::new();
        staged.add_change(manifest_path(category), manifest.clone());

        match self.resolve_playlists(category, &manifest, &mut staged) {
            Ok(Resolved {
                playlists,
                overwritten,
            }) => {
                let files = staged.len() - overwritten.len();
                batch.extend(staged);
                CategoryReport {
                    category: category.to_string(),
                    playlists,
                    files,
                    overwritten,
                    failure: None,
                }
            }
            Err(failure) => {
                let files = match self.plan.manifest_policy {
                    ManifestPolicy::Always => {
                        batch.add_change(manifest_path(category), manifest);
                        1
                    }
                    ManifestPolicy::WithCategory => 0,
                };
                CategoryReport::failed(category, files, failure)
            }
        }
    }

    fn resolve_playlists(
        &self,
        category: &str,
        manifest: &[u8],
        staged: &mut TreeBatch,
    ) -> std::result::Result<Resolved, CategoryFailure> {
        let shape = FeedShape::for_category(category, &self.plan.org_category);
        let playlists = normalize(manifest, shape)
            .map_err(|error| CategoryFailure::new("decoding manifest", error))?;

        let mut written = BTreeSet::from([manifest_path(category)]);
        let mut overwritten = Vec::new();
        for playlist in &playlists {
            let step = || format!("resolving playlist \"{}\" ({})", playlist.title, playlist.id);
            let videos = collect_videos(self.videos, &playlist.id)
                .map_err(|error| CategoryFailure::new(step(), error))?;
            info!(
                "  {} ({}): {} video(s)",
                playlist.title,
                playlist.id,
                videos.len()
            );
            let file = PlaylistFile {
                default_img: playlist.default_image.clone(),
                videos,
            };
            let content = serde_json::to_vec(&file).map_err(|err| {
                CategoryFailure::new(
                    step(),
                    BackupError::Encode {
                        what: "playlist file".into(),
                        source: err,
                    },
                )
            })?;
            let path = playlist_path(category, playlist);
            if !written.insert(path.clone()) {
                warn!(
                    "playlist \"{}\" ({}) overwrites {path}; earlier content is lost",
                    playlist.title, playlist.id
                );
                overwritten.push(path.clone());
            }
            staged.add_change(path, content);
        }

        Ok(Resolved {
            playlists: playlists.len(),
            overwritten,
        })
    }
}

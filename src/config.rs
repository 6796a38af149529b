#![forbid(unsafe_code)]

//! Run configuration.
//!
//! Non-secret settings come from a TOML file. API credentials come from the
//! process environment, falling back to a `.env` file. Command-line
//! overrides win over both.

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::backup::{ManifestPolicy, RunPlan};
use crate::playlists::{DEFAULT_FEED_BASE_URL, DEFAULT_ORG_CATEGORY};
use crate::store::github;
use crate::youtube;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_CONFIG_PATH: &str = "config/backup.toml";
pub const DEFAULT_BRANCH: &str = "master";
pub const YOUTUBE_API_KEY_VAR: &str = "YOUTUBE_API_KEY";
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySettings {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// `owner/name`
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            repo: None,
            branch: default_branch(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct YoutubeSettings {
    #[serde(default = "default_youtube_api_url")]
    api_url: String,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            api_url: default_youtube_api_url(),
        }
    }
}

/// Shape of the TOML settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default = "default_feed_base_url")]
    feed_base_url: String,
    #[serde(default = "default_org_category")]
    org_category: String,
    #[serde(default)]
    commit_manifest_on_failure: bool,
    #[serde(default)]
    repository: RepositorySettings,
    #[serde(default)]
    youtube: YoutubeSettings,
}

fn default_github_api_url() -> String {
    github::DEFAULT_API_URL.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_youtube_api_url() -> String {
    youtube::DEFAULT_API_URL.to_string()
}

fn default_feed_base_url() -> String {
    DEFAULT_FEED_BASE_URL.to_string()
}

fn default_org_category() -> String {
    DEFAULT_ORG_CATEGORY.to_string()
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub youtube_api_key: Option<String>,
    pub github_token: Option<String>,
}

// Never print credentials, even in debug output.
impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("youtube_api_key", &self.youtube_api_key.as_ref().map(|_| "***"))
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub categories: Vec<String>,
    pub feed_base_url: String,
    pub org_category: String,
    pub manifest_policy: ManifestPolicy,
    pub repository: RepositorySettings,
    pub youtube_api_url: String,
    pub secrets: Secrets,
}

impl Settings {
    pub fn run_plan(&self) -> RunPlan {
        RunPlan {
            categories: self.categories.clone(),
            org_category: self.org_category.clone(),
            manifest_policy: self.manifest_policy,
        }
    }

    pub fn youtube_api_key(&self) -> Result<&str> {
        self.secrets
            .youtube_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{YOUTUBE_API_KEY_VAR} not set"))
    }

    pub fn github_token(&self) -> Result<&str> {
        self.secrets
            .github_token
            .as_deref()
            .ok_or_else(|| anyhow!("{GITHUB_TOKEN_VAR} not set"))
    }

    pub fn repo(&self) -> Result<&str> {
        self.repository
            .repo
            .as_deref()
            .ok_or_else(|| anyhow!("repository.repo not set in the settings file"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
    /// Replaces the configured category list when non-empty.
    pub categories: Vec<String>,
    pub branch: Option<String>,
}

pub fn load_settings(overrides: Overrides) -> Result<Settings> {
    let config_path = overrides
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let raw = fs::read_to_string(&config_path)
        .with_context(|| format!("Reading {}", config_path.display()))?;
    let file = parse_settings(&raw)
        .with_context(|| format!("Parsing {}", config_path.display()))?;

    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    build_settings(file, &file_vars, env_var_string, overrides)
}

fn parse_settings(raw: &str) -> Result<FileSettings> {
    toml::from_str(raw).context("invalid settings file")
}

fn build_settings(
    file: FileSettings,
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: Overrides,
) -> Result<Settings> {
    let requested = if overrides.categories.is_empty() {
        file.categories
    } else {
        overrides.categories
    };
    let categories: Vec<String> = requested
        .into_iter()
        .map(|category| category.trim().to_string())
        .filter(|category| !category.is_empty())
        .collect();
    if categories.is_empty() {
        bail!("no categories configured");
    }
    if let Some(bad) = categories.iter().find(|category| category.contains('/')) {
        bail!("category {bad:?} must not contain '/'");
    }

    let mut repository = file.repository;
    if let Some(branch) = overrides
        .branch
        .map(|branch| branch.trim().to_string())
        .filter(|branch| !branch.is_empty())
    {
        repository.branch = branch;
    }

    let secrets = Secrets {
        youtube_api_key: lookup_value(YOUTUBE_API_KEY_VAR, file_vars, &env_lookup),
        github_token: lookup_value(GITHUB_TOKEN_VAR, file_vars, &env_lookup),
    };

    let manifest_policy = if file.commit_manifest_on_failure {
        ManifestPolicy::Always
    } else {
        ManifestPolicy::WithCategory
    };

    Ok(Settings {
        categories,
        feed_base_url: file.feed_base_url,
        org_category: file.org_category,
        manifest_policy,
        repository,
        youtube_api_url: file.youtube.api_url,
        secrets,
    })
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

/// Parses `KEY=value` lines. Blank lines, `#` comments and lines without `=`
/// are skipped; an `export ` prefix and matching quotes are stripped.
/// A missing file yields no variables.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
        categories = ["country", "organization"]

        [repository]
        repo = "rwapps/video_backups"
    "#;

    fn make_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(toml: &str, env_file: &str, overrides: Overrides) -> Result<Settings> {
        let vars = read_env_file(make_file(env_file).path())?;
        build_settings(parse_settings(toml)?, &vars, |_| None, overrides)
    }

    #[test]
    fn minimal_settings_use_defaults() {
        let settings = settings_from(MINIMAL, "", Overrides::default()).unwrap();
        assert_eq!(settings.categories, ["country", "organization"]);
        assert_eq!(settings.feed_base_url, DEFAULT_FEED_BASE_URL);
        assert_eq!(settings.org_category, "organization");
        assert_eq!(settings.manifest_policy, ManifestPolicy::WithCategory);
        assert_eq!(settings.repository.api_url, "https://api.github.com");
        assert_eq!(settings.repository.branch, DEFAULT_BRANCH);
        assert_eq!(settings.repo().unwrap(), "rwapps/video_backups");
        assert_eq!(settings.youtube_api_url, youtube::DEFAULT_API_URL);
        assert!(settings.youtube_api_key().is_err());
    }

    #[test]
    fn full_settings_are_honoured() {
        let settings = settings_from(
            r#"
            categories = ["disaster"]
            feed_base_url = "https://feeds.example/playlists"
            org_category = "orgs"
            commit_manifest_on_failure = true

            [repository]
            api_url = "https://git.example/api/v3"
            repo = "me/backups"
            branch = "main"

            [youtube]
            api_url = "https://yt.example/v3"
            "#,
            "",
            Overrides::default(),
        )
        .unwrap();
        assert_eq!(settings.org_category, "orgs");
        assert_eq!(settings.manifest_policy, ManifestPolicy::Always);
        assert_eq!(settings.repository.branch, "main");
        assert_eq!(settings.youtube_api_url, "https://yt.example/v3");
        let plan = settings.run_plan();
        assert_eq!(plan.categories, ["disaster"]);
        assert_eq!(plan.manifest_policy, ManifestPolicy::Always);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_settings("categories = [\"a\"]\ncategory = \"typo\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("category"));
    }

    #[test]
    fn empty_category_list_is_an_error() {
        let err = settings_from("categories = [\" \"]", "", Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("no categories"));
    }

    #[test]
    fn category_with_slash_is_an_error() {
        let err = settings_from("categories = [\"a/b\"]", "", Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("must not contain"));
    }

    #[test]
    fn overrides_replace_categories_and_branch() {
        let settings = settings_from(
            MINIMAL,
            "",
            Overrides {
                categories: vec!["country".into()],
                branch: Some("backup-test".into()),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(settings.categories, ["country"]);
        assert_eq!(settings.repository.branch, "backup-test");
    }

    #[test]
    fn secrets_come_from_env_file() {
        let settings = settings_from(
            MINIMAL,
            "YOUTUBE_API_KEY=\"yt-key\"\nGITHUB_TOKEN='gh-token'\n",
            Overrides::default(),
        )
        .unwrap();
        assert_eq!(settings.youtube_api_key().unwrap(), "yt-key");
        assert_eq!(settings.github_token().unwrap(), "gh-token");
        assert!(!format!("{:?}", settings.secrets).contains("gh-token"));
    }

    #[test]
    fn process_env_wins_over_env_file() {
        let vars = read_env_file(make_file("GITHUB_TOKEN=\"from-file\"\n").path()).unwrap();
        let settings = build_settings(
            parse_settings(MINIMAL).unwrap(),
            &vars,
            |key| (key == GITHUB_TOKEN_VAR).then(|| "from-env".to_string()),
            Overrides::default(),
        )
        .unwrap();
        assert_eq!(settings.github_token().unwrap(), "from-env");
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let settings =
            settings_from(MINIMAL, "YOUTUBE_API_KEY=\"  \"\n", Overrides::default()).unwrap();
        assert!(settings.youtube_api_key().is_err());
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_file(
            r#"
            export YOUTUBE_API_KEY="abc"
            GITHUB_TOKEN='def'
            SPACED =  "x y"
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("YOUTUBE_API_KEY").unwrap(), "abc");
        assert_eq!(vars.get("GITHUB_TOKEN").unwrap(), "def");
        assert_eq!(vars.get("SPACED").unwrap(), "x y");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn load_settings_reads_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("backup.toml");
        let env_path = dir.path().join(".env");
        fs::write(&config_path, MINIMAL).unwrap();
        fs::write(&env_path, "YOUTUBE_API_KEY=\"k\"\n").unwrap();

        let settings = load_settings(Overrides {
            config_path: Some(config_path),
            env_path: Some(env_path),
            ..Overrides::default()
        })
        .unwrap();
        assert_eq!(settings.categories.len(), 2);
        assert!(settings.secrets.youtube_api_key.is_some());
    }

    #[test]
    fn load_settings_requires_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings(Overrides {
            config_path: Some(dir.path().join("nope.toml")),
            env_path: Some(dir.path().join(".env")),
            ..Overrides::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }
}

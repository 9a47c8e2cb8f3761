//! Configuration loading: the main config file plus the per-host profile
//! directory and the script catalog discovered from the filesystem.
//!
//! Everything here is validated up front. A malformed host profile aborts
//! the whole run before any job starts; a bad config cannot be partially
//! trusted.

use crate::core::models::{HostProfile, ScriptCatalog, ScriptSet};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid host profile {path}: {source}")]
    Profile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("duplicate host {host} (also defined in {path})")]
    DuplicateHost { host: String, path: PathBuf },
    #[error("concurrency must be a positive integer")]
    ZeroConcurrency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Maximum number of hosts backed up at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Directory of per-host profile files (`<name>.toml`).
    #[serde(default = "default_servers_dir")]
    pub servers_dir: PathBuf,
    /// Directory of per-host script directories.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    /// Local destination root; each host mirrors into `<backup_dir>/<host>`.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    /// Where per-host transfer logs are written.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Optional cap on any single remote invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

fn default_concurrency() -> usize {
    1
}

fn default_servers_dir() -> PathBuf {
    PathBuf::from("servers")
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl AppConfig {
    /// Layer the config file, `SSB_`-prefixed environment variables, and
    /// any CLI overrides, in increasing priority.
    pub fn load(path: &Path, cli: Option<&impl Serialize>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SSB_"));
        if let Some(cli) = cli {
            figment = figment.merge(Serialized::defaults(cli));
        }

        let config: AppConfig = figment.extract().map_err(Box::new)?;
        if config.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(config)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Load and validate every `*.toml` profile under the servers directory.
///
/// Files are read in name order so a duplicate-host error is stable.
pub fn load_host_profiles(servers_dir: &Path) -> Result<Vec<Arc<HostProfile>>, ConfigError> {
    let entries = std::fs::read_dir(servers_dir).map_err(|source| ConfigError::Io {
        path: servers_dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    let mut profiles = Vec::with_capacity(paths.len());
    for path in paths {
        debug!(path = %path.display(), "loading host profile");
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let profile: HostProfile = toml::from_str(&raw).map_err(|source| ConfigError::Profile {
            path: path.clone(),
            source,
        })?;

        if !seen.insert(profile.hostname.clone()) {
            return Err(ConfigError::DuplicateHost {
                host: profile.hostname,
                path,
            });
        }
        profiles.push(Arc::new(profile));
    }

    info!(count = profiles.len(), "loaded host profiles");
    Ok(profiles)
}

/// Discover pre/post scripts for each host from `<scripts_dir>/<hostname>/`.
///
/// File names starting with `pre` are pre-scripts, `post` are post-scripts;
/// each list is sorted lexicographically, which fixes execution order.
/// A host without a script directory simply has no scripts.
pub fn discover_scripts(
    scripts_dir: &Path,
    profiles: &[Arc<HostProfile>],
) -> Result<ScriptCatalog, ConfigError> {
    let mut catalog = ScriptCatalog::new();

    for profile in profiles {
        let host_dir = scripts_dir.join(&profile.hostname);
        if !host_dir.is_dir() {
            debug!(host = %profile.hostname, "no script directory");
            continue;
        }

        let entries = std::fs::read_dir(&host_dir).map_err(|source| ConfigError::Io {
            path: host_dir.clone(),
            source,
        })?;

        let mut pre = Vec::new();
        let mut post = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("pre") {
                pre.push(name);
            } else if name.starts_with("post") {
                post.push(name);
            }
        }
        pre.sort();
        post.sort();

        debug!(
            host = %profile.hostname,
            pre = pre.len(),
            post = post.len(),
            "discovered scripts"
        );
        catalog.insert(
            profile.hostname.clone(),
            ScriptSet {
                local_dir: Some(host_dir),
                pre,
                post,
            },
        );
    }

    Ok(catalog)
}

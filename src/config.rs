//! Settings come from three layers: command line flags, then the selected
//! environment of a YAML config file, then built-in defaults.
//!
//! ```yaml
//! production:
//!   global:
//!     bucket: ./public
//!   deploy:
//!     root: ./build
//!     files: "*.html,assets"
//!     dest: site
//!   rollback:
//!     dest: site
//! ```

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Args;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    path::{clamp, clean},
    upload::UPLOAD_WORKERS,
};

pub const DEFAULT_CONFIG: &str = "./config.yaml";
pub const DEFAULT_ENV: &str = "default";

pub const DEFAULT_FILES: &str = "*.html";
pub const DEFAULT_ROOT: &str = "./";
pub const DEFAULT_DEST: &str = "./";
pub const DEFAULT_PROPAGATION_DELAY_MS: u64 = 1500;

#[derive(Debug, Clone, Default, Deserialize, Args)]
#[serde(deny_unknown_fields)]
pub struct GlobalSection {
    /// Directory holding the bucket to deploy into
    #[arg(long, global = true)]
    pub bucket: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Args)]
#[serde(deny_unknown_fields)]
pub struct DeploySection {
    /// The local directory (prefix) to deploy [default: ./]
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Comma separated glob patterns of files to deploy (within root) besides
    /// the scripts and stylesheets referenced from HTML [default: *.html]
    #[arg(long)]
    pub files: Option<String>,
    /// The destination directory to write files to in the bucket [default: ./]
    #[arg(long)]
    pub dest: Option<String>,
    /// Number of concurrent uploads [default: 20]
    #[arg(long)]
    pub workers: Option<usize>,
    /// Wait between uploading assets and publishing HTML [default: 1500]
    #[arg(long)]
    pub propagation_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Args)]
#[serde(deny_unknown_fields)]
pub struct RollbackSection {
    /// The destination directory files were deployed to [default: ./]
    #[arg(long)]
    pub dest: Option<String>,
    /// The version to roll back to, as printed by the deploy
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvProfile {
    #[serde(default)]
    pub global: GlobalSection,
    #[serde(default)]
    pub deploy: DeploySection,
    #[serde(default)]
    pub rollback: RollbackSection,
}

pub type ConfigFile = BTreeMap<String, EnvProfile>;

/// Loads the profile of `env` from `path`.
///
/// Without an explicit path a missing `./config.yaml` is fine, and without an
/// explicit env a file lacking a `default` entry is ignored.
pub fn load_profile(path: Option<&Path>, env: Option<&str>) -> Result<EnvProfile> {
    let file = path.unwrap_or(Path::new(DEFAULT_CONFIG));

    let raw = match std::fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound && path.is_none() => {
            debug!(file = %file.display(), "no config file");
            return Ok(EnvProfile::default());
        }
        Err(e) => return Err(e.into()),
    };

    parse_profile(&raw, env)
}

pub fn parse_profile(raw: &str, env: Option<&str>) -> Result<EnvProfile> {
    let mut config: ConfigFile = serde_yaml::from_str(raw)?;

    match (config.remove(env.unwrap_or(DEFAULT_ENV)), env) {
        (Some(profile), _) => Ok(profile),
        (None, Some(env)) => Err(Error::config(format!("env {env} does not exist in the config file"))),
        (None, None) => {
            info!("env not provided and no default env found, ignoring config file");
            Ok(EnvProfile::default())
        }
    }
}

impl GlobalSection {
    pub fn merge(self, under: GlobalSection) -> GlobalSection {
        GlobalSection {
            bucket: self.bucket.or(under.bucket),
        }
    }

    pub fn require_bucket(&self) -> Result<&Path> {
        self.bucket
            .as_deref()
            .ok_or_else(|| Error::config("the --bucket flag is required"))
    }
}

impl DeploySection {
    pub fn merge(self, under: DeploySection) -> DeploySection {
        DeploySection {
            root: self.root.or(under.root),
            files: self.files.or(under.files),
            dest: self.dest.or(under.dest),
            workers: self.workers.or(under.workers),
            propagation_delay_ms: self.propagation_delay_ms.or(under.propagation_delay_ms),
        }
    }
}

impl RollbackSection {
    pub fn merge(self, under: RollbackSection) -> RollbackSection {
        RollbackSection {
            dest: self.dest.or(under.dest),
            version: self.version.or(under.version),
        }
    }
}

/// Bucket keys never start with `/` nor climb above the bucket root.
pub fn normalize_dest(dest: &str) -> String {
    clamp(&clean(dest))
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub root: PathBuf,
    pub files: String,
    pub dest: String,
    pub workers: usize,
    pub propagation_delay: Duration,
}

impl TryFrom<DeploySection> for DeployConfig {
    type Error = Error;

    fn try_from(section: DeploySection) -> Result<Self> {
        let workers = section.workers.unwrap_or(UPLOAD_WORKERS);
        if workers == 0 {
            return Err(Error::config("--workers must be at least 1"));
        }

        Ok(DeployConfig {
            root: section.root.unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT)),
            files: section.files.unwrap_or_else(|| DEFAULT_FILES.to_string()),
            dest: normalize_dest(section.dest.as_deref().unwrap_or(DEFAULT_DEST)),
            workers,
            propagation_delay: Duration::from_millis(
                section
                    .propagation_delay_ms
                    .unwrap_or(DEFAULT_PROPAGATION_DELAY_MS),
            ),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RollbackConfig {
    pub dest: String,
    pub version: String,
}

impl TryFrom<RollbackSection> for RollbackConfig {
    type Error = Error;

    fn try_from(section: RollbackSection) -> Result<Self> {
        let version = section
            .version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config("the --version flag is required for the `rollback` command"))?;

        if version.contains('/') || version.contains("..") {
            return Err(Error::config(format!("invalid version {version:?}")));
        }

        Ok(RollbackConfig {
            dest: normalize_dest(section.dest.as_deref().unwrap_or(DEFAULT_DEST)),
            version,
        })
    }
}

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::artifact::{ArtifactStore, FsArtifactStore, HttpArtifactStore};
use crate::error::{CleaningError, Result};
use crate::mirror::ExperimentMirror;
use crate::run_context::{RunContext, DEFAULT_JOB_TYPE, DEFAULT_PROJECT};

pub const DEFAULT_CONFIG_FILE: &str = "basic_cleaning.toml";

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CleaningConfig {
    pub run: RunConfig,
    pub store: StoreConfig,
    pub mirror: MirrorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub project: String,
    pub job_type: String,
    pub work_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            job_type: DEFAULT_JOB_TYPE.to_string(),
            work_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Fs,
    Http,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub root: PathBuf,
    pub url: Option<String>,
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Fs,
            root: PathBuf::from("artifact_store"),
            url: None,
            token_env: "ARTIFACT_STORE_TOKEN".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct MirrorConfig {
    pub root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            filter: "basic_cleaning=info,warn".to_string(),
        }
    }
}

impl CleaningConfig {
    /// Load configuration from `path`, or from `basic_cleaning.toml` when it
    /// exists. Environment variables override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CleaningError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay values from the environment. `lookup` is injected for tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("ARTIFACT_STORE_BACKEND") {
            match backend.to_ascii_lowercase().as_str() {
                "fs" => self.store.backend = StoreBackend::Fs,
                "http" => self.store.backend = StoreBackend::Http,
                other => tracing::warn!("Ignoring unknown ARTIFACT_STORE_BACKEND '{}'", other),
            }
        }
        if let Some(root) = lookup("ARTIFACT_STORE_ROOT") {
            self.store.root = PathBuf::from(root);
        }
        if let Some(url) = lookup("ARTIFACT_STORE_URL") {
            self.store.url = Some(url);
        }
        if let Some(project) = lookup("CLEANING_PROJECT") {
            self.run.project = project;
        }
        if let Some(root) = lookup("CLEANING_MIRROR_ROOT") {
            self.mirror.root = Some(PathBuf::from(root));
        }
    }

    pub fn run_context(&self) -> RunContext {
        RunContext::new(self.run.project.clone(), self.run.job_type.clone())
    }

    /// Build the configured artifact store client for `ctx`.
    pub fn build_store(&self, ctx: RunContext) -> Result<Box<dyn ArtifactStore>> {
        match self.store.backend {
            StoreBackend::Fs => Ok(Box::new(FsArtifactStore::new(self.store.root.clone(), ctx))),
            StoreBackend::Http => {
                let url = self.store.url.as_deref().ok_or_else(|| {
                    CleaningError::Config("store.url is required for the http backend".to_string())
                })?;
                let token = std::env::var(&self.store.token_env).ok();
                let timeout = Duration::from_secs(self.store.timeout_secs);
                Ok(Box::new(HttpArtifactStore::new(url, token, timeout, ctx)?))
            }
        }
    }

    pub fn build_mirror(&self) -> Option<ExperimentMirror> {
        self.mirror.root.as_ref().map(ExperimentMirror::new)
    }
}

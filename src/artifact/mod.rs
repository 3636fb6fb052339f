//! Versioned artifacts: references, manifests and the store interface.
//!
//! ```text
//!  "name:vN" ──parse──▶ ArtifactRef ──use_artifact──▶ ArtifactManifest ──download──▶ local dir
//!
//!  PendingArtifact ──add_file*──▶ log_artifact ──▶ ArtifactManifest (next version)
//! ```
//!
//! File contents live in a content-addressed blob space keyed by SHA-256;
//! manifests only carry names, digests and metadata.

pub mod cas_fs;
pub mod http;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{CleaningError, Result};

pub use cas_fs::FsArtifactStore;
pub use http::HttpArtifactStore;

/// Artifact type of the datasets this step consumes.
pub const RAW_DATA_TYPE: &str = "raw_data";

const CAS_PREFIX: &str = "cas:sha256:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactVersion {
    Latest,
    Index(u32),
}

impl fmt::Display for ArtifactVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactVersion::Latest => write!(f, "latest"),
            ArtifactVersion::Index(n) => write!(f, "v{}", n),
        }
    }
}

/// `name`, `name:latest` or `name:vN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub name: String,
    pub version: ArtifactVersion,
}

impl FromStr for ArtifactRef {
    type Err = CleaningError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| CleaningError::InvalidReference {
            reference: s.to_string(),
            reason: reason.to_string(),
        };

        let (name, version) = match s.split_once(':') {
            Some((name, tag)) => {
                let version = if tag == "latest" {
                    ArtifactVersion::Latest
                } else {
                    tag.strip_prefix('v')
                        .and_then(|n| n.parse::<u32>().ok())
                        .map(ArtifactVersion::Index)
                        .ok_or_else(|| invalid("version must be 'latest' or 'v<N>'"))?
                };
                (name, version)
            }
            None => (s, ArtifactVersion::Latest),
        };

        validate_name(name).map_err(|reason| invalid(reason))?;
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

fn validate_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("name is empty");
    }
    if name.contains(|c: char| matches!(c, '/' | '\\' | ':')) {
        return Err("name must not contain '/', '\\' or ':'");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub name: String,
    pub sha256: String,
    pub size: u64,
}

impl ArtifactFile {
    pub fn payload_ref(&self) -> String {
        format!("{}{}", CAS_PREFIX, self.sha256)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub version: u32,
    pub digest: String,
    pub files: Vec<ArtifactFile>,
    pub created_at: DateTime<Utc>,
    pub created_by_run: Option<Uuid>,
}

impl ArtifactManifest {
    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef {
            name: self.name.clone(),
            version: ArtifactVersion::Index(self.version),
        }
    }

    /// Directory name used when materializing this version locally.
    pub fn download_dir_name(&self) -> String {
        format!("{}-v{}", self.name, self.version)
    }

    pub fn ensure_kind(&self, expected: &str) -> Result<()> {
        if self.kind != expected {
            return Err(CleaningError::ArtifactTypeMismatch {
                name: self.name.clone(),
                expected: expected.to_string(),
                actual: self.kind.clone(),
            });
        }
        Ok(())
    }
}

/// An artifact being assembled before it is logged to a store.
#[derive(Debug, Clone)]
pub struct PendingArtifact {
    pub name: String,
    pub kind: String,
    pub description: String,
    files: Vec<PathBuf>,
}

impl PendingArtifact {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name).map_err(|reason| CleaningError::InvalidReference {
            reference: name.clone(),
            reason: reason.to_string(),
        })?;
        Ok(Self {
            name,
            kind: kind.into(),
            description: description.into(),
            files: Vec::new(),
        })
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CleaningError::InvalidArtifactFile(path.display().to_string()));
        }
        self.files.push(path.to_path_buf());
        Ok(())
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Read every added file, returning its entry and contents.
    pub(crate) fn read_files(&self) -> Result<Vec<(ArtifactFile, Vec<u8>)>> {
        self.files
            .iter()
            .map(|path| {
                let bytes = fs::read(path)?;
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| CleaningError::InvalidArtifactFile(path.display().to_string()))?
                    .to_string();
                let entry = ArtifactFile {
                    name,
                    sha256: sha256_hex(&bytes),
                    size: bytes.len() as u64,
                };
                Ok((entry, bytes))
            })
            .collect()
    }
}

/// Where lineage records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageEvent {
    Used,
    Logged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub run_id: Uuid,
    pub event: LineageEvent,
    pub artifact: String,
    pub version: u32,
    pub digest: String,
    pub at: DateTime<Utc>,
}

/// Download/upload interface of a versioned artifact store.
pub trait ArtifactStore {
    /// Resolve `reference`, check its type and record it as an input of the run.
    fn use_artifact(&self, reference: &ArtifactRef, kind: &str) -> Result<ArtifactManifest>;

    /// Materialize all files of `manifest` under `dest_root` and return the directory.
    fn download(&self, manifest: &ArtifactManifest, dest_root: &Path) -> Result<PathBuf>;

    /// Register `pending` as the next version of its name and record it as a run output.
    fn log_artifact(&self, pending: PendingArtifact) -> Result<ArtifactManifest>;
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Digest of an artifact's content: SHA-256 over sorted `name:sha256` lines.
pub fn content_digest(files: &[ArtifactFile]) -> String {
    let mut lines: Vec<String> = files
        .iter()
        .map(|f| format!("{}:{}", f.name, f.sha256))
        .collect();
    lines.sort();
    sha256_hex(lines.join("\n").as_bytes())
}

/// A single file name with no directory components, so joining it onto a
/// directory stays inside that directory.
pub fn is_plain_file_name(name: &str) -> bool {
    Path::new(name).file_name().and_then(|f| f.to_str()) == Some(name)
}

pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Reject manifests whose names or digests could not have come from a store
/// write. Manifests from a remote store are untrusted input.
fn check_manifest(manifest: &ArtifactManifest) -> Result<()> {
    validate_name(&manifest.name).map_err(|reason| CleaningError::InvalidReference {
        reference: manifest.name.clone(),
        reason: reason.to_string(),
    })?;
    for file in &manifest.files {
        if !is_plain_file_name(&file.name) {
            return Err(CleaningError::InvalidArtifactFile(file.name.clone()));
        }
        if !is_sha256_hex(&file.sha256) {
            return Err(CleaningError::Store {
                message: format!("file '{}' has malformed sha256 '{}'", file.name, file.sha256),
            });
        }
    }
    Ok(())
}

/// Write verified file contents into `dest_root/<name>-v<N>/`.
pub(crate) fn materialize<F>(manifest: &ArtifactManifest, dest_root: &Path, mut fetch: F) -> Result<PathBuf>
where
    F: FnMut(&ArtifactFile) -> Result<Vec<u8>>,
{
    check_manifest(manifest)?;
    let dir = dest_root.join(manifest.download_dir_name());
    fs::create_dir_all(&dir)?;
    for file in &manifest.files {
        let bytes = fetch(file)?;
        let actual = sha256_hex(&bytes);
        if actual != file.sha256 {
            return Err(CleaningError::ChecksumMismatch {
                file: file.name.clone(),
                expected: file.sha256.clone(),
                actual,
            });
        }
        fs::write(dir.join(&file.name), bytes)?;
    }
    Ok(dir)
}

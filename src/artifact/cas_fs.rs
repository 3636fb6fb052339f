use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use super::{
    content_digest, is_sha256_hex, materialize, sha256_hex, ArtifactFile, ArtifactManifest, ArtifactRef,
    ArtifactStore, ArtifactVersion, LineageEvent, LineageRecord, PendingArtifact, CAS_PREFIX,
};
use crate::error::{CleaningError, Result};
use crate::run_context::RunContext;

/// Artifact store on the local filesystem.
///
/// Layout under `root`:
/// - `cas/sha256/<aa>/<bb>/<hex>`: file contents
/// - `artifacts/<project>/<name>/v<N>.json`: manifests
/// - `runs/<run_id>.ndjson`: lineage records of a run
pub struct FsArtifactStore {
    root: PathBuf,
    ctx: RunContext,
}

impl FsArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P, ctx: RunContext) -> Self {
        Self {
            root: root.into(),
            ctx,
        }
    }

    fn blob_path(&self, hex: &str) -> PathBuf {
        self.root
            .join("cas")
            .join("sha256")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(hex)
    }

    fn artifact_dir(&self, name: &str) -> PathBuf {
        self.root.join("artifacts").join(&self.ctx.project).join(name)
    }

    fn manifest_path(&self, name: &str, version: u32) -> PathBuf {
        self.artifact_dir(name).join(format!("v{}.json", version))
    }

    fn lineage_path(&self) -> PathBuf {
        self.root.join("runs").join(format!("{}.ndjson", self.ctx.run_id))
    }

    /// Store bytes content-addressed and return `cas:sha256:<hex>`.
    pub fn write_cas(&self, bytes: &[u8]) -> Result<String> {
        let hex = sha256_hex(bytes);
        let path = self.blob_path(&hex);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            fs::write(&path, bytes)?;
        }
        Ok(format!("{}{}", CAS_PREFIX, hex))
    }

    pub fn read_cas(&self, payload_ref: &str) -> Result<Vec<u8>> {
        let hex = payload_ref
            .strip_prefix(CAS_PREFIX)
            .filter(|h| is_sha256_hex(h))
            .ok_or_else(|| CleaningError::Store {
                message: format!("bad payload ref '{}'", payload_ref),
            })?;
        let path = self.blob_path(hex);
        if !path.exists() {
            return Err(CleaningError::Store {
                message: format!("blob {} missing from {:?}", payload_ref, self.root),
            });
        }
        Ok(fs::read(path)?)
    }

    /// Published versions of `name`, ascending.
    pub fn versions(&self, name: &str) -> Result<Vec<u32>> {
        let dir = self.artifact_dir(name);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(dir)? {
            let file_name = entry?.file_name();
            let version = file_name
                .to_str()
                .and_then(|f| f.strip_prefix('v'))
                .and_then(|f| f.strip_suffix(".json"))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(v) = version {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn read_manifest(&self, name: &str, version: u32) -> Result<ArtifactManifest> {
        let path = self.manifest_path(name, version);
        if !path.exists() {
            return Err(CleaningError::ArtifactNotFound(format!("{}:v{}", name, version)));
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn resolve(&self, reference: &ArtifactRef) -> Result<ArtifactManifest> {
        let version = match reference.version {
            ArtifactVersion::Index(v) => v,
            ArtifactVersion::Latest => *self
                .versions(&reference.name)?
                .last()
                .ok_or_else(|| CleaningError::ArtifactNotFound(reference.to_string()))?,
        };
        self.read_manifest(&reference.name, version)
    }

    fn append_lineage(&self, event: LineageEvent, manifest: &ArtifactManifest) -> Result<()> {
        let path = self.lineage_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let record = LineageRecord {
            run_id: self.ctx.run_id,
            event,
            artifact: manifest.name.clone(),
            version: manifest.version,
            digest: manifest.digest.clone(),
            at: Utc::now(),
        };
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(&record)?)?;
        Ok(())
    }

    /// Lineage records written by this store's run so far.
    pub fn lineage(&self) -> Result<Vec<LineageRecord>> {
        let path = self.lineage_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn use_artifact(&self, reference: &ArtifactRef, kind: &str) -> Result<ArtifactManifest> {
        let manifest = self.resolve(reference)?;
        manifest.ensure_kind(kind)?;
        self.append_lineage(LineageEvent::Used, &manifest)?;
        info!(artifact = %manifest.reference(), digest = %manifest.digest, "Using artifact");
        Ok(manifest)
    }

    fn download(&self, manifest: &ArtifactManifest, dest_root: &Path) -> Result<PathBuf> {
        let dir = materialize(manifest, dest_root, |file: &ArtifactFile| {
            self.read_cas(&file.payload_ref())
        })?;
        debug!("Downloaded {} to {:?}", manifest.reference(), dir);
        Ok(dir)
    }

    fn log_artifact(&self, pending: PendingArtifact) -> Result<ArtifactManifest> {
        let contents = pending.read_files()?;
        for (_, bytes) in &contents {
            self.write_cas(bytes)?;
        }
        let files: Vec<ArtifactFile> = contents.into_iter().map(|(entry, _)| entry).collect();
        let digest = content_digest(&files);

        let versions = self.versions(&pending.name)?;
        if let Some(&latest) = versions.last() {
            let current = self.read_manifest(&pending.name, latest)?;
            if current.digest == digest {
                info!(artifact = %current.reference(), "Content unchanged, reusing existing version");
                self.append_lineage(LineageEvent::Logged, &current)?;
                return Ok(current);
            }
        }

        let manifest = ArtifactManifest {
            name: pending.name,
            kind: pending.kind,
            description: pending.description,
            version: versions.last().map_or(0, |v| v + 1),
            digest,
            files,
            created_at: Utc::now(),
            created_by_run: Some(self.ctx.run_id),
        };
        let path = self.manifest_path(&manifest.name, manifest.version);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec_pretty(&manifest)?)?;
        self.append_lineage(LineageEvent::Logged, &manifest)?;

        info!(artifact = %manifest.reference(), files = manifest.files.len(), "Logged artifact");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::RAW_DATA_TYPE;
    use tempfile::tempdir;

    fn publish(store: &FsArtifactStore, dir: &Path, name: &str, body: &str) -> ArtifactManifest {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        let mut pending = PendingArtifact::new(name, RAW_DATA_TYPE, "raw listings").unwrap();
        pending.add_file(&path).unwrap();
        store.log_artifact(pending).unwrap()
    }

    #[test]
    fn write_cas_is_content_addressed() {
        let root = tempdir().unwrap();
        let store = FsArtifactStore::new(root.path(), RunContext::default());

        let first = store.write_cas(b"hello").unwrap();
        let second = store.write_cas(b"hello").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, format!("cas:sha256:{}", sha256_hex(b"hello")));
        assert_eq!(store.read_cas(&first).unwrap(), b"hello");
        assert!(store.read_cas("sha256:abcd").is_err());
    }

    #[test]
    fn versions_increment_and_latest_resolves_to_newest() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = FsArtifactStore::new(root.path(), RunContext::default());

        let v0 = publish(&store, scratch.path(), "sample.csv", "price\n1\n");
        let v1 = publish(&store, scratch.path(), "sample.csv", "price\n2\n");
        assert_eq!((v0.version, v1.version), (0, 1));
        assert_eq!(store.versions("sample.csv").unwrap(), vec![0, 1]);

        let latest = store.resolve(&"sample.csv:latest".parse().unwrap()).unwrap();
        assert_eq!(latest, v1);
        let pinned = store.resolve(&"sample.csv:v0".parse().unwrap()).unwrap();
        assert_eq!(pinned, v0);
    }

    #[test]
    fn identical_content_reuses_latest_version() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = FsArtifactStore::new(root.path(), RunContext::default());

        let first = publish(&store, scratch.path(), "sample.csv", "price\n1\n");
        let again = publish(&store, scratch.path(), "sample.csv", "price\n1\n");
        assert_eq!(first, again);
        assert_eq!(store.versions("sample.csv").unwrap(), vec![0]);
    }

    #[test]
    fn use_artifact_checks_type_and_records_lineage() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = FsArtifactStore::new(root.path(), RunContext::default());
        publish(&store, scratch.path(), "sample.csv", "price\n1\n");

        let reference: ArtifactRef = "sample.csv".parse().unwrap();
        assert!(matches!(
            store.use_artifact(&reference, "clean_sample"),
            Err(CleaningError::ArtifactTypeMismatch { .. })
        ));
        store.use_artifact(&reference, RAW_DATA_TYPE).unwrap();

        let events: Vec<LineageEvent> = store.lineage().unwrap().iter().map(|r| r.event).collect();
        assert_eq!(events, vec![LineageEvent::Logged, LineageEvent::Used]);
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let root = tempdir().unwrap();
        let store = FsArtifactStore::new(root.path(), RunContext::default());
        assert!(matches!(
            store.use_artifact(&"sample.csv:latest".parse().unwrap(), RAW_DATA_TYPE),
            Err(CleaningError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn download_materializes_and_verifies_files() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let store = FsArtifactStore::new(root.path(), RunContext::default());
        let manifest = publish(&store, scratch.path(), "sample.csv", "price\n1\n");

        let dir = store.download(&manifest, dest.path()).unwrap();
        assert_eq!(dir, dest.path().join("sample.csv-v0"));
        assert_eq!(fs::read_to_string(dir.join("sample.csv")).unwrap(), "price\n1\n");

        // Corrupt the stored blob
        let hex = &manifest.files[0].sha256;
        fs::write(store.blob_path(hex), "tampered").unwrap();
        assert!(matches!(
            store.download(&manifest, dest.path()),
            Err(CleaningError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn download_rejects_file_names_outside_the_artifact_dir() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let store = FsArtifactStore::new(root.path(), RunContext::default());
        let manifest = publish(&store, scratch.path(), "sample.csv", "price\n1\n");
        let dl = dest.path().join("dl");

        for name in ["../escaped.csv", "/tmp/escaped.csv", "nested/escaped.csv"] {
            let mut tampered = manifest.clone();
            tampered.files[0].name = name.to_string();
            assert!(matches!(
                store.download(&tampered, &dl),
                Err(CleaningError::InvalidArtifactFile(ref n)) if n == name
            ));
        }
        assert!(!dl.join("escaped.csv").exists());
        assert!(!dest.path().join("escaped.csv").exists());
    }

    #[test]
    fn malformed_digests_are_errors_not_panics() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let store = FsArtifactStore::new(root.path(), RunContext::default());
        let manifest = publish(&store, scratch.path(), "sample.csv", "price\n1\n");

        let accented = "é".repeat(32);
        assert!(store.read_cas(&format!("cas:sha256:{}", accented)).is_err());
        assert!(store.read_cas("cas:sha256:abcd").is_err());

        let mut tampered = manifest.clone();
        tampered.files[0].sha256 = accented;
        assert!(matches!(
            store.download(&tampered, dest.path()),
            Err(CleaningError::Store { .. })
        ));
    }
}

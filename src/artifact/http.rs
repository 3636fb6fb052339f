use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{debug, info};

use super::{
    content_digest, materialize, ArtifactFile, ArtifactManifest, ArtifactRef, ArtifactStore,
    LineageEvent, PendingArtifact,
};
use crate::error::{CleaningError, Result};
use crate::run_context::RunContext;

/// Client for a remote artifact store speaking a small REST protocol:
///
/// - `GET  {base}/projects/{project}/artifacts/{name}/{latest|vN}` → manifest
/// - `GET  {base}/blobs/sha256/{hex}` / `PUT` the same path to upload
/// - `POST {base}/projects/{project}/artifacts` → registered manifest
/// - `POST {base}/runs/{run_id}/lineage`
pub struct HttpArtifactStore {
    base_url: String,
    token: Option<String>,
    client: Client,
    ctx: RunContext,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    description: &'a str,
    digest: &'a str,
    files: &'a [ArtifactFile],
    run_id: uuid::Uuid,
}

#[derive(Serialize)]
struct LineageRequest<'a> {
    event: LineageEvent,
    artifact: &'a str,
    version: u32,
    digest: &'a str,
    job_type: &'a str,
}

impl HttpArtifactStore {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration, ctx: RunContext) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
            ctx,
        })
    }

    pub fn manifest_url(&self, reference: &ArtifactRef) -> String {
        format!(
            "{}/projects/{}/artifacts/{}/{}",
            self.base_url, self.ctx.project, reference.name, reference.version
        )
    }

    pub fn blob_url(&self, sha256: &str) -> String {
        format!("{}/blobs/sha256/{}", self.base_url, sha256)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let resp = self.authorized(request).send()?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CleaningError::ArtifactNotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(CleaningError::Store {
                message: format!("{} failed: {} - {}", what, status, body),
            });
        }
        Ok(resp)
    }

    fn record_lineage(&self, event: LineageEvent, manifest: &ArtifactManifest) -> Result<()> {
        let url = format!("{}/runs/{}/lineage", self.base_url, self.ctx.run_id);
        let body = LineageRequest {
            event,
            artifact: &manifest.name,
            version: manifest.version,
            digest: &manifest.digest,
            job_type: &self.ctx.job_type,
        };
        self.send(self.client.post(url).json(&body), "lineage update")?;
        Ok(())
    }
}

impl ArtifactStore for HttpArtifactStore {
    fn use_artifact(&self, reference: &ArtifactRef, kind: &str) -> Result<ArtifactManifest> {
        let resp = self.send(self.client.get(self.manifest_url(reference)), &reference.to_string())?;
        let manifest: ArtifactManifest = resp.json()?;
        manifest.ensure_kind(kind)?;
        self.record_lineage(LineageEvent::Used, &manifest)?;
        info!(artifact = %manifest.reference(), digest = %manifest.digest, "Using remote artifact");
        Ok(manifest)
    }

    fn download(&self, manifest: &ArtifactManifest, dest_root: &Path) -> Result<PathBuf> {
        materialize(manifest, dest_root, |file: &ArtifactFile| {
            debug!("Fetching blob {}", file.payload_ref());
            let resp = self.send(self.client.get(self.blob_url(&file.sha256)), &file.payload_ref())?;
            Ok(resp.bytes()?.to_vec())
        })
    }

    fn log_artifact(&self, pending: PendingArtifact) -> Result<ArtifactManifest> {
        let contents = pending.read_files()?;
        for (entry, bytes) in contents.iter() {
            let request = self
                .client
                .put(self.blob_url(&entry.sha256))
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone());
            self.send(request, &format!("upload of {}", entry.name))?;
        }
        let files: Vec<ArtifactFile> = contents.into_iter().map(|(entry, _)| entry).collect();
        let digest = content_digest(&files);

        let url = format!("{}/projects/{}/artifacts", self.base_url, self.ctx.project);
        let body = RegisterRequest {
            name: &pending.name,
            kind: &pending.kind,
            description: &pending.description,
            digest: &digest,
            files: &files,
            run_id: self.ctx.run_id,
        };
        let manifest: ArtifactManifest = self
            .send(self.client.post(url).json(&body), "artifact registration")?
            .json()?;
        self.record_lineage(LineageEvent::Logged, &manifest)?;
        info!(artifact = %manifest.reference(), "Logged remote artifact");
        Ok(manifest)
    }
}

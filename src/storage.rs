//! Project-scoped file storage for generated artifacts.
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const FALLBACK_MIME: &str = "application/octet-stream";

/// A file written into a project's storage area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the project's storage root, `/`-separated.
    pub relative_path: String,
    pub mime_type: String,
    pub size: u64,
}

#[async_trait]
pub trait ProjectStorage: Send + Sync {
    /// Fetch `url` into `subdir` of the project's storage.
    async fn download_to_project_storage(
        &self,
        project_id: &str,
        url: &str,
        subdir: &str,
    ) -> AppResult<StoredFile>;

    /// Write bytes the caller already holds. `source_key` names the file the
    /// same way a URL does for downloads.
    async fn write_to_project_storage(
        &self,
        project_id: &str,
        source_key: &str,
        subdir: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> AppResult<StoredFile>;
}

/// Stores files under `{root}/projects/{project}/{subdir}/`.
pub struct LocalProjectStorage {
    root: PathBuf,
    client: Client,
    timeout: Duration,
}

impl LocalProjectStorage {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        LocalProjectStorage {
            root: root.into(),
            client: Client::new(),
            timeout,
        }
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join("projects").join(sanitize_segment(project_id))
    }

    /// Absolute location of a [`StoredFile::relative_path`].
    pub fn resolve(&self, project_id: &str, relative_path: &str) -> PathBuf {
        relative_path
            .split('/')
            .fold(self.project_dir(project_id), |acc, part| acc.join(part))
    }

    async fn write_file(
        &self,
        project_id: &str,
        source_key: &str,
        subdir: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> AppResult<StoredFile> {
        let subdir = sanitize_segment(subdir);
        let file_name = artifact_file_name(source_key, mime_type);
        let dir = self.project_dir(project_id).join(&subdir);
        tokio::fs::create_dir_all(&dir).await?;

        // Same source always lands on the same name; write-then-rename keeps a
        // concurrent reader from seeing a partial file.
        let target = dir.join(&file_name);
        let partial = dir.join(format!("{}.{}.part", file_name, Uuid::new_v4().simple()));
        let written = match tokio::fs::write(&partial, bytes).await {
            Ok(()) => tokio::fs::rename(&partial, &target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        Ok(StoredFile {
            relative_path: format!("{}/{}", subdir, file_name),
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
        })
    }
}

#[async_trait]
impl ProjectStorage for LocalProjectStorage {
    async fn download_to_project_storage(
        &self,
        project_id: &str,
        url: &str,
        subdir: &str,
    ) -> AppResult<StoredFile> {
        tracing::debug!(url, subdir, "downloading artifact");
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Download {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let header_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty() && v != FALLBACK_MIME);
        let bytes = response.bytes().await?;
        let mime_type = header_mime
            .or_else(|| mime_from_extension(url).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_MIME.to_string());
        let stored = self.write_file(project_id, url, subdir, &bytes, &mime_type).await?;
        tracing::info!(
            url,
            path = %stored.relative_path,
            size = stored.size,
            mime = %stored.mime_type,
            "artifact downloaded"
        );
        Ok(stored)
    }

    async fn write_to_project_storage(
        &self,
        project_id: &str,
        source_key: &str,
        subdir: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> AppResult<StoredFile> {
        self.write_file(project_id, source_key, subdir, bytes, mime_type).await
    }
}

/// Deterministic file name for an artifact: a UUIDv5 of its source plus an extension.
pub fn artifact_file_name(source_key: &str, mime_type: &str) -> String {
    let stem = Uuid::new_v5(&Uuid::NAMESPACE_URL, source_key.as_bytes()).simple();
    let ext = extension_from_url(source_key)
        .or_else(|| extension_from_mime(mime_type))
        .unwrap_or("bin");
    format!("{}.{}", stem, ext)
}

/// Keep a single path segment: `[A-Za-z0-9._-]`, no traversal.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

fn extension_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    let valid = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

fn extension_from_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        _ => None,
    }
}

/// Guess a MIME type from the extension in a URL or path.
pub fn mime_from_extension(url: &str) -> Option<&'static str> {
    match extension_from_url(url)?.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}

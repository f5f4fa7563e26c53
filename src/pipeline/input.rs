//! Document intake: turn a path, URL, or uploaded bytes into a [`Document`].
//!
//! pdfium needs a file-system path, so URL downloads and in-memory uploads are
//! written to a temp location owned by the `Document`; it is removed when the
//! `Document` is dropped. The `%PDF` magic bytes are checked up front so a
//! wrong file type surfaces as a clear error rather than a pdfium failure.
//!
//! Every `Document` gets a fresh [`DocumentId`]. Results computed for one
//! document (e.g. an anomaly advisory) carry that id so they can be ignored
//! once the user has moved on to another upload.

use crate::error::BillReconError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};
use uuid::Uuid;

/// Identity of one uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Keeps temp storage alive for as long as the document is.
enum Backing {
    Local,
    Downloaded { _dir: TempDir },
    Uploaded { _file: NamedTempFile },
}

/// A PDF ready to be rasterised.
pub struct Document {
    id: DocumentId,
    name: String,
    path: PathBuf,
    _backing: Backing,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl Document {
    /// Resolve a local path or HTTP(S) URL.
    pub async fn open(input: &str, download_timeout_secs: u64) -> Result<Self, BillReconError> {
        if is_url(input) {
            download_url(input, download_timeout_secs).await
        } else if input.trim().is_empty() {
            Err(BillReconError::InvalidInput {
                input: input.to_string(),
            })
        } else {
            Self::from_path(input)
        }
    }

    /// Open a local file, validating existence, permissions, and PDF magic.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BillReconError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(BillReconError::DocumentNotFound { path });
        }

        match std::fs::File::open(&path) {
            Ok(mut f) => {
                let mut magic = [0u8; 4];
                if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                    return Err(BillReconError::NotAPdf { path, magic });
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(BillReconError::PermissionDenied { path });
            }
            Err(_) => {
                return Err(BillReconError::DocumentNotFound { path });
            }
        }

        debug!("Resolved local document: {}", path.display());
        Ok(Self {
            id: DocumentId::new(),
            name: display_name(&path),
            path,
            _backing: Backing::Local,
        })
    }

    /// Accept an in-memory upload.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, BillReconError> {
        let name = name.into();
        if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&bytes[..4]);
            return Err(BillReconError::NotAPdf {
                path: PathBuf::from(&name),
                magic,
            });
        }

        let mut tmp = tempfile::Builder::new()
            .prefix("billrecon-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| BillReconError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| BillReconError::Internal(format!("tempfile write: {e}")))?;

        debug!("Staged upload '{}' ({} bytes)", name, bytes.len());
        Ok(Self {
            id: DocumentId::new(),
            path: tmp.path().to_path_buf(),
            name,
            _backing: Backing::Uploaded { _file: tmp },
        })
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// File name shown to the user.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Download a URL to a temporary directory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, BillReconError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BillReconError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            BillReconError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            BillReconError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(BillReconError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| BillReconError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| BillReconError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(BillReconError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| BillReconError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(Document {
        id: DocumentId::new(),
        name: filename,
        path: file_path,
        _backing: Backing::Downloaded { _dir: temp_dir },
    })
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

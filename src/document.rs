//! Document fetching
//!
//! Turns a document source reference into plain text. Remote references are
//! downloaded; `file://` URLs and bare paths are read from disk. Only UTF-8
//! text is accepted.

use crate::runtime::DocumentSource;
use async_trait::async_trait;
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const MAX_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document source reference is empty")]
    EmptyReference,
    #[error("Unsupported document source {reference}")]
    UnsupportedScheme { reference: String },
    #[error("Failed to fetch {reference}: {message}")]
    Fetch { reference: String, message: String },
    #[error("Fetching {reference} returned HTTP {status}")]
    Status { reference: String, status: u16 },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{reference} is larger than {MAX_DOCUMENT_BYTES} bytes")]
    TooLarge { reference: String },
    #[error("{reference} is not a text document: {detail}")]
    UnsupportedFormat { reference: String, detail: String },
    #[error("{reference} contains no text")]
    Empty { reference: String },
}

#[derive(Debug, PartialEq, Eq)]
enum Location {
    Remote(Url),
    Local(PathBuf),
}

fn locate(reference: &str) -> Result<Location, DocumentError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(DocumentError::EmptyReference);
    }
    match Url::parse(reference) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Location::Remote(url)),
            "file" => url
                .to_file_path()
                .map(Location::Local)
                .map_err(|()| DocumentError::UnsupportedScheme {
                    reference: reference.to_string(),
                }),
            // Windows drive letters parse as a one-letter scheme
            scheme if scheme.len() == 1 => Ok(Location::Local(PathBuf::from(reference))),
            _ => Err(DocumentError::UnsupportedScheme {
                reference: reference.to_string(),
            }),
        },
        Err(_) => Ok(Location::Local(PathBuf::from(reference))),
    }
}

/// Validate and decode a fetched body
fn decode(reference: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Result<String, DocumentError> {
    let unsupported = |detail: &str| DocumentError::UnsupportedFormat {
        reference: reference.to_string(),
        detail: detail.to_string(),
    };

    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(DocumentError::TooLarge {
            reference: reference.to_string(),
        });
    }
    if bytes.starts_with(b"%PDF-") {
        return Err(unsupported("PDF documents are not supported"));
    }
    if let Some(content_type) = content_type {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let textual = mime.starts_with("text/")
            || mime.ends_with("+xml")
            || matches!(
                mime.as_str(),
                "application/json" | "application/xml" | "application/xhtml+xml" | "application/markdown"
            );
        if !textual {
            return Err(unsupported(&format!("content type {mime}")));
        }
    }

    let text = String::from_utf8(bytes).map_err(|_| unsupported("body is not valid UTF-8"))?;
    if text.trim().is_empty() {
        return Err(DocumentError::Empty {
            reference: reference.to_string(),
        });
    }
    Ok(text)
}

/// Fetches documents over HTTP or from the local filesystem
pub struct HttpDocumentSource {
    client: reqwest::Client,
}

impl HttpDocumentSource {
    pub fn new() -> Result<Self, DocumentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DocumentError::Fetch {
                reference: String::new(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    async fn fetch_remote(&self, reference: &str, url: Url) -> Result<String, DocumentError> {
        let fetch_error = |e: reqwest::Error| DocumentError::Fetch {
            reference: reference.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DocumentError::Status {
                reference: reference.to_string(),
                status: status.as_u16(),
            });
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_DOCUMENT_BYTES as u64)
        {
            return Err(DocumentError::TooLarge {
                reference: reference.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(fetch_error)?;
        decode(reference, bytes.to_vec(), content_type.as_deref())
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch_text(&self, reference: &str) -> Result<String, DocumentError> {
        let start = std::time::Instant::now();
        let text = match locate(reference)? {
            Location::Remote(url) => self.fetch_remote(reference, url).await?,
            Location::Local(path) => {
                let bytes = tokio::fs::read(&path).await.map_err(|source| DocumentError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                decode(reference, bytes, None)?
            }
        };
        tracing::info!(
            reference = %reference,
            chars = text.chars().count(),
            duration_ms = %start.elapsed().as_millis(),
            "Document fetched"
        );
        Ok(text)
    }
}

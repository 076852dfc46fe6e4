//! Document retrieval side-channel for offer attachments.
//!
//! The portal serves every attachment as `octet-stream` behind a session
//! cookie wall, so the runtime proxies downloads: fetch the bytes,
//! sniff the real content type from magic bytes, and surface the
//! upstream filename (or a generated default). Only the portal host is
//! ever fetched.

use crate::portal::PORTAL_HOST;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Fetch timeout — attachments are small PDFs and office files.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures of a proxied fetch, mapped to HTTP statuses by the caller.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("host not allowed: {0}")]
    DisallowedHost(String),

    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// A fetched attachment with its sniffed type.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    /// MIME detected from magic bytes, not the upstream header.
    pub mime: &'static str,
    pub filename: String,
}

/// Classify content from its first bytes. The portal's server declares
/// `octet-stream` for everything, so the signature is the only truth.
pub fn sniff_mime(bytes: &[u8]) -> (&'static str, &'static str) {
    if bytes.starts_with(b"%PDF") {
        ("application/pdf", "pdf")
    } else if bytes.starts_with(b"PK\x03\x04") {
        // .docx/.xlsx/plain zip
        ("application/zip", "zip")
    } else if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        // legacy .doc/.xls
        ("application/msword", "doc")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ("image/jpeg", "jpg")
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        ("image/png", "png")
    } else {
        ("application/octet-stream", "bin")
    }
}

/// Pull a filename out of a Content-Disposition header.
pub fn filename_from_disposition(disposition: &str) -> Option<String> {
    let re = Regex::new(r#"(?i)filename\*?=(?:UTF-8'')?["']?([^"';\r\n]+)"#)
        .expect("disposition regex is valid");
    re.captures(disposition)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// HTTP client for proxied fetches. Browser-like UA — the portal rejects
/// bare clients.
pub fn client() -> reqwest::Client {
    let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
              AppleWebKit/537.36 (KHTML, like Gecko) \
              Chrome/120.0.0.0 Safari/537.36";
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(ua)
        .build()
        .unwrap_or_default()
}

/// Fetch one attachment from the portal.
pub async fn fetch_document(
    client: &reqwest::Client,
    raw_url: &str,
) -> Result<FetchedDocument, ProxyError> {
    fetch_from(client, raw_url, PORTAL_HOST).await
}

async fn fetch_from(
    client: &reqwest::Client,
    raw_url: &str,
    allowed_host: &str,
) -> Result<FetchedDocument, ProxyError> {
    let url = Url::parse(raw_url).map_err(|_| ProxyError::InvalidUrl(raw_url.to_string()))?;
    if url.host_str() != Some(allowed_host) {
        return Err(ProxyError::DisallowedHost(
            url.host_str().unwrap_or_default().to_string(),
        ));
    }

    let response = client
        .get(url)
        .header("Accept", "application/pdf,*/*")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ProxyError::UpstreamStatus(response.status().as_u16()));
    }

    let upstream_name = response
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition);

    let bytes = response.bytes().await?.to_vec();
    let (mime, ext) = sniff_mime(&bytes);
    let filename = upstream_name.unwrap_or_else(|| format!("documento.{ext}"));

    Ok(FetchedDocument {
        bytes,
        mime,
        filename,
    })
}

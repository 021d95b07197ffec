//! Image url classification and inlining.
//!
//! Backends cannot reach images served from a private network or loopback address, so
//! those are fetched here and inlined as base64 data urls before a request leaves.
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use url::{Host, Url};

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageError {
    #[error("Failed to fetch image {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Invalid data uri: {0}")]
    InvalidDataUri(String),
}

/// Base64 payload with its media type
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub base64: String,
    pub mime_type: String,
}

impl EncodedImage {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UriKind<'a> {
    /// `data:` uri; `base64` tells whether the payload is already base64
    Data {
        mime_type: &'a str,
        base64: bool,
        payload: &'a str,
    },
    Url,
}

pub fn parse_data_uri(uri: &str) -> Result<UriKind<'_>, ImageError> {
    let Some(rest) = uri.strip_prefix("data:") else {
        return Ok(UriKind::Url);
    };
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageError::InvalidDataUri(truncate(uri)))?;
    let (mime_type, base64) = match header.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (header, false),
    };
    let mime_type = mime_type.split(';').next().unwrap_or_default();
    Ok(UriKind::Data {
        mime_type: if mime_type.is_empty() {
            DEFAULT_IMAGE_MIME
        } else {
            mime_type
        },
        base64,
        payload,
    })
}

fn truncate(uri: &str) -> String {
    uri.chars().take(48).collect()
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // unique local fc00::/7
                || (first & 0xfe00) == 0xfc00
                // link local fe80::/10
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Whether the url points at loopback or a private network
pub fn is_local_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    match parsed.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_private_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_private_ip(IpAddr::V6(ip)),
        None => false,
    }
}

/// Fetches an image and encodes it as base64
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<EncodedImage, ImageError>;
}

pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<EncodedImage, ImageError> {
        let fail = |reason: String| ImageError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fail(format!("status {}", response.status())));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
        let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;

        Ok(EncodedImage {
            base64: STANDARD.encode(&bytes),
            mime_type,
        })
    }
}

/// Resolve an attachment url to what a backend should receive.
///
/// Base64 data urls and public urls pass through. Local urls are fetched and inlined,
/// and non-base64 data urls are re-encoded.
pub async fn resolve_image_url(
    url: &str,
    fetcher: &dyn ImageFetcher,
) -> Result<String, ImageError> {
    match parse_data_uri(url)? {
        UriKind::Data {
            base64: true, ..
        } => Ok(url.to_string()),
        UriKind::Data {
            mime_type,
            base64: false,
            payload,
        } => {
            let decoded = urlencoding::decode_binary(payload.as_bytes());
            Ok(EncodedImage {
                base64: STANDARD.encode(&decoded),
                mime_type: mime_type.to_string(),
            }
            .to_data_url())
        }
        UriKind::Url if is_local_url(url) => {
            tracing::debug!(url, "inlining local image");
            Ok(fetcher.fetch(url).await?.to_data_url())
        }
        UriKind::Url => Ok(url.to_string()),
    }
}

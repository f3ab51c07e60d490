//! Content-addressable staging protocol: URL normalization, object-key
//! derivation, and the metadata/presign shapes shared by the worker (who
//! uploads) and the gateway (who consumes and caches the result).
//!
//! Grounded on `media-pirate/src/handlers/dl_command.py` (hash/stat/upload/
//! presign sequence) and `gateway/src/handlers/video_ready_event.py`
//! (base-URL stripping used for the content-id hash).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// What kind of media an object key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strip query and fragment, lowercase the host, trim a trailing slash from
/// the path — the normalization the worker applies before hashing a command
/// URL, and the gateway applies to a presigned URL before computing its
/// content-id hash.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    let host = url.host_str()?.to_lowercase();
    url.set_host(Some(&host)).ok()?;
    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);
    Some(url.to_string())
}

/// SHA-256 hex digest of a normalized URL — the object-store key component
/// and the content-id cache key.
pub fn content_hash(normalized_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `{kind}/{sha256(normalized_url)}` — the object-store key.
pub fn object_key(kind: MediaKind, normalized_url: &str) -> String {
    format!("{}/{}", kind.as_str(), content_hash(normalized_url))
}

/// User metadata stored alongside each uploaded object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub extension: String,
    pub original_name: String,
    pub source_url_hash: String,
    pub download_timestamp: String,
    pub original_url: String,
    pub cleaned_url: String,
    pub url_domain: String,
}

impl ObjectMetadata {
    /// Render as the URL-encoded key/value pairs the object-store client
    /// attaches as user metadata, per §6's object bucket layout.
    pub fn to_header_map(&self) -> Vec<(&'static str, String)> {
        vec![
            ("extension", urlencode(&self.extension)),
            ("original-name", urlencode(&self.original_name)),
            ("source-url-hash", urlencode(&self.source_url_hash)),
            ("download-timestamp", urlencode(&self.download_timestamp)),
            ("original-url", urlencode(&self.original_url)),
            ("cleaned-url", urlencode(&self.cleaned_url)),
            ("url-domain", urlencode(&self.url_domain)),
        ]
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

pub const PRESIGN_TTL: Duration = Duration::from_secs(300);
pub const CONTENT_ID_TTL: Duration = Duration::from_secs(600);

/// Everything a presigned-GET request needs to force the right download
/// behavior client-side.
#[derive(Debug, Clone)]
pub struct PresignRequest {
    pub object_key: String,
    pub content_type: String,
    pub filename: String,
    pub ttl: Duration,
}

impl PresignRequest {
    pub fn new(object_key: impl Into<String>, content_type: impl Into<String>, filename: impl Into<String>) -> Self {
        PresignRequest {
            object_key: object_key.into(),
            content_type: content_type.into(),
            filename: filename.into(),
            ttl: PRESIGN_TTL,
        }
    }

    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_query_and_fragment() {
        let normalized = normalize_url("https://Host.com/path?x=1#frag").unwrap();
        assert_eq!(normalized, "https://host.com/path");
    }

    #[test]
    fn normalize_trims_trailing_slash() {
        let normalized = normalize_url("https://host.com/path/").unwrap();
        assert_eq!(normalized, "https://host.com/path");
    }

    #[test]
    fn differing_queries_normalize_identically() {
        let a = normalize_url("https://host/path?x=1").unwrap();
        let b = normalize_url("https://host/path?x=2").unwrap();
        assert_eq!(a, b);
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn object_key_layout() {
        let normalized = normalize_url("https://host/path").unwrap();
        let key = object_key(MediaKind::Video, &normalized);
        assert!(key.starts_with("video/"));
        assert_eq!(key, format!("video/{}", content_hash(&normalized)));
    }

    #[test]
    fn content_disposition_quotes_filename() {
        let req = PresignRequest::new("video/abc", "video/mp4", "clip.mp4");
        assert_eq!(req.content_disposition(), "attachment; filename=\"clip.mp4\"");
    }
}

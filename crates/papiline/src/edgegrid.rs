//! EG1-HMAC-SHA256 request signing
//!
//! Requests to the vendor API carry a time-boxed, nonce-keyed Authorization
//! header. The canonical data-to-sign is assembled from the request
//! descriptor, hashed with a signing key that is itself an HMAC of the
//! timestamp under the client secret, and appended to the unsigned header:
//!
//! ```text
//! EG1-HMAC-SHA256 client_token=..;access_token=..;timestamp=..;nonce=..;signature=..
//! ```
//!
//! Signing is pure: [sign_with] takes timestamp and nonce as inputs so tests
//! can assert the produced header byte-for-byte; [sign] supplies the current
//! UTC time and a random v4 nonce.
//!
//! On a 30x response the transport strips the header, rewrites the path from
//! `Location` via [redirect] and re-signs. Hops are bounded by
//! [MAX_REDIRECT_HOPS]; exceeding the bound is an error rather than an
//! endless re-sign loop.
use crate::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Redirect chains are re-signed at most this many times
pub const MAX_REDIRECT_HOPS: usize = 5;

/// Request bodies are truncated to this many bytes before hashing
pub const DEFAULT_MAX_BODY: usize = 131072;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H:%M:%S+0000";

/// API client identity, loaded from an `.edgerc`-style JSON section
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Credentials {
    pub client_token: String,
    pub client_secret: String,
    pub access_token: String,
    pub host: String,
}

impl Credentials {
    /// Fails fast before any signing (or network) work happens
    pub fn validate(&self) -> Result<(), SignError> {
        for (field, value) in [
            ("client_token", &self.client_token),
            ("client_secret", &self.client_secret),
            ("access_token", &self.access_token),
            ("host", &self.host),
        ] {
            if value.is_empty() {
                return Err(SignError::MissingCredentials(field));
            }
        }

        Ok(())
    }
}

/// An HTTP request descriptor to be signed
///
/// `headers_to_sign` lists header names in the order the caller wants them
/// folded into the canonical data-to-sign. After signing, `url` and the
/// `Authorization` header are populated.
#[derive(derive_new::new, Debug, Clone)]
pub struct SignableRequest {
    pub method: String,
    pub path: String,

    #[new(default)]
    pub headers: IndexMap<String, String>,

    #[new(default)]
    pub headers_to_sign: Vec<String>,

    #[new(default)]
    pub body: Option<Value>,

    #[new(default)]
    pub qs: IndexMap<String, String>,

    #[new(default)]
    pub url: Option<String>,

    #[new(default)]
    hops: usize,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SignError {
    #[error("missing credential '{0}'")]
    MissingCredentials(&'static str),

    #[error("redirect chain exceeded {MAX_REDIRECT_HOPS} hops")]
    TooManyRedirects,

    #[error("redirect location '{0}' has no usable path")]
    InvalidLocation(String),
}

/// Sign `request` with the current UTC time and a random nonce
pub fn sign(request: SignableRequest, credentials: &Credentials) -> Result<SignableRequest, SignError> {
    let timestamp = format_timestamp(chrono::Utc::now());
    let nonce = uuid::Uuid::new_v4().to_string();

    sign_with(request, credentials, &timestamp, &nonce, DEFAULT_MAX_BODY)
}

/// Deterministic signing core
pub fn sign_with(
    mut request: SignableRequest,
    credentials: &Credentials,
    timestamp: &str,
    nonce: &str,
    max_body: usize,
) -> Result<SignableRequest, SignError> {
    credentials.validate()?;

    let request_path = request_path(&request);
    let method = request.method.to_uppercase();

    let unsigned_header = format!(
        "EG1-HMAC-SHA256 client_token={};access_token={};timestamp={};nonce={};",
        credentials.client_token, credentials.access_token, timestamp, nonce,
    );

    let content_hash = content_hash(&request, max_body);
    let canonical_headers = canonical_headers(&request);

    let data_to_sign = [
        method.as_str(),
        "https",
        credentials.host.as_str(),
        request_path.as_str(),
        canonical_headers.as_str(),
        content_hash.as_str(),
        unsigned_header.as_str(),
    ]
    .join("\t");

    let signing_key = base64_hmac(credentials.client_secret.as_bytes(), timestamp.as_bytes());
    let signature = base64_hmac(signing_key.as_bytes(), data_to_sign.as_bytes());

    tracing::trace!(%method, path = %request_path, "signed request");

    request.url = Some(format!("https://{}{}", credentials.host, request_path));
    request.headers.insert(
        "Authorization".to_string(),
        format!("{unsigned_header}signature={signature}"),
    );

    Ok(request)
}

/// Prepare a signed request for one more hop after a 30x response
///
/// Strips the stale Authorization header and rewrites the path from the
/// `Location` header; the caller re-signs the returned descriptor.
pub fn redirect(mut request: SignableRequest, location: &str) -> Result<SignableRequest, SignError> {
    request.hops += 1;
    if request.hops > MAX_REDIRECT_HOPS {
        return Err(SignError::TooManyRedirects);
    }

    tracing::debug!(%location, hop = request.hops, "following redirect");

    request.headers.shift_remove("Authorization");
    request.path = location_path(location)?;
    // the rewritten path carries the redirect's own query string
    request.qs.clear();
    request.url = None;

    Ok(request)
}

/// UTC timestamp in the canonical `YYYYMMDDTHH:mm:ss+0000` form
pub fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn request_path(request: &SignableRequest) -> String {
    if request.qs.is_empty() {
        return request.path.clone();
    }

    let query: Vec<String> = request
        .qs
        .iter()
        .map(|(key, value)| {
            format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
        })
        .collect();

    let separator = if request.path.contains('?') { '&' } else { '?' };
    format!("{}{}{}", request.path, separator, query.join("&"))
}

fn content_hash(request: &SignableRequest, max_body: usize) -> String {
    if !request.method.eq_ignore_ascii_case("POST") {
        return String::new();
    }

    let Some(body) = &request.body else {
        return String::new();
    };

    let text = match body {
        Value::String(text) => text.clone(),
        Value::Object(object) => object
            .iter()
            .map(|(key, value)| {
                let json =
                    serde_json::to_string(value).expect("value serialization cannot fail");
                format!("{}={}", key, urlencoding::encode(&json))
            })
            .collect::<Vec<_>>()
            .join("&"),
        other => serde_json::to_string(other).expect("value serialization cannot fail"),
    };

    if text.is_empty() {
        return String::new();
    }

    let truncated = &text.as_bytes()[..text.len().min(max_body)];
    STANDARD.encode(Sha256::digest(truncated))
}

fn canonical_headers(request: &SignableRequest) -> String {
    request
        .headers_to_sign
        .iter()
        .map(|name| {
            let value = request
                .headers
                .iter()
                .find(|(header, _)| header.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
                .unwrap_or("");

            // trim and collapse internal whitespace runs
            let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
            format!("{}:{}", name.to_lowercase(), collapsed)
        })
        .collect::<Vec<_>>()
        .join("\t")
}

fn base64_hmac(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    STANDARD.encode(mac.finalize().into_bytes())
}

fn location_path(location: &str) -> Result<String, SignError> {
    if location.starts_with('/') {
        return Ok(location.to_string());
    }

    let after_scheme = location
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| SignError::InvalidLocation(location.to_string()))?;

    match after_scheme.find('/') {
        Some(slash) => Ok(after_scheme[slash..].to_string()),
        None => Ok("/".to_string()),
    }
}

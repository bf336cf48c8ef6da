//! Signature Version 2 signing.
//!
//! The string to sign is
//!
//! ```text
//! POST\n<host>\n<encoded path>\n<sorted, encoded parameters>
//! ```
//!
//! and the signature is `Base64(HMAC-SHA256(string_to_sign, secret_key))`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;

use crate::request::RequestParameters;

type HmacSha256 = Hmac<Sha256>;

pub const HTTP_METHOD: &str = "POST";
pub const SIGNATURE_METHOD: &str = "HmacSHA256";
pub const SIGNATURE_VERSION: &str = "2";
pub const SIGNATURE_KEY: &str = "Signature";

/// Timestamps are sent this many seconds in the past so a fast local clock
/// never produces a request the service considers to be from the future.
pub const TIMESTAMP_SKEW_SECONDS: i64 = 120;

/// RFC 3986 unreserved characters stay as they are, everything else is escaped.
const RAW_URL_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes a value the way the service expects (space is `%20`, `/` is `%2F`).
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, RAW_URL_ENCODE).to_string()
}

/// Encodes each `/`-separated segment on its own. An empty path becomes `/`.
pub fn encode_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(percent_encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// Builds the string to sign. Parameters are sorted by byte-wise key order
/// here and nowhere else; a `Signature` entry is never part of the result.
pub fn canonical_string(host: &str, path: &str, parameters: &RequestParameters) -> String {
    let mut sorted = parameters.sorted();
    sorted.remove(SIGNATURE_KEY);

    format!(
        "{HTTP_METHOD}\n{host}\n{}\n{}",
        encode_path(path),
        sorted.to_encoded_string()
    )
}

/// `Base64(HMAC-SHA256(data, secret_key))`
pub fn sign(data: &str, secret_key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());

    BASE64.encode(mac.finalize().into_bytes())
}

/// Replaces any `Signature` in `parameters` with a fresh one.
pub fn sign_parameters(
    parameters: &mut RequestParameters,
    host: &str,
    path: &str,
    secret_key: &str,
) {
    parameters.remove(SIGNATURE_KEY);
    let signature = sign(&canonical_string(host, path, parameters), secret_key);
    parameters.insert(SIGNATURE_KEY, signature);
}

/// `Base64(MD5(body))`, sent as `ContentMD5Value` with XML bodies
pub fn content_md5(body: &[u8]) -> String {
    BASE64.encode(Md5::digest(body))
}

/// ISO-8601 with a numeric offset, e.g. `2024-01-01T10:58:00+00:00`
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// Formats `time` minus [`TIMESTAMP_SKEW_SECONDS`].
pub fn skewed_timestamp(time: DateTime<Utc>) -> String {
    format_timestamp(time - Duration::seconds(TIMESTAMP_SKEW_SECONDS))
}

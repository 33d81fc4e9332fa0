//! Canonical request signing.
//!
//! The canonical string is built from, in order:
//!
//! ```text
//! <param values sorted by param name>;<values of headers listed in X-Keys>;<body>;<access_key>
//! ```
//!
//! Empty groups are left out. The signature is the lowercase hex
//! HMAC-SHA256 of that string keyed by the secret key, so the secret never
//! appears in the signed content.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header listing which headers are folded into the signature.
pub const X_KEYS: &str = "x-keys";
/// Header carrying the client signature.
pub const X_SIGNATURE: &str = "x-signature";
/// Header carrying the client timestamp in milliseconds.
pub const X_TIMESTAMP: &str = "x-timestamp";
/// Header carrying the public access key.
pub const X_ACCESS_KEY: &str = "x-access-key";

/// Fragment contributed by a header that is listed in X-Keys but not sent.
pub const MISSING_HEADER: &str = "None";

const SEPARATOR: &str = ";";

/// Errors in the signing input. These are client errors, never mismatches.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignError {
    #[error("header X-Keys is missing or names no signable header")]
    MissingKeys,
    #[error("request body is not valid UTF-8")]
    InvalidBody,
    #[error("secret key rejected by HMAC")]
    InvalidKey,
}

/// The signable parts of an inbound request.
///
/// Parameter and header names are stored lowercase; the first value seen
/// for a name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SignedRequest {
    params: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl SignedRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter.
    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_param(name, value);
        self
    }

    /// Add a header.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Set the raw body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn insert_param(&mut self, name: &str, value: impl Into<String>) {
        self.params
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| value.into());
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| value.into());
    }

    /// Replace a header value, used when attaching a signature.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.trim().to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }
}

/// Build the canonical string for `request`.
///
/// Never includes the secret key, so it is safe to log at trace level.
pub fn canonical_string(access_key: &str, request: &SignedRequest) -> Result<String, SignError> {
    let mut fragments: Vec<&str> = Vec::new();

    // BTreeMap iterates in ascending key order
    fragments.extend(request.params.values().map(String::as_str));

    // Empty names and X-Signature itself never contribute a fragment.
    let names: Vec<&str> = request
        .header_value(X_KEYS)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case(X_SIGNATURE))
        .collect();
    if names.is_empty() {
        return Err(SignError::MissingKeys);
    }
    for name in names {
        fragments.push(request.header_value(name).unwrap_or(MISSING_HEADER));
    }

    if !request.body.is_empty() {
        let body = std::str::from_utf8(&request.body).map_err(|_| SignError::InvalidBody)?;
        fragments.push(body);
    }

    fragments.push(access_key);
    Ok(fragments.join(SEPARATOR))
}

/// Compute the lowercase hex HMAC-SHA256 signature of `request`.
pub fn compute_signature(
    access_key: &str,
    secret_key: &str,
    request: &SignedRequest,
) -> Result<String, SignError> {
    let content = canonical_string(access_key, request)?;
    tracing::trace!(access_key, canonical = %content, "Built canonical string");

    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| SignError::InvalidKey)?;
    mac.update(content.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Client-side helper: stamp `request` with the headers a caller must send.
///
/// `X-Keys` must already be set on `request`.
pub fn sign_request(
    access_key: &str,
    secret_key: &str,
    timestamp_ms: i64,
    mut request: SignedRequest,
) -> Result<SignedRequest, SignError> {
    request.set_header(X_TIMESTAMP, timestamp_ms.to_string());
    request.set_header(X_ACCESS_KEY, access_key);
    let signature = compute_signature(access_key, secret_key, &request)?;
    request.set_header(X_SIGNATURE, signature);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AK: &str = "AK0123456789abcdefghijklmnopqrst";
    const SK: &str = "SK0123456789ABCDEFGHIJKLMNOPQRST";

    #[test]
    fn test_single_header_vector() {
        let req = SignedRequest::new()
            .header("X-Keys", "X-Foo")
            .header("X-Foo", "bar");

        assert_eq!(
            canonical_string(AK, &req).unwrap(),
            format!("bar;{}", AK)
        );
        assert_eq!(
            compute_signature(AK, SK, &req).unwrap(),
            "b388f4d8a2204b1a3a0b43e155a0159c70cb903b949afac00d65d94c8cfbebff"
        );
    }

    #[test]
    fn test_full_vector() {
        let req = SignedRequest::new()
            .param("b", "2")
            .param("a", "1")
            .header("X-Keys", "X-Foo,X-Missing")
            .header("x-foo", "bar")
            .body(r#"{"a":1}"#);

        assert_eq!(
            canonical_string(AK, &req).unwrap(),
            format!(r#"1;2;bar;None;{{"a":1}};{}"#, AK)
        );
        assert_eq!(
            compute_signature(AK, SK, &req).unwrap(),
            "c8be6a4843f1b6334ea0973aed550dbbac251694bce39dfb3be11f98453f18fc"
        );
    }

    #[test]
    fn test_deterministic() {
        let req = SignedRequest::new()
            .param("page", "3")
            .header("X-Keys", "X-Foo")
            .header("X-Foo", "bar")
            .body("payload");
        assert_eq!(
            compute_signature(AK, SK, &req).unwrap(),
            compute_signature(AK, SK, &req).unwrap()
        );
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let forward = SignedRequest::new()
            .param("alpha", "1")
            .param("beta", "2")
            .param("gamma", "3")
            .header("X-Keys", "X-Foo");
        let backward = SignedRequest::new()
            .param("gamma", "3")
            .param("beta", "2")
            .param("alpha", "1")
            .header("X-Keys", "X-Foo");
        assert_eq!(
            compute_signature(AK, SK, &forward).unwrap(),
            compute_signature(AK, SK, &backward).unwrap()
        );
    }

    #[test]
    fn test_param_value_changes_signature() {
        let base = SignedRequest::new()
            .param("amount", "100")
            .header("X-Keys", "X-Foo");
        let tampered = SignedRequest::new()
            .param("amount", "1000")
            .header("X-Keys", "X-Foo");
        assert_ne!(
            compute_signature(AK, SK, &base).unwrap(),
            compute_signature(AK, SK, &tampered).unwrap()
        );
    }

    #[test]
    fn test_only_values_are_signed() {
        // renaming a parameter without moving it keeps the canonical string
        let a = SignedRequest::new().param("x", "1").header("X-Keys", "X-Foo");
        let b = SignedRequest::new().param("y", "1").header("X-Keys", "X-Foo");
        assert_eq!(canonical_string(AK, &a), canonical_string(AK, &b));
    }

    #[test]
    fn test_header_order_follows_x_keys() {
        let req = SignedRequest::new()
            .header("X-A", "1")
            .header("X-B", "2")
            .header("X-Keys", "X-B,X-A");
        assert_eq!(canonical_string(AK, &req).unwrap(), format!("2;1;{}", AK));
    }

    #[test]
    fn test_missing_x_keys_is_input_error() {
        let req = SignedRequest::new().header("X-Foo", "bar");
        assert_eq!(
            compute_signature(AK, SK, &req).unwrap_err(),
            SignError::MissingKeys
        );

        let empty = SignedRequest::new().header("X-Keys", "  ");
        assert_eq!(
            compute_signature(AK, SK, &empty).unwrap_err(),
            SignError::MissingKeys
        );
    }

    #[test]
    fn test_empty_x_keys_names_are_ignored() {
        let req = SignedRequest::new()
            .header("X-Keys", "X-Foo,,")
            .header("X-Foo", "bar");
        assert_eq!(canonical_string(AK, &req).unwrap(), format!("bar;{}", AK));

        let only_commas = SignedRequest::new().header("X-Keys", " , ,");
        assert_eq!(
            canonical_string(AK, &only_commas).unwrap_err(),
            SignError::MissingKeys
        );

        let only_signature = SignedRequest::new()
            .header("X-Keys", "X-Signature")
            .header("X-Signature", "deadbeef");
        assert_eq!(
            canonical_string(AK, &only_signature).unwrap_err(),
            SignError::MissingKeys
        );
    }

    #[test]
    fn test_listed_names_are_trimmed_and_case_insensitive() {
        let req = SignedRequest::new()
            .header("X-Keys", "x-foo , X-BAR")
            .header("X-Foo", "1")
            .header("x-bar", "2");
        assert_eq!(canonical_string(AK, &req).unwrap(), format!("1;2;{}", AK));
    }

    #[test]
    fn test_x_signature_is_never_folded() {
        let req = SignedRequest::new()
            .header("X-Keys", "X-Foo,X-Signature")
            .header("X-Foo", "bar")
            .header("X-Signature", "deadbeef");
        assert_eq!(canonical_string(AK, &req).unwrap(), format!("bar;{}", AK));
    }

    #[test]
    fn test_invalid_utf8_body() {
        let req = SignedRequest::new()
            .header("X-Keys", "X-Foo")
            .body(vec![0xff, 0xfe]);
        assert_eq!(
            compute_signature(AK, SK, &req).unwrap_err(),
            SignError::InvalidBody
        );
    }

    #[test]
    fn test_first_header_value_wins() {
        let req = SignedRequest::new()
            .header("X-Foo", "first")
            .header("x-foo", "second");
        assert_eq!(req.header_value("X-FOO"), Some("first"));
    }

    #[test]
    fn test_secret_not_in_canonical() {
        let req = SignedRequest::new()
            .header("X-Keys", "X-Foo")
            .header("X-Foo", "bar");
        assert!(!canonical_string(AK, &req).unwrap().contains(SK));
    }

    #[test]
    fn test_sign_request_sets_headers() {
        let req = SignedRequest::new()
            .header("X-Keys", "X-Timestamp,X-Access-Key")
            .param("q", "rust");
        let signed = sign_request(AK, SK, 1_700_000_000_000, req).unwrap();

        assert_eq!(signed.header_value(X_TIMESTAMP), Some("1700000000000"));
        assert_eq!(signed.header_value(X_ACCESS_KEY), Some(AK));

        let expected = compute_signature(AK, SK, &signed).unwrap();
        assert_eq!(signed.header_value(X_SIGNATURE), Some(expected.as_str()));
    }
}

//! Scrubbing of signed upload URLs before they reach logs.
//!
//! Upload destinations are pre-signed: the query string carries the
//! signature and credential scope that authorise the PUT. Anything that logs
//! or displays such a URL goes through [`scrub_signed_url`] first.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Query parameters that authorise a signed request
    static ref SIGNED_QUERY_PARAMS: Regex = Regex::new(
        r"(?i)([?&](?:x-amz-signature|x-amz-credential|x-amz-security-token|x-goog-signature|x-goog-credential|signature|googleaccessid|awsaccesskeyid|sig|token)=)[^&#\s]*"
    )
    .unwrap();

    /// Basic auth embedded in a URL
    static ref URL_USERINFO: Regex = Regex::new(r"(https?://)([^:/@\s]+):([^@/\s]+)@").unwrap();
}

/// Redact signature and credential query parameters from a signed URL.
///
/// # Example
///
/// ```
/// use stream_uploader::security::scrub_signed_url;
///
/// let url = "https://bucket.s3.amazonaws.com/v.ts?partNumber=3&X-Amz-Signature=abc123";
/// assert_eq!(
///     scrub_signed_url(url),
///     "https://bucket.s3.amazonaws.com/v.ts?partNumber=3&X-Amz-Signature=<REDACTED>"
/// );
/// ```
pub fn scrub_signed_url(url: &str) -> Cow<'_, str> {
    if !SIGNED_QUERY_PARAMS.is_match(url) && !URL_USERINFO.is_match(url) {
        return Cow::Borrowed(url);
    }

    let result = SIGNED_QUERY_PARAMS.replace_all(url, "${1}<REDACTED>");
    let result = URL_USERINFO.replace_all(&result, "${1}<REDACTED_USER>:<REDACTED_PASS>@");
    Cow::Owned(result.into_owned())
}

/// Format an error with any embedded signed URL scrubbed.
pub fn safe_error_message(context: &str, error: &impl std::fmt::Display) -> String {
    let raw_message = format!("{}: {}", context, error);
    scrub_signed_url(&raw_message).into_owned()
}

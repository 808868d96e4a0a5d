//! URI validation and normalization
//!
//! Every URI entering the core is normalized exactly once, at the manager
//! boundary; the normalized string is the record identity everywhere else
//! (store keys, cache entries, queue items).
//!
//! Normalization: parse as an absolute `http`/`https` URL, lowercase the
//! scheme and host, drop the default port and any fragment, keep query and
//! path as-is.

use url::Url;

use crate::error::{Error, Result};

/// Normalize a URI string into the canonical record identity.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when the input is not a well-formed
/// absolute `http`/`https` URI with a host component.
pub fn normalize(uri: &str) -> Result<String> {
    let mut parsed = Url::parse(uri)
        .map_err(|e| Error::invalid_argument(format!("malformed URI '{uri}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::invalid_argument(format!(
                "unsupported scheme '{other}' in '{uri}'"
            )));
        }
    }

    if parsed.host_str().is_none() {
        return Err(Error::invalid_argument(format!("URI '{uri}' has no host")));
    }

    parsed.set_fragment(None);
    Ok(parsed.to_string())
}

/// Extract the host component of a URI.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when the URI cannot be parsed or has
/// no host.
pub fn host_of(uri: &str) -> Result<String> {
    let parsed = Url::parse(uri)
        .map_err(|e| Error::invalid_argument(format!("malformed URI '{uri}': {e}")))?;

    parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| Error::invalid_argument(format!("URI '{uri}' has no host")))
}

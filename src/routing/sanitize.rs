//! Request-path sanitization.
//!
//! A path is rejected when, after dropping the query and fragment and
//! percent-decoding it, it could step outside its mount: relative segments,
//! backslashes, NUL bytes, or a leading/trailing dot.

use percent_encoding::percent_decode_str;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is not absolute")]
    NotAbsolute,

    #[error("path is not valid UTF-8 once decoded")]
    InvalidEncoding,

    #[error("path contains a forbidden sequence")]
    Forbidden,
}

/// Decode and validate a request target, returning the clean path.
pub fn sanitize_path(target: &str) -> Result<String, PathError> {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    let raw = &target[..end];

    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| PathError::InvalidEncoding)?;

    if !decoded.starts_with('/') {
        return Err(PathError::NotAbsolute);
    }
    if decoded.contains("/.")
        || decoded.contains("./")
        || decoded.contains('\\')
        || decoded.contains('\0')
        || decoded.ends_with('.')
    {
        return Err(PathError::Forbidden);
    }

    Ok(decoded.into_owned())
}

/// The storage key: everything after the final `/`.
pub fn object_key(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

//! Streaming endpoint URLs derived from the HTTP API base URL.

use url::Url;

use crate::Result;
use crate::error::Error;

/// Path segments of the account-wide updates stream.
pub const GENERAL_UPDATES: &[&str] = &["api", "v1", "updates"];

/// Path segments of the progress stream for a single scan.
///
/// The scan id becomes exactly one segment. It must not be empty, `.` or `..`.
pub fn scan_progress(scan_id: &str) -> Result<[&str; 6]> {
    if scan_id.is_empty() {
        return Err(Error::validation("scan id must not be empty"));
    }
    if matches!(scan_id, "." | "..") {
        return Err(Error::validation(format!(
            "scan id `{scan_id}` is not a valid path segment"
        )));
    }

    Ok(["api", "v1", "code", "scans", scan_id, "progress"])
}

/// Rewrites an HTTP(S) base URL to its WebSocket equivalent and appends `segments`.
///
/// `http` becomes `ws` and `https` becomes `wss`; `ws`/`wss` inputs are kept as they are.
/// Any path already present on `base` is preserved as a prefix. Each segment is
/// percent-encoded on its own, so `/`, `%`, `?` and `#` inside a segment never change the
/// path structure.
pub fn stream_url(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base)?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::validation(format!(
                "unsupported scheme `{other}` for streaming endpoint {base}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::validation(format!("unable to rewrite scheme of {base}")))?;

    url.path_segments_mut()
        .map_err(|()| Error::validation(format!("{base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

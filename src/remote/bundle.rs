//! Result bundle extraction
//!
//! The remote service delivers results as a zip archive holding masks and a
//! single JSON score document. Only the score document is read.

use super::{RemoteError, RemoteStep};
use serde_json::{Map, Value};
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Largest result bundle accepted from the remote service
pub const MAX_BUNDLE_BYTES: u64 = 64 * 1024 * 1024;

/// Largest decompressed score document read from a bundle
pub const MAX_SCORE_ENTRY_BYTES: u64 = 4 * 1024 * 1024;

/// Locate the entry ending in `suffix` and parse it as a JSON object.
///
/// Entries are searched in name order so the choice is stable when several
/// match. A missing entry lists what the bundle did contain.
pub fn extract_score_document(
    bundle: &[u8],
    suffix: &str,
) -> Result<Map<String, Value>, RemoteError> {
    let step = RemoteStep::FetchResult;
    let mut archive = ZipArchive::new(Cursor::new(bundle))
        .map_err(|e| RemoteError::parse(step, format!("result bundle is not a zip archive: {e}")))?;

    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();

    let Some(name) = names.iter().find(|n| n.ends_with(suffix)).cloned() else {
        return Err(RemoteError::parse(
            step,
            format!("no entry ending in {suffix} in result bundle; entries: [{}]", names.join(", ")),
        ));
    };

    let entry = archive
        .by_name(&name)
        .map_err(|e| RemoteError::parse(step, format!("cannot open {name}: {e}")))?;
    if entry.size() > MAX_SCORE_ENTRY_BYTES {
        return Err(RemoteError::parse(
            step,
            format!("{name} is {} bytes, limit is {MAX_SCORE_ENTRY_BYTES}", entry.size()),
        ));
    }

    // The declared size is not trusted; the read itself is capped too
    let mut contents = String::new();
    entry
        .take(MAX_SCORE_ENTRY_BYTES + 1)
        .read_to_string(&mut contents)
        .map_err(|e| RemoteError::parse(step, format!("cannot read {name}: {e}")))?;
    if contents.len() as u64 > MAX_SCORE_ENTRY_BYTES {
        return Err(RemoteError::parse(
            step,
            format!("{name} exceeds {MAX_SCORE_ENTRY_BYTES} bytes"),
        ));
    }

    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(RemoteError::parse(step, format!("{name} is not a JSON object"))),
        Err(e) => Err(RemoteError::parse(step, format!("{name} is not valid JSON: {e}"))),
    }
}

//! Offset cursors for backends that page through an in-memory result list.
//!
//! The cursor is the decimal offset of the first item on the page. Backends
//! with their own continuation tokens are free to ignore this module; the
//! engine treats cursors as opaque.

use super::params::SearchOptions;
use crate::error::{FhirError, FhirResult};

/// Parses an offset cursor. A missing cursor means offset zero.
pub fn parse_offset(cursor: Option<&str>) -> FhirResult<usize> {
    let Some(raw) = cursor else {
        return Ok(0);
    };
    let offset: i64 = raw
        .trim()
        .parse()
        .map_err(|_| FhirError::invalid_request(format!("invalid cursor '{}'", raw)))?;
    if offset < 0 {
        return Err(FhirError::invalid_request(format!(
            "offset must be non-negative, got {}",
            offset
        )));
    }
    usize::try_from(offset)
        .map_err(|_| FhirError::invalid_request(format!("invalid cursor '{}'", raw)))
}

/// Encodes an offset as a cursor.
pub fn encode_offset(offset: usize) -> String {
    offset.to_string()
}

/// Cuts one page out of `items` according to the options' cursor and count.
///
/// Returns the page and the cursor of the following page, if any. A cursor
/// past the end yields an empty, terminal page.
pub fn paginate<T: Clone>(
    items: &[T],
    options: &SearchOptions,
) -> FhirResult<(Vec<T>, Option<String>)> {
    let offset = parse_offset(options.cursor.as_deref())?;
    if offset >= items.len() {
        return Ok((Vec::new(), None));
    }

    let end = offset.saturating_add(options.count).min(items.len());
    let page = items[offset..end].to_vec();
    let next = (options.count > 0 && end < items.len()).then(|| encode_offset(end));
    Ok((page, next))
}

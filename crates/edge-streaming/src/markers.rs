//! Insertion point markers embedded in raw markup.

use edge_core::Region;

use crate::chunk::{ContentChunk, InsertionPoint};

/// Comment the renderer places where head metadata belongs.
pub const HEAD_MARKER: &str = "<!--edge:head-->";

/// Comment the renderer places where deferred body metadata belongs.
pub const BODY_MARKER: &str = "<!--edge:body-->";

/// Marker comment for a region.
pub fn marker_comment(region: Region) -> &'static str {
    match region {
        Region::Head => HEAD_MARKER,
        Region::Body => BODY_MARKER,
    }
}

/// Length of the longest suffix of `html` that could begin a marker.
///
/// Markers may span chunk boundaries; callers hold this tail back until
/// the next chunk arrives.
pub fn partial_marker_len(html: &str) -> usize {
    let longest = HEAD_MARKER.len().max(BODY_MARKER.len()) - 1;
    (1..=longest.min(html.len()))
        .rev()
        .find(|&len| {
            let tail = &html.as_bytes()[html.len() - len..];
            HEAD_MARKER.as_bytes().starts_with(tail) || BODY_MARKER.as_bytes().starts_with(tail)
        })
        .unwrap_or(0)
}

/// Split markup into `Html` and `Marker` chunks.
///
/// Empty markup segments between markers are dropped.
pub fn split_markers(html: &str) -> Vec<ContentChunk> {
    let mut chunks = Vec::new();
    let mut rest = html;

    loop {
        let next = [
            (rest.find(HEAD_MARKER), InsertionPoint::head(), HEAD_MARKER.len()),
            (rest.find(BODY_MARKER), InsertionPoint::body(), BODY_MARKER.len()),
        ]
        .into_iter()
        .filter_map(|(pos, point, len)| pos.map(|p| (p, point, len)))
        .min_by_key(|(pos, _, _)| *pos);

        match next {
            Some((pos, point, len)) => {
                if pos > 0 {
                    chunks.push(ContentChunk::Html(rest[..pos].to_string()));
                }
                chunks.push(ContentChunk::Marker(point));
                rest = &rest[pos + len..];
            }
            None => {
                if !rest.is_empty() {
                    chunks.push(ContentChunk::Html(rest.to_string()));
                }
                break;
            }
        }
    }

    chunks
}

//! Glue markup written around renderer output.

use edge_metadata::{escape_html, MetadataFragment};
use edge_streaming::BoundaryId;

/// Swaps a boundary's fallback for its streamed segment.
const REVEAL_FN: &str = "(function(id){var s=document.querySelector('template[data-edge-segment=\"'+id+'\"]'),b=document.querySelector('[data-edge-boundary=\"'+id+'\"]');if(s&&b){b.replaceWith(s.content);s.remove()}})";

/// Wrap fallback markup so it can be replaced later.
pub fn fallback_placeholder(boundary: &BoundaryId, html: &str) -> String {
    format!(
        r#"<div data-edge-boundary="{}">{}</div>"#,
        escape_html(boundary.as_str()),
        html
    )
}

/// Segment that replaces a previously streamed fallback.
pub fn reveal_segment(boundary: &BoundaryId, html: &str) -> String {
    let id = escape_html(boundary.as_str());
    format!(
        r#"<template data-edge-segment="{id}">{html}</template><script>{REVEAL_FN}("{id}")</script>"#
    )
}

/// Concatenate fragment payloads.
pub fn render_fragments(fragments: &[MetadataFragment]) -> String {
    fragments.iter().map(|f| f.payload.as_str()).collect()
}

/// A complete document wrapping generated body markup.
pub fn document(lang: &str, head: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"{}\"><head>{}</head><body>{}</body></html>",
        escape_html(lang),
        head,
        body
    )
}

/// Client-side navigation used once the status line is committed.
pub fn redirect_refresh(target: &str) -> String {
    format!(
        r#"<meta id="__edge-page-redirect" http-equiv="refresh" content="0;url={}">"#,
        escape_html(target)
    )
}

/// Keeps crawlers from indexing a not-found page served with 200.
pub fn noindex() -> &'static str {
    r#"<meta name="robots" content="noindex">"#
}

/// Not-found markup written in place of content after bytes were sent.
pub fn not_found_inline(html: &str) -> String {
    format!("{}{}", noindex(), html)
}

/// Terminal error marker appended after bytes were already sent.
pub fn error_indicator(class: &str) -> String {
    format!(
        r#"<template data-edge-error="{}"></template>"#,
        escape_html(class)
    )
}

//! Metadata fragments.

use std::fmt;

use edge_core::Region;
use serde::{Deserialize, Serialize};

use crate::tree::SlotId;

/// What kind of tag a fragment renders.
///
/// Variant order is the order fragments are written within a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetadataKind {
    TitleTag,
    MetaTag,
    LinkTag,
}

/// Logical identity used for dedup, e.g. `title` or `meta:description`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetadataKey(pub String);

impl MetadataKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn title() -> Self {
        Self::new("title")
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rendered metadata for one logical identity.
///
/// `Head` fragments must land before the head closes (charset, viewport).
/// `Body` fragments are streamed metadata: they are written in the head when
/// ready in time, otherwise at the body insertion point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFragment {
    pub region: Region,
    pub kind: MetadataKind,
    pub key: MetadataKey,
    pub payload: String,
    pub source_slot: SlotId,
}

impl MetadataFragment {
    /// A `<title>` tag.
    pub fn title(slot: impl Into<SlotId>, text: &str) -> Self {
        Self {
            region: Region::Body,
            kind: MetadataKind::TitleTag,
            key: MetadataKey::title(),
            payload: format!("<title>{}</title>", escape_html(text)),
            source_slot: slot.into(),
        }
    }

    /// A named `<meta>` tag.
    pub fn meta(slot: impl Into<SlotId>, name: &str, content: &str) -> Self {
        Self {
            region: Region::Body,
            kind: MetadataKind::MetaTag,
            key: MetadataKey::new(format!("meta:{}", name)),
            payload: format!(
                r#"<meta name="{}" content="{}">"#,
                escape_html(name),
                escape_html(content)
            ),
            source_slot: slot.into(),
        }
    }

    /// A `<link>` tag.
    pub fn link(slot: impl Into<SlotId>, rel: &str, href: &str) -> Self {
        Self {
            region: Region::Body,
            kind: MetadataKind::LinkTag,
            key: MetadataKey::new(format!("link:{}", rel)),
            payload: format!(
                r#"<link rel="{}" href="{}">"#,
                escape_html(rel),
                escape_html(href)
            ),
            source_slot: slot.into(),
        }
    }

    /// The charset declaration. Always in the head.
    pub fn charset(charset: &str) -> Self {
        Self {
            region: Region::Head,
            kind: MetadataKind::MetaTag,
            key: MetadataKey::new("meta:charset"),
            payload: format!(r#"<meta charset="{}">"#, escape_html(charset)),
            source_slot: SlotId::root(),
        }
    }

    /// The viewport declaration. Always in the head.
    pub fn viewport(content: &str) -> Self {
        let mut fragment = Self::meta(SlotId::root(), "viewport", content);
        fragment.region = Region::Head;
        fragment
    }

    /// Override the target region.
    pub fn in_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }
}

/// Escape text interpolated into markup.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Metadata known synchronously from route configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteMetadata {
    /// Document charset.
    pub charset: String,
    /// Viewport meta content.
    pub viewport: String,
    /// Fragments used when no slot supplies a key.
    pub defaults: Vec<MetadataFragment>,
    /// Keys every document should end up with.
    pub required: Vec<MetadataKey>,
}

impl Default for RouteMetadata {
    fn default() -> Self {
        Self {
            charset: "utf-8".to_string(),
            viewport: "width=device-width, initial-scale=1".to_string(),
            defaults: Vec::new(),
            required: vec![MetadataKey::title()],
        }
    }
}

impl RouteMetadata {
    /// Add a default fragment.
    pub fn with_default(mut self, fragment: MetadataFragment) -> Self {
        self.defaults.push(fragment);
        self
    }

    /// Use a default title.
    pub fn with_default_title(self, title: &str) -> Self {
        self.with_default(MetadataFragment::title(SlotId::root(), title))
    }

    /// Head fragments: charset first, then viewport.
    pub fn head_fragments(&self) -> Vec<MetadataFragment> {
        vec![
            MetadataFragment::charset(&self.charset),
            MetadataFragment::viewport(&self.viewport),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_fragment() {
        let fragment = MetadataFragment::title("page", "index page");
        assert_eq!(fragment.payload, "<title>index page</title>");
        assert_eq!(fragment.key, MetadataKey::title());
        assert_eq!(fragment.region, Region::Body);
    }

    #[test]
    fn test_title_is_escaped() {
        let fragment = MetadataFragment::title("page", "a < b & c");
        assert_eq!(fragment.payload, "<title>a &lt; b &amp; c</title>");
    }

    #[test]
    fn test_head_fragments() {
        let head = RouteMetadata::default().head_fragments();
        assert_eq!(head[0].payload, r#"<meta charset="utf-8">"#);
        assert_eq!(
            head[1].payload,
            r#"<meta name="viewport" content="width=device-width, initial-scale=1">"#
        );
        assert!(head.iter().all(|f| f.region == Region::Head));
    }

    #[test]
    fn test_route_metadata_from_json() {
        let route: RouteMetadata = serde_json::from_str(r#"{"charset": "iso-8859-1"}"#).unwrap();
        assert_eq!(route.charset, "iso-8859-1");
        assert_eq!(route.required, vec![MetadataKey::title()]);
    }
}

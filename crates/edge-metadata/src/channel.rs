//! Session-scoped metadata readiness with parallel-slot dedup.

use std::collections::{HashMap, HashSet};

use edge_core::{Region, RegionSet};
use futures::channel::mpsc::{self, TryRecvError};
use futures::StreamExt;

use crate::fragment::{MetadataFragment, MetadataKey, RouteMetadata};
use crate::tree::{RouteTree, SlotId, SlotRank};

/// Readiness of the session's metadata. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataReadiness {
    /// No region is ready.
    Pending,
    /// Some regions are ready.
    PartiallyReady(RegionSet),
    /// Every region is ready.
    Ready(RegionSet),
}

impl MetadataReadiness {
    fn from_set(set: RegionSet) -> Self {
        if set.is_full() {
            Self::Ready(set)
        } else if set.is_empty() {
            Self::Pending
        } else {
            Self::PartiallyReady(set)
        }
    }

    /// Regions ready so far.
    pub fn regions(&self) -> RegionSet {
        match self {
            Self::Pending => RegionSet::empty(),
            Self::PartiallyReady(set) | Self::Ready(set) => *set,
        }
    }

    /// Check if a region is ready.
    pub fn is_ready(&self, region: Region) -> bool {
        self.regions().contains(region)
    }
}

/// Events sent by render-tree evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataEvent {
    /// A slot produced a fragment.
    Fragment(MetadataFragment),
    /// A slot finished resolving its metadata.
    Settled(SlotId),
}

/// Producer handle given to render-tree evaluation.
#[derive(Debug, Clone)]
pub struct MetadataFeed {
    tx: mpsc::UnboundedSender<MetadataEvent>,
}

impl MetadataFeed {
    /// Submit a fragment. Returns `false` if the session is gone.
    pub fn submit(&self, fragment: MetadataFragment) -> bool {
        self.tx
            .unbounded_send(MetadataEvent::Fragment(fragment))
            .is_ok()
    }

    /// Mark a slot's metadata as fully resolved.
    pub fn settle(&self, slot: impl Into<SlotId>) -> bool {
        self.tx
            .unbounded_send(MetadataEvent::Settled(slot.into()))
            .is_ok()
    }
}

#[derive(Debug)]
struct Entry {
    fragment: MetadataFragment,
    rank: SlotRank,
    seq: u64,
}

/// Consumer side of the metadata channel, owned by the assembler.
///
/// `Head` (charset, viewport) is ready from construction. `Body` becomes
/// ready once every slot in the route tree has settled, or when every feed
/// handle is dropped. For each key only the fragment from the best-ranked
/// slot is kept.
#[derive(Debug)]
pub struct MetadataChannel {
    rx: Option<mpsc::UnboundedReceiver<MetadataEvent>>,
    tree: RouteTree,
    route: RouteMetadata,
    unsettled: HashSet<SlotId>,
    entries: HashMap<MetadataKey, Entry>,
    ready: RegionSet,
    taken: RegionSet,
    seq: u64,
}

impl MetadataChannel {
    /// Create a channel for one session.
    pub fn new(tree: RouteTree, route: RouteMetadata) -> (Self, MetadataFeed) {
        let (tx, rx) = mpsc::unbounded();
        let unsettled = tree.slots().iter().map(|s| s.id.clone()).collect();

        let mut channel = Self {
            rx: Some(rx),
            tree,
            route,
            unsettled,
            entries: HashMap::new(),
            ready: RegionSet::empty(),
            taken: RegionSet::empty(),
            seq: 0,
        };

        let seeded = channel
            .route
            .head_fragments()
            .into_iter()
            .chain(channel.route.defaults.clone());
        for fragment in seeded {
            channel.insert(fragment, SlotRank::ROUTE_DEFAULT);
        }
        channel.ready.insert(Region::Head);
        channel.update_readiness();

        (channel, MetadataFeed { tx })
    }

    /// Session-level readiness.
    pub fn readiness(&self) -> MetadataReadiness {
        MetadataReadiness::from_set(self.ready)
    }

    /// Readiness as seen from one region: `Pending` until it is ready.
    pub fn region_status(&self, region: Region) -> MetadataReadiness {
        if self.ready.contains(region) {
            MetadataReadiness::from_set(self.ready)
        } else {
            MetadataReadiness::Pending
        }
    }

    /// Check if a region is ready.
    pub fn is_ready(&self, region: Region) -> bool {
        self.ready.contains(region)
    }

    /// Check if a region's fragments have been taken.
    pub fn is_taken(&self, region: Region) -> bool {
        self.taken.contains(region)
    }

    /// Apply a fragment directly, bypassing the feed.
    pub fn submit(&mut self, fragment: MetadataFragment) {
        self.apply(MetadataEvent::Fragment(fragment));
    }

    /// Mark a slot settled directly, bypassing the feed.
    pub fn settle(&mut self, slot: impl Into<SlotId>) {
        self.apply(MetadataEvent::Settled(slot.into()));
    }

    /// Wait for and apply one event.
    ///
    /// Returns `false` once no further events can arrive; at that point
    /// every region is ready. Cancel-safe.
    pub async fn recv(&mut self) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            return false;
        };

        match rx.next().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => {
                self.close();
                false
            }
        }
    }

    /// Apply every event already queued without waiting.
    pub fn drain_ready(&mut self) {
        while let Some(rx) = self.rx.as_mut() {
            match rx.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Closed) => self.close(),
                Err(TryRecvError::Empty) => break,
            }
        }
    }

    /// Wait until a region is ready.
    pub async fn wait_ready(&mut self, region: Region) {
        while !self.is_ready(region) {
            if !self.recv().await {
                break;
            }
        }
    }

    /// Stop listening and treat every outstanding slot as settled.
    pub fn close(&mut self) {
        self.rx = None;
        if !self.unsettled.is_empty() {
            tracing::debug!(
                outstanding = self.unsettled.len(),
                "metadata feed closed with unsettled slots"
            );
            self.unsettled.clear();
        }
        self.update_readiness();
    }

    /// Take a region's fragments for emission.
    ///
    /// Returns an empty list if the region was already taken, so every
    /// fragment is written at most once.
    pub fn take_region(&mut self, region: Region) -> Vec<MetadataFragment> {
        if !self.taken.insert(region) {
            tracing::warn!(%region, "metadata region already taken");
            return Vec::new();
        }
        if !self.ready.contains(region) {
            tracing::debug!(%region, "taking metadata before it is ready");
        }

        let mut entries: Vec<&Entry> = self
            .entries
            .values()
            .filter(|e| e.fragment.region == region)
            .collect();
        entries.sort_by_key(|e| (head_order(&e.fragment.key), e.fragment.kind, e.seq));
        entries.into_iter().map(|e| e.fragment.clone()).collect()
    }

    /// Current winning fragment for a key.
    pub fn fragment(&self, key: &MetadataKey) -> Option<&MetadataFragment> {
        self.entries.get(key).map(|e| &e.fragment)
    }

    /// The route tree this session resolves against.
    pub fn tree(&self) -> &RouteTree {
        &self.tree
    }

    fn apply(&mut self, event: MetadataEvent) {
        match event {
            MetadataEvent::Fragment(mut fragment) => {
                if fragment.region == Region::Head && self.taken.contains(Region::Head) {
                    tracing::debug!(key = %fragment.key, "head already written, moving fragment to body");
                    fragment.region = Region::Body;
                }
                let written = self
                    .entries
                    .get(&fragment.key)
                    .is_some_and(|e| self.taken.contains(e.fragment.region));
                if written || self.taken.contains(fragment.region) {
                    tracing::warn!(key = %fragment.key, slot = %fragment.source_slot, "late metadata fragment dropped");
                    return;
                }
                let rank = self.tree.rank(&fragment.source_slot);
                self.insert(fragment, rank);
            }
            MetadataEvent::Settled(slot) => {
                if !self.unsettled.remove(&slot) {
                    tracing::debug!(%slot, "settle for unknown or settled slot");
                }
                self.update_readiness();
            }
        }
    }

    fn insert(&mut self, fragment: MetadataFragment, rank: SlotRank) {
        if let Some(existing) = self.entries.get(&fragment.key) {
            if rank <= existing.rank {
                tracing::debug!(
                    key = %fragment.key,
                    slot = %fragment.source_slot,
                    kept = %existing.fragment.source_slot,
                    "metadata fragment discarded"
                );
                return;
            }
        }

        self.seq += 1;
        let seq = self
            .entries
            .get(&fragment.key)
            .map(|e| e.seq)
            .unwrap_or(self.seq);
        self.entries
            .insert(fragment.key.clone(), Entry { fragment, rank, seq });
    }

    fn update_readiness(&mut self) {
        if self.ready.contains(Region::Body) || !self.unsettled.is_empty() {
            return;
        }

        for key in &self.route.required {
            if !self.entries.contains_key(key) {
                tracing::warn!(%key, "required metadata missing");
            }
        }
        self.ready.insert(Region::Body);
    }
}

/// Charset and viewport lead the head regardless of kind.
fn head_order(key: &MetadataKey) -> u8 {
    match key.0.as_str() {
        "meta:charset" => 0,
        "meta:viewport" => 1,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parallel_tree() -> RouteTree {
        RouteTree::new()
            .with_segment("page", "root")
            .with_segment("@a", "page")
            .with_default_slot("@b", "page")
    }

    fn settle_all(channel: &mut MetadataChannel) {
        for slot in ["root", "page", "@a", "@b"] {
            channel.settle(slot);
        }
    }

    fn titles(fragments: &[MetadataFragment]) -> Vec<&str> {
        fragments
            .iter()
            .filter(|f| f.key == MetadataKey::title())
            .map(|f| f.payload.as_str())
            .collect()
    }

    #[test]
    fn test_head_ready_immediately() {
        let (channel, _feed) = MetadataChannel::new(parallel_tree(), RouteMetadata::default());
        assert!(channel.is_ready(Region::Head));
        assert!(!channel.is_ready(Region::Body));
        assert_eq!(channel.region_status(Region::Body), MetadataReadiness::Pending);
        assert!(matches!(
            channel.readiness(),
            MetadataReadiness::PartiallyReady(_)
        ));
    }

    #[test]
    fn test_body_ready_after_all_slots_settle() {
        let (mut channel, _feed) =
            MetadataChannel::new(parallel_tree(), RouteMetadata::default());
        channel.submit(MetadataFragment::title("@a", "A"));
        channel.settle("root");
        channel.settle("page");
        channel.settle("@a");
        assert!(!channel.is_ready(Region::Body));

        channel.settle("@b");
        assert!(channel.is_ready(Region::Body));
        assert!(matches!(channel.readiness(), MetadataReadiness::Ready(_)));
    }

    #[test]
    fn test_active_slot_wins_even_if_late() {
        let (mut channel, _feed) =
            MetadataChannel::new(parallel_tree(), RouteMetadata::default());
        channel.submit(MetadataFragment::title("@b", "B"));
        channel.submit(MetadataFragment::title("@a", "A"));
        settle_all(&mut channel);

        let body = channel.take_region(Region::Body);
        assert_eq!(titles(&body), vec!["<title>A</title>"]);
    }

    #[test]
    fn test_default_slot_discarded_after_active() {
        let (mut channel, _feed) =
            MetadataChannel::new(parallel_tree(), RouteMetadata::default());
        channel.submit(MetadataFragment::title("@a", "A"));
        channel.submit(MetadataFragment::title("@b", "B"));
        settle_all(&mut channel);

        let body = channel.take_region(Region::Body);
        assert_eq!(titles(&body), vec!["<title>A</title>"]);
    }

    #[test]
    fn test_missing_slot_falls_back_to_ancestor() {
        let (mut channel, _feed) =
            MetadataChannel::new(parallel_tree(), RouteMetadata::default());
        channel.submit(MetadataFragment::title("page", "layout title"));
        channel.submit(MetadataFragment::meta("@a", "description", "from a"));
        settle_all(&mut channel);

        let body = channel.take_region(Region::Body);
        assert_eq!(titles(&body), vec!["<title>layout title</title>"]);
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn test_route_default_used_last() {
        let route = RouteMetadata::default().with_default_title("Fallback");
        let (mut channel, _feed) = MetadataChannel::new(parallel_tree(), route);
        settle_all(&mut channel);
        assert_eq!(
            titles(&channel.take_region(Region::Body)),
            vec!["<title>Fallback</title>"]
        );
    }

    #[test]
    fn test_take_region_once() {
        let (mut channel, _feed) = MetadataChannel::new(RouteTree::empty(), RouteMetadata::default());
        let head = channel.take_region(Region::Head);
        assert_eq!(head.len(), 2);
        assert!(channel.take_region(Region::Head).is_empty());
        assert!(channel.is_taken(Region::Head));
    }

    #[test]
    fn test_body_fragments_ordered_title_first() {
        let (mut channel, _feed) = MetadataChannel::new(RouteTree::new(), RouteMetadata::default());
        channel.submit(MetadataFragment::link("root", "canonical", "/"));
        channel.submit(MetadataFragment::meta("root", "description", "d"));
        channel.submit(MetadataFragment::title("root", "t"));
        channel.settle("root");

        let kinds: Vec<_> = channel
            .take_region(Region::Body)
            .into_iter()
            .map(|f| f.key.0)
            .collect();
        assert_eq!(kinds, vec!["title", "meta:description", "link:canonical"]);
    }

    #[test]
    fn test_late_head_fragment_moves_to_body() {
        let (mut channel, _feed) = MetadataChannel::new(RouteTree::new(), RouteMetadata::default());
        channel.take_region(Region::Head);
        channel.submit(MetadataFragment::meta("root", "theme-color", "#fff").in_region(Region::Head));
        channel.settle("root");

        let body = channel.take_region(Region::Body);
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].region, Region::Body);
    }

    #[test]
    fn test_slot_viewport_replaces_route_viewport() {
        let (mut channel, _feed) = MetadataChannel::new(RouteTree::new(), RouteMetadata::default());
        channel.submit(MetadataFragment::viewport("width=device-width"));
        channel.submit(MetadataFragment::title("root", "t").in_region(Region::Head));

        let head: Vec<_> = channel
            .take_region(Region::Head)
            .into_iter()
            .map(|f| f.payload)
            .collect();
        assert_eq!(
            head,
            vec![
                r#"<meta charset="utf-8">"#.to_string(),
                r#"<meta name="viewport" content="width=device-width">"#.to_string(),
                "<title>t</title>".to_string(),
            ]
        );
    }

    #[test]
    fn test_key_written_in_head_not_repeated_in_body() {
        let (mut channel, _feed) = MetadataChannel::new(RouteTree::new(), RouteMetadata::default());
        channel.take_region(Region::Head);
        channel.submit(MetadataFragment::viewport("width=500"));
        channel.settle("root");

        assert!(channel.take_region(Region::Body).is_empty());
    }

    #[tokio::test]
    async fn test_feed_events_drive_readiness() {
        let (mut channel, feed) = MetadataChannel::new(RouteTree::new(), RouteMetadata::default());

        assert!(feed.submit(MetadataFragment::title("root", "index page")));
        assert!(feed.settle("root"));
        channel.wait_ready(Region::Body).await;

        assert!(channel.is_ready(Region::Body));
        assert_eq!(
            channel.fragment(&MetadataKey::title()).unwrap().payload,
            "<title>index page</title>"
        );
    }

    #[tokio::test]
    async fn test_dropped_feed_finalizes() {
        let (mut channel, feed) = MetadataChannel::new(parallel_tree(), RouteMetadata::default());
        feed.submit(MetadataFragment::title("@a", "A"));
        drop(feed);

        channel.wait_ready(Region::Body).await;
        assert!(channel.is_ready(Region::Body));
        assert!(!channel.recv().await);
    }

    #[test]
    fn test_drain_ready_is_non_blocking() {
        let (mut channel, feed) = MetadataChannel::new(RouteTree::new(), RouteMetadata::default());
        channel.drain_ready();
        assert!(!channel.is_ready(Region::Body));

        feed.settle("root");
        channel.drain_ready();
        assert!(channel.is_ready(Region::Body));
    }
}

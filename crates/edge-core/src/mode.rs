//! Delivery modes and document regions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a client receives the response body.
///
/// Assigned once when a session starts and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Incremental flushes as content becomes available.
    Streaming,
    /// One complete, fully-resolved response in a single write.
    Blocking,
}

impl DeliveryMode {
    /// Check if this mode buffers the whole response.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking)
    }

    /// Check if this mode flushes incrementally.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming => write!(f, "streaming"),
            Self::Blocking => write!(f, "blocking"),
        }
    }
}

/// A named document area that metadata fragments target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// Inside `<head>`, before it closes.
    Head,
    /// Inside `<body>`, at the body insertion point.
    Body,
}

impl Region {
    /// All regions in document order.
    pub const ALL: [Region; 2] = [Region::Head, Region::Body];

    fn bit(self) -> u8 {
        match self {
            Self::Head => 0b01,
            Self::Body => 0b10,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => write!(f, "head"),
            Self::Body => write!(f, "body"),
        }
    }
}

/// A small set of regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RegionSet(u8);

impl RegionSet {
    /// Create an empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create a set holding every region.
    pub fn all() -> Self {
        Region::ALL.into_iter().collect()
    }

    /// Insert a region. Returns `false` if it was already present.
    pub fn insert(&mut self, region: Region) -> bool {
        let present = self.contains(region);
        self.0 |= region.bit();
        !present
    }

    /// Check membership.
    pub fn contains(&self, region: Region) -> bool {
        self.0 & region.bit() != 0
    }

    /// Check if no region is present.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Check if every region is present.
    pub fn is_full(&self) -> bool {
        *self == Self::all()
    }

    /// Number of regions present.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate regions in document order.
    pub fn iter(&self) -> impl Iterator<Item = Region> + '_ {
        Region::ALL.into_iter().filter(|r| self.contains(*r))
    }
}

impl FromIterator<Region> for RegionSet {
    fn from_iter<I: IntoIterator<Item = Region>>(iter: I) -> Self {
        let mut set = Self::empty();
        for region in iter {
            set.insert(region);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_set_insert_once() {
        let mut set = RegionSet::empty();
        assert!(set.insert(Region::Body));
        assert!(!set.insert(Region::Body));
        assert_eq!(set.len(), 1);
        assert!(set.contains(Region::Body));
        assert!(!set.contains(Region::Head));
    }

    #[test]
    fn test_region_set_full() {
        let set: RegionSet = [Region::Head, Region::Body].into_iter().collect();
        assert!(set.is_full());
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Region::Head, Region::Body]);
    }

    #[test]
    fn test_delivery_mode_helpers() {
        assert!(DeliveryMode::Blocking.is_blocking());
        assert!(DeliveryMode::Streaming.is_streaming());
        assert_eq!(DeliveryMode::Streaming.to_string(), "streaming");
    }
}

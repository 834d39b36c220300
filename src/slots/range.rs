//! Slot-ownership tokens from `CLUSTER NODES`.
//!
//! A master line ends with zero or more tokens, each either a stable range
//! (`0-5460`) or a bracketed transition marker for a single slot
//! (`[5461-<-<node-id>]` / `[5461->-<node-id>]`).

use std::str::FromStr;

use serde::Serialize;

use crate::cluster::types::ParseError;

/// Total number of hash slots in a cluster.
pub const TOTAL_SLOTS: u32 = 16384;

/// Arrow used inside a marker when the slot is being imported from a peer.
const IMPORTING_ARROW: &str = "-<-";
/// Arrow used inside a marker when the slot is being migrated to a peer.
const MIGRATING_ARROW: &str = "->-";

/// Direction of an in-progress slot handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotTransition {
    /// `[slot-<-peer]`
    Importing,
    /// `[slot->-peer]`
    Migrating,
}

impl SlotTransition {
    fn arrow(self) -> &'static str {
        match self {
            SlotTransition::Importing => IMPORTING_ARROW,
            SlotTransition::Migrating => MIGRATING_ARROW,
        }
    }
}

/// Should the upper bound of a stable range be walked or not.
///
/// The wire format defines `end` inclusively. `Exclusive` reproduces the
/// historical `[start, end)` walk, which undercounts every range by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotBounds {
    /// Walk `start..=end`.
    #[default]
    Inclusive,
    /// Walk `start..end`.
    Exclusive,
}

/// A span of hash slots owned by a master, or a single slot in transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotRange {
    /// Start of the range (inclusive).
    pub start: u16,
    /// End of the range (inclusive). Always 0 for a transition marker.
    pub end: u16,
    /// Peer node id named by a transition marker.
    pub migrating_to: Option<String>,
    /// Which arrow the marker used, `None` for stable ranges.
    pub transition: Option<SlotTransition>,
}

impl SlotRange {
    /// Create a stable range.
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start,
            end,
            migrating_to: None,
            transition: None,
        }
    }

    /// Create a transition marker for a single slot.
    pub fn marker(slot: u16, transition: SlotTransition, peer: impl Into<String>) -> Self {
        Self {
            start: slot,
            end: 0,
            migrating_to: Some(peer.into()),
            transition: Some(transition),
        }
    }

    /// True for a plain `start-end` range.
    pub fn is_stable(&self) -> bool {
        self.transition.is_none()
    }

    /// Slots of a stable range under the given bound convention.
    ///
    /// Markers yield nothing: their `end` is a sentinel, not a bound.
    pub fn slots(&self, bounds: SlotBounds) -> impl Iterator<Item = u16> + use<> {
        let (start, end) = if self.is_stable() {
            (u32::from(self.start), u32::from(self.end))
        } else {
            (1, 0)
        };
        let end = match bounds {
            SlotBounds::Inclusive => end + 1,
            SlotBounds::Exclusive => end,
        };
        (start..end).filter_map(|slot| u16::try_from(slot).ok())
    }

    /// Number of slots [`SlotRange::slots`] would yield.
    pub fn count(&self, bounds: SlotBounds) -> usize {
        if !self.is_stable() || self.end < self.start {
            return 0;
        }
        let span = usize::from(self.end - self.start);
        match bounds {
            SlotBounds::Inclusive => span + 1,
            SlotBounds::Exclusive => span,
        }
    }

    /// Parse one slot token.
    pub fn parse(token: &str) -> Result<Self, ParseError> {
        if let Some(inner) = token.strip_prefix('[') {
            let inner = inner.strip_suffix(']').ok_or_else(|| invalid(token, "unterminated marker"))?;
            return parse_marker(token, inner);
        }

        let (start, end) = token
            .split_once('-')
            .ok_or_else(|| invalid(token, "expected <start>-<end>"))?;
        Ok(SlotRange::new(
            parse_slot(token, start)?,
            parse_slot(token, end)?,
        ))
    }
}

fn parse_marker(token: &str, inner: &str) -> Result<SlotRange, ParseError> {
    for transition in [SlotTransition::Importing, SlotTransition::Migrating] {
        if let Some((slot, peer)) = inner.split_once(transition.arrow()) {
            if peer.is_empty() {
                return Err(invalid(token, "missing peer node id"));
            }
            return Ok(SlotRange::marker(parse_slot(token, slot)?, transition, peer));
        }
    }
    Err(invalid(token, "unknown transition arrow"))
}

fn parse_slot(token: &str, value: &str) -> Result<u16, ParseError> {
    value
        .parse::<u16>()
        .map_err(|e| invalid(token, &format!("invalid slot {value:?}: {e}")))
}

fn invalid(token: &str, reason: &str) -> ParseError {
    ParseError::InvalidSlotToken {
        token: token.to_string(),
        reason: reason.to_string(),
    }
}

impl FromStr for SlotRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SlotRange::parse(s)
    }
}

impl std::fmt::Display for SlotRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.transition, &self.migrating_to) {
            (Some(transition), Some(peer)) => {
                write!(f, "[{}{}{}]", self.start, transition.arrow(), peer)
            }
            _ => write!(f, "{}-{}", self.start, self.end),
        }
    }
}

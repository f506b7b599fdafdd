//! Page events feeding the prefetch controller.
//!
//! In the browser these were DOM listeners; here the page (or a test) posts
//! them as a typed stream, so the controller has an explicit, detachable
//! trigger surface.

use serde::{Deserialize, Serialize};

/// `navigator.connection.effectiveType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveConnectionType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    #[serde(other)]
    Unknown,
}

impl EffectiveConnectionType {
    /// Connections on which speculative fetching wastes scarce bandwidth.
    pub fn is_slow(&self) -> bool {
        matches!(self, EffectiveConnectionType::Slow2g | EffectiveConnectionType::TwoG)
    }
}

impl std::fmt::Display for EffectiveConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectiveConnectionType::Slow2g => write!(f, "slow-2g"),
            EffectiveConnectionType::TwoG => write!(f, "2g"),
            EffectiveConnectionType::ThreeG => write!(f, "3g"),
            EffectiveConnectionType::FourG => write!(f, "4g"),
            EffectiveConnectionType::Unknown => write!(f, "unknown"),
        }
    }
}

/// One event from the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEvent {
    /// Pointer entered an anchor.
    Hover { href: String },

    /// Page finished loading; hrefs of matching anchors intersecting the
    /// viewport, in visual order.
    PageLoaded { visible_links: Vec<String> },

    /// An anchor was clicked.
    Click { href: String },

    /// Tab visibility changed.
    Visibility { hidden: bool },

    /// Network information changed.
    Connection { effective_type: EffectiveConnectionType },
}

//! Proxy overlay: externally configured vote and holdings figures added to
//! the "for" side of resolution tallies.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::VotingError;

pub const DEFAULT_PROXY_VOTES: i64 = 120;
pub const DEFAULT_PROXY_HOLDINGS: i64 = 136_789_566;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyOverlay {
    pub proxy_votes: i64,
    pub proxy_holdings: i64,
}

impl ProxyOverlay {
    pub fn new(proxy_votes: i64, proxy_holdings: i64) -> Result<Self, VotingError> {
        if proxy_votes < 0 || proxy_holdings < 0 {
            return Err(VotingError::InvalidRequest(
                "proxy votes and holdings must not be negative".into(),
            ));
        }
        Ok(ProxyOverlay {
            proxy_votes,
            proxy_holdings,
        })
    }

    /// Overlay that contributes nothing.
    pub fn disabled() -> Self {
        ProxyOverlay {
            proxy_votes: 0,
            proxy_holdings: 0,
        }
    }
}

impl Default for ProxyOverlay {
    fn default() -> Self {
        ProxyOverlay {
            proxy_votes: DEFAULT_PROXY_VOTES,
            proxy_holdings: DEFAULT_PROXY_HOLDINGS,
        }
    }
}

/// Holds the currently configured overlay. Reads never block writers.
pub struct ProxyOverlayStore {
    current: watch::Sender<ProxyOverlay>,
}

impl ProxyOverlayStore {
    pub fn new(initial: ProxyOverlay) -> Self {
        let (current, _) = watch::channel(initial);
        Self { current }
    }

    pub fn current(&self) -> ProxyOverlay {
        *self.current.borrow()
    }

    /// Replaces the overlay and returns the previous one.
    pub fn set(&self, overlay: ProxyOverlay) -> ProxyOverlay {
        self.current.send_replace(overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_figures_are_rejected() {
        assert!(ProxyOverlay::new(-1, 0).is_err());
        assert!(ProxyOverlay::new(0, -5).is_err());
        assert!(ProxyOverlay::new(0, 0).is_ok());
    }

    #[test]
    fn set_returns_previous_overlay() {
        let store = ProxyOverlayStore::new(ProxyOverlay::default());

        let previous = store.set(ProxyOverlay::disabled());

        assert_eq!(previous, ProxyOverlay::default());
        assert_eq!(store.current(), ProxyOverlay::disabled());
    }

    #[test]
    fn overlay_uses_client_field_names() {
        let json = serde_json::to_value(ProxyOverlay::default()).unwrap();
        assert_eq!(json["proxyVotes"], 120);
        assert_eq!(json["proxyHoldings"], 136_789_566);
    }
}

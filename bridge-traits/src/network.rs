//! Connectivity Mode Abstraction
//!
//! Exposes the user-selected offline switch to the sync layer.

use std::sync::atomic::{AtomicBool, Ordering};

/// Whether the application is operating in explicit offline mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityMode {
    /// Network calls are allowed
    Online,
    /// Network calls are suppressed; reads are served from the cache only
    Offline,
}

impl ConnectivityMode {
    pub fn from_offline(offline: bool) -> Self {
        if offline {
            Self::Offline
        } else {
            Self::Online
        }
    }

    pub fn is_offline(self) -> bool {
        matches!(self, Self::Offline)
    }
}

/// Offline-mode flag provider
///
/// Read by every sync operation at call start. Implementations must be cheap
/// to query and never block.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::OfflineModeProvider;
///
/// fn may_call_network(flag: &dyn OfflineModeProvider) -> bool {
///     !flag.is_offline()
/// }
/// ```
pub trait OfflineModeProvider: Send + Sync {
    /// Current value of the offline switch
    fn is_offline(&self) -> bool;

    /// Current value as a [`ConnectivityMode`]
    fn mode(&self) -> ConnectivityMode {
        ConnectivityMode::from_offline(self.is_offline())
    }
}

/// In-process flag without persistence or change notification.
#[derive(Debug, Default)]
pub struct StaticOfflineMode {
    offline: AtomicBool,
}

impl StaticOfflineMode {
    pub fn new(offline: bool) -> Self {
        Self {
            offline: AtomicBool::new(offline),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl OfflineModeProvider for StaticOfflineMode {
    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}

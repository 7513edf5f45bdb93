//! Online/offline detection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::settings::Settings;

/// Network reachability as last reported by the platform.
///
/// The host forwards platform notifications here; reads are lock-free.
#[derive(Debug)]
pub struct NetworkState {
  online: AtomicBool,
}

impl NetworkState {
  pub fn new(online: bool) -> Self {
    Self {
      online: AtomicBool::new(online),
    }
  }

  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  /// Store the new state and return the previous one.
  pub fn set(&self, online: bool) -> bool {
    self.online.swap(online, Ordering::SeqCst)
  }
}

impl Default for NetworkState {
  fn default() -> Self {
    Self::new(true)
  }
}

/// Answers "can we reach the network right now?".
#[derive(Clone)]
pub struct ConnectivityOracle {
  network: Arc<NetworkState>,
  settings: Settings,
}

impl ConnectivityOracle {
  pub fn new(network: Arc<NetworkState>, settings: Settings) -> Self {
    Self { network, settings }
  }

  /// Connected unless the platform reports no network or the developer
  /// offline switch is on. Evaluated fresh on every call.
  pub fn is_connected(&self) -> bool {
    if !self.network.is_online() {
      return false;
    }

    match self.settings.force_offline() {
      Ok(forced) => !forced,
      Err(e) => {
        warn!(error = %e, "Could not read offline override, assuming none");
        true
      }
    }
  }

  /// Record a platform network change. Returns true on an offline to online transition.
  pub fn set_network_state(&self, online: bool) -> bool {
    let was_online = self.network.set(online);
    debug!(was_online, online, "Network state changed");
    online && !was_online
  }
}

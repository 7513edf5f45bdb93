//! Application context: builds and owns every component.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::cache::CacheManager;
use crate::client::{ClientEvent, HttpTransport, RemoteClient, Transport, TransportError};
use crate::clock::{Clock, SystemClock};
use crate::connectivity::{ConnectivityOracle, NetworkState};
use crate::content::StoredContents;
use crate::db::Database;
use crate::settings::Settings;
use crate::sync::{ReplayReport, SyncQueue};

/// Everything the host application needs, wired together once.
#[derive(Clone)]
pub struct AppContext {
  pub db: Arc<Database>,
  pub settings: Settings,
  pub contents: StoredContents,
  pub client: RemoteClient,
}

impl AppContext {
  /// Open the store at `path` and talk to the network over HTTP.
  pub fn open(path: &Path) -> Result<Self> {
    let db = Database::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;
    let context = Self::builder(Arc::new(db)).build()?;
    Ok(context)
  }

  pub fn builder(db: Arc<Database>) -> AppContextBuilder {
    AppContextBuilder {
      db,
      transport: None,
      clock: None,
      network: None,
      events: None,
    }
  }

  pub fn cache(&self) -> &CacheManager {
    self.client.cache()
  }

  pub fn queue(&self) -> &SyncQueue {
    self.client.queue()
  }

  pub fn oracle(&self) -> &ConnectivityOracle {
    self.client.oracle()
  }

  /// Forward a platform connectivity change; replays the queue when the
  /// device comes back online.
  pub async fn on_network_change(&self, online: bool) -> Option<ReplayReport> {
    if self.oracle().set_network_state(online) {
      info!("Connection restored, replaying queued operations");
      Some(self.client.sync().await)
    } else {
      None
    }
  }

  /// Manual sync trigger.
  pub async fn sync_now(&self) -> ReplayReport {
    self.client.sync().await
  }
}

pub struct AppContextBuilder {
  db: Arc<Database>,
  transport: Option<Arc<dyn Transport>>,
  clock: Option<Arc<dyn Clock>>,
  network: Option<Arc<NetworkState>>,
  events: Option<mpsc::UnboundedSender<ClientEvent>>,
}

impl AppContextBuilder {
  pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
    self.transport = Some(transport);
    self
  }

  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = Some(clock);
    self
  }

  pub fn network(mut self, network: Arc<NetworkState>) -> Self {
    self.network = Some(network);
    self
  }

  pub fn events(mut self, tx: mpsc::UnboundedSender<ClientEvent>) -> Self {
    self.events = Some(tx);
    self
  }

  /// Assemble the context. Without an explicit transport, HTTP is used.
  pub fn build(self) -> Result<AppContext, TransportError> {
    let db = self.db;
    let clock = self
      .clock
      .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
    let network = self.network.unwrap_or_default();
    let transport: Arc<dyn Transport> = match self.transport {
      Some(transport) => transport,
      None => Arc::new(HttpTransport::new()?),
    };

    let settings = Settings::new(db.clone());
    let contents = StoredContents::new(db.clone());
    let oracle = ConnectivityOracle::new(network, settings.clone());
    let cache = CacheManager::new(db.clone(), settings.clone(), clock.clone());
    let queue = SyncQueue::new(db.clone(), clock);

    let mut client = RemoteClient::new(
      transport,
      cache,
      queue,
      oracle,
      settings.clone(),
      Arc::new(contents.clone()),
    );
    if let Some(tx) = self.events {
      client = client.with_events(tx);
    }

    Ok(AppContext {
      db,
      settings,
      contents,
      client,
    })
  }
}

use crate::collector::{collect_host, CollectorSettings};
use crate::metrics::Metrics;
use crate::session::SessionFactory;
use crate::state::{now_unix, FleetSnapshot, HostSnapshot, ServerSpec};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// The published fleet snapshot. The poller swaps in a fresh `Arc` each
/// cycle; readers clone the current one and never hold a lock across their
/// own work.
#[derive(Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<RwLock<Arc<FleetSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last fully published snapshot, or an empty fleet before
    /// the first cycle completes. Never blocks on a collection in progress.
    pub fn current(&self) -> Arc<FleetSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn publish(&self, snapshot: FleetSnapshot) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }
}

pub struct Poller<F> {
    factory: F,
    servers: Vec<ServerSpec>,
    settings: CollectorSettings,
    interval: Duration,
    store: SnapshotStore,
    metrics: Arc<Metrics>,
}

impl<F> Poller<F>
where
    F: SessionFactory + Clone + 'static,
{
    pub fn new(
        factory: F,
        servers: Vec<ServerSpec>,
        settings: CollectorSettings,
        interval: Duration,
        store: SnapshotStore,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            factory,
            servers,
            settings,
            interval,
            store,
            metrics,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // Delay, not Skip: the next cycle starts at the later of "interval
        // elapsed" and "previous cycle finished", so two cycles never hold
        // concurrent sessions to the same host.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("stopping fleet poller");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// Runs one full collection cycle and publishes the resulting snapshot.
    pub async fn run_cycle(&self) {
        let started = Instant::now();

        let mut handles = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            let factory = self.factory.clone();
            let task_server = server.clone();
            let settings = self.settings;
            let handle = tokio::spawn(async move {
                collect_host(&factory, &task_server, settings).await
            });
            handles.push((server.clone(), handle));
        }

        let mut hosts = BTreeMap::new();
        for (server, handle) in handles {
            let snapshot = match handle.await {
                Ok(snapshot) => snapshot,
                // A panicked collection task still yields an Error snapshot
                // so every configured host appears in the published fleet.
                Err(err) => {
                    warn!(host = %server.name, error = %err, "collection task failed");
                    HostSnapshot::failed(
                        server.clone(),
                        format!("collection task failed: {err}"),
                        now_unix(),
                    )
                }
            };
            if !snapshot.status.is_ok() {
                self.metrics.inc_collect_error(&server.name);
            }
            hosts.insert(server.name.clone(), snapshot);
        }

        let snapshot = FleetSnapshot {
            hosts,
            generated_at_unix: now_unix(),
        };
        self.metrics.observe_cycle(started.elapsed());
        self.metrics.update_from_snapshot(&snapshot);
        self.store.publish(snapshot);
    }
}

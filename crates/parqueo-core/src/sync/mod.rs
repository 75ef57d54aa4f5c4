//! Queue drain triggers.
//!
//! The coordinator drains the deferred queue whenever connectivity returns
//! and, optionally, on a timer while online. After a reconnect or a drain
//! that replayed something it bumps a refresh counter so listings reload.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::connectivity::Connectivity;
use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::queue::{DrainReport, SyncQueue};
use crate::remote::RemoteStore;

/// Queue synchronization status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Offline,
    Syncing,
    /// Nothing left to replay
    Synced,
    /// Last drain stopped on a failed replay
    Pending,
}

pub struct SyncCoordinator<R: RemoteStore, S: KeyValueStore> {
    remote: R,
    queue: SyncQueue<S>,
    connectivity: Connectivity,
    drain_interval: Option<Duration>,
    refresh: watch::Sender<u64>,
    state: watch::Sender<SyncState>,
}

impl<R: RemoteStore, S: KeyValueStore> SyncCoordinator<R, S> {
    pub fn new(remote: R, queue: SyncQueue<S>, connectivity: Connectivity) -> Self {
        let initial = if connectivity.is_online() {
            SyncState::Synced
        } else {
            SyncState::Offline
        };
        let (refresh, _) = watch::channel(0);
        let (state, _) = watch::channel(initial);
        Self {
            remote,
            queue,
            connectivity,
            drain_interval: None,
            refresh,
            state,
        }
    }

    /// Also drain every `interval` while online
    #[must_use]
    pub fn with_drain_interval(mut self, interval: Option<Duration>) -> Self {
        self.drain_interval = interval.filter(|interval| !interval.is_zero());
        self
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn queue(&self) -> &SyncQueue<S> {
        &self.queue
    }

    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Counter bumped whenever listings should reload
    pub fn subscribe_refresh(&self) -> watch::Receiver<u64> {
        self.refresh.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Ask listings to reload
    pub fn request_refresh(&self) {
        self.refresh.send_modify(|generation| *generation += 1);
    }

    /// React to a connectivity transition
    pub async fn on_connectivity_change(&self, was_online: bool, is_online: bool) -> Result<()> {
        if !is_online {
            self.state.send_replace(SyncState::Offline);
            return Ok(());
        }
        if was_online {
            return Ok(());
        }

        tracing::info!("Connectivity restored; draining sync queue");
        let drained = self.drain_now().await;
        self.request_refresh();
        drained.map(|_| ())
    }

    /// Drain now if online. Returns `None` when offline or when another
    /// drainer holds the queue lock.
    pub async fn drain_now(&self) -> Result<Option<DrainReport>> {
        if !self.connectivity.is_online() {
            self.state.send_replace(SyncState::Offline);
            return Ok(None);
        }

        self.state.send_replace(SyncState::Syncing);
        let report = match self.queue.drain(&self.remote).await {
            Ok(report) => report,
            Err(Error::QueueLocked) => {
                tracing::info!("Sync queue is locked by another session; skipping drain");
                self.state.send_replace(SyncState::Pending);
                return Ok(None);
            }
            Err(error) => {
                self.state.send_replace(SyncState::Pending);
                return Err(error);
            }
        };

        if let Some(failure) = &report.failure {
            tracing::warn!(
                position = failure.position,
                remaining = report.remaining,
                "Sync queue drain halted: {}",
                failure.message
            );
        }
        self.state.send_replace(if report.is_complete() {
            SyncState::Synced
        } else {
            SyncState::Pending
        });
        if report.replayed > 0 {
            self.request_refresh();
        }
        Ok(Some(report))
    }

    /// Watch connectivity (and the timer) until `shutdown` completes
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        let mut connectivity = self.connectivity.subscribe();
        let mut last_online = *connectivity.borrow_and_update();
        let mut ticker = self.drain_interval.map(|period| {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        tokio::pin!(shutdown);

        if last_online {
            log_drain_failure(self.drain_now().await.map(|_| ()));
        }

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *connectivity.borrow_and_update();
                    log_drain_failure(self.on_connectivity_change(last_online, online).await);
                    last_online = online;
                }
                _ = async {
                    match ticker.as_mut() {
                        Some(ticker) => ticker.tick().await,
                        None => std::future::pending().await,
                    }
                }, if last_online => {
                    log_drain_failure(self.drain_now().await.map(|_| ()));
                }
            }
        }
        tracing::debug!("Sync coordinator stopped");
    }
}

fn log_drain_failure(result: Result<()>) {
    if let Err(error) = result {
        tracing::warn!("Sync queue drain failed: {error}");
    }
}

//! Background maintenance scheduler
//!
//! A single cooperative loop multiplexes fixed tasks on their own
//! intervals: metadata refresh, cache quota enforcement, stale-peer
//! cleanup, and predictive pre-download. A failing task logs and waits
//! for its next tick; it never takes the API down with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{info, warn};
use urpm_errors::Error;
use urpm_events::{Event, EventSender, EventSenderExt};

use crate::state::DaemonState;

/// The scheduler loop
pub struct Scheduler {
    pub state: Arc<DaemonState>,
    pub tx: EventSender,
}

fn make_interval(secs: u64) -> Interval {
    let mut ticker = interval(Duration::from_secs(secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Don't fire everything at startup
    ticker.reset();
    ticker
}

impl Scheduler {
    /// Run until the task is aborted.
    pub async fn run(self) {
        let daemon_config = &self.state.config.daemon;
        let mut refresh = make_interval(daemon_config.refresh_interval_secs);
        let mut eviction = make_interval(daemon_config.eviction_interval_secs);
        let mut peer_cleanup = make_interval(daemon_config.peer_cleanup_interval_secs);
        let predictive_enabled = daemon_config.predictive_interval_secs > 0;
        let mut predictive = make_interval(if predictive_enabled {
            daemon_config.predictive_interval_secs
        } else {
            // Never fires meaningfully; the branch checks the flag
            86_400
        });

        info!("scheduler running");
        loop {
            tokio::select! {
                _ = refresh.tick() => self.run_task("metadata-refresh").await,
                _ = eviction.tick() => self.run_task("cache-eviction").await,
                _ = peer_cleanup.tick() => self.run_task("peer-cleanup").await,
                _ = predictive.tick(), if predictive_enabled => {
                    self.run_task("predictive-download").await;
                }
            }
        }
    }

    /// Run one named task, converting failure into a log line and a
    /// retry at the next tick.
    pub async fn run_task(&self, name: &str) {
        self.tx.emit(Event::ScheduledTaskStarted {
            task: name.to_string(),
        });
        let result = self.dispatch(name).await;
        if let Err(e) = &result {
            warn!(task = name, error = %e, "scheduled task failed");
        }
        self.tx.emit(Event::ScheduledTaskFinished {
            task: name.to_string(),
            ok: result.is_ok(),
        });
    }

    async fn dispatch(&self, name: &str) -> Result<(), Error> {
        match name {
            "metadata-refresh" => {
                self.state.engine.media_sync().refresh_all().await?;
                Ok(())
            }
            "cache-eviction" => {
                let installed = urpm_rpm::query_installed(
                    self.state.config.general.root.as_deref(),
                )
                .await
                .unwrap_or_default()
                .into_iter()
                .map(|p| p.nevra.to_string())
                .collect::<Vec<_>>();
                self.state
                    .engine
                    .cache_evictor()
                    .enforce_quotas(&installed)
                    .await?;
                Ok(())
            }
            "peer-cleanup" => {
                let expired = self
                    .state
                    .catalog
                    .expire_peers(self.state.peer_stale_secs())
                    .await?;
                if expired > 0 {
                    info!(expired, "dropped stale peers");
                }
                Ok(())
            }
            "predictive-download" => self.predictive_download().await,
            _ => Err(Error::internal(format!("unknown scheduled task {name}"))),
        }
    }

    /// Pre-fetch pending upgrades of installed packages so the next
    /// `upgrade` run starts warm.
    async fn predictive_download(&self) -> Result<(), Error> {
        let installed =
            urpm_rpm::query_installed(self.state.config.general.root.as_deref())
                .await
                .unwrap_or_default();
        let media = self.state.catalog.list_media().await?;

        let mut wanted = Vec::new();
        for pkg in installed {
            let candidates = self
                .state
                .catalog
                .packages_by_name(&pkg.nevra.name)
                .await?;
            let Some(best) = candidates.first() else {
                continue;
            };
            if best.meta.nevra.evr() <= pkg.nevra.evr() {
                continue;
            }
            let Some(short_id) = media
                .iter()
                .find(|m| m.id == best.media_id)
                .map(|m| m.short_id.clone())
            else {
                continue;
            };
            wanted.push((
                urpm_resolver::TransactionItem {
                    nevra: best.meta.nevra.clone(),
                    media_id: Some(best.media_id),
                    digest: best.meta.digest.clone(),
                    file_size: best.meta.file_size,
                },
                short_id,
            ));
            if wanted.len() >= 32 {
                break; // cap one round; the next tick continues
            }
        }

        if !wanted.is_empty() {
            self.state.engine.acquirer().acquire_all(&wanted).await?;
        }
        Ok(())
    }
}

//! The crawl orchestrator: wires the HTTP session, store, engine, control
//! plane, and telemetry together the way the original crawler's `main`
//! sequences them (login, seed, hop loop, relationship resolution).

use std::path::PathBuf;
use std::time::Duration;

use fstree_control::ControlPlane;
use fstree_error::Result;
use fstree_http::{Session, SessionConfig};
use fstree_store::Store;
use fstree_telemetry::{CrawlEvent, TelemetryEmitter, now_iso};
use fstree_types::{FsId, ThrottleConfig};
use serde_json::json;
use tracing::{info, warn};

/// Everything the orchestrator needs for one crawl run.
pub struct RunConfig {
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub throttle: ThrottleConfig,
    pub individuals: Vec<FsId>,
    pub hop_count: u32,
    pub db_path: PathBuf,
    pub telemetry_path: Option<PathBuf>,
    pub install_os_signal_handlers: bool,
    /// Overrides the FamilySearch host; defaults to
    /// [`fstree_http::DEFAULT_BASE_URL`] when `None`. Only ever set by
    /// tests pointing the orchestrator at a mock server.
    pub base_url: Option<String>,
}

/// Summary returned after a run completes or is stopped early.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub iterations_completed: u32,
    pub stopped_early: Option<String>,
    pub total_requests: u64,
}

pub struct Orchestrator {
    session: Session,
    store: Store,
    throttle: ThrottleConfig,
    control: ControlPlane,
    telemetry: Option<TelemetryEmitter>,
    hop_count: u32,
}

impl Orchestrator {
    /// Logs in, opens (or migrates) the store, and records the redacted
    /// run configuration. Does not seed the frontier or crawl yet.
    pub async fn connect(config: RunConfig) -> Result<Self> {
        info!("logging in to FamilySearch");
        let session = Session::connect(SessionConfig {
            username: config.username.clone(),
            password: config.password,
            timeout: config.timeout,
            requests_per_second: config.throttle.requests_per_second,
            max_retries: config.throttle.max_retries,
            backoff_base_seconds: config.throttle.backoff_base_seconds,
            backoff_multiplier: config.throttle.backoff_multiplier,
            backoff_max_seconds: config.throttle.backoff_max_seconds,
            base_url: config.base_url.clone().unwrap_or_else(|| fstree_http::DEFAULT_BASE_URL.to_string()),
        })
        .await?;

        let store = Store::open(&config.db_path)?;
        store.record_run_configuration(&json!({
            "username": config.username,
            "password": "******",
            "hop_count": config.hop_count,
            "throttle": config.throttle.clone(),
            "db_path": config.db_path.display().to_string(),
        }))?;

        let control = ControlPlane::new();
        if config.install_os_signal_handlers {
            fstree_control::install_signal_handlers(control.clone())?;
        }

        let telemetry = config.telemetry_path.as_ref().map(TelemetryEmitter::to_path).transpose()?;

        let seeds = if config.individuals.is_empty() {
            match session.login_info().person_id.and_then(|id| FsId::new(id).ok()) {
                Some(id) => vec![id],
                None => {
                    warn!("no seed individuals given and no default person id available; frontier stays empty");
                    Vec::new()
                }
            }
        } else {
            config.individuals
        };
        if store.seed_frontier_if_empty(&seeds)? == 0 {
            info!("frontier/processing already populated; resuming existing crawl");
        }

        Ok(Self { session, store, throttle: config.throttle, control, telemetry, hop_count: config.hop_count })
    }

    pub fn control_plane(&self) -> ControlPlane {
        self.control.clone()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs up to `hop_count` BFS hops (starting from the store's
    /// checkpointed `starting_iteration`, so a fresh and a resumed run use
    /// the same code path), then one relationship-resolution pass, unless
    /// a stop is requested first.
    pub async fn run(&self) -> Result<RunSummary> {
        let status = self.store.get_checkpoint_status()?;
        let starting_iteration = u32::try_from(status.starting_iteration).unwrap_or(0);
        let start_counter = self.session.counter();

        let mut iterations_completed = 0u32;
        let mut stopped_early = None;

        for iteration in starting_iteration..starting_iteration.saturating_add(self.hop_count) {
            if self.control.should_stop() {
                stopped_early = self.control.stop_reason();
                break;
            }
            if self.store.frontier_count()? == 0 {
                info!(iteration, "frontier is empty, stopping hop loop early");
                break;
            }
            info!(iteration, frontier = self.store.frontier_count()?, "downloading hop");
            match fstree_engine::iterate(
                &self.session,
                &self.store,
                &self.throttle,
                &self.control,
                self.telemetry.as_ref(),
                iteration,
            )
            .await
            {
                Ok(()) => iterations_completed += 1,
                Err(err) if err.is_stop_requested() => {
                    stopped_early = Some(err.to_string());
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        if stopped_early.is_none() {
            match fstree_engine::resolve_relationships(
                &self.session,
                &self.store,
                &self.throttle,
                &self.control,
                self.telemetry.as_ref(),
                starting_iteration,
            )
            .await
            {
                Ok(()) => {}
                Err(err) if err.is_stop_requested() => stopped_early = Some(err.to_string()),
                Err(err) => return Err(err),
            }
        } else {
            warn!(reason = ?stopped_early, "skipping relationship resolution because a stop was requested");
        }

        if let Some(reason) = &stopped_early {
            if let Some(telemetry) = &self.telemetry {
                telemetry.emit(&CrawlEvent::Stop { ts: now_iso(), reason: reason.clone() })?;
            }
        }

        Ok(RunSummary {
            iterations_completed,
            stopped_early,
            total_requests: self.session.counter() - start_counter,
        })
    }

    /// Closes the store (optionally writing a `.sql` dump) and flushes
    /// telemetry. Consumes `self`.
    pub fn close(self, dump_sql: bool) -> Result<()> {
        if let Some(telemetry) = self.telemetry {
            telemetry.close()?;
        }
        self.store.close(dump_sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_config_builds_with_defaults() {
        let config = RunConfig {
            username: "user".into(),
            password: "pass".into(),
            timeout: Duration::from_secs(60),
            throttle: ThrottleConfig::default(),
            individuals: vec![FsId::new("ABCD-123").unwrap()],
            hop_count: 4,
            db_path: PathBuf::from(":memory:"),
            telemetry_path: None,
            install_os_signal_handlers: false,
            base_url: None,
        };
        assert_eq!(config.hop_count, 4);
    }
}

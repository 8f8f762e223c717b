//! Pipeline orchestrator
//!
//! Runs Connect → Extract → Transform → Load → Verify in strict sequence and
//! reports one [`RunOutcome`]. Only a failed connection, an empty input set or
//! a lost store connection during load end the run in [`PipelineState::Failed`].

use crate::config::Settings;
use crate::error::EtlError;
use crate::extract::{Extraction, Extractor};
use crate::load::{LoadReport, Loader};
use crate::store::{SqlStore, TargetStore};
use crate::transform::Transformer;
use crate::verify::{verify, VerificationReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Connected,
    Extracted,
    Transformed,
    Loaded,
    Verified,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Connected => "connected",
            PipelineState::Extracted => "extracted",
            PipelineState::Transformed => "transformed",
            PipelineState::Loaded => "loaded",
            PipelineState::Verified => "verified",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Reached `Done` but at least one table could not be verified
    Degraded,
    Failed,
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Failed => 1,
            RunStatus::Degraded => 2,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "SUCCESS"),
            RunStatus::Degraded => write!(f, "DEGRADED"),
            RunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub state: PipelineState,
    pub status: RunStatus,
    pub error: Option<String>,
    /// Tables whose source file was not found
    pub missing_sources: Vec<String>,
    pub load: Option<LoadReport>,
    pub verification: Option<VerificationReport>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl RunOutcome {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// Tracks state transitions and timing of one run
struct RunTracker {
    run_id: Uuid,
    state: PipelineState,
    started_at: DateTime<Utc>,
    clock: Instant,
    missing_sources: Vec<String>,
}

impl RunTracker {
    fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: PipelineState::Idle,
            started_at: Utc::now(),
            clock: Instant::now(),
            missing_sources: Vec::new(),
        }
    }

    fn advance(&mut self, next: PipelineState) {
        info!(from = %self.state, to = %next, "Pipeline state transition");
        self.state = next;
    }

    fn finish(
        mut self,
        status: RunStatus,
        error: Option<String>,
        load: Option<LoadReport>,
        verification: Option<VerificationReport>,
    ) -> RunOutcome {
        let next = if status == RunStatus::Failed {
            PipelineState::Failed
        } else {
            PipelineState::Done
        };
        self.advance(next);

        let elapsed = self.clock.elapsed();
        match &error {
            Some(e) => error!(elapsed_ms = elapsed.as_millis() as u64, error = %e, "ETL run failed"),
            None => info!(elapsed_ms = elapsed.as_millis() as u64, %status, "ETL run finished"),
        }

        RunOutcome {
            run_id: self.run_id,
            state: self.state,
            status,
            error,
            missing_sources: self.missing_sources,
            load,
            verification,
            started_at: self.started_at,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn fail(self, error: impl fmt::Display, load: Option<LoadReport>) -> RunOutcome {
        self.finish(RunStatus::Failed, Some(error.to_string()), load, None)
    }
}

/// The ETL orchestrator
pub struct Pipeline {
    settings: Settings,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Connect to the configured store and run every stage
    pub async fn run(&self) -> RunOutcome {
        let tracker = RunTracker::start();
        let span = info_span!("etl_run", run_id = %tracker.run_id);

        async move {
            info!(
                data_dir = %self.settings.data_dir.display(),
                database = %self.settings.database.redacted_url(),
                batch_size = self.settings.batch_size,
                max_retry_attempts = self.settings.max_retry_attempts,
                "Starting ETL run"
            );

            match SqlStore::connect(&self.settings.database).await {
                Ok(store) => {
                    let outcome = self.run_stages(&store, tracker).await;
                    store.close().await;
                    outcome
                },
                Err(e) => {
                    error!(error = %e, "Cannot connect to target store");
                    tracker.fail(EtlError::from(e), None)
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Run every stage against an already connected store
    pub async fn run_with_store<S>(&self, store: &S) -> RunOutcome
    where
        S: TargetStore + ?Sized,
    {
        let tracker = RunTracker::start();
        let span = info_span!("etl_run", run_id = %tracker.run_id);
        self.run_stages(store, tracker).instrument(span).await
    }

    async fn run_stages<S>(&self, store: &S, mut tracker: RunTracker) -> RunOutcome
    where
        S: TargetStore + ?Sized,
    {
        tracker.advance(PipelineState::Connected);
        let registry = &self.settings.registry;

        let extraction = match self.extract().await {
            Ok(extraction) => extraction,
            Err(e) => return tracker.fail(e, None),
        };
        tracker.missing_sources = extraction.missing.clone();
        tracker.advance(PipelineState::Extracted);

        let mut transformed = Transformer::new(self.settings.cleaning)
            .transform_all(registry, extraction.datasets)
            .await;
        transformed.failed.extend(extraction.failed);
        tracker.advance(PipelineState::Transformed);

        let loader = Loader::new(store, registry, self.settings.batch_size);
        let load = match loader.load(transformed).await {
            Ok(report) => report,
            Err(abort) => {
                let message = abort.to_string();
                return tracker.fail(message, Some(abort.report));
            },
        };
        tracker.advance(PipelineState::Loaded);

        let verification = verify(store, registry).await;
        tracker.advance(PipelineState::Verified);

        let status = if verification.is_complete() {
            RunStatus::Success
        } else {
            warn!("Verification incomplete, run is degraded");
            RunStatus::Degraded
        };
        tracker.finish(status, None, Some(load), Some(verification))
    }

    /// Read source files on a blocking worker
    async fn extract(&self) -> Result<Extraction, EtlError> {
        let settings = self.settings.clone();
        let extraction = tokio::task::spawn_blocking(move || Extractor::new(&settings).extract())
            .await
            .map_err(|e| EtlError::Io(std::io::Error::other(e)))?;

        if extraction.is_empty() {
            return Err(EtlError::NoSourceFiles {
                data_dir: self.settings.data_dir.clone(),
            });
        }

        info!(
            tables = extraction.datasets.len(),
            rows = extraction.total_rows(),
            missing = extraction.missing.len(),
            failed = extraction.failed.len(),
            "Extraction finished"
        );
        Ok(extraction)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
        assert_eq!(RunStatus::Degraded.exit_code(), 2);
    }

    #[test]
    fn test_terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
        assert!(!PipelineState::Verified.is_terminal());
    }

    #[tokio::test]
    async fn test_unsupported_url_fails_at_connect() {
        let mut settings = Settings::default();
        settings.database.url = "mysql://localhost/opinions".to_string();

        let outcome = Pipeline::new(settings).run().await;
        assert_eq!(outcome.state, PipelineState::Failed);
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.load.is_none());
        assert!(outcome.error.unwrap().contains("Unsupported"));
    }
}

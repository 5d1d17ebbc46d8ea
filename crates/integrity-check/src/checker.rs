//! Runs every check concurrently and merges their results
//!
//! Each check gets its own task. Notices and errors are merged into two
//! separately locked collections as the tasks finish, and the report is
//! only handed back once every task has joined. A failing (or panicking)
//! check never hides the notices of the others.

use crate::checks::fanout::lock;
use crate::checks::{Check, CheckOutcome};
use anyhow::{Context, anyhow};
use futures::FutureExt;
use integrity_common::{AggregateError, Notice};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span};

/// Merged result of one audit
#[derive(Debug, Default)]
pub struct AuditReport {
    pub notices: Vec<Notice>,
    pub error: Option<AggregateError>,
}

impl AuditReport {
    /// Every check reached a verdict (findings do not count as failure)
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Orchestrates a fixed set of checks
pub struct Checker {
    checks: Vec<Arc<dyn Check>>,
}

impl Checker {
    pub fn new(checks: Vec<Arc<dyn Check>>) -> Self {
        Self { checks }
    }

    /// Run all checks concurrently and wait for every one of them
    pub async fn run_all(&self) -> AuditReport {
        let notices: Arc<Mutex<Vec<Notice>>> = Arc::default();
        let errors: Arc<Mutex<AggregateError>> = Arc::default();
        let mut tasks = JoinSet::new();

        for check in &self.checks {
            let check = Arc::clone(check);
            let notices = Arc::clone(&notices);
            let errors = Arc::clone(&errors);
            let span = info_span!("check", check = %check.name());

            tasks.spawn(
                async move {
                    let name = check.name().to_string();
                    info!("Running check");

                    let outcome = AssertUnwindSafe(check.run())
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            let message = panic_message(&*panic);
                            CheckOutcome::failed(anyhow!("check panicked: {message}"))
                        });

                    debug!(
                        notices = outcome.notices.len(),
                        failed = outcome.error.is_some(),
                        "Check finished"
                    );

                    if let Some(e) = outcome.error {
                        lock(&errors).push(e.context(format!("running check {name:?}")));
                    }
                    lock(&notices).extend(outcome.notices);
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined.context("check task did not complete") {
                lock(&errors).push(e);
            }
        }

        let notices = std::mem::take(&mut *lock(&notices));
        let errors = std::mem::take(&mut *lock(&errors));
        AuditReport {
            notices,
            error: errors.into_option(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

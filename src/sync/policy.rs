// Best-effort wrapper for mirror calls

use std::future::Future;
use tracing::{info, warn};

use super::snapshot::Subject;
use crate::mirror::MirrorError;
use crate::observability::SyncMetrics;

/// A mirror failure or skip that did not stop the save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWarning {
    pub subject: Subject,
    pub operation: &'static str,
    pub message: String,
}

impl std::fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.subject, self.operation, self.message)
    }
}

/// Runs mirror calls so that their failures become warnings.
///
/// Only calls returning `MirrorError` are accepted; store and validation
/// errors keep propagating through `?` in the engine.
pub struct BestEffort<'a> {
    metrics: &'a SyncMetrics,
    warnings: Vec<SyncWarning>,
}

impl<'a> BestEffort<'a> {
    pub fn new(metrics: &'a SyncMetrics) -> Self {
        Self {
            metrics,
            warnings: Vec::new(),
        }
    }

    pub fn metrics(&self) -> &'a SyncMetrics {
        self.metrics
    }

    pub async fn call<T, F>(&mut self, subject: &Subject, operation: &'static str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, MirrorError>>,
    {
        self.metrics.record_mirror_call();
        match call.await {
            Ok(value) => {
                info!(subject = %subject, operation, "Mirror call succeeded");
                Some(value)
            }
            Err(e) => {
                self.metrics.record_mirror_failure(operation);
                warn!(
                    subject = %subject,
                    operation,
                    error = %e,
                    transient = e.is_transient(),
                    "Mirror call failed, local save kept"
                );
                self.warnings.push(SyncWarning {
                    subject: subject.clone(),
                    operation,
                    message: e.to_string(),
                });
                None
            }
        }
    }

    /// Record a call that was not attempted
    pub fn skip(&mut self, subject: &Subject, operation: &'static str, reason: impl Into<String>) {
        let message = reason.into();
        warn!(subject = %subject, operation, reason = %message, "Mirror call skipped");
        self.warnings.push(SyncWarning {
            subject: subject.clone(),
            operation,
            message,
        });
    }

    pub fn warnings(&self) -> &[SyncWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<SyncWarning> {
        self.warnings
    }
}

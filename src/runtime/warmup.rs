//! Warmup - one best-effort invocation per registered task at start
//!
//! Runs in the background and never blocks readiness. Results are
//! discarded; only the per-task outcome is kept for health reports.
//! Warmup bypasses the cache, the breakers and the monitor.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{invoke_registration, TaskRegistration, TaskRegistry, TaskRequest};

use super::context::ChatInput;

/// Synthetic text sent to every task body
pub const WARMUP_TEXT: &str = "hello";

/// Warmup outcome for one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WarmupStatus {
    Pending,
    Succeeded { duration_ms: u64 },
    Failed { reason: String },
}

impl WarmupStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Tracks warmup of every registered task
#[derive(Clone, Default)]
pub struct WarmupRunner {
    statuses: Arc<DashMap<Arc<str>, WarmupStatus>>,
}

impl WarmupRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every task pending and warm them concurrently in the background
    pub fn spawn(
        &self,
        registry: &TaskRegistry,
        default_timeout: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let registrations: Vec<Arc<TaskRegistration>> = registry.iter().cloned().collect();
        for registration in &registrations {
            self.statuses
                .insert(Arc::clone(&registration.name), WarmupStatus::Pending);
        }

        // Dependencies are fed their fallback output
        let fallbacks: FxHashMap<Arc<str>, Arc<Value>> = registrations
            .iter()
            .map(|r| {
                let output = r.fallback.as_ref().map_or(Value::Null, |f| f.output.clone());
                (Arc::clone(&r.name), Arc::new(output))
            })
            .collect();

        let statuses = Arc::clone(&self.statuses);
        tokio::spawn(async move {
            let started = Instant::now();
            let mut join_set = JoinSet::new();
            for registration in registrations {
                let request = synthetic_request(&registration, &fallbacks);
                let timeout = registration.timeout.unwrap_or(default_timeout);
                join_set.spawn(async move {
                    let start = Instant::now();
                    let outcome = invoke_registration(&registration, request, timeout).await;
                    let status = match outcome {
                        Ok(_) => WarmupStatus::Succeeded {
                            duration_ms: start.elapsed().as_millis() as u64,
                        },
                        Err(e) => WarmupStatus::Failed {
                            reason: e.to_string(),
                        },
                    };
                    (Arc::clone(&registration.name), status)
                });
            }

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("warmup interrupted by shutdown");
                        break;
                    }
                    joined = join_set.join_next() => {
                        let Some(joined) = joined else { break };
                        match joined {
                            Ok((task, status)) => {
                                if let WarmupStatus::Failed { reason } = &status {
                                    warn!(task = %task, "warmup failed: {}", reason);
                                }
                                statuses.insert(task, status);
                            }
                            Err(e) => warn!("warmup task aborted: {}", e),
                        }
                    }
                }
            }

            // Dropping the set aborts whatever is still running
            drop(join_set);

            let failed = statuses.iter().filter(|s| s.value().is_failed()).count();
            info!(
                tasks = statuses.len(),
                failed,
                duration_ms = started.elapsed().as_millis() as u64,
                "warmup finished"
            );
        })
    }

    pub fn status(&self, task: &str) -> Option<WarmupStatus> {
        self.statuses.get(task).map(|s| s.value().clone())
    }

    /// Every task's status, sorted by name
    pub fn statuses(&self) -> BTreeMap<String, WarmupStatus> {
        self.statuses
            .iter()
            .map(|e| (e.key().to_string(), e.value().clone()))
            .collect()
    }

    /// Started and nothing left pending
    pub fn is_complete(&self) -> bool {
        !self.statuses.is_empty()
            && self
                .statuses
                .iter()
                .all(|s| !matches!(s.value(), WarmupStatus::Pending))
    }

    pub fn failed_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.value().is_failed()).count()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

fn synthetic_request(
    registration: &TaskRegistration,
    fallbacks: &FxHashMap<Arc<str>, Arc<Value>>,
) -> TaskRequest {
    let deps = registration
        .requires
        .iter()
        .map(|dep| {
            let name: Arc<str> = Arc::from(dep.as_str());
            let value = fallbacks
                .get(&name)
                .cloned()
                .unwrap_or_else(|| Arc::new(Value::Null));
            (name, value)
        })
        .collect();

    TaskRequest {
        task: Arc::clone(&registration.name),
        session_id: Arc::from("warmup"),
        input: Arc::new(ChatInput::text(WARMUP_TEXT)),
        deps,
        params: Arc::clone(&registration.params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FallbackSpec;
    use crate::registry::{handler_fn, TaskOutput};
    use serde_json::json;

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry
            .register(
                TaskRegistration::new(
                    "emotion",
                    handler_fn(|req| async move {
                        assert_eq!(req.text(), WARMUP_TEXT);
                        Ok(TaskOutput::new(json!({"label": "neutral"})))
                    }),
                )
                .with_fallback(FallbackSpec::authoritative(json!({"label": "neutral"}))),
            )
            .register(
                TaskRegistration::new(
                    "style",
                    handler_fn(|req| async move {
                        let label = req
                            .dep("emotion")
                            .and_then(|e| e["label"].as_str())
                            .unwrap_or("missing")
                            .to_string();
                        Ok(TaskOutput::new(json!(label)))
                    }),
                )
                .requires(["emotion"]),
            )
            .register_fn("broken", Duration::from_secs(1), |_req| async {
                Err::<TaskOutput, _>(anyhow::anyhow!("model not loaded"))
            });
        registry
    }

    #[tokio::test]
    async fn records_success_and_failure() {
        let warmup = WarmupRunner::new();
        warmup
            .spawn(&registry(), Duration::from_secs(1), CancellationToken::new())
            .await
            .unwrap();

        assert!(warmup.is_complete());
        assert_eq!(warmup.len(), 3);
        assert_eq!(warmup.failed_count(), 1);
        assert!(matches!(
            warmup.status("emotion"),
            Some(WarmupStatus::Succeeded { .. })
        ));
        assert!(matches!(
            warmup.status("broken"),
            Some(WarmupStatus::Failed { reason }) if reason.contains("model not loaded")
        ));
    }

    #[tokio::test]
    async fn dependencies_receive_fallback_output() {
        let mut registry = TaskRegistry::new();
        registry
            .register(
                TaskRegistration::new(
                    "emotion",
                    handler_fn(|_req| async { Ok(TaskOutput::new(json!(null))) }),
                )
                .with_fallback(FallbackSpec::authoritative(json!({"label": "calm"}))),
            )
            .register(
                TaskRegistration::new(
                    "style",
                    handler_fn(|req| async move {
                        match req.dep("emotion") {
                            Some(v) if v["label"] == "calm" => Ok(TaskOutput::new(json!("ok"))),
                            _ => Err(anyhow::anyhow!("dependency not fed")),
                        }
                    }),
                )
                .requires(["emotion"]),
            );

        let warmup = WarmupRunner::new();
        warmup
            .spawn(&registry, Duration::from_secs(1), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(warmup.failed_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_leaves_slow_tasks_pending() {
        let mut registry = TaskRegistry::new();
        registry.register_fn("slow", Duration::from_secs(5), |_req| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(TaskOutput::new(json!("late")))
        });

        let warmup = WarmupRunner::new();
        let shutdown = CancellationToken::new();
        let handle = warmup.spawn(&registry, Duration::from_secs(5), shutdown.clone());
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(warmup.status("slow"), Some(WarmupStatus::Pending));
        assert!(!warmup.is_complete());
    }
}

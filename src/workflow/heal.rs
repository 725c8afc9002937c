//! Execution self-heal loop
//!
//! Drives the bounded retry cycle around the execution sandbox: run
//! the code, and on failure ask the repair generator for a revised
//! version, wait out the rate-limit spacing, and resubmit. The retry
//! cap is a hard invariant; the loop never runs unbounded.

use crate::collaborators::{ContentGenerator, ExecutionOutcome, ExecutionSandbox, GenerationKind};
use crate::workflow::store::{StoreError, WorkflowStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Output markers that flag a run as failed even when the sandbox
/// reports success; the sandbox only sees the process exit, not
/// tracebacks printed by the script itself
const ERROR_KEYWORDS: &[&str] = &[
    "Traceback",
    "Error:",
    "Exception:",
    "KeyError",
    "SyntaxError",
];

/// Tuning for the self-heal loop
#[derive(Debug, Clone)]
pub struct HealSettings {
    /// Maximum retries consumed before giving up
    pub max_attempts: u32,

    /// Minimum spacing between attempts (upstream quota)
    pub min_delay: Duration,

    /// Per-call timeout for sandbox and generator invocations
    pub call_timeout: Duration,
}

impl Default for HealSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(5),
            call_timeout: Duration::from_secs(180),
        }
    }
}

/// Successful run after zero or more repairs
#[derive(Debug, Clone)]
pub struct HealReport {
    /// Captured standard output of the winning run
    pub logs: String,

    /// Retries consumed to get there (0 on a first-try success)
    pub attempts: u32,
}

/// Errors from the self-heal loop
#[derive(Debug, Error)]
pub enum HealError {
    #[error("execution retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The bounded retry controller for the execution stage
pub struct HealLoop {
    sandbox: Arc<dyn ExecutionSandbox>,
    generator: Arc<dyn ContentGenerator>,
    store: Arc<WorkflowStore>,
    settings: HealSettings,
}

impl HealLoop {
    pub fn new(
        sandbox: Arc<dyn ExecutionSandbox>,
        generator: Arc<dyn ContentGenerator>,
        store: Arc<WorkflowStore>,
        settings: HealSettings,
    ) -> Self {
        Self {
            sandbox,
            generator,
            store,
            settings,
        }
    }

    /// Run `code` for workflow `id` until success or the cap
    ///
    /// Attempt accounting lives on the record so status polls see the
    /// retry budget drain in real time. The caller is responsible for
    /// resetting `execution_attempts` when the stage is entered afresh.
    pub async fn run(&self, id: &str, code: &str) -> Result<HealReport, HealError> {
        let mut code = code.to_string();
        let mut previous_attempt: Option<Instant> = None;

        loop {
            // Rate limit: at least `min_delay` between submissions
            if let Some(started) = previous_attempt {
                let elapsed = started.elapsed();
                if elapsed < self.settings.min_delay {
                    tokio::time::sleep(self.settings.min_delay - elapsed).await;
                }
            }
            previous_attempt = Some(Instant::now());

            let failure = match self
                .sandbox
                .execute(&code, self.settings.call_timeout)
                .await
            {
                Ok(outcome) => match failure_text(&outcome) {
                    None => {
                        let record = self.store.mutate(id, None, |r| {
                            r.execution_logs = Some(outcome.stdout.clone());
                            r.last_error = None;
                        })?;
                        tracing::info!(
                            workflow = id,
                            attempts = record.execution_attempts,
                            "execution succeeded"
                        );
                        return Ok(HealReport {
                            logs: outcome.stdout,
                            attempts: record.execution_attempts,
                        });
                    }
                    Some(text) => text,
                },
                // Transport failure: the sandbox never saw the code, so
                // there is nothing to parse from its output
                Err(e) if e.is_transport() => format!("sandbox unreachable: {}", e),
                Err(e) => e.to_string(),
            };

            let attempts = self.store.get(id)?.execution_attempts;
            if attempts >= self.settings.max_attempts {
                self.store.mutate(id, None, |r| {
                    r.last_error = Some(format!("execution retries exhausted: {}", failure));
                })?;
                return Err(HealError::RetriesExhausted {
                    attempts,
                    last_error: failure,
                });
            }

            self.store.mutate(id, None, |r| {
                r.execution_attempts += 1;
                r.last_error = Some(failure.clone());
            })?;
            tracing::warn!(
                workflow = id,
                attempt = attempts + 1,
                max = self.settings.max_attempts,
                "execution failed, requesting repair"
            );

            match self
                .generator
                .generate(
                    GenerationKind::CodeRepair,
                    &repair_context(&code, &failure),
                    self.settings.call_timeout,
                )
                .await
            {
                Ok(revised) => code = revised,
                Err(e) => {
                    // Repair failures draw from the same retry budget;
                    // resubmit the unrevised code next cycle
                    tracing::warn!(workflow = id, error = %e, "repair generation failed");
                }
            }
        }
    }
}

/// Decide whether an execution outcome counts as a failure, and with
/// what error text
fn failure_text(outcome: &ExecutionOutcome) -> Option<String> {
    if !outcome.success {
        if !outcome.stderr.trim().is_empty() {
            return Some(outcome.stderr.clone());
        }
        if !outcome.stdout.trim().is_empty() {
            return Some(outcome.stdout.clone());
        }
        return Some("execution failed without captured output".into());
    }

    if ERROR_KEYWORDS.iter().any(|kw| outcome.stdout.contains(kw)) {
        return Some(outcome.stdout.clone());
    }

    None
}

fn repair_context(code: &str, error: &str) -> String {
    format!(
        "The following code failed to execute.\n\n--- code ---\n{}\n\n--- error ---\n{}",
        code, error
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CollaboratorError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Sandbox that fails a fixed number of times before succeeding,
    /// recording every submission it sees
    struct MockSandbox {
        fail_times: u32,
        calls: AtomicU32,
        submissions: Mutex<Vec<String>>,
        transport_failure: bool,
    }

    impl MockSandbox {
        fn failing(fail_times: u32) -> Self {
            Self {
                fail_times,
                calls: AtomicU32::new(0),
                submissions: Mutex::new(Vec::new()),
                transport_failure: false,
            }
        }

        fn unreachable_times(fail_times: u32) -> Self {
            Self {
                transport_failure: true,
                ..Self::failing(fail_times)
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExecutionSandbox for MockSandbox {
        async fn execute(
            &self,
            code: &str,
            _timeout: Duration,
        ) -> Result<ExecutionOutcome, CollaboratorError> {
            let count = self.calls.fetch_add(1, Ordering::SeqCst);
            self.submissions.lock().unwrap().push(code.to_string());

            if count < self.fail_times {
                if self.transport_failure {
                    return Err(CollaboratorError::network("connection refused"));
                }
                return Ok(ExecutionOutcome {
                    success: false,
                    stdout: String::new(),
                    stderr: "Traceback: KeyError 'target'".into(),
                });
            }

            Ok(ExecutionOutcome {
                success: true,
                stdout: "model trained, accuracy 0.91".into(),
                stderr: String::new(),
            })
        }

        fn name(&self) -> &str {
            "mock-sandbox"
        }
    }

    /// Generator that returns numbered revisions
    struct MockRepairGenerator {
        calls: AtomicU32,
    }

    impl MockRepairGenerator {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentGenerator for MockRepairGenerator {
        async fn generate(
            &self,
            kind: GenerationKind,
            _context: &str,
            _timeout: Duration,
        ) -> Result<String, CollaboratorError> {
            assert_eq!(kind, GenerationKind::CodeRepair);
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("print('revision {}')", n))
        }

        fn name(&self) -> &str {
            "mock-generator"
        }
    }

    fn test_settings() -> HealSettings {
        HealSettings {
            max_attempts: 3,
            min_delay: Duration::from_millis(1),
            call_timeout: Duration::from_secs(5),
        }
    }

    fn heal_loop(sandbox: Arc<MockSandbox>, store: Arc<WorkflowStore>) -> HealLoop {
        HealLoop::new(
            sandbox,
            Arc::new(MockRepairGenerator::new()),
            store,
            test_settings(),
        )
    }

    #[tokio::test]
    async fn test_first_try_success() {
        let store = Arc::new(WorkflowStore::new());
        let record = store.create("goal", None);
        let sandbox = Arc::new(MockSandbox::failing(0));
        let heal = heal_loop(Arc::clone(&sandbox), Arc::clone(&store));

        let report = heal.run(&record.id, "print('hi')").await.unwrap();

        assert_eq!(report.attempts, 0);
        assert!(report.logs.contains("accuracy"));
        assert_eq!(sandbox.call_count(), 1);

        let record = store.get(&record.id).unwrap();
        assert_eq!(record.execution_attempts, 0);
        assert!(record.last_error.is_none());
        assert!(record.execution_logs.is_some());
    }

    #[tokio::test]
    async fn test_two_failures_then_success() {
        let store = Arc::new(WorkflowStore::new());
        let record = store.create("goal", None);
        let sandbox = Arc::new(MockSandbox::failing(2));
        let heal = heal_loop(Arc::clone(&sandbox), Arc::clone(&store));

        let report = heal.run(&record.id, "print('v0')").await.unwrap();

        // Count reflects retries consumed, not attempts remaining
        assert_eq!(report.attempts, 2);
        assert_eq!(sandbox.call_count(), 3);

        // The third submission carried the second revision
        let submissions = sandbox.submissions.lock().unwrap();
        assert_eq!(submissions[0], "print('v0')");
        assert_eq!(submissions[1], "print('revision 1')");
        assert_eq!(submissions[2], "print('revision 2')");
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let store = Arc::new(WorkflowStore::new());
        let record = store.create("goal", None);
        let sandbox = Arc::new(MockSandbox::failing(10));
        let heal = heal_loop(Arc::clone(&sandbox), Arc::clone(&store));

        let err = heal.run(&record.id, "print('broken')").await.unwrap_err();

        match err {
            HealError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {:?}", other),
        }

        // Cap of 3 retries means 4 submissions total, never more
        assert_eq!(sandbox.call_count(), 4);

        let record = store.get(&record.id).unwrap();
        assert_eq!(record.execution_attempts, 3);
        assert!(record.last_error.as_deref().unwrap().contains("exhausted"));
    }

    #[tokio::test]
    async fn test_transport_failure_synthesizes_error_text() {
        let store = Arc::new(WorkflowStore::new());
        let record = store.create("goal", None);
        let sandbox = Arc::new(MockSandbox::unreachable_times(1));
        let heal = heal_loop(Arc::clone(&sandbox), Arc::clone(&store));

        heal.run(&record.id, "print('hi')").await.unwrap();

        // The failed attempt was counted and carried the synthesized text
        let record = store.get(&record.id).unwrap();
        assert_eq!(record.execution_attempts, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_counts_toward_cap() {
        let store = Arc::new(WorkflowStore::new());
        let record = store.create("goal", None);
        let sandbox = Arc::new(MockSandbox::unreachable_times(10));
        let heal = heal_loop(Arc::clone(&sandbox), Arc::clone(&store));

        let err = heal.run(&record.id, "print('hi')").await.unwrap_err();
        match err {
            HealError::RetriesExhausted { last_error, .. } => {
                assert!(last_error.contains("sandbox unreachable"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_minimum_delay_between_attempts() {
        let store = Arc::new(WorkflowStore::new());
        let record = store.create("goal", None);
        let sandbox = Arc::new(MockSandbox::failing(2));
        let settings = HealSettings {
            min_delay: Duration::from_millis(50),
            ..test_settings()
        };
        let heal = HealLoop::new(
            Arc::clone(&sandbox) as Arc<dyn ExecutionSandbox>,
            Arc::new(MockRepairGenerator::new()),
            Arc::clone(&store),
            settings,
        );

        let start = std::time::Instant::now();
        heal.run(&record.id, "print('hi')").await.unwrap();

        // Three attempts means two enforced gaps
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_failure_text_classification() {
        // Success with clean output
        let ok = ExecutionOutcome {
            success: true,
            stdout: "done".into(),
            stderr: String::new(),
        };
        assert!(failure_text(&ok).is_none());

        // Failure prefers stderr
        let failed = ExecutionOutcome {
            success: false,
            stdout: "partial".into(),
            stderr: "boom".into(),
        };
        assert_eq!(failure_text(&failed).as_deref(), Some("boom"));

        // Failure with no output at all gets a placeholder
        let silent = ExecutionOutcome {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(failure_text(&silent).unwrap().contains("without captured"));

        // Keyword in stdout overrides the success flag
        let traceback = ExecutionOutcome {
            success: true,
            stdout: "Traceback (most recent call last): KeyError".into(),
            stderr: String::new(),
        };
        assert!(failure_text(&traceback).is_some());
    }
}

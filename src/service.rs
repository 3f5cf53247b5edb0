//! Service lifecycle
//!
//! Managers move through `Unprepared -> Prepared -> Started -> Stopped ->
//! Destroyed`, driven by a [`ServiceRuntime`]. Transitions are
//! one-directional; a failure while bringing services up triggers a cleanup
//! pass, and if the cleanup fails too, both failures are reported as one
//! combined error.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use tracing::info;

// ============================================================================
// Service State
// ============================================================================

/// Lifecycle states of a managed service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Initial state, no resources held
    Unprepared,
    /// Resources allocated, background work not yet running
    Prepared,
    /// Background work running
    Started,
    /// Background work stopped, resources still held
    Stopped,
    /// Terminal state, all resources released
    Destroyed,
}

// ============================================================================
// Validation
// ============================================================================

/// One manager's validation outcome; an empty error list means success
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    /// Which manager reported the failure
    pub service: String,
    /// Human-readable validation errors
    pub errors: Vec<String>,
}

// ============================================================================
// Service Manager Trait
// ============================================================================

/// Lifecycle contract implemented by the extractor and loader managers
#[async_trait]
pub trait ServiceManager: Send {
    /// Name used in logs and validation reports
    fn name(&self) -> &str;

    /// Allocates resources; called once before `start`
    async fn prepare(&mut self) -> Result<()>;

    /// Begins background work; called once after a successful `prepare`
    async fn start(&mut self) -> Result<()>;

    /// Stops background work, waiting for in-flight handling to finish
    async fn stop(&mut self) -> Result<()>;

    /// Releases remaining resources after `stop`
    async fn destroy(&mut self) -> Result<()> {
        Ok(())
    }

    /// Checks configuration; only meaningful between `prepare` and `start`
    fn validate(&self) -> Vec<ValidationFailure> {
        Vec::new()
    }
}

// ============================================================================
// Safe Runners
// ============================================================================

/// Run a task and, if it fails, run a cleanup task; the returned error
/// preserves both failures when the cleanup fails as well
pub async fn run_and_cleanup_on_error<T, TaskFut, CleanupFn, CleanupFut>(
    message: &str,
    task: TaskFut,
    cleanup: CleanupFn,
) -> Result<T>
where
    TaskFut: Future<Output = Result<T>>,
    CleanupFn: FnOnce() -> CleanupFut,
    CleanupFut: Future<Output = Result<()>>,
{
    match task.await {
        Ok(value) => Ok(value),
        Err(task_error) => {
            let mut details = vec![task_error.to_string()];
            if let Err(cleanup_error) = cleanup().await {
                details.push(cleanup_error.to_string());
            }
            Err(Error::suppressed(message, details))
        }
    }
}

// ============================================================================
// Service Runtime
// ============================================================================

/// Drives a set of managers through the lifecycle state machine
pub struct ServiceRuntime {
    managers: Vec<Box<dyn ServiceManager>>,
    state: ServiceState,
}

impl Default for ServiceRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRuntime {
    /// Create an empty runtime
    pub fn new() -> Self {
        Self {
            managers: Vec::new(),
            state: ServiceState::Unprepared,
        }
    }

    /// Register a manager; must happen before `initialize`
    pub fn add_manager(&mut self, manager: Box<dyn ServiceManager>) {
        self.managers.push(manager);
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Prepare, validate and start all managers
    ///
    /// On any failure the already-brought-up managers are shut down again;
    /// if that cleanup fails too, the returned error lists both failures.
    pub async fn initialize(&mut self) -> Result<()> {
        if let Err(error) = self.bring_up().await {
            let mut details = vec![error.to_string()];
            if let Err(cleanup_error) = self.shutdown().await {
                details.push(cleanup_error.to_string());
            }
            return Err(Error::suppressed("failed to initialize services", details));
        }
        Ok(())
    }

    async fn bring_up(&mut self) -> Result<()> {
        info!("preparing the service managers");
        for manager in &mut self.managers {
            manager.prepare().await?;
        }
        self.state = ServiceState::Prepared;

        info!("validating the service managers");
        let mut failures = Vec::new();
        for manager in &self.managers {
            for failure in manager.validate() {
                for error in failure.errors {
                    failures.push(format!("{}: {error}", failure.service));
                }
            }
        }
        if !failures.is_empty() {
            return Err(Error::Validation { failures });
        }

        info!("starting the service managers");
        for manager in &mut self.managers {
            manager.start().await?;
        }
        self.state = ServiceState::Started;
        Ok(())
    }

    /// Stop and destroy all managers, collecting every failure along the way
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == ServiceState::Destroyed {
            return Ok(());
        }

        let mut details = Vec::new();

        info!("stopping the service managers");
        for manager in &mut self.managers {
            if let Err(error) = manager.stop().await {
                details.push(format!("{}: {error}", manager.name()));
            }
        }
        self.state = ServiceState::Stopped;

        info!("destroying the service managers");
        for manager in &mut self.managers {
            if let Err(error) = manager.destroy().await {
                details.push(format!("{}: {error}", manager.name()));
            }
        }
        self.state = ServiceState::Destroyed;

        if details.is_empty() {
            Ok(())
        } else {
            Err(Error::suppressed("failed to shut down services", details))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubManager {
        name: String,
        fail_start: bool,
        fail_stop: bool,
        prepared: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
        destroyed: Arc<AtomicUsize>,
    }

    impl StubManager {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail_start: false,
                fail_stop: false,
                prepared: Arc::new(AtomicUsize::new(0)),
                stopped: Arc::new(AtomicUsize::new(0)),
                destroyed: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ServiceManager for StubManager {
        fn name(&self) -> &str {
            &self.name
        }

        async fn prepare(&mut self) -> Result<()> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn start(&mut self) -> Result<()> {
            if self.fail_start {
                return Err(Error::config("start exploded"));
            }
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                return Err(Error::config("stop exploded"));
            }
            Ok(())
        }

        async fn destroy(&mut self) -> Result<()> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runtime_full_lifecycle() {
        let manager = StubManager::new("stub");
        let prepared = Arc::clone(&manager.prepared);
        let stopped = Arc::clone(&manager.stopped);
        let destroyed = Arc::clone(&manager.destroyed);

        let mut runtime = ServiceRuntime::new();
        runtime.add_manager(Box::new(manager));
        assert_eq!(runtime.state(), ServiceState::Unprepared);

        runtime.initialize().await.unwrap();
        assert_eq!(runtime.state(), ServiceState::Started);
        assert_eq!(prepared.load(Ordering::SeqCst), 1);

        runtime.shutdown().await.unwrap();
        assert_eq!(runtime.state(), ServiceState::Destroyed);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        // Second shutdown is a no-op
        runtime.shutdown().await.unwrap();
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_failure_triggers_cleanup() {
        let mut manager = StubManager::new("stub");
        manager.fail_start = true;
        let stopped = Arc::clone(&manager.stopped);

        let mut runtime = ServiceRuntime::new();
        runtime.add_manager(Box::new(manager));

        let err = runtime.initialize().await.unwrap_err();
        assert!(err.to_string().contains("start exploded"));
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_and_cleanup_failures_are_combined() {
        let mut manager = StubManager::new("stub");
        manager.fail_start = true;
        manager.fail_stop = true;

        let mut runtime = ServiceRuntime::new();
        runtime.add_manager(Box::new(manager));

        let message = runtime.initialize().await.unwrap_err().to_string();
        assert!(message.contains("start exploded"));
        assert!(message.contains("stop exploded"));
    }

    #[tokio::test]
    async fn test_run_and_cleanup_on_error_passes_through_success() {
        let value = run_and_cleanup_on_error("never used", async { Ok(7) }, || async {
            panic!("cleanup must not run on success")
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_and_cleanup_on_error_combines_failures() {
        let result: Result<()> = run_and_cleanup_on_error(
            "failed to start worker",
            async { Err(Error::config("task failed")) },
            || async { Err(Error::config("cleanup failed")) },
        )
        .await;

        let message = result.unwrap_err().to_string();
        assert!(message.contains("failed to start worker"));
        assert!(message.contains("task failed"));
        assert!(message.contains("cleanup failed"));
    }
}

use std::sync::Arc;

use netprobe_common::InvocationOutcome;
use tracing::{debug, error, warn};

use super::{Invocation, Runner, SystemRunner};

/// Guarantees that system state a probe changed gets put back.
///
/// Release invocations are registered right after the change is applied and
/// run in registration order when [`StateScope::release`] is awaited. A scope
/// dropped while still armed (error path, cancelled future) schedules the
/// same releases on the current runtime instead.
pub struct StateScope {
    label: String,
    runner: Arc<dyn Runner>,
    releases: Vec<Invocation>,
    armed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseReport {
    pub commands: Vec<String>,
    pub outcomes: Vec<InvocationOutcome>,
}

impl ReleaseReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(InvocationOutcome::is_success)
    }

    pub fn errors(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .map(InvocationOutcome::describe)
            .collect()
    }
}

impl StateScope {
    pub fn acquire(label: impl Into<String>, runner: Arc<dyn Runner>) -> Self {
        Self {
            label: label.into(),
            runner,
            releases: Vec::new(),
            armed: true,
        }
    }

    /// A scope whose releases spawn real processes.
    pub fn system(label: impl Into<String>) -> Self {
        Self::acquire(label, Arc::new(SystemRunner))
    }

    pub fn on_release(&mut self, invocation: Invocation) {
        self.releases.push(invocation);
    }

    /// Runs the releases in order. Each stays registered until it has run, so
    /// a release cancelled part way hands the rest to [`Drop`].
    pub async fn release(mut self) -> ReleaseReport {
        debug!(scope = %self.label, count = self.releases.len(), "releasing state");
        let mut report = ReleaseReport {
            commands: Vec::with_capacity(self.releases.len()),
            outcomes: Vec::with_capacity(self.releases.len()),
        };

        while let Some(invocation) = self.releases.first().cloned() {
            report.commands.push(invocation.command_line());
            report.outcomes.push(self.runner.run(invocation).await);
            self.releases.remove(0);
        }

        self.armed = false;
        report
    }
}

async fn run_releases(runner: &dyn Runner, releases: Vec<Invocation>) -> ReleaseReport {
    let mut report = ReleaseReport {
        commands: Vec::with_capacity(releases.len()),
        outcomes: Vec::with_capacity(releases.len()),
    };

    for invocation in releases {
        report.commands.push(invocation.command_line());
        report.outcomes.push(runner.run(invocation).await);
    }

    report
}

impl Drop for StateScope {
    fn drop(&mut self) {
        if !self.armed || self.releases.is_empty() {
            return;
        }

        let releases: Vec<Invocation> = std::mem::take(&mut self.releases);
        let label: String = std::mem::take(&mut self.label);
        let runner: Arc<dyn Runner> = self.runner.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(scope = %label, "scope dropped without release, scheduling cleanup");
                handle.spawn(async move {
                    let report = run_releases(runner.as_ref(), releases).await;
                    if !report.all_succeeded() {
                        error!(scope = %label, errors = ?report.errors(), "deferred cleanup failed");
                    }
                });
            }
            Err(_) => {
                error!(scope = %label, "no runtime available, state was not restored");
            }
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Hangs the first time `slow` runs; every call succeeds otherwise.
    #[derive(Default)]
    struct StallOnce {
        stalled: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Runner for StallOnce {
        async fn run(&self, invocation: Invocation) -> InvocationOutcome {
            self.calls.lock().unwrap().push(invocation.command_line());
            if invocation.program() == "slow" && !self.stalled.swap(true, Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            InvocationOutcome::Success {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            }
        }
    }

    fn marker(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("netprobe-scope-{}-{name}", std::process::id()))
    }

    fn touch(path: &PathBuf) -> Invocation {
        Invocation::new("touch").arg(path.display().to_string())
    }

    #[tokio::test]
    async fn release_runs_in_order() {
        let mut scope = StateScope::system("test");
        scope.on_release(Invocation::new("true"));
        scope.on_release(Invocation::new("sh").args(["-c", "exit 4"]));

        let report = scope.release().await;
        assert_eq!(report.commands, vec!["true", "sh -c exit 4"]);
        assert!(report.outcomes[0].is_success());
        assert!(!report.all_succeeded());
        assert_eq!(report.errors().len(), 1);
    }

    #[tokio::test]
    async fn dropped_scope_still_releases() {
        let path = marker("drop");
        let _ = std::fs::remove_file(&path);

        {
            let mut scope = StateScope::system("dropped");
            scope.on_release(touch(&path));
        }

        for _ in 0..50 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn released_scope_does_not_run_twice() {
        let path = marker("once");
        let _ = std::fs::remove_file(&path);

        let mut scope = StateScope::system("once");
        scope.on_release(touch(&path));
        scope.release().await;
        assert!(path.exists());

        std::fs::remove_file(&path).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn cancelled_release_hands_the_rest_to_drop() {
        let runner = Arc::new(StallOnce::default());
        let mut scope = StateScope::acquire("cancelled", runner.clone());
        scope.on_release(Invocation::new("first"));
        scope.on_release(Invocation::new("slow"));
        scope.on_release(Invocation::new("last"));

        let cut = tokio::time::timeout(Duration::from_millis(100), scope.release()).await;
        assert!(cut.is_err());

        for _ in 0..50 {
            if runner.calls.lock().unwrap().len() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(*runner.calls.lock().unwrap(), vec!["first", "slow", "slow", "last"]);
    }
}

//! Concurrent runner for a service's long-running processes.
//!
//! Processes run until one fails or a shutdown signal arrives; the runner
//! then cancels the rest, runs the registered closers under a timeout, and
//! reports how the service should exit. Exiting the process is the caller's
//! decision, which keeps the runner itself testable.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A named long-running process: takes a cancellation token, runs until
/// cancelled or failed.
pub type Process = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

/// Cleanup executed after every process has stopped.
pub type Closer = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

/// How the service should exit after the runner winds down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerExit {
    /// All processes stopped cleanly (signal or natural completion).
    Clean,
    /// At least one process returned an error or panicked.
    Faulted,
}

impl RunnerExit {
    pub fn code(&self) -> i32 {
        match self {
            RunnerExit::Clean => 0,
            RunnerExit::Faulted => 1,
        }
    }
}

pub struct Runner {
    processes: Vec<(String, Process)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Add a named process. If any process returns an error, all others are
    /// cancelled.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Add a closer, executed after all processes stop regardless of outcome.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned cancellation token, e.g. for tests or nested
    /// lifecycles.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run every process until completion, failure, or shutdown signal, then
    /// execute the closers and report the exit disposition.
    pub async fn run(self) -> RunnerExit {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut faulted = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "process completed");
                }
                Ok((name, Err(e))) => {
                    error!(process = %name, error = %format!("{:#}", e), "process failed");
                    faulted = true;
                    token.cancel();
                }
                Err(e) => {
                    error!(error = %e, "process panicked");
                    faulted = true;
                    token.cancel();
                }
            }
        }

        if !self.closers.is_empty() {
            info!(timeout = ?self.closer_timeout, "running closers");
            let closed = tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await;
            if closed.is_err() {
                error!(timeout = ?self.closer_timeout, "closers timed out");
            }
        }

        if faulted {
            RunnerExit::Faulted
        } else {
            info!("all processes stopped cleanly");
            RunnerExit::Clean
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(e) => error!(error = %e, "failed to install signal handler"),
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("received SIGTERM");
                    token.cancel();
                }
                Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
            }
        });
    }
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("closer completed"),
            Ok(Err(e)) => error!(error = %format!("{:#}", e), "closer failed"),
            Err(e) => error!(error = %e, "closer panicked"),
        }
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graceful shutdown coordination.
//!
//! One root [`CancellationToken`] propagates to every worker: bus pollers
//! exit their loops, timers are cancelled, transports are closed. The
//! coordinator turns OS signals (SIGINT/SIGTERM, plus SIGQUIT on Unix) into
//! that cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Bridges OS signals to a root cancellation token.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    root: CancellationToken,
    initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator with a fresh root token.
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The root token; clone it into every worker.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Cancels the root token. Idempotent.
    pub fn initiate_shutdown(&self) {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Shutdown initiated");
            self.root.cancel();
        }
    }

    /// Returns `true` once shutdown has begun.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Blocks until an OS termination signal arrives (or shutdown was
    /// already initiated), then cancels the root token.
    pub async fn wait_for_shutdown(&self) {
        if self.is_shutdown_initiated() {
            return;
        }

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
            let mut sigquit =
                signal(SignalKind::quit()).expect("failed to register SIGQUIT handler");

            tokio::select! {
                _ = self.root.cancelled() => {}
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = sigquit.recv() => info!("Received SIGQUIT"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = self.root.cancelled() => {}
                result = tokio::signal::ctrl_c() => {
                    result.expect("failed to register Ctrl+C handler");
                    info!("Received Ctrl+C");
                }
            }
        }

        self.initiate_shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initiate_cancels_token() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();

        assert!(!coordinator.is_shutdown_initiated());
        assert!(!token.is_cancelled());

        coordinator.initiate_shutdown();
        coordinator.initiate_shutdown(); // idempotent

        assert!(coordinator.is_shutdown_initiated());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_returns_after_manual_initiation() {
        let coordinator = ShutdownCoordinator::new();

        let waiter = coordinator.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_shutdown().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.initiate_shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait_for_shutdown should return")
            .unwrap();
    }

    #[tokio::test]
    async fn test_child_tokens_observe_cancellation() {
        let coordinator = ShutdownCoordinator::new();
        let child = coordinator.token().child_token();

        coordinator.initiate_shutdown();
        assert!(child.is_cancelled());
    }
}

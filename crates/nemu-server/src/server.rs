//! Listener plus a fixed pool of request workers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use nemu_core::SafeRoot;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::Config;
use crate::errpage::ErrorPages;
use crate::router;
use crate::router::AppState;

/// A bound server that has not started serving yet.
pub struct NemuServer {
    http: Arc<tiny_http::Server>,
    state: Arc<AppState>,
    workers: usize,
}

impl NemuServer {
    /// Binds the listener and prepares the shared state.
    pub fn bind(config: &Config) -> Result<Self> {
        let root = SafeRoot::new(&config.server.dir)?;
        root.ensure_exists()
            .with_context(|| format!("cannot create {}", root.as_path().display()))?;

        let addr = config.server.bind_addr();
        let http = tiny_http::Server::http(&addr).map_err(|e| anyhow!("failed to bind {addr}: {e}"))?;

        let state = AppState {
            root,
            token_digest: config.server.token.trim().to_string(),
            options: config.upload,
            pages: ErrorPages::new(),
        };
        Ok(Self {
            http: Arc::new(http),
            state: Arc::new(state),
            workers: config.server.workers.max(1),
        })
    }

    /// Address actually bound, useful when the configured port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http.server_addr().to_ip()
    }

    /// Starts the workers and returns immediately.
    pub fn spawn(self) -> Result<ServerHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let http = Arc::clone(&self.http);
            let state = Arc::clone(&self.state);
            let shutdown = Arc::clone(&shutdown);
            let worker = thread::Builder::new()
                .name(format!("nemu-worker-{id}"))
                .spawn(move || worker_loop(&http, &state, &shutdown))
                .context("failed to spawn worker thread")?;
            workers.push(worker);
        }

        info!(
            addr = ?self.local_addr(),
            root = %self.state.root.as_path().display(),
            workers = self.workers,
            "server is running"
        );
        Ok(ServerHandle {
            http: self.http,
            shutdown,
            workers,
        })
    }

    /// Serves until the workers exit.
    pub fn run(self) -> Result<()> {
        self.spawn()?.join();
        Ok(())
    }
}

/// Running server.
pub struct ServerHandle {
    http: Arc<tiny_http::Server>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the server listens on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http.server_addr().to_ip()
    }

    /// Stops accepting requests, lets in-flight ones finish and joins the
    /// workers.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for _ in 0..self.workers.len() {
            self.http.unblock();
        }
        self.join();
        info!("server stopped");
    }

    fn join(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

fn worker_loop(http: &tiny_http::Server, state: &AppState, shutdown: &AtomicBool) {
    loop {
        match http.recv() {
            Ok(request) => router::handle(request, state),
            Err(e) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                warn!(error = %e, "failed to accept request");
            }
        }
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
    }
    debug!("worker exiting");
}

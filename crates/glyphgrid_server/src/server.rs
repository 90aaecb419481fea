//! The top-level accept loop: binds a TCP listener and spawns one connection task per
//! accepted socket, all sharing the one process-wide [`PersistentPool`] and
//! [`Registry`] (spec.md §9: "a single process-wide resource ... no second
//! instance").

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::TcpListener;

use glyphgrid_log::info;
use glyphgrid_store::PersistentPool;

use crate::connection::accept_connection;
use crate::registry::Registry;

pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Binds a listener on `0.0.0.0:port`.
    pub async fn bind(port: u16) -> anyhow::Result<Self> {
        let addr = format!("0.0.0.0:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding to {addr}"))?;
        info!("listening on {addr}");
        Ok(Self { listener })
    }

    /// The address actually bound, e.g. after binding to port 0 for a test.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, spawning one task per connection against the
    /// shared `pool`. Also spawns `pool`'s background flush loop.
    pub async fn serve(self, pool: Arc<PersistentPool>) -> anyhow::Result<()> {
        let registry = Arc::new(Registry::new());
        tokio::spawn(PersistentPool::run_flush_loop(pool.clone()));

        loop {
            let (stream, _peer) = self.listener.accept().await?;
            tokio::spawn(accept_connection(pool.clone(), registry.clone(), stream));
        }
    }
}

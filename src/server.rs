//! TCP accept loop.
//!
//! Owns the listener and the shared state, and spawns one task per accepted
//! connection. Everything interesting happens in
//! [`connection`](crate::connection).

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::StorageEngine;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// A bound server, ready to accept connections.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
    max_frame_size: usize,
}

impl Server {
    /// Binds the listener and creates an empty store as configured.
    pub async fn bind(config: &Config) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        let storage = Arc::new(StorageEngine::with_shards(config.shards));
        info!(shards = storage.shard_count(), "Storage engine initialized");

        Ok(Self::new(
            listener,
            storage,
            Arc::new(ConnectionStats::new()),
            config.max_frame_bytes,
        ))
    }

    pub fn new(
        listener: TcpListener,
        storage: Arc<StorageEngine>,
        stats: Arc<ConnectionStats>,
        max_frame_size: usize,
    ) -> Self {
        Self {
            listener,
            storage,
            stats,
            max_frame_size,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// Connections already running keep their tasks; only the listener stops.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = self.local_addr() {
            info!(address = %addr, "Listening");
        }

        tokio::select! {
            _ = self.accept_loop() => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
    }

    async fn accept_loop(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let handler = CommandHandler::new(Arc::clone(&self.storage));
                    let stats = Arc::clone(&self.stats);
                    tokio::spawn(handle_connection(
                        stream,
                        addr,
                        handler,
                        stats,
                        self.max_frame_size,
                    ));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    async fn start_server() -> (
        SocketAddr,
        Arc<StorageEngine>,
        Arc<ConnectionStats>,
        oneshot::Sender<()>,
        JoinHandle<()>,
    ) {
        let config = Config {
            port: 0,
            shards: 4,
            ..Config::default()
        };
        let server = Server::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let storage = Arc::clone(server.storage());
        let stats = Arc::clone(server.stats());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = shutdown_rx.await;
        }));

        (addr, storage, stats, shutdown_tx, task)
    }

    async fn request(client: &mut TcpStream, req: &[u8], expected_len: usize) -> Vec<u8> {
        client.write_all(req).await.unwrap();
        let mut buf = vec![0u8; expected_len];
        client.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_ping_over_tcp() {
        let (addr, _, _, _shutdown, _) = start_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let reply = request(&mut client, b"*1\r\n$4\r\nPING\r\n", 7).await;
        assert_eq!(reply, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_concurrent_clients_share_store() {
        let (addr, storage, _, _shutdown, _) = start_server().await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            tasks.push(tokio::spawn(async move {
                let mut client = TcpStream::connect(addr).await.unwrap();
                let key = format!("key{}", i);
                let set = format!("*3\r\n$3\r\nSET\r\n$4\r\n{}\r\n$1\r\n{}\r\n", key, i);
                assert_eq!(request(&mut client, set.as_bytes(), 5).await, b"+OK\r\n");

                let get = format!("*2\r\n$3\r\nGET\r\n$4\r\n{}\r\n", key);
                let expected = format!("$1\r\n{}\r\n", i);
                assert_eq!(
                    request(&mut client, get.as_bytes(), expected.len()).await,
                    expected.as_bytes()
                );
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(storage.len(), 8);

        let mut client = TcpStream::connect(addr).await.unwrap();
        let reply = request(&mut client, b"*2\r\n$3\r\nGET\r\n$4\r\nkey3\r\n", 7).await;
        assert_eq!(reply, b"$1\r\n3\r\n");
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats, _shutdown, _) = start_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        request(&mut client, b"*1\r\n$4\r\nPING\r\n", 7).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);

        drop(client);
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accept_loop() {
        let (addr, _, _, shutdown, task) = start_server().await;

        shutdown.send(()).unwrap();
        task.await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }
}

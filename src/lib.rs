//! # EmberKV - An In-Memory Key-Value Server
//!
//! EmberKV speaks RESP, the Redis wire protocol, so `redis-cli` and the usual
//! client libraries can talk to it. It keeps everything in memory and supports
//! a deliberately small command set with per-key expiry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              EmberKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────────┐ │
//! │                     │ RespReader  │    │        StorageEngine         │ │
//! │                     │ RespWriter  │    │  ┌────────┐ ┌────────┐       │ │
//! │                     └─────────────┘    │  │Shard 0 │ │Shard N │ ...   │ │
//! │                                        │  │RwLock  │ │RwLock  │       │ │
//! │                                        │  └────────┘ └────────┘       │ │
//! │                                        └──────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use emberkv::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind(&Config::default()).await?;
//!     server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO message`
//! - `SET key value [EX seconds | PX milliseconds]`
//! - `GET key`
//! - `TTL key`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP parser, value type, and stream codec
//! - [`storage`]: Thread-safe storage engine with lazy expiry
//! - [`commands`]: Command extraction and dispatch
//! - [`connection`]: Per-client request/response loop
//! - [`server`]: TCP accept loop
//! - [`config`]: Command-line configuration
//!
//! ## Expiry
//!
//! Keys with a TTL are expired lazily: an expired key reads as absent at once
//! and is removed the next time `GET` or `TTL` touches it. There is no
//! background sweep, so an expired key that is never read again stays in
//! memory.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::{Command, CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionHandler, ConnectionStats};
pub use protocol::{ProtocolError, RespParser, RespReader, RespValue, RespWriter};
pub use server::Server;
pub use storage::{StorageEngine, Ttl};

/// The default port EmberKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host EmberKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

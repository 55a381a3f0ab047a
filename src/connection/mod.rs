//! Connection Handler Module
//!
//! Each client connection is handled by its own async task. The task owns the
//! stream, decodes frames, runs commands, and writes replies in order until
//! the client goes away or sends something undecodable.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ RespReader  │───>│  Command    │───>│ Execute cmd │     │
//! │  │  decode()   │    │ from_frame  │    └──────┬──────┘     │
//! │  └─────────────┘    └─────────────┘           │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ RespWriter  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use emberkv::connection::{handle_connection, ConnectionStats};
//! use emberkv::commands::CommandHandler;
//! use emberkv::protocol::DEFAULT_MAX_FRAME_SIZE;
//! use emberkv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! let handler = CommandHandler::new(Arc::clone(&storage));
//! tokio::spawn(handle_connection(stream, addr, handler, stats, DEFAULT_MAX_FRAME_SIZE));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};

//! Command Handler
//!
//! Dispatches a [`Command`] to its handler by upper-cased name and runs it
//! against the shared [`StorageEngine`].
//!
//! ## Supported Commands
//!
//! - `PING` - Replies `PONG`; extra arguments are ignored
//! - `ECHO message` - Replies with `message`
//! - `SET key value [EX seconds | PX milliseconds]...` - Set a key
//! - `GET key` - Get a key's value
//! - `TTL key` - Remaining time to live in seconds (-1 no expiry, -2 missing)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  execute()  │───>│  dispatch() │───>│  cmd_*()    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      StorageEngine          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::command::{Command, CommandError};
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

type CommandResult = Result<RespValue, CommandError>;

/// Executes commands against a shared storage engine.
///
/// Cheap to clone; every connection gets its own handle.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a command and returns the reply.
    ///
    /// Never fails: validation problems come back as an error reply.
    pub fn execute(&self, command: Command) -> RespValue {
        match self.dispatch(&command) {
            Ok(reply) => reply,
            Err(err) => {
                debug!(command = ?command.name(), error = %err, "Command rejected");
                err.into()
            }
        }
    }

    fn dispatch(&self, command: &Command) -> CommandResult {
        let name = command.name().ok_or(CommandError::EmptyCommand)?;
        let args = command.args();

        match name.as_str() {
            "PING" => Ok(self.cmd_ping(args)),
            "ECHO" => self.cmd_echo(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "TTL" => self.cmd_ttl(args),
            _ => Err(CommandError::UnknownCommand(name)),
        }
    }

    /// PING
    fn cmd_ping(&self, _args: &[Bytes]) -> RespValue {
        RespValue::pong()
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> CommandResult {
        match args {
            [message] => Ok(RespValue::bulk_string(message.clone())),
            _ => Err(CommandError::WrongArity("echo")),
        }
    }

    /// SET key value [EX seconds | PX milliseconds]...
    ///
    /// Options are read in pairs; when several are given the last one wins.
    fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        let (key, value, options) = match args {
            [key, value, options @ ..] => (key, value, options),
            _ => return Err(CommandError::WrongArity("set")),
        };

        let mut ttl: Option<Duration> = None;
        for pair in options.chunks(2) {
            let [option, amount] = pair else {
                return Err(CommandError::Syntax);
            };

            ttl = Some(if option.eq_ignore_ascii_case(b"EX") {
                Duration::from_secs(parse_positive(amount)?)
            } else if option.eq_ignore_ascii_case(b"PX") {
                Duration::from_millis(parse_positive(amount)?)
            } else {
                return Err(CommandError::Syntax);
            });
        }

        let expires_at = match ttl {
            Some(ttl) => Some(
                Instant::now()
                    .checked_add(ttl)
                    .ok_or(CommandError::NotAnInteger)?,
            ),
            None => None,
        };

        self.storage.set(key.clone(), value.clone(), expires_at);
        Ok(RespValue::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::WrongArity("get"));
        };

        Ok(match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[Bytes]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::WrongArity("ttl"));
        };

        Ok(RespValue::integer(self.storage.ttl(key).as_seconds()))
    }
}

/// Parses a strictly positive decimal integer argument.
fn parse_positive(arg: &[u8]) -> Result<u64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|&n| n > 0)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or(CommandError::NotAnInteger)
}

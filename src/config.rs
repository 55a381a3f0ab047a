//! Server configuration, parsed from the command line.

use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::storage::DEFAULT_SHARDS;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;

/// Smallest accepted `--max-frame-bytes`; room for any ordinary command
const MIN_FRAME_BYTES: usize = 1024;

/// EmberKV server options.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "emberkv")]
#[command(about = "In-memory key-value server speaking the Redis protocol")]
#[command(version)]
pub struct Config {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of storage shards, each with its own lock (1 = single global lock)
    #[arg(long, default_value_t = DEFAULT_SHARDS, value_parser = parse_shards)]
    pub shards: usize,

    /// Largest frame a client may send, in bytes (at least 1024)
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE, value_parser = parse_max_frame_bytes)]
    pub max_frame_bytes: usize,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            shards: DEFAULT_SHARDS,
            max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Returns the bind address as `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_shards(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_max_frame_bytes(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n < MIN_FRAME_BYTES => Err(format!("must be at least {}", MIN_FRAME_BYTES)),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["emberkv"]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bind_address(), "127.0.0.1:6379");
    }

    #[test]
    fn test_overrides() {
        let config = Config::try_parse_from([
            "emberkv",
            "-H",
            "0.0.0.0",
            "--port",
            "6380",
            "--shards",
            "1",
            "--max-frame-bytes",
            "4096",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:6380");
        assert_eq!(config.shards, 1);
        assert_eq!(config.max_frame_bytes, 4096);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::try_parse_from(["emberkv", "--shards", "0"]).is_err());
        assert!(Config::try_parse_from(["emberkv", "--port", "70000"]).is_err());
        assert!(Config::try_parse_from(["emberkv", "--bogus"]).is_err());
    }

    #[test]
    fn test_max_frame_bytes_floor() {
        assert!(Config::try_parse_from(["emberkv", "--max-frame-bytes", "0"]).is_err());
        assert!(Config::try_parse_from(["emberkv", "--max-frame-bytes", "1023"]).is_err());

        let config = Config::try_parse_from(["emberkv", "--max-frame-bytes", "1024"]).unwrap();
        assert_eq!(config.max_frame_bytes, MIN_FRAME_BYTES);
    }
}

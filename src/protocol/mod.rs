//! RESP Protocol Implementation
//!
//! Frame codec for the Redis Serialization Protocol (RESP).
//!
//! ## Modules
//!
//! - `types`: The `RespValue` enum and its wire serialization
//! - `parser`: Incremental parser over a byte buffer
//! - `codec`: `RespReader` / `RespWriter` over async byte streams
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let response = RespValue::bulk_string(Bytes::from("cafe"));
//! assert_eq!(response.serialize(), b"$4\r\ncafe\r\n");
//! ```

pub mod codec;
pub mod parser;
pub mod types;

pub use codec::{RespReader, RespWriter, DEFAULT_MAX_FRAME_SIZE};
pub use parser::{parse_message, FrameScanner, ProtocolError, ProtocolResult, RespParser};
pub use types::RespValue;

//! Parsed commands and command-tier errors.

use crate::protocol::RespValue;
use bytes::Bytes;
use thiserror::Error;

/// Command-tier failures.
///
/// The `Display` text is exactly what goes back to the client as an error
/// reply; the connection stays open afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    EmptyCommand,

    /// Carries the upper-cased command name
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Carries the lower-case command name
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("syntax error")]
    Syntax,

    /// Top-level frame was not an array
    #[error("expected array")]
    ExpectedArray,

    /// Array element was neither a bulk nor a simple string
    #[error("invalid argument type")]
    InvalidArgumentType,
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(err.to_string())
    }
}

/// A command name followed by its arguments, all binary-safe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    parts: Vec<Bytes>,
}

impl Command {
    pub fn new(parts: Vec<Bytes>) -> Self {
        Self { parts }
    }

    /// Extracts a command from a decoded frame.
    ///
    /// The frame must be an array whose elements are bulk strings or simple
    /// strings. A null bulk string element counts as an empty argument.
    pub fn from_frame(frame: RespValue) -> Result<Self, CommandError> {
        let elements = match frame {
            RespValue::Array(elements) => elements,
            _ => return Err(CommandError::ExpectedArray),
        };

        let parts = elements
            .into_iter()
            .map(|element| match element {
                RespValue::BulkString(data) | RespValue::SimpleString(data) => Ok(data),
                RespValue::Null => Ok(Bytes::new()),
                _ => Err(CommandError::InvalidArgumentType),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { parts })
    }

    /// The upper-cased command name, or `None` for an empty command.
    pub fn name(&self) -> Option<String> {
        self.parts
            .first()
            .map(|name| String::from_utf8_lossy(name).to_uppercase())
    }

    /// Arguments after the command name.
    pub fn args(&self) -> &[Bytes] {
        self.parts.get(1..).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }
}

impl<T: Into<Bytes>> FromIterator<T> for Command {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_frame() {
        let frame = RespValue::array(vec![
            RespValue::bulk_string(Bytes::from("set")),
            RespValue::simple_string("key"),
            RespValue::Null,
        ]);
        let command = Command::from_frame(frame).unwrap();

        assert_eq!(command.name().as_deref(), Some("SET"));
        assert_eq!(command.args(), &[Bytes::from("key"), Bytes::new()]);
        assert_eq!(command.len(), 3);
    }

    #[test]
    fn test_from_frame_keeps_simple_string_bytes() {
        let frame = RespValue::array(vec![
            RespValue::simple_string("ECHO"),
            RespValue::simple_string(Bytes::from_static(b"\xff\x00")),
        ]);
        let command = Command::from_frame(frame).unwrap();
        assert_eq!(command.args(), &[Bytes::from_static(b"\xff\x00")]);
    }

    #[test]
    fn test_from_frame_rejects_non_array() {
        assert_eq!(
            Command::from_frame(RespValue::simple_string("PING")),
            Err(CommandError::ExpectedArray)
        );
        assert_eq!(
            Command::from_frame(RespValue::Null),
            Err(CommandError::ExpectedArray)
        );
    }

    #[test]
    fn test_from_frame_rejects_bad_elements() {
        for bad in [
            RespValue::integer(1),
            RespValue::error("x"),
            RespValue::array(vec![]),
        ] {
            let frame = RespValue::array(vec![RespValue::bulk_string(Bytes::from("ECHO")), bad]);
            assert_eq!(
                Command::from_frame(frame),
                Err(CommandError::InvalidArgumentType)
            );
        }
    }

    #[test]
    fn test_empty_command() {
        let command = Command::from_frame(RespValue::array(vec![])).unwrap();
        assert!(command.is_empty());
        assert_eq!(command.name(), None);
        assert!(command.args().is_empty());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RespValue::from(CommandError::UnknownCommand("FOO".into())).serialize(),
            b"-unknown command 'FOO'\r\n"
        );
        assert_eq!(
            CommandError::WrongArity("echo").to_string(),
            "wrong number of arguments for 'echo' command"
        );
    }
}

//! Builder for constructing command payloads
//!
//! Generic helper for assembling a Redis command and encoding it into the
//! wire-ready RESP2 payload that gets handed to the transport.
//!
//! # Creating a payload
//! The following example builds the payload for [HGET](https://redis.io/commands/hget/).
//! ```
//! use clustered_redis::commands::builder::CommandBuilder;
//!
//! let payload = CommandBuilder::new("HGET")
//!     .arg_static("myhash")
//!     .arg_static("field1")
//!     .to_payload()
//!     .unwrap();
//!
//! assert_eq!(b"*3\r\n$4\r\nHGET\r\n$6\r\nmyhash\r\n$6\r\nfield1\r\n", payload.as_ref());
//! ```
//! # Improved performance
//! For best performance, especially with large amounts of data, it is recommended to use [Bytes](<https://docs.rs/bytes/latest/bytes/>).
//! ```
//!# use bytes::Bytes;
//! use clustered_redis::commands::builder::CommandBuilder;
//!#
//! // Using Bytes avoids data copy, as clone() is shallow
//! let value = Bytes::from_static("Large value".as_bytes());
//!
//! let _payload = CommandBuilder::new("SET")
//!     .arg_static("key1")
//!     .arg(&value)
//!     .to_payload()
//!     .unwrap();
//! ```
use crate::commands::CommandError;
use bytes::{Bytes, BytesMut};
use redis_protocol::resp2::encode::encode_bytes;
use redis_protocol::resp2::types::Frame as Resp2Frame;

/// Builder for constructing RESP2 command payloads
#[derive(Clone, Default)]
pub struct CommandBuilder {
    pub(crate) elements: Vec<Bytes>,
}

impl CommandBuilder {
    pub fn new(keyword: &'static str) -> Self {
        CommandBuilder {
            elements: vec![Bytes::from_static(keyword.as_bytes())],
        }
    }

    /// Adds a static argument
    pub fn arg_static(mut self, arg: &'static str) -> Self {
        self.elements.push(Bytes::from_static(arg.as_bytes()));
        self
    }

    /// Adds cased string of uint
    pub fn arg_uint(mut self, arg: usize) -> Self {
        self.elements.push(Bytes::from(arg.to_string()));
        self
    }

    /// Adds a byte argument
    /// Note: Besides static, the most efficient way caused by the nature how Bytes cloning is working
    pub fn arg(mut self, arg: &Bytes) -> Self {
        self.elements.push(arg.clone());
        self
    }

    /// Just adding byte if option is Some
    pub fn arg_option(mut self, arg: Option<&Bytes>) -> Self {
        if let Some(inner) = arg {
            self.elements.push(inner.clone());
        }
        self
    }

    /// Encodes the accumulated arguments into the wire-ready payload
    pub fn to_payload(self) -> Result<Bytes, CommandError> {
        if self.elements.is_empty() {
            return Err(CommandError::InvalidParam);
        }

        let frame: Resp2Frame = self.into();
        let mut buffer = BytesMut::new();
        if encode_bytes(&mut buffer, &frame).is_err() {
            return Err(CommandError::EncodingFailed);
        }

        Ok(buffer.freeze())
    }
}

impl From<CommandBuilder> for Resp2Frame {
    fn from(builder: CommandBuilder) -> Self {
        let mut frames = Vec::with_capacity(builder.elements.len());
        for byte in builder.elements {
            frames.push(Resp2Frame::BulkString(byte));
        }

        Resp2Frame::Array(frames)
    }
}

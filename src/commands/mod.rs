pub mod builder;
#[cfg(test)]
pub(crate) mod tests;

use crate::cluster::Cluster;
use crate::commands::builder::CommandBuilder;
use crate::network::Transport;
use bytes::Bytes;
use core::fmt::{Debug, Formatter};
use redis_protocol::resp2::types::Frame as Resp2Frame;

/// Default retry budget of a command: the maximum number of network attempts
/// across redirections and reconnects before the command is failed
pub const DEFAULT_TTL: u32 = 16;

/// Pre-encoded `CLUSTER SLOTS` request used by the slot refresh protocol
pub(crate) const CLUSTER_SLOTS_PAYLOAD: Bytes =
    Bytes::from_static(b"*2\r\n$7\r\nCLUSTER\r\n$5\r\nSLOTS\r\n");

/// Pre-encoded `ASKING` probe sent ahead of a redirected command
pub(crate) const ASKING_PAYLOAD: Bytes = Bytes::from_static(b"*1\r\n$6\r\nASKING\r\n");

/// Terminal command outcomes, surfaced through the response callback
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Internal invariant violated; the command was dropped with its callback still armed
    Unknown,
    /// Low level transport failure while the command was on the wire
    Tcp,
    /// Redis error response. Inner value is the error frame received.
    ErrorResponse(Resp2Frame),
    /// Retry budget exhausted across redirections and reconnects
    /// *The cluster topology is likely flapping in this case.*
    TtlExceeded,
    /// No usable connection to the resolved node
    ConnectionFailed,
    /// Slot table was torn down while the command was still queued
    SlotUnavailable,
    /// Failed encoding the command payload
    EncodingFailed,
    /// Empty command or otherwise unusable parameters
    InvalidParam,
    /// Overtaken in the reply pipeline or abandoned on the delay queue
    Timeout,
}

/// Response callback of a command.
///
/// Invoked exactly once with either the reply frame or a terminal error. On a
/// live delivery the cluster is passed back as `Some`, so the callback may
/// issue follow-up commands or tear the cluster down; captured state replaces
/// the private-data pointer of classic C clients. When a command is destroyed
/// with its callback still armed, the callback fires with `None` and
/// [`CommandError::Unknown`] instead of being lost.
pub type ResponseCallback<T> =
    Box<dyn FnOnce(Option<&mut Cluster<T>>, Result<Resp2Frame, CommandError>)>;

/// One formatted command travelling through the cluster.
///
/// A command is owned by exactly one place at a time: the caller (before
/// submission), the slot-pending queue, a connection's pre-connect queue, a
/// connection's in-flight queue, the delay queue, or an in-flight ASKING
/// probe. Transfer between owners is a move.
pub struct Command<T: Transport> {
    payload: Bytes,
    callback: Option<ResponseCallback<T>>,

    /// Remaining network attempts
    ttl: u32,

    /// Slot resolved from the key on first dispatch, kept across retries
    slot: Option<u16>,
}

impl<T: Transport> Command<T> {
    /// Wraps a caller-provided pre-formatted payload
    pub fn from_payload<F>(payload: Bytes, callback: F) -> Self
    where
        F: FnOnce(Option<&mut Cluster<T>>, Result<Resp2Frame, CommandError>) + 'static,
    {
        Command {
            payload,
            callback: Some(Box::new(callback)),
            ttl: DEFAULT_TTL,
            slot: None,
        }
    }

    /// Encodes the given builder into a new command
    pub fn from_builder<F>(builder: CommandBuilder, callback: F) -> Result<Self, CommandError>
    where
        F: FnOnce(Option<&mut Cluster<T>>, Result<Resp2Frame, CommandError>) + 'static,
    {
        Ok(Self::from_payload(builder.to_payload()?, callback))
    }

    /// Encodes an argument vector (command word first) into a new command
    pub fn from_args<F>(args: &[&[u8]], callback: F) -> Result<Self, CommandError>
    where
        F: FnOnce(Option<&mut Cluster<T>>, Result<Resp2Frame, CommandError>) + 'static,
    {
        if args.is_empty() {
            return Err(CommandError::InvalidParam);
        }

        let builder = CommandBuilder {
            elements: args.iter().map(|arg| Bytes::copy_from_slice(arg)).collect(),
        };
        Self::from_builder(builder, callback)
    }

    /// The wire-ready payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Remaining retry budget
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn slot(&self) -> Option<u16> {
        self.slot
    }

    pub(crate) fn set_slot(&mut self, slot: u16) {
        self.slot = Some(slot);
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.ttl == 0
    }

    /// One network attempt is about to happen
    pub(crate) fn consume_attempt(&mut self) {
        self.ttl = self.ttl.saturating_sub(1);
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.callback.is_some()
    }

    #[cfg(test)]
    pub(crate) fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl;
    }

    /// Delivers the outcome to the callback. The callback slot is cleared
    /// first, so re-entrant destruction of this command cannot fire it again.
    pub(crate) fn invoke(
        &mut self,
        cluster: &mut Cluster<T>,
        result: Result<Resp2Frame, CommandError>,
    ) {
        if let Some(callback) = self.callback.take() {
            callback(Some(cluster), result);
        }
    }
}

impl<T: Transport> Drop for Command<T> {
    /// A command destroyed with its callback still armed synthesizes an
    /// `Unknown` delivery, so no caller observes silent loss. The cluster is
    /// gone at this point, hence the `None` handle.
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            log::debug!("command dropped with its callback still armed");
            callback(None, Err(CommandError::Unknown));
        }
    }
}

impl<T: Transport> Debug for Command<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Command")
            .field("payload", &self.payload)
            .field("ttl", &self.ttl)
            .field("slot", &self.slot)
            .field("armed", &self.callback.is_some())
            .finish()
    }
}

use crate::commands::{Command, ASKING_PAYLOAD, CLUSTER_SLOTS_PAYLOAD};
use crate::network::host::HostKey;
use crate::network::transport::{ReplyToken, Transport, TransportError};
use bytes::Bytes;
use core::fmt::{Debug, Formatter};
use std::collections::VecDeque;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// One entry travelling the pipelined wire of a connection.
///
/// Slot refreshes and ASKING probes share the reply pipeline with user
/// commands, so the in-flight queue carries a discriminator instead of a bare
/// command. The ASKING variant owns the redirected command until the probe is
/// answered.
pub(crate) enum InFlight<T: Transport> {
    User(Command<T>),
    SlotRefresh,
    Asking(Command<T>),
}

impl<T: Transport> InFlight<T> {
    pub(crate) fn payload(&self) -> Bytes {
        match self {
            InFlight::User(cmd) => cmd.payload().clone(),
            InFlight::SlotRefresh => CLUSTER_SLOTS_PAYLOAD,
            InFlight::Asking(_) => ASKING_PAYLOAD,
        }
    }
}

/// Outcome of handing an entry to a connection
pub(crate) enum Submit<T: Transport> {
    /// On the wire, reply pending
    Sent,
    /// Parked in the pre-connect queue
    Queued,
    /// The connection is not usable; the entry is handed back for re-routing
    NotConnected(InFlight<T>),
    /// The transport refused the payload
    Rejected(InFlight<T>, TransportError),
}

/// Single logical link to one master node.
///
/// Owns the pre-connect queue and the in-flight FIFO. The underlying wire is
/// strictly pipelined, so the in-flight order equals the order in which the
/// transport will deliver replies; a reply arriving for a later entry times
/// out every earlier one.
///
/// The connection never invokes callbacks itself: state transitions hand the
/// affected entries back to the cluster, which owns delivery. This keeps all
/// container borrows released before any user code runs.
pub struct Connection<T: Transport> {
    key: HostKey,
    handle: Option<T::Handle>,
    status: ConnectionStatus,
    pending: VecDeque<InFlight<T>>,
    in_flight: VecDeque<(ReplyToken, InFlight<T>)>,
}

impl<T: Transport> Connection<T> {
    pub(crate) fn new(key: HostKey) -> Self {
        Connection {
            key,
            handle: None,
            status: ConnectionStatus::Disconnected,
            pending: VecDeque::new(),
            in_flight: VecDeque::new(),
        }
    }

    pub fn key(&self) -> &HostKey {
        &self.key
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Stores the transport handle and arms the pre-connect queue.
    /// Legal only from the disconnected state.
    pub(crate) fn set_connecting(&mut self, handle: T::Handle) -> bool {
        if self.status != ConnectionStatus::Disconnected {
            return false;
        }

        self.handle = Some(handle);
        self.status = ConnectionStatus::Connecting;
        true
    }

    /// Completes the connect handshake.
    ///
    /// Returns the drained pre-connect queue; the cluster re-routes those
    /// entries instead of sending them directly, so routing is re-evaluated
    /// against a possibly changed slot table. Returns None when the
    /// connection was not in the connecting state.
    pub(crate) fn set_connected(&mut self) -> Option<VecDeque<InFlight<T>>> {
        if self.status != ConnectionStatus::Connecting || self.handle.is_none() {
            return None;
        }

        self.status = ConnectionStatus::Connected;
        Some(core::mem::take(&mut self.pending))
    }

    /// Unconditional transition into the disconnected state.
    ///
    /// Optionally closes the transport handle and returns
    /// `(in_flight, pending)`: the in-flight entries are to be failed with a
    /// connection error, the pending entries are either failed or re-routed
    /// at the caller's discretion.
    pub(crate) fn set_disconnected(
        &mut self,
        transport: &mut T,
        close_transport: bool,
    ) -> (VecDeque<InFlight<T>>, VecDeque<InFlight<T>>) {
        self.status = ConnectionStatus::Disconnected;

        if let Some(handle) = self.handle.take() {
            if close_transport {
                transport.disconnect(handle);
            }
        }

        let in_flight = self.in_flight.drain(..).map(|(_, entry)| entry).collect();
        (in_flight, core::mem::take(&mut self.pending))
    }

    /// Dispatches one entry according to the connection state
    pub(crate) fn submit(
        &mut self,
        transport: &mut T,
        token: ReplyToken,
        entry: InFlight<T>,
    ) -> Submit<T> {
        match self.status {
            ConnectionStatus::Connecting => {
                self.pending.push_back(entry);
                Submit::Queued
            }
            ConnectionStatus::Disconnected => Submit::NotConnected(entry),
            ConnectionStatus::Connected => {
                let handle = match self.handle.as_mut() {
                    Some(handle) => handle,
                    None => return Submit::NotConnected(entry),
                };

                let payload = entry.payload();
                match transport.send_formatted(handle, &payload, token) {
                    Ok(()) => {
                        self.in_flight.push_back((token, entry));
                        Submit::Sent
                    }
                    Err(error) => Submit::Rejected(entry, error),
                }
            }
        }
    }

    /// Locates the reply target in the in-flight FIFO.
    ///
    /// Every entry in front of the target was skipped by the pipelined wire
    /// and is returned as expired (to be failed as timed out, in FIFO order).
    /// An unknown token yields `(empty, None)`: the entry was already resolved
    /// elsewhere, e.g. by a disconnect.
    pub(crate) fn take_reply(
        &mut self,
        token: ReplyToken,
    ) -> (Vec<InFlight<T>>, Option<InFlight<T>>) {
        if !self.in_flight.iter().any(|(entry_token, _)| *entry_token == token) {
            return (Vec::new(), None);
        }

        let mut expired = Vec::new();
        while let Some((entry_token, entry)) = self.in_flight.pop_front() {
            if entry_token == token {
                return (expired, Some(entry));
            }

            expired.push(entry);
        }

        (expired, None)
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

impl<T: Transport> Debug for Connection<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("status", &self.status)
            .field("pending", &self.pending.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

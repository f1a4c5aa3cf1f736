use bytes::Bytes;

/// Correlation token attached to every submitted payload.
///
/// The transport must echo the token in the matching reply event so the
/// per-connection reply demultiplexer can locate the command in its in-flight
/// queue. Tokens are issued by the cluster and are unique per cluster instance.
pub type ReplyToken = u64;

/// Error surface of the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Low level I/O failure (transient, the affected command is retried)
    Io,
    /// Peer closed the connection (transient, the affected command is retried)
    Eof,
    /// Any other failure reported by the transport, with its message
    Other(String),
}

impl TransportError {
    /// Transient errors are recovered by re-dispatching the command instead of
    /// surfacing the failure to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Io | TransportError::Eof)
    }
}

/// Contract of the I/O layer driving a cluster.
///
/// The cluster core never performs I/O itself: it asks the transport to open
/// links and to put pre-formatted RESP payloads on the wire, and the event
/// loop that owns the transport feeds completions back through
/// [`Cluster::on_transport_connected`](crate::cluster::Cluster::on_transport_connected),
/// [`Cluster::on_transport_reply`](crate::cluster::Cluster::on_transport_reply) and
/// [`Cluster::on_transport_disconnected`](crate::cluster::Cluster::on_transport_disconnected).
///
/// Requirements on an implementation:
/// * `connect` is non-blocking; completion arrives as a connected event for
///   the `ip:port` name of the peer.
/// * `send_formatted` either rejects immediately or guarantees exactly one
///   reply event carrying `token`, in submission order per handle.
/// * `disconnect` triggers exactly one disconnected event.
pub trait Transport {
    /// Transport-side identity of one link, stored inside the connection
    type Handle;

    /// Opens a link to the given peer without blocking
    fn connect(&mut self, ip: &str, port: u16) -> Result<Self::Handle, TransportError>;

    /// Hands one wire-ready payload to the transport
    fn send_formatted(
        &mut self,
        handle: &mut Self::Handle,
        payload: &Bytes,
        token: ReplyToken,
    ) -> Result<(), TransportError>;

    /// Closes the link
    fn disconnect(&mut self, handle: Self::Handle);
}

#[cfg(any(test, feature = "mock"))]
pub use mocked::{MockTransportStack, SocketMock};

#[cfg(any(test, feature = "mock"))]
mod mocked {
    use super::{ReplyToken, Transport, TransportError};
    use bytes::Bytes;
    use mockall::mock;

    /// Handle type used by the mocked transport
    #[derive(Debug)]
    pub struct SocketMock {
        pub id: i32,
    }

    impl SocketMock {
        pub fn new(id: i32) -> Self {
            SocketMock { id }
        }
    }

    mock! {
        #[derive(Debug)]
        pub TransportStack {}

        impl Transport for TransportStack {
            type Handle = SocketMock;

            fn connect(&mut self, ip: &str, port: u16) -> Result<SocketMock, TransportError>;

            fn send_formatted(
                &mut self,
                handle: &mut SocketMock,
                payload: &Bytes,
                token: ReplyToken,
            ) -> Result<(), TransportError>;

            fn disconnect(&mut self, handle: SocketMock);
        }
    }
}

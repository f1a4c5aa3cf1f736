pub use connection::{Connection, ConnectionStatus};
pub use host::HostKey;
pub use transport::{ReplyToken, Transport, TransportError};

#[cfg(any(test, feature = "mock"))]
pub use transport::{MockTransportStack, SocketMock};

pub(crate) mod connection;
pub(crate) mod host;
pub(crate) mod transport;

#[cfg(test)]
pub(crate) mod tests;

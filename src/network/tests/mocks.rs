use crate::cluster::Cluster;
use crate::network::{HostKey, MockTransportStack, SocketMock, TransportError};
use bytes::Bytes;
use redis_protocol::resp2;
use redis_protocol::resp2::types::Frame as Resp2Frame;

pub const CLUSTER_SLOTS_WIRE: &str = "*2\r\n$7\r\nCLUSTER\r\n$5\r\nSLOTS\r\n";
pub const ASKING_WIRE: &str = "*1\r\n$6\r\nASKING\r\n";

/// Helper for constructing transport layer mocks
pub struct TransportMockBuilder {
    stack: MockTransportStack,
}

impl TransportMockBuilder {
    /// Expects a connect to the given peer, handing out a socket with the given ID
    pub fn connect(mut self, ip: &'static str, port: u16, socket_id: i32) -> Self {
        self.stack.expect_connect().times(1).returning(move |actual_ip, actual_port| {
            assert_eq!(ip, actual_ip);
            assert_eq!(port, actual_port);
            Ok(SocketMock::new(socket_id))
        });
        self
    }

    /// Simulates a refused connect
    pub fn connect_error(mut self) -> Self {
        self.stack
            .expect_connect()
            .times(1)
            .returning(move |_, _| Err(TransportError::Other("connection refused".to_string())));
        self
    }

    /// Expects the given payload on the given socket
    pub fn send(mut self, socket_id: i32, data: &'static str) -> Self {
        self.stack
            .expect_send_formatted()
            .times(1)
            .returning(move |socket, payload, _| {
                assert_eq!(socket_id, socket.id);
                if !data.is_empty() {
                    assert_eq!(data.as_bytes(), payload.as_ref());
                }
                Ok(())
            });
        self
    }

    /// Expects the given payload on any socket
    pub fn send_any_socket(mut self, data: &'static str) -> Self {
        self.stack.expect_send_formatted().times(1).returning(move |_, payload, _| {
            if !data.is_empty() {
                assert_eq!(data.as_bytes(), payload.as_ref());
            }
            Ok(())
        });
        self
    }

    /// Expects a `CLUSTER SLOTS` refresh request on the given socket
    pub fn send_cluster_slots(self, socket_id: i32) -> Self {
        self.send(socket_id, CLUSTER_SLOTS_WIRE)
    }

    /// Expects an `ASKING` probe on the given socket
    pub fn send_asking(self, socket_id: i32) -> Self {
        self.send(socket_id, ASKING_WIRE)
    }

    /// Simulates the transport rejecting a payload
    pub fn send_error(mut self) -> Self {
        self.stack
            .expect_send_formatted()
            .times(1)
            .returning(move |_, _, _| Err(TransportError::Io));
        self
    }

    /// Asserts that the given socket is closed
    pub fn disconnect(mut self, socket_id: i32) -> Self {
        self.stack.expect_disconnect().times(1).returning(move |socket| {
            assert_eq!(socket_id, socket.id);
        });
        self
    }

    /// Asserts a number of closes without pinning their order
    pub fn disconnect_any(mut self, count: usize) -> Self {
        self.stack.expect_disconnect().times(count).returning(move |_| {});
        self
    }

    pub fn into_mock(self) -> MockTransportStack {
        self.stack
    }
}

impl Default for TransportMockBuilder {
    fn default() -> Self {
        Self {
            stack: MockTransportStack::new(),
        }
    }
}

pub fn create_cluster(stack: MockTransportStack, seed_ip: &str, seed_port: u16) -> Cluster<MockTransportStack> {
    Cluster::new(stack, HostKey::new(seed_ip, seed_port))
}

/// Decodes one RESP2 frame from its wire form; sidesteps frame construction
/// details for the error/status variants.
pub fn decoded_frame(wire: &str) -> Resp2Frame {
    let buffer = Bytes::from(wire.to_string());
    let (frame, _) = resp2::decode::decode(&buffer)
        .expect("decodable test frame")
        .expect("complete test frame");
    frame
}

pub fn error_frame(message: &str) -> Resp2Frame {
    decoded_frame(&format!("-{message}\r\n"))
}

pub fn status_frame(message: &str) -> Resp2Frame {
    decoded_frame(&format!("+{message}\r\n"))
}

pub fn bulk_frame(data: &str) -> Resp2Frame {
    Resp2Frame::BulkString(Bytes::from(data.to_string()))
}

/// Builds a `CLUSTER SLOTS` reply frame: per range `(start, end, hosts)`,
/// hosts as `(ip, port)` with the master first
pub fn slots_frame(ranges: &[(i64, i64, &[(&str, u16)])]) -> Resp2Frame {
    let records = ranges
        .iter()
        .map(|(start, end, hosts)| {
            let mut fields = vec![Resp2Frame::Integer(*start), Resp2Frame::Integer(*end)];
            for (ip, port) in hosts.iter() {
                fields.push(Resp2Frame::Array(vec![
                    Resp2Frame::BulkString(Bytes::from(ip.to_string())),
                    Resp2Frame::Integer(*port as i64),
                ]));
            }
            Resp2Frame::Array(fields)
        })
        .collect();

    Resp2Frame::Array(records)
}

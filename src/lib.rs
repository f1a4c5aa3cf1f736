//! This crate offers the routing and recovery core of a non-blocking Redis
//! Cluster client: the slot table and its refresh protocol, pipelined
//! per-connection dispatch, MOVED/ASK/CLUSTERDOWN handling and paced retries.
//!
//! Wire I/O is not part of the crate: the core drives any transport
//! implementing [Transport](crate::network::Transport) and is fed completions
//! by the event loop that owns it.
//!
//! This crate consists of three parts:
//! * [cluster module](crate::cluster) for the router: slot table, redirections, retries
//! * [network module](crate::network) for the transport contract and the connection state machine
//! * [commands module](crate::commands) for building wire-ready command payloads
//!
//! ```
//!# use bytes::Bytes;
//!# use clustered_redis::cluster::Cluster;
//!# use clustered_redis::commands::builder::CommandBuilder;
//!# use clustered_redis::network::{HostKey, ReplyToken, Transport, TransportError};
//!#
//!# struct NullTransport;
//!# impl Transport for NullTransport {
//!#     type Handle = u32;
//!#     fn connect(&mut self, _ip: &str, _port: u16) -> Result<u32, TransportError> {
//!#         Ok(0)
//!#     }
//!#     fn send_formatted(
//!#         &mut self,
//!#         _handle: &mut u32,
//!#         _payload: &Bytes,
//!#         _token: ReplyToken,
//!#     ) -> Result<(), TransportError> {
//!#         Ok(())
//!#     }
//!#     fn disconnect(&mut self, _handle: u32) {}
//!# }
//!#
//! let mut cluster = Cluster::new(NullTransport, HostKey::new("127.0.0.1", 7000));
//! cluster.start();
//!
//! let command = CommandBuilder::new("GET").arg_static("some_key");
//! cluster.exec(Some(b"some_key"), command, |_cluster, response| {
//!     match response {
//!         Ok(frame) => println!("reply: {:?}", frame),
//!         Err(error) => println!("failed: {:?}", error),
//!     }
//! }).unwrap();
//! ```
#![cfg_attr(feature = "strict", deny(warnings))]

/// # Cluster routing core
///
/// [Cluster](crate::cluster::Cluster) owns the 16384-entry slot table, the
/// connection registry and every queued command. A key is hashed to its slot
/// with [key_slot](crate::cluster::key_slot); the slot resolves to a master
/// and the command travels that node's pipelined connection.
///
/// ## Slot table lifecycle
///
/// The table starts out Invalid. Commands issued before a successful
/// `CLUSTER SLOTS` refresh are parked and drained, in order, once the reply
/// is applied. Refreshes are coalesced: at most one request is in flight.
///
/// ## Redirections
///
/// * `MOVED` rewrites the affected slot row, re-dispatches the command and
///   schedules a background refresh to re-learn replicas.
/// * `ASK` sends an `ASKING` probe to the target node and replays the command
///   there once the probe is confirmed, without touching the slot table.
/// * `CLUSTERDOWN` surfaces the reply to the caller and tears everything
///   down via [reset](crate::cluster::Cluster::reset).
///
/// ## Retry budget
///
/// Every command carries a ttl ([DEFAULT_TTL](crate::commands::DEFAULT_TTL)
/// network attempts). Redirects and transient transport failures consume it;
/// once exhausted the command fails with
/// [TtlExceeded](crate::commands::CommandError::TtlExceeded). Commands deep
/// into their budget are paced out on a delay queue driven by
/// [proc](crate::cluster::Cluster::proc) instead of retrying in a tight loop.
pub mod cluster;

/// # Command payloads
///
/// Commands travel as pre-encoded RESP2 payloads built with
/// [CommandBuilder](crate::commands::builder::CommandBuilder). A
/// [Command](crate::commands::Command) pairs the payload with its response
/// callback and retry budget; the callback fires exactly once with either the
/// reply frame or a [CommandError](crate::commands::CommandError).
pub mod commands;

/// # Transport contract and connections
///
/// The core performs no I/O. An event loop owns a
/// [Transport](crate::network::Transport) implementation, lets the cluster
/// submit payloads through it, and feeds connect/reply/disconnect completions
/// back into the cluster, keyed by the peer's `ip:port` name and the
/// [ReplyToken](crate::network::ReplyToken) issued at submission.
///
/// Replies on one connection arrive in submission order; a reply overtaking
/// earlier tokens times the skipped commands out. Connection state is managed
/// by [Connection](crate::network::Connection): commands submitted while the
/// link is still connecting are parked and re-routed once it comes up.
pub mod network;

use crate::cluster::slots::{key_slot, Slot, SlotState, SLOT_COUNT};
use crate::cluster::timer::{DelayQueue, TimePoint};
use crate::commands::builder::CommandBuilder;
use crate::commands::{Command, CommandError, DEFAULT_TTL};
use crate::network::connection::{InFlight, Submit};
use crate::network::host::make_name;
use crate::network::{
    Connection, ConnectionStatus, HostKey, ReplyToken, Transport, TransportError,
};
use bytes::Bytes;
use core::fmt::{self, Debug, Formatter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use redis_protocol::resp2::types::Frame as Resp2Frame;
use std::collections::{HashMap, VecDeque};

/// Timer interval used until `set_timer_interval` is called: 100 ms
const DEFAULT_TIMER_INTERVAL_SEC: i64 = 0;
const DEFAULT_TIMER_INTERVAL_USEC: i64 = 100_000;

/// Default cap for lines handed to installed log writers
const DEFAULT_LOG_LINE_MAX: usize = 65536;

/// Hook invoked when a connection is registered (before the connect completes)
pub type ConnectHook<T> = Box<dyn FnMut(&mut Cluster<T>, &HostKey)>;

/// Hook invoked on connect completion or disconnect, with the transport status
pub type ConnectionEventHook<T> = Box<dyn FnMut(&mut Cluster<T>, &HostKey, &Result<(), TransportError>)>;

/// Sink for formatted diagnostic lines
pub type LogWriter = Box<dyn FnMut(&str)>;

struct EventHooks<T: Transport> {
    on_connect: Option<ConnectHook<T>>,
    on_connected: Option<ConnectionEventHook<T>>,
    on_disconnected: Option<ConnectionEventHook<T>>,
}

impl<T: Transport> EventHooks<T> {
    fn new() -> Self {
        EventHooks {
            on_connect: None,
            on_connected: None,
            on_disconnected: None,
        }
    }
}

struct LogWriters {
    info: Option<LogWriter>,
    debug: Option<LogWriter>,
    max_line: usize,
}

impl LogWriters {
    fn new() -> Self {
        LogWriters {
            info: None,
            debug: None,
            max_line: DEFAULT_LOG_LINE_MAX,
        }
    }
}

/// Routing and recovery core of the cluster client.
///
/// Owns the slot table, the connection registry, every queued command and the
/// transport instance. All operations run on the single task that drives the
/// transport's event loop; the transport feeds completions back through
/// [`on_transport_connected`](Cluster::on_transport_connected),
/// [`on_transport_reply`](Cluster::on_transport_reply) and
/// [`on_transport_disconnected`](Cluster::on_transport_disconnected).
///
/// Response callbacks receive the cluster back as `&mut`, so they are free to
/// issue follow-up commands or call [`reset`](Cluster::reset); no container
/// borrow is held across a callback invocation.
pub struct Cluster<T: Transport> {
    transport: T,

    /// Bootstrap address used while the slot table is unpopulated
    seed: HostKey,

    slots: Vec<Slot>,
    slot_state: SlotState,

    /// Commands parked while the slot table is not usable
    slot_pending: VecDeque<Command<T>>,

    connections: HashMap<String, Connection<T>>,

    /// Commands awaiting a paced retry
    delay: DelayQueue<T>,
    last_tick: TimePoint,
    timer_interval_sec: i64,
    timer_interval_usec: i64,

    hooks: EventHooks<T>,
    log_writers: LogWriters,

    /// Reusable scratch line for the installed log writers
    log_line: String,

    rng: StdRng,
    next_token: ReplyToken,
}

impl<T: Transport> Cluster<T> {
    /// Creates a cluster around the given transport and bootstrap address.
    /// No I/O happens until [`start`](Cluster::start) or the first dispatch.
    pub fn new(transport: T, seed: HostKey) -> Self {
        Cluster {
            transport,
            seed,
            slots: (0..SLOT_COUNT as u16).map(Slot::new).collect(),
            slot_state: SlotState::Invalid,
            slot_pending: VecDeque::new(),
            connections: HashMap::new(),
            delay: DelayQueue::new(),
            last_tick: TimePoint::default(),
            timer_interval_sec: DEFAULT_TIMER_INTERVAL_SEC,
            timer_interval_usec: DEFAULT_TIMER_INTERVAL_USEC,
            hooks: EventHooks::new(),
            log_writers: LogWriters::new(),
            log_line: String::new(),
            rng: StdRng::from_entropy(),
            next_token: 0,
        }
    }

    /// Triggers the first slot refresh
    pub fn start(&mut self) {
        self.reload_slots();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn slot_state(&self) -> SlotState {
        self.slot_state
    }

    /// Read access to one slot row
    pub fn slot(&self, index: u16) -> Option<&Slot> {
        self.slots.get(index as usize)
    }

    /// Builds the payload from the given builder and dispatches it.
    ///
    /// `key` selects the slot; pass `None` (or an empty key) to keep the slot
    /// already recorded on the command. The callback fires exactly once. The
    /// returned error mirrors a callback delivery that already happened and
    /// means the command could not even be queued.
    pub fn exec<F>(
        &mut self,
        key: Option<&[u8]>,
        builder: CommandBuilder,
        callback: F,
    ) -> Result<(), CommandError>
    where
        F: FnOnce(Option<&mut Cluster<T>>, Result<Resp2Frame, CommandError>) + 'static,
    {
        let payload = match builder.to_payload() {
            Ok(payload) => payload,
            Err(error) => {
                self.log_info(format_args!("format cmd failed"));
                callback(Some(self), Err(error.clone()));
                return Err(error);
            }
        };

        self.exec_command(key, Command::from_payload(payload, callback))
    }

    /// Dispatches an argument vector (command word first)
    pub fn exec_args<F>(
        &mut self,
        key: Option<&[u8]>,
        args: &[&[u8]],
        callback: F,
    ) -> Result<(), CommandError>
    where
        F: FnOnce(Option<&mut Cluster<T>>, Result<Resp2Frame, CommandError>) + 'static,
    {
        if args.is_empty() {
            self.log_info(format_args!("format cmd without arguments failed"));
            callback(Some(self), Err(CommandError::InvalidParam));
            return Err(CommandError::InvalidParam);
        }

        let builder = CommandBuilder {
            elements: args.iter().map(|arg| Bytes::copy_from_slice(arg)).collect(),
        };
        self.exec(key, builder, callback)
    }

    /// Dispatches a caller-owned pre-formatted command
    pub fn exec_command(
        &mut self,
        key: Option<&[u8]>,
        mut cmd: Command<T>,
    ) -> Result<(), CommandError> {
        if let Some(key) = key {
            if !key.is_empty() {
                cmd.set_slot(key_slot(key));
            }
        }

        if cmd.is_exhausted() {
            let slot = cmd.slot();
            self.log_debug(format_args!("cmd at slot {slot:?} ttl expired"));
            self.call_cmd(cmd, Err(CommandError::TtlExceeded));
            return Err(CommandError::TtlExceeded);
        }

        if self.slot_state != SlotState::Ok {
            let slot = cmd.slot();
            self.log_debug(format_args!("transfer cmd at slot {slot:?} to slot update pending list"));
            self.slot_pending.push_back(cmd);
            self.reload_slots();
            return Ok(());
        }

        let target = self.get_slot_master(cmd.slot()).clone();
        if !self.make_connection(&target) {
            self.log_info(format_args!("connect to {target} failed"));
            self.call_cmd(cmd, Err(CommandError::ConnectionFailed));
            return Err(CommandError::ConnectionFailed);
        }

        self.exec_on(target.name(), cmd)
    }

    /// Re-dispatches a command after a redirect or a transient failure.
    ///
    /// Fresh commands retry immediately; commands already deep into their ttl
    /// budget are spaced out on the delay queue, since they are likely caught
    /// in a flapping topology. The connection hint is honored only on the
    /// immediate path.
    pub fn retry(&mut self, cmd: Command<T>, conn: Option<&str>) -> Result<(), CommandError> {
        if !self.is_timer_active() || cmd.ttl() > DEFAULT_TTL / 2 {
            return match conn {
                None => self.exec_command(None, cmd),
                Some(name) => self.exec_on(name, cmd),
            };
        }

        self.add_timer_cmd(cmd);
        Ok(())
    }

    /// Requests a fresh copy of the slot table.
    ///
    /// Refreshes are coalesced: while one `CLUSTER SLOTS` request is in
    /// flight, further calls return without action. Returns true when a
    /// refresh was initiated or is already in progress.
    pub fn reload_slots(&mut self) -> bool {
        if self.slot_state == SlotState::Updating {
            return true;
        }

        let target = self.get_slot_master(None).clone();

        let status = self.get_connection(target.name()).map(|conn| conn.status());
        match status {
            None => {
                // Refresh resumes via the connected event
                self.slot_state = SlotState::Invalid;
                self.make_connection(&target)
            }
            Some(ConnectionStatus::Connected) => match self.submit_to(target.name(), InFlight::SlotRefresh) {
                Submit::Sent | Submit::Queued => {
                    self.slot_state = SlotState::Updating;
                    true
                }
                Submit::NotConnected(_) | Submit::Rejected(..) => {
                    self.slot_state = SlotState::Invalid;
                    false
                }
            },
            Some(_) => {
                self.slot_state = SlotState::Invalid;
                true
            }
        }
    }

    /// Resolves the master for a slot. `None` (or an empty row) falls back to
    /// a random slot's master, and finally to the seed address.
    pub fn get_slot_master(&mut self, index: Option<u16>) -> &HostKey {
        let resolved = match index {
            Some(slot) if (slot as usize) < SLOT_COUNT && !self.slots[slot as usize].hosts.is_empty() => {
                Some(slot as usize)
            }
            _ => {
                let random = self.rng.gen_range(0..SLOT_COUNT);
                if self.slots[random].hosts.is_empty() {
                    None
                } else {
                    Some(random)
                }
            }
        };

        match resolved {
            Some(slot) => &self.slots[slot].hosts[0],
            None => &self.seed,
        }
    }

    pub fn get_connection(&self, name: &str) -> Option<&Connection<T>> {
        self.connections.get(name)
    }

    pub fn get_connection_addr(&self, ip: &str, port: u16) -> Option<&Connection<T>> {
        self.connections.get(&make_name(ip, port))
    }

    /// Ensures a connection to the given node exists: reuses a registered one,
    /// otherwise asks the transport for a new link. Returns false when the
    /// transport refused to connect.
    pub fn make_connection(&mut self, key: &HostKey) -> bool {
        if self.connections.contains_key(key.name()) {
            return true;
        }

        let handle = match self.transport.connect(key.ip(), key.port()) {
            Ok(handle) => handle,
            Err(error) => {
                self.log_info(format_args!("redis connect to {key} failed, msg: {error:?}"));
                return false;
            }
        };

        let mut connection = Connection::new(key.clone());
        connection.set_connecting(handle);
        self.connections.insert(key.name().to_string(), connection);

        self.fire_on_connect(key);
        self.log_debug(format_args!("redis make connection to {key}"));
        true
    }

    /// Removes a connection from the registry.
    ///
    /// In-flight commands are failed with a connection error; parked
    /// pre-connect commands go back through [`retry`](Cluster::retry) so they
    /// can be re-routed.
    pub fn release_connection(
        &mut self,
        key: &HostKey,
        close_transport: bool,
        status: Result<(), TransportError>,
    ) -> bool {
        let mut connection = match self.connections.remove(key.name()) {
            Some(connection) => connection,
            None => return false,
        };

        let (in_flight, pending) = connection.set_disconnected(&mut self.transport, close_transport);

        for entry in in_flight {
            self.fail_entry(entry, CommandError::ConnectionFailed);
        }

        self.fire_on_disconnected(key, &status);
        self.log_debug(format_args!("release connection {key}"));

        for entry in pending {
            match entry {
                InFlight::User(cmd) | InFlight::Asking(cmd) => {
                    let _ = self.retry(cmd, None);
                }
                InFlight::SlotRefresh => self.refresh_failed(),
            }
        }

        true
    }

    /// Installs the connection-registered hook, returning the previous one
    pub fn set_on_connect(&mut self, hook: Option<ConnectHook<T>>) -> Option<ConnectHook<T>> {
        core::mem::replace(&mut self.hooks.on_connect, hook)
    }

    /// Installs the connect-completion hook, returning the previous one
    pub fn set_on_connected(
        &mut self,
        hook: Option<ConnectionEventHook<T>>,
    ) -> Option<ConnectionEventHook<T>> {
        core::mem::replace(&mut self.hooks.on_connected, hook)
    }

    /// Installs the disconnect hook, returning the previous one
    pub fn set_on_disconnected(
        &mut self,
        hook: Option<ConnectionEventHook<T>>,
    ) -> Option<ConnectionEventHook<T>> {
        core::mem::replace(&mut self.hooks.on_disconnected, hook)
    }

    /// The delay timer is active once a tick has been observed and the
    /// configured interval is non-zero
    pub fn is_timer_active(&self) -> bool {
        !self.last_tick.is_zero() && (self.timer_interval_sec > 0 || self.timer_interval_usec > 0)
    }

    pub fn set_timer_interval(&mut self, sec: i64, usec: i64) {
        self.timer_interval_sec = sec;
        self.timer_interval_usec = usec;
    }

    /// Periodic tick: records the wall time and re-dispatches every delayed
    /// command whose deadline has passed. Returns the number re-dispatched.
    pub fn proc(&mut self, sec: i64, usec: i64) -> usize {
        let now = TimePoint::new(sec, usec);
        self.last_tick = now;

        let mut dispatched = 0;
        while let Some(cmd) = self.delay.pop_due(now) {
            let _ = self.exec_command(None, cmd);
            dispatched += 1;
        }

        dispatched
    }

    /// Installs per-cluster sinks for formatted diagnostic lines, truncated to
    /// `max_line_size` bytes. Internal diagnostics additionally go through the
    /// `log` facade regardless of these writers.
    pub fn set_log_writer(
        &mut self,
        info: Option<LogWriter>,
        debug: Option<LogWriter>,
        max_line_size: usize,
    ) {
        self.log_writers.info = info;
        self.log_writers.debug = debug;
        self.log_writers.max_line = max_line_size;
        self.log_line = String::new();
    }

    /// Tears the cluster down: disconnects every connection, fails every
    /// queued command and invalidates the slot table. Idempotent.
    pub fn reset(&mut self) {
        // Snapshot the names: callbacks fired below may mutate the registry
        let names: Vec<String> = self.connections.keys().cloned().collect();
        for name in names {
            let mut connection = match self.connections.remove(&name) {
                Some(connection) => connection,
                None => continue,
            };
            let key = connection.key().clone();
            let (in_flight, pending) = connection.set_disconnected(&mut self.transport, true);

            for entry in in_flight.into_iter().chain(pending) {
                match entry {
                    InFlight::User(cmd) | InFlight::Asking(cmd) => {
                        self.call_cmd(cmd, Err(CommandError::ConnectionFailed));
                    }
                    InFlight::SlotRefresh => {}
                }
            }

            self.fire_on_disconnected(&key, &Ok(()));
        }

        // Commands parked during the callbacks above stay queued; only the
        // snapshot taken here is failed
        let mut parked = std::mem::take(&mut self.slot_pending);
        while let Some(cmd) = parked.pop_front() {
            self.call_cmd(cmd, Err(CommandError::SlotUnavailable));
        }

        for slot in self.slots.iter_mut() {
            slot.hosts.clear();
        }
        self.slot_state = SlotState::Invalid;

        self.last_tick = TimePoint::default();
        let mut delayed = std::mem::replace(&mut self.delay, DelayQueue::new());
        while let Some(cmd) = delayed.pop_any() {
            self.call_cmd(cmd, Err(CommandError::Timeout));
        }

        self.log_line = String::new();
    }

    /// Connect completion delivered by the transport, keyed by `ip:port`
    pub fn on_transport_connected(&mut self, name: &str, status: Result<(), TransportError>) {
        let key = match self.connections.get(name) {
            Some(connection) => connection.key().clone(),
            None => {
                log::debug!("connected event for unknown connection {name}");
                return;
            }
        };

        self.fire_on_connected(&key, &status);

        if let Err(error) = status {
            self.log_debug(format_args!("connect to {key} failed, msg: {error:?}"));
            self.release_connection(&key, false, Err(error));
            return;
        }

        let drained = match self.connections.get_mut(key.name()).and_then(|conn| conn.set_connected()) {
            Some(drained) => drained,
            // The hook above released or replaced the connection
            None => return,
        };

        for entry in drained {
            match entry {
                InFlight::User(cmd) => {
                    let _ = self.retry(cmd, None);
                }
                InFlight::Asking(cmd) => self.send_asking(key.name(), cmd),
                InFlight::SlotRefresh => {}
            }
        }

        self.log_debug(format_args!("connect to {key} success"));

        if self.slot_state == SlotState::Invalid {
            self.reload_slots();
        }
    }

    /// Disconnect notification delivered by the transport
    pub fn on_transport_disconnected(&mut self, name: &str, status: Result<(), TransportError>) {
        let key = match self.connections.get(name) {
            Some(connection) => connection.key().clone(),
            None => {
                log::debug!("disconnected event for unknown connection {name}");
                return;
            }
        };

        self.release_connection(&key, false, status);
    }

    /// Reply delivered by the transport.
    ///
    /// The token locates the command in the connection's in-flight FIFO;
    /// entries skipped by the pipelined wire are failed as timed out first,
    /// in FIFO order.
    pub fn on_transport_reply(
        &mut self,
        name: &str,
        token: ReplyToken,
        reply: Result<Resp2Frame, TransportError>,
    ) {
        let (expired, target) = match self.connections.get_mut(name) {
            Some(connection) => connection.take_reply(token),
            None => {
                log::debug!("reply for unknown connection {name}");
                return;
            }
        };

        for entry in expired {
            self.fail_entry(entry, CommandError::Timeout);
        }

        let entry = match target {
            Some(entry) => entry,
            None => {
                log::debug!("reply token {token} not in flight on {name}");
                return;
            }
        };

        match entry {
            InFlight::User(cmd) => self.on_user_reply(name, cmd, reply),
            InFlight::SlotRefresh => self.on_slots_reply(reply),
            InFlight::Asking(cmd) => self.on_asking_reply(name, cmd, reply),
        }
    }

    /// Dispatches one command to a connection, consuming one ttl attempt
    fn exec_on(&mut self, name: &str, mut cmd: Command<T>) -> Result<(), CommandError> {
        if cmd.is_exhausted() {
            let slot = cmd.slot();
            self.log_debug(format_args!("cmd at slot {slot:?} ttl expired"));
            self.call_cmd(cmd, Err(CommandError::TtlExceeded));
            return Err(CommandError::TtlExceeded);
        }

        cmd.consume_attempt();
        let slot = cmd.slot();

        match self.submit_to(name, InFlight::User(cmd)) {
            Submit::Sent | Submit::Queued => {
                self.log_debug(format_args!("exec cmd at slot {slot:?}, connection {name}"));
                Ok(())
            }
            Submit::NotConnected(InFlight::User(cmd)) => self.exec_command(None, cmd),
            Submit::NotConnected(entry) => {
                self.fail_entry(entry, CommandError::ConnectionFailed);
                Err(CommandError::ConnectionFailed)
            }
            Submit::Rejected(entry, error) => {
                self.log_debug(format_args!("send on {name} rejected, msg: {error:?}"));
                self.fail_entry(entry, CommandError::Tcp);
                Err(CommandError::Tcp)
            }
        }
    }

    /// Issues a token and hands the entry to the named connection
    fn submit_to(&mut self, name: &str, entry: InFlight<T>) -> Submit<T> {
        let token = self.next_token;
        self.next_token += 1;

        match self.connections.get_mut(name) {
            None => Submit::NotConnected(entry),
            Some(connection) => connection.submit(&mut self.transport, token, entry),
        }
    }

    fn send_asking(&mut self, name: &str, cmd: Command<T>) {
        match self.submit_to(name, InFlight::Asking(cmd)) {
            Submit::Sent | Submit::Queued => {}
            Submit::NotConnected(entry) => self.fail_entry(entry, CommandError::ConnectionFailed),
            Submit::Rejected(entry, error) => {
                self.log_debug(format_args!("asking on {name} rejected, msg: {error:?}"));
                self.fail_entry(entry, CommandError::Tcp);
            }
        }
    }

    fn on_user_reply(
        &mut self,
        name: &str,
        cmd: Command<T>,
        reply: Result<Resp2Frame, TransportError>,
    ) {
        let frame = match reply {
            Err(error) if error.is_transient() => {
                self.log_debug(format_args!("redis reply on {name} err {error:?} and will retry"));
                let _ = self.retry(cmd, None);
                return;
            }
            Err(error) => {
                self.log_debug(format_args!("redis reply on {name} err {error:?} and abort"));
                self.call_cmd(cmd, Err(CommandError::Tcp));
                return;
            }
            Ok(frame) => frame,
        };

        let error_text = match &frame {
            Resp2Frame::Error(message) => Some(message.to_string()),
            _ => None,
        };

        match error_text {
            Some(text) => self.on_error_reply(cmd, frame, text),
            None => self.call_cmd(cmd, Ok(frame)),
        }
    }

    /// Redirection handling for protocol-level error replies
    fn on_error_reply(&mut self, cmd: Command<T>, frame: Resp2Frame, text: String) {
        if has_error_prefix(&text, "ASK") {
            if let Some((_, key)) = parse_redirect(&text) {
                self.log_debug(format_args!("{text}"));
                self.redirect_ask(key, cmd);
                return;
            }
        } else if has_error_prefix(&text, "MOVED") {
            if let Some((slot, key)) = parse_redirect(&text) {
                self.log_debug(format_args!("{text}"));
                self.redirect_moved(slot, key, cmd);
                return;
            }

            // Unparseable MOVED leaves the table suspect
            self.slot_state = SlotState::Invalid;
        } else if has_error_prefix(&text, "CLUSTERDOWN") {
            self.log_info(format_args!("cluster down, resetting connections and queued commands"));
            self.call_cmd(cmd, Err(CommandError::ErrorResponse(frame)));
            self.reset();
            return;
        }

        self.log_debug(format_args!("redis reply error and abort, msg: {text}"));
        self.call_cmd(cmd, Err(CommandError::ErrorResponse(frame)));
    }

    /// MOVED: the slot moved for good. The row is rewritten to the announced
    /// master and a background refresh re-learns the replicas.
    fn redirect_moved(&mut self, slot: u16, key: HostKey, cmd: Command<T>) {
        let row = &mut self.slots[slot as usize];
        row.hosts.clear();
        row.hosts.push(key);

        let _ = self.retry(cmd, None);
        self.reload_slots();
    }

    /// ASK: one-shot redirect during slot migration. The slot table is not
    /// touched; an ASKING probe carries the command to the announced node.
    fn redirect_ask(&mut self, key: HostKey, cmd: Command<T>) {
        if !self.make_connection(&key) {
            self.call_cmd(cmd, Err(CommandError::ConnectionFailed));
            return;
        }

        self.send_asking(key.name(), cmd);
    }

    fn on_asking_reply(
        &mut self,
        name: &str,
        cmd: Command<T>,
        reply: Result<Resp2Frame, TransportError>,
    ) {
        let frame = match reply {
            Err(error) if error.is_transient() => {
                self.log_debug(format_args!("redis asking on {name} err {error:?} and will retry"));
                let _ = self.retry(cmd, None);
                return;
            }
            Err(error) => {
                self.log_debug(format_args!("redis asking on {name} err {error:?} and abort"));
                self.call_cmd(cmd, Err(CommandError::Tcp));
                return;
            }
            Ok(frame) => frame,
        };

        let confirmed = match &frame {
            Resp2Frame::SimpleString(data) => data.as_ref().eq_ignore_ascii_case(b"OK"),
            _ => false,
        };

        if confirmed {
            let _ = self.retry(cmd, Some(name));
            return;
        }

        self.log_debug(format_args!("redis reply asking err and abort"));
        self.call_cmd(cmd, Err(CommandError::ErrorResponse(frame)));
    }

    /// Reply to the in-flight `CLUSTER SLOTS` request
    fn on_slots_reply(&mut self, reply: Result<Resp2Frame, TransportError>) {
        let ranges = match reply {
            Ok(frame) => parse_slot_ranges(&frame),
            Err(_) => None,
        };

        let ranges = match ranges {
            Some(ranges) => ranges,
            None => {
                self.refresh_failed();
                return;
            }
        };

        for slot in self.slots.iter_mut() {
            slot.hosts.clear();
        }

        let count = ranges.len();
        for (start, end, hosts) in ranges {
            for index in start..=end {
                self.slots[index].hosts = hosts.clone();
            }
        }

        self.slot_state = SlotState::Ok;

        // Drain a snapshot: a callback below may park new commands
        let mut parked = std::mem::take(&mut self.slot_pending);
        while let Some(cmd) = parked.pop_front() {
            let _ = self.retry(cmd, None);
        }

        self.log_info(format_args!("update {count} slot ranges done"));
    }

    fn refresh_failed(&mut self) {
        self.slot_state = SlotState::Invalid;

        if !self.slot_pending.is_empty() {
            self.log_info(format_args!("update slots failed and try to retry again"));
            self.reload_slots();
        } else {
            self.log_info(format_args!("update slots failed and will retry later"));
        }
    }

    /// Terminal failure of one in-flight entry
    fn fail_entry(&mut self, entry: InFlight<T>, error: CommandError) {
        match entry {
            InFlight::User(cmd) | InFlight::Asking(cmd) => self.call_cmd(cmd, Err(error)),
            InFlight::SlotRefresh => self.refresh_failed(),
        }
    }

    /// Exactly-once delivery to the command callback
    fn call_cmd(&mut self, mut cmd: Command<T>, result: Result<Resp2Frame, CommandError>) {
        cmd.invoke(self, result);
    }

    fn add_timer_cmd(&mut self, cmd: Command<T>) {
        let deadline = self
            .last_tick
            .advanced_by(self.timer_interval_sec, self.timer_interval_usec);
        self.delay.push(deadline, cmd);
    }

    fn fire_on_connect(&mut self, key: &HostKey) {
        if let Some(mut hook) = self.hooks.on_connect.take() {
            hook(self, key);
            if self.hooks.on_connect.is_none() {
                self.hooks.on_connect = Some(hook);
            }
        }
    }

    fn fire_on_connected(&mut self, key: &HostKey, status: &Result<(), TransportError>) {
        if let Some(mut hook) = self.hooks.on_connected.take() {
            hook(self, key, status);
            if self.hooks.on_connected.is_none() {
                self.hooks.on_connected = Some(hook);
            }
        }
    }

    fn fire_on_disconnected(&mut self, key: &HostKey, status: &Result<(), TransportError>) {
        if let Some(mut hook) = self.hooks.on_disconnected.take() {
            hook(self, key, status);
            if self.hooks.on_disconnected.is_none() {
                self.hooks.on_disconnected = Some(hook);
            }
        }
    }

    fn log_debug(&mut self, args: fmt::Arguments<'_>) {
        log::debug!("{args}");

        if self.log_writers.debug.is_some() {
            self.render_log_line(args);
            if let Some(writer) = self.log_writers.debug.as_mut() {
                writer(&self.log_line);
            }
        }
    }

    fn log_info(&mut self, args: fmt::Arguments<'_>) {
        log::info!("{args}");

        if self.log_writers.info.is_some() {
            self.render_log_line(args);
            if let Some(writer) = self.log_writers.info.as_mut() {
                writer(&self.log_line);
            }
        }
    }

    fn render_log_line(&mut self, args: fmt::Arguments<'_>) {
        self.log_line.clear();
        let _ = fmt::Write::write_fmt(&mut self.log_line, args);

        let max = self.log_writers.max_line;
        if self.log_line.len() > max {
            let mut cut = max;
            while !self.log_line.is_char_boundary(cut) {
                cut -= 1;
            }
            self.log_line.truncate(cut);
        }
    }

    #[cfg(test)]
    pub(crate) fn slot_pending_count(&self) -> usize {
        self.slot_pending.len()
    }

    #[cfg(test)]
    pub(crate) fn delay_count(&self) -> usize {
        self.delay.len()
    }

    #[cfg(test)]
    pub(crate) fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl<T: Transport> Debug for Cluster<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cluster")
            .field("seed", &self.seed)
            .field("slot_state", &self.slot_state)
            .field("connections", &self.connections.len())
            .field("slot_pending", &self.slot_pending.len())
            .field("delayed", &self.delay.len())
            .finish()
    }
}

fn has_error_prefix(text: &str, prefix: &str) -> bool {
    let text = text.as_bytes();
    let prefix = prefix.as_bytes();
    text.len() >= prefix.len() && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Parses `<verb> <slot> <ip:port>` out of a redirect reply
fn parse_redirect(text: &str) -> Option<(u16, HostKey)> {
    let mut parts = text.split_whitespace();
    let _verb = parts.next()?;

    let slot = parts.next()?.parse::<u16>().ok()?;
    if slot as usize >= SLOT_COUNT {
        return None;
    }

    Some((slot, HostKey::parse(parts.next()?)?))
}

/// Decodes a `CLUSTER SLOTS` reply into `(start, end, hosts)` ranges.
///
/// Host records are `[ip, port, ...]`; elements past the first two (such as
/// the node id of Redis 4+) are ignored. Malformed records are skipped, but a
/// reply whose first record is not an array counts as a failed refresh.
fn parse_slot_ranges(frame: &Resp2Frame) -> Option<Vec<(usize, usize, Vec<HostKey>)>> {
    let records = match frame {
        Resp2Frame::Array(records) if !records.is_empty() => records,
        _ => return None,
    };

    if !matches!(records.first(), Some(Resp2Frame::Array(_))) {
        return None;
    }

    let mut ranges = Vec::with_capacity(records.len());
    for record in records {
        let fields = match record {
            Resp2Frame::Array(fields) if fields.len() >= 3 => fields,
            _ => continue,
        };

        let (start, end) = match (frame_integer(&fields[0]), frame_integer(&fields[1])) {
            (Some(start), Some(end))
                if start >= 0 && end >= start && (end as usize) < SLOT_COUNT =>
            {
                (start as usize, end as usize)
            }
            _ => continue,
        };

        let mut hosts = Vec::with_capacity(fields.len() - 2);
        for field in &fields[2..] {
            let parts = match field {
                Resp2Frame::Array(parts) if parts.len() >= 2 => parts,
                _ => continue,
            };

            let ip = match frame_text(&parts[0]) {
                Some(ip) => ip,
                None => continue,
            };
            let port = match frame_integer(&parts[1]) {
                Some(port) if (0..=u16::MAX as i64).contains(&port) => port as u16,
                _ => continue,
            };

            hosts.push(HostKey::new(&ip, port));
        }

        ranges.push((start, end, hosts));
    }

    Some(ranges)
}

fn frame_integer(frame: &Resp2Frame) -> Option<i64> {
    match frame {
        Resp2Frame::Integer(value) => Some(*value),
        _ => None,
    }
}

fn frame_text(frame: &Resp2Frame) -> Option<String> {
    match frame {
        Resp2Frame::BulkString(data) | Resp2Frame::SimpleString(data) => {
            String::from_utf8(data.to_vec()).ok()
        }
        _ => None,
    }
}

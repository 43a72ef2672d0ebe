//! Multi-client TCP server over the hardware socket pool
//!
//! One socket is reserved as the listener; each client slot is permanently
//! bound to its own socket drawn from the range directly above it. The
//! accept signal is the listener socket's own status reaching Established.
//! The listener is not reopened on a fresh socket while a connection is
//! attached, so only one connection can be accepted per listen cycle even
//! though up to [`MAX_CLIENTS`] sessions are tracked.

use crate::error::{Error, Result};
use crate::registers::MAX_SOCKETS;
use crate::socket::{SocketManager, SocketMode};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

/// Fixed number of client slots
pub const MAX_CLIENTS: usize = 4;

/// Largest receive drained per session per processing tick
const RX_CHUNK: usize = 512;

/// Fixed acknowledgment echoed after received payloads when enabled
const ACK: &[u8] = b"ACK\r\n";

/// Lifecycle of one client slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Connected,
    DataReady,
    Sending,
    Disconnecting,
    Error,
}

/// Server-side bookkeeping for one logical TCP client
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Slot index
    pub client_id: usize,
    /// Hardware socket this slot is permanently bound to
    pub socket_id: usize,
    pub state: SessionState,
    pub connect_time: Option<Instant>,
    pub last_activity: Instant,
    pub remote_ip: Ipv4Addr,
    pub remote_port: u16,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error_count: u32,
}

impl ClientSession {
    fn new(client_id: usize, socket_id: usize) -> Self {
        ClientSession {
            client_id,
            socket_id,
            state: SessionState::Idle,
            connect_time: None,
            last_activity: Instant::now(),
            remote_ip: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
            bytes_sent: 0,
            bytes_received: 0,
            error_count: 0,
        }
    }

    /// Return the slot to idle; identity and socket binding are kept
    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.connect_time = None;
        self.last_activity = Instant::now();
        self.remote_ip = Ipv4Addr::UNSPECIFIED;
        self.remote_port = 0;
        self.bytes_sent = 0;
        self.bytes_received = 0;
        self.error_count = 0;
    }
}

/// Aggregate server statistics
///
/// Monotonic except `active_connections`, which is recomputed live each
/// processing tick.
#[derive(Debug, Clone)]
pub struct ServerStatistics {
    pub total_connections: u64,
    pub active_connections: usize,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub connection_errors: u64,
    pub server_start: Instant,
    pub last_client_connect: Option<Instant>,
}

impl ServerStatistics {
    fn new() -> Self {
        ServerStatistics {
            total_connections: 0,
            active_connections: 0,
            total_bytes_sent: 0,
            total_bytes_received: 0,
            connection_errors: 0,
            server_start: Instant::now(),
            last_client_connect: None,
        }
    }

    /// Uptime computed live from the start tick
    pub fn uptime(&self) -> Duration {
        self.server_start.elapsed()
    }
}

/// Server tuning
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// TCP listen port
    pub port: u16,
    /// Hardware socket reserved for the listener
    pub listener_socket: usize,
    /// Idle sessions older than this are force-disconnected
    pub client_timeout: Duration,
    /// Minimum spacing between processing ticks (zero disables limiting)
    pub process_interval: Duration,
    /// Echo a fixed acknowledgment after each received payload
    pub echo_ack: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            port: 8080,
            listener_socket: 0,
            client_timeout: Duration::from_millis(30_000),
            process_interval: Duration::from_millis(100),
            echo_ack: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Idle,
    Listening,
    /// A connection is attached to the listener; no further accepts until
    /// the pool drains and the listener is re-initialized
    Connected,
}

type ConnectCallback = Box<dyn FnMut(usize, SocketAddrV4) + Send>;
type DisconnectCallback = Box<dyn FnMut(usize) + Send>;
type DataCallback = Box<dyn FnMut(usize, &[u8]) + Send>;

/// TCP server multiplexing logical client sessions onto hardware sockets
///
/// Owns the [`SocketManager`] for the whole register path; callbacks receive
/// only payload data and ids, so they cannot re-enter the register space
/// from inside a processing tick.
pub struct TcpServer {
    mgr: SocketManager,
    sessions: [ClientSession; MAX_CLIENTS],
    stats: ServerStatistics,
    state: ServerState,
    settings: ServerSettings,
    last_process: Option<Instant>,
    streaming_enabled: bool,
    streaming_interval: Duration,
    last_stream: Option<Instant>,
    connect_cb: Option<ConnectCallback>,
    disconnect_cb: Option<DisconnectCallback>,
    data_cb: Option<DataCallback>,
}

impl TcpServer {
    pub fn new(mgr: SocketManager, settings: ServerSettings) -> Self {
        let listener = settings.listener_socket;
        TcpServer {
            mgr,
            sessions: std::array::from_fn(|i| ClientSession::new(i, listener + 1 + i)),
            stats: ServerStatistics::new(),
            state: ServerState::Idle,
            settings,
            last_process: None,
            streaming_enabled: false,
            streaming_interval: Duration::from_millis(1000),
            last_stream: None,
            connect_cb: None,
            disconnect_cb: None,
            data_cb: None,
        }
    }

    /// Initialize the listener socket and enter the listening state
    pub fn start(&mut self) -> Result<()> {
        let listener = self.settings.listener_socket;
        if listener + 1 + MAX_CLIENTS > MAX_SOCKETS {
            return Err(Error::InvalidParameter(format!(
                "listener socket {} leaves no room for {} client sockets",
                listener, MAX_CLIENTS
            )));
        }

        if !self.mgr.init_socket(listener, SocketMode::Tcp, self.settings.port)
            || !self.mgr.listen(listener)
        {
            return Err(Error::InitializationFailed(format!(
                "listener socket {} on port {}",
                listener, self.settings.port
            )));
        }

        self.state = ServerState::Listening;
        self.stats = ServerStatistics::new();
        log::info!(
            "TCP server listening on port {} (listener socket {}, client sockets {}..={})",
            self.settings.port,
            listener,
            listener + 1,
            listener + MAX_CLIENTS
        );
        Ok(())
    }

    /// One processing tick
    ///
    /// Rate-limited to the configured interval. Steps: recompute live
    /// statistics, sweep idle sessions, check the listener for a new
    /// connection, drain pending receive data, emit the periodic status
    /// broadcast.
    pub fn process(&mut self) {
        if let Some(last) = self.last_process {
            if last.elapsed() < self.settings.process_interval {
                return;
            }
        }
        self.last_process = Some(Instant::now());

        self.recompute_active();
        self.sweep_idle_sessions();
        self.accept_pending();
        self.service_sessions();
        self.stream_status();
        self.recompute_active();
    }

    fn recompute_active(&mut self) {
        self.stats.active_connections = self
            .sessions
            .iter()
            .filter(|s| s.state == SessionState::Connected)
            .count();
    }

    /// Force-disconnect connected sessions whose activity is stale
    fn sweep_idle_sessions(&mut self) {
        for client in 0..MAX_CLIENTS {
            let session = &self.sessions[client];
            if session.state == SessionState::Connected
                && session.last_activity.elapsed() > self.settings.client_timeout
            {
                log::info!(
                    "Client {}: idle for {:?}, disconnecting",
                    client,
                    session.last_activity.elapsed()
                );
                self.teardown_session(client);
            }
        }
    }

    /// Check the listener socket's own status for an inbound connection
    fn accept_pending(&mut self) {
        use crate::socket::SocketStatus;

        if self.state != ServerState::Listening {
            return;
        }
        let listener = self.settings.listener_socket;
        if self.mgr.get_status(listener) != SocketStatus::Established {
            return;
        }

        let slot = self
            .sessions
            .iter()
            .position(|s| s.state == SessionState::Idle);
        let client = match slot {
            Some(client) => client,
            None => {
                log::warn!("Inbound connection but no free client slot");
                return;
            }
        };

        let (remote_ip, remote_port) = self
            .mgr
            .remote_endpoint(listener)
            .unwrap_or((Ipv4Addr::UNSPECIFIED, 0));

        let now = Instant::now();
        let session = &mut self.sessions[client];
        session.state = SessionState::Connected;
        session.connect_time = Some(now);
        session.last_activity = now;
        session.remote_ip = remote_ip;
        session.remote_port = remote_port;
        session.bytes_sent = 0;
        session.bytes_received = 0;
        session.error_count = 0;

        self.state = ServerState::Connected;
        self.stats.total_connections += 1;
        self.stats.last_client_connect = Some(now);
        log::info!(
            "Client {} connected from {}:{}",
            client,
            remote_ip,
            remote_port
        );

        if let Some(cb) = self.connect_cb.as_mut() {
            cb(client, SocketAddrV4::new(remote_ip, remote_port));
        }
    }

    /// Drain pending receive data for every attached session
    fn service_sessions(&mut self) {
        for client in 0..MAX_CLIENTS {
            if !matches!(
                self.sessions[client].state,
                SessionState::Connected | SessionState::DataReady
            ) {
                continue;
            }
            let socket = self.sessions[client].socket_id;

            match self.mgr.receive(socket, RX_CHUNK) {
                None => {
                    log::warn!("Client {}: socket failure, dropping session", client);
                    self.sessions[client].error_count += 1;
                    self.stats.connection_errors += 1;
                    self.teardown_session(client);
                }
                Some(data) if !data.is_empty() => {
                    let session = &mut self.sessions[client];
                    session.state = SessionState::DataReady;
                    session.bytes_received += data.len() as u64;
                    session.last_activity = Instant::now();
                    self.stats.total_bytes_received += data.len() as u64;

                    if let Some(cb) = self.data_cb.as_mut() {
                        cb(client, &data);
                    }
                    if self.settings.echo_ack {
                        self.send_to_session(client, ACK);
                    }
                    if self.sessions[client].state == SessionState::DataReady {
                        self.sessions[client].state = SessionState::Connected;
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// Periodic status-line broadcast to every connected client
    fn stream_status(&mut self) {
        if !self.streaming_enabled {
            return;
        }
        if let Some(last) = self.last_stream {
            if last.elapsed() < self.streaming_interval {
                return;
            }
        }
        self.last_stream = Some(Instant::now());

        self.recompute_active();
        let line = format!(
            "status uptime={}s clients={} rx={} tx={}\r\n",
            self.stats.uptime().as_secs(),
            self.stats.active_connections,
            self.stats.total_bytes_received,
            self.stats.total_bytes_sent,
        );
        self.broadcast(line.as_bytes());
    }

    /// Close a session's socket, fire the disconnect callback, reset the slot
    fn teardown_session(&mut self, client: usize) {
        let socket = self.sessions[client].socket_id;
        self.sessions[client].state = SessionState::Disconnecting;
        self.mgr.disconnect(socket);
        self.mgr.close(socket);

        if let Some(cb) = self.disconnect_cb.as_mut() {
            cb(client);
        }
        self.sessions[client].reset();

        // once the pool is empty the listener (occupied by the last peer)
        // can be re-initialized for the next connection
        if self.state == ServerState::Connected
            && self.sessions.iter().all(|s| s.state == SessionState::Idle)
        {
            self.relisten();
        }
    }

    fn relisten(&mut self) {
        let listener = self.settings.listener_socket;
        if self.mgr.init_socket(listener, SocketMode::Tcp, self.settings.port)
            && self.mgr.listen(listener)
        {
            self.state = ServerState::Listening;
            log::info!("Listener re-armed on port {}", self.settings.port);
        } else {
            log::warn!("Failed to re-arm listener on port {}", self.settings.port);
        }
    }

    /// Send payload to one client; returns bytes accepted (0 on failure)
    pub fn send(&mut self, client: usize, data: &[u8]) -> usize {
        if !self.is_connected(client) {
            return 0;
        }
        self.send_to_session(client, data)
    }

    fn send_to_session(&mut self, client: usize, data: &[u8]) -> usize {
        let socket = self.sessions[client].socket_id;
        self.sessions[client].state = SessionState::Sending;

        match self.mgr.send(socket, data) {
            Some(accepted) => {
                let session = &mut self.sessions[client];
                session.state = SessionState::Connected;
                session.bytes_sent += accepted as u64;
                if accepted > 0 {
                    session.last_activity = Instant::now();
                }
                self.stats.total_bytes_sent += accepted as u64;
                if accepted < data.len() {
                    log::debug!(
                        "Client {}: partial send, {} of {} bytes accepted",
                        client,
                        accepted,
                        data.len()
                    );
                }
                accepted
            }
            None => {
                log::warn!("Client {}: send failure, dropping session", client);
                self.sessions[client].error_count += 1;
                self.stats.connection_errors += 1;
                self.teardown_session(client);
                0
            }
        }
    }

    /// Send payload to every connected client; returns clients reached
    ///
    /// A client counts as reached only when the full payload was accepted.
    pub fn broadcast(&mut self, data: &[u8]) -> usize {
        let mut reached = 0;
        for client in 0..MAX_CLIENTS {
            if self.sessions[client].state == SessionState::Connected
                && self.send_to_session(client, data) == data.len()
            {
                reached += 1;
            }
        }
        reached
    }

    pub fn is_connected(&self, client: usize) -> bool {
        self.sessions
            .get(client)
            .map(|s| matches!(s.state, SessionState::Connected | SessionState::DataReady))
            .unwrap_or(false)
    }

    pub fn client_info(&self, client: usize) -> Option<&ClientSession> {
        self.sessions.get(client)
    }

    /// Forcibly disconnect one client
    pub fn disconnect(&mut self, client: usize) -> bool {
        if client >= MAX_CLIENTS || self.sessions[client].state == SessionState::Idle {
            return false;
        }
        self.teardown_session(client);
        true
    }

    pub fn stats(&self) -> &ServerStatistics {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ServerStatistics::new();
        log::info!("Server statistics reset");
    }

    /// Enable or disable the periodic status broadcast
    pub fn set_data_streaming(&mut self, enable: bool, interval: Duration) {
        self.streaming_enabled = enable;
        self.streaming_interval = interval;
        self.last_stream = None;
    }

    pub fn on_connect<F: FnMut(usize, SocketAddrV4) + Send + 'static>(&mut self, cb: F) {
        self.connect_cb = Some(Box::new(cb));
    }

    pub fn on_disconnect<F: FnMut(usize) + Send + 'static>(&mut self, cb: F) {
        self.disconnect_cb = Some(Box::new(cb));
    }

    pub fn on_data_received<F: FnMut(usize, &[u8]) + Send + 'static>(&mut self, cb: F) {
        self.data_cb = Some(Box::new(cb));
    }

    pub fn sessions(&self) -> &[ClientSession] {
        &self.sessions
    }

    /// Access to the socket manager (diagnostics, link monitor)
    pub fn manager_mut(&mut self) -> &mut SocketManager {
        &mut self.mgr
    }

    /// Disconnect every session and close every socket
    pub fn shutdown(&mut self) {
        log::info!("TCP server shutting down");
        // leave the attached state first so teardown does not re-arm the listener
        self.state = ServerState::Idle;
        for client in 0..MAX_CLIENTS {
            if self.sessions[client].state != SessionState::Idle {
                self.teardown_session(client);
            }
        }
        self.mgr.close_all();
        self.state = ServerState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Registers;
    use crate::socket::{CommandTiming, SocketStatus};
    use crate::transport::mock::MockNic;
    use crate::transport::Transport;
    use std::sync::{Arc, Mutex};

    fn test_server(settings: ServerSettings) -> (MockNic, TcpServer) {
        let nic = MockNic::new();
        let regs = Registers::new(Transport::with_settle(nic.clone(), Duration::ZERO));
        let mgr = SocketManager::new(
            regs,
            CommandTiming {
                timeout: Duration::from_millis(50),
                poll_interval: Duration::from_millis(1),
            },
        );
        (nic, TcpServer::new(mgr, settings))
    }

    fn fast_settings() -> ServerSettings {
        ServerSettings {
            process_interval: Duration::ZERO,
            ..ServerSettings::default()
        }
    }

    fn started_server() -> (MockNic, TcpServer) {
        let (nic, mut server) = test_server(fast_settings());
        server.start().unwrap();
        (nic, server)
    }

    /// Simulate an inbound connection on the listener and run one tick
    fn connect_client(nic: &MockNic, server: &mut TcpServer) {
        nic.set_status(0, SocketStatus::Established);
        server.process();
    }

    #[test]
    fn test_start_puts_listener_in_listen() {
        let (_nic, mut server) = started_server();
        assert_eq!(
            server.manager_mut().get_status(0),
            SocketStatus::Listen
        );
        assert_eq!(server.state, ServerState::Listening);
    }

    #[test]
    fn test_accept_connects_exactly_one_slot() {
        let (nic, mut server) = started_server();
        nic.set_remote(0, Ipv4Addr::new(10, 1, 1, 9), 40001);

        let seen: Arc<Mutex<Vec<(usize, SocketAddrV4)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        server.on_connect(move |client, remote| {
            seen_cb.lock().unwrap().push((client, remote));
        });

        connect_client(&nic, &mut server);

        let connected: Vec<usize> = server
            .sessions()
            .iter()
            .filter(|s| s.state == SessionState::Connected)
            .map(|s| s.client_id)
            .collect();
        assert_eq!(connected, vec![0]);
        assert_eq!(server.stats().total_connections, 1);
        assert_eq!(server.stats().active_connections, 1);
        assert_eq!(server.sessions()[0].remote_ip, Ipv4Addr::new(10, 1, 1, 9));
        assert_eq!(server.sessions()[0].remote_port, 40001);

        let calls = seen.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 0);
        assert_eq!(
            calls[0].1,
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 9), 40001)
        );
    }

    #[test]
    fn test_no_second_accept_while_connection_attached() {
        let (nic, mut server) = started_server();
        connect_client(&nic, &mut server);
        // listener still reads Established; server must not hand out
        // another slot for the same attached connection
        server.process();
        server.process();
        assert_eq!(server.stats().total_connections, 1);
        assert_eq!(server.stats().active_connections, 1);
    }

    #[test]
    fn test_disconnect_rearms_listener() {
        let (nic, mut server) = started_server();
        connect_client(&nic, &mut server);

        assert!(server.disconnect(0));
        assert!(!server.is_connected(0));
        assert_eq!(server.state, ServerState::Listening);
        assert_eq!(server.manager_mut().get_status(0), SocketStatus::Listen);

        // a fresh peer can now connect into the same slot
        connect_client(&nic, &mut server);
        assert_eq!(server.stats().total_connections, 2);
    }

    #[test]
    fn test_idle_timeout_disconnects_after_deadline_only() {
        let (nic, mut server) = test_server(ServerSettings {
            client_timeout: Duration::from_millis(40),
            process_interval: Duration::ZERO,
            ..ServerSettings::default()
        });
        server.start().unwrap();

        let dropped: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let dropped_cb = Arc::clone(&dropped);
        server.on_disconnect(move |client| dropped_cb.lock().unwrap().push(client));

        connect_client(&nic, &mut server);
        assert!(server.is_connected(0));

        // fresh activity: the sweep must not fire early
        server.process();
        assert!(server.is_connected(0));
        assert!(dropped.lock().unwrap().is_empty());

        // age the session past the deadline; next tick disconnects it
        server.sessions[0].last_activity = Instant::now() - Duration::from_millis(100);
        server.process();
        assert!(!server.is_connected(0));
        assert_eq!(*dropped.lock().unwrap(), vec![0]);
        assert_eq!(server.stats().active_connections, 0);
    }

    #[test]
    fn test_send_clamped_by_transmit_space() {
        let (nic, mut server) = started_server();
        connect_client(&nic, &mut server);

        // slot 0 is bound to socket 1; pin its free space below the payload
        nic.set_tx_free(1, 100);
        let payload = vec![0xA5u8; 500];
        assert_eq!(server.send(0, &payload), 100);
        assert_eq!(nic.send_count(1), 1);
        assert_eq!(server.stats().total_bytes_sent, 100);
        assert_eq!(server.sessions()[0].bytes_sent, 100);
    }

    #[test]
    fn test_send_to_idle_client_returns_zero() {
        let (_nic, mut server) = started_server();
        assert_eq!(server.send(2, b"nobody home"), 0);
        assert_eq!(server.send(MAX_CLIENTS + 1, b"bad id"), 0);
        assert_eq!(server.stats().total_bytes_sent, 0);
    }

    #[test]
    fn test_broadcast_reaches_all_connected() {
        let (nic, mut server) = started_server();
        for session in server.sessions.iter_mut() {
            session.state = SessionState::Connected;
        }

        let payload = [0x42u8; 20];
        assert_eq!(server.broadcast(&payload), 4);
        assert_eq!(server.stats().total_bytes_sent, 80);
        for (i, session) in server.sessions().iter().enumerate() {
            assert_eq!(session.bytes_sent, 20, "client {}", i);
            assert_eq!(nic.sent(session.socket_id).len(), 1);
        }
    }

    #[test]
    fn test_broadcast_skips_idle_slots() {
        let (_nic, mut server) = started_server();
        server.sessions[1].state = SessionState::Connected;
        server.sessions[3].state = SessionState::Connected;

        assert_eq!(server.broadcast(b"ping"), 2);
        assert_eq!(server.stats().total_bytes_sent, 8);
    }

    #[test]
    fn test_receive_invokes_data_callback_and_counters() {
        let (nic, mut server) = started_server();
        connect_client(&nic, &mut server);

        let received: Arc<Mutex<Vec<(usize, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
        let received_cb = Arc::clone(&received);
        server.on_data_received(move |client, data| {
            received_cb.lock().unwrap().push((client, data.to_vec()));
        });

        nic.inject_rx(1, b"measure 42\r\n");
        server.process();

        let calls = received.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 0);
        assert_eq!(calls[0].1, b"measure 42\r\n");
        assert_eq!(server.stats().total_bytes_received, 12);
        assert_eq!(server.sessions()[0].bytes_received, 12);
        assert_eq!(server.sessions()[0].state, SessionState::Connected);
    }

    #[test]
    fn test_echo_ack_after_receive() {
        let (nic, mut server) = test_server(ServerSettings {
            echo_ack: true,
            process_interval: Duration::ZERO,
            ..ServerSettings::default()
        });
        server.start().unwrap();
        connect_client(&nic, &mut server);

        nic.inject_rx(1, b"hello");
        server.process();

        let sent = nic.sent(1);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], ACK);
    }

    #[test]
    fn test_socket_failure_tears_session_down() {
        let (nic, mut server) = started_server();
        connect_client(&nic, &mut server);

        nic.inject_rx(1, b"doomed");
        nic.set_hang_commands(true);
        server.process();

        assert!(!server.is_connected(0));
        assert_eq!(server.stats().connection_errors, 1);
        assert_eq!(server.stats().active_connections, 0);
    }

    #[test]
    fn test_active_connections_matches_connected_count() {
        let (_nic, mut server) = started_server();
        server.sessions[0].state = SessionState::Connected;
        server.sessions[2].state = SessionState::Connected;
        server.process();
        assert_eq!(server.stats().active_connections, 2);

        server.sessions[2].state = SessionState::Idle;
        server.process();
        assert_eq!(server.stats().active_connections, 1);
    }

    #[test]
    fn test_process_rate_limited() {
        let (_nic, mut server) = test_server(ServerSettings {
            process_interval: Duration::from_millis(60),
            ..ServerSettings::default()
        });
        server.start().unwrap();

        server.process();
        server.sessions[0].state = SessionState::Connected;
        // second call inside the interval must be a no-op
        server.process();
        assert_eq!(server.stats().active_connections, 0);

        std::thread::sleep(Duration::from_millis(70));
        server.process();
        assert_eq!(server.stats().active_connections, 1);
    }

    #[test]
    fn test_streaming_broadcasts_status_line() {
        let (nic, mut server) = started_server();
        server.sessions[0].state = SessionState::Connected;
        server.set_data_streaming(true, Duration::ZERO);

        server.process();

        let sent = nic.sent(1);
        assert_eq!(sent.len(), 1);
        let line = String::from_utf8(sent[0].clone()).unwrap();
        assert!(line.starts_with("status uptime="), "line: {}", line);
        assert!(line.ends_with("\r\n"));
    }

    #[test]
    fn test_reset_stats_clears_counters() {
        let (nic, mut server) = started_server();
        connect_client(&nic, &mut server);
        server.send(0, b"some bytes");
        assert!(server.stats().total_bytes_sent > 0);

        server.reset_stats();
        assert_eq!(server.stats().total_connections, 0);
        assert_eq!(server.stats().total_bytes_sent, 0);
        assert_eq!(server.stats().connection_errors, 0);
    }

    #[test]
    fn test_no_free_slot_leaves_pool_untouched() {
        let (nic, mut server) = started_server();
        for session in server.sessions.iter_mut() {
            session.state = SessionState::Connected;
        }
        nic.set_status(0, SocketStatus::Established);
        server.process();
        assert_eq!(server.stats().total_connections, 0);
    }

    #[test]
    fn test_shutdown_idles_everything() {
        let (nic, mut server) = started_server();
        connect_client(&nic, &mut server);
        server.shutdown();

        assert!(server.sessions().iter().all(|s| s.state == SessionState::Idle));
        assert_eq!(server.state, ServerState::Idle);
        assert_eq!(server.manager_mut().get_status(0), SocketStatus::Closed);
    }

    #[test]
    fn test_client_info_reports_slot_binding() {
        let (_nic, server) = started_server();
        for client in 0..MAX_CLIENTS {
            let info = server.client_info(client).unwrap();
            assert_eq!(info.client_id, client);
            assert_eq!(info.socket_id, client + 1);
            assert_eq!(info.state, SessionState::Idle);
        }
        assert!(server.client_info(MAX_CLIENTS).is_none());
    }

    #[test]
    fn test_uptime_advances() {
        let (_nic, server) = started_server();
        std::thread::sleep(Duration::from_millis(10));
        assert!(server.stats().uptime() >= Duration::from_millis(10));
    }
}

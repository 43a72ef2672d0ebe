//! Diagnostic views for the external command dispatcher
//!
//! Read-only snapshots over the driver's data model. The only state these
//! touch is the cached socket status, which is refreshed whenever it is
//! read (that refresh path lives in `SocketManager::get_status`).

use crate::registers::{socket_reg, MAX_SOCKETS};
use crate::server::TcpServer;
use crate::socket::SocketManager;
use std::fmt::Write as _;

/// Span of the per-socket register block included in dumps
const SOCKET_DUMP_LEN: u16 = 0x30;

/// Hex dump of one socket's register block
pub fn dump_socket_registers(mgr: &mut SocketManager, id: usize) -> String {
    if id >= MAX_SOCKETS {
        return format!("socket {}: out of range\n", id);
    }

    let mut out = format!("socket {} registers:\n", id);
    for row in (0..SOCKET_DUMP_LEN).step_by(8) {
        let base = socket_reg(id, row);
        let _ = write!(out, "  {:#06x}:", base);
        for offset in 0..8 {
            match mgr.registers_mut().read_byte(base + offset) {
                Ok(value) => {
                    let _ = write!(out, " {:02X}", value);
                }
                Err(_) => {
                    let _ = write!(out, " ??");
                }
            }
        }
        out.push('\n');
    }
    out
}

/// One line per hardware socket: mode, fresh status, port, error count
pub fn socket_table(mgr: &mut SocketManager) -> String {
    let mut out = String::from("id  mode     status       port   errors\n");
    for id in 0..MAX_SOCKETS {
        let status = mgr.get_status(id);
        let Some(descriptor) = mgr.descriptor(id) else {
            continue;
        };
        let _ = writeln!(
            out,
            "{:<3} {:<8} {:<12} {:<6} {}",
            id,
            format!("{:?}", descriptor.mode),
            format!("{:?}", status),
            descriptor.local_port,
            descriptor.error_count,
        );
    }
    out
}

/// One line per client slot
pub fn server_report(server: &TcpServer) -> String {
    let mut out = String::from("client  socket  state          remote                rx/tx bytes\n");
    for session in server.sessions() {
        let _ = writeln!(
            out,
            "{:<7} {:<7} {:<14} {:<21} {}/{}",
            session.client_id,
            session.socket_id,
            format!("{:?}", session.state),
            format!("{}:{}", session.remote_ip, session.remote_port),
            session.bytes_received,
            session.bytes_sent,
        );
    }
    out
}

/// Aggregate statistics snapshot
pub fn stats_report(server: &TcpServer) -> String {
    let stats = server.stats();
    format!(
        "uptime: {}s\n\
         connections: {} total, {} active\n\
         bytes: {} received, {} sent\n\
         errors: {}\n",
        stats.uptime().as_secs(),
        stats.total_connections,
        stats.active_connections,
        stats.total_bytes_received,
        stats.total_bytes_sent,
        stats.connection_errors,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Registers;
    use crate::server::{ServerSettings, TcpServer};
    use crate::socket::{CommandTiming, SocketMode};
    use crate::transport::mock::MockNic;
    use crate::transport::Transport;
    use std::time::Duration;

    fn test_manager() -> (MockNic, SocketManager) {
        let nic = MockNic::new();
        let regs = Registers::new(Transport::with_settle(nic.clone(), Duration::ZERO));
        (
            nic,
            SocketManager::new(
                regs,
                CommandTiming {
                    timeout: Duration::from_millis(50),
                    poll_interval: Duration::from_millis(1),
                },
            ),
        )
    }

    #[test]
    fn test_register_dump_covers_block() {
        let (_nic, mut mgr) = test_manager();
        assert!(mgr.init_socket(0, SocketMode::Tcp, 5000));

        let dump = dump_socket_registers(&mut mgr, 0);
        assert!(dump.contains("socket 0 registers:"));
        assert!(dump.contains("0x0400:"));
        // port 5000 is 0x13 0x88 in the source-port registers
        assert!(dump.contains("13 88"));
    }

    #[test]
    fn test_register_dump_rejects_bad_id() {
        let (_nic, mut mgr) = test_manager();
        assert!(dump_socket_registers(&mut mgr, MAX_SOCKETS).contains("out of range"));
    }

    #[test]
    fn test_socket_table_lists_all_sockets() {
        let (_nic, mut mgr) = test_manager();
        assert!(mgr.init_socket(2, SocketMode::Tcp, 8080));

        let table = socket_table(&mut mgr);
        assert_eq!(table.lines().count(), MAX_SOCKETS + 1);
        assert!(table.contains("Init"));
        assert!(table.contains("8080"));
    }

    #[test]
    fn test_reports_do_not_mutate_sessions() {
        let (_nic, mgr) = test_manager();
        let mut server = TcpServer::new(
            mgr,
            ServerSettings {
                process_interval: Duration::ZERO,
                ..ServerSettings::default()
            },
        );
        server.start().unwrap();

        let before: Vec<_> = server.sessions().iter().map(|s| s.state).collect();
        let report = server_report(&server);
        let stats = stats_report(&server);
        let after: Vec<_> = server.sessions().iter().map(|s| s.state).collect();

        assert_eq!(before, after);
        assert!(report.contains("client"));
        assert!(stats.contains("uptime:"));
        assert!(stats.contains("connections: 0 total, 0 active"));
    }
}

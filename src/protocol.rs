// src/protocol.rs - Controller command protocol over a stream socket
//
// A command snapshots all six joints:
//   1,(<J1>,<J2>,<J3>,<J4>,<J5>,<J6>)(3,0)
// with three decimals per value. The controller answers `True` once it has
// accepted the command; anything else counts as a failed delivery.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::joints::{JointStore, JOINT_COUNT};

const COMMAND_PREFIX: &str = "1,(";
const COMMAND_SUFFIX: &str = ")(3,0)";

/// Reply the controller sends when a command was accepted.
pub const CONFIRMATION_TOKEN: &str = "True";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to connect to controller at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("transmission failed: {0}")]
    Transmission(#[from] io::Error),
    #[error("controller closed the connection without replying")]
    ShortRead,
    #[error("controller replied {0:?} instead of \"True\"")]
    ConfirmationMismatch(String),
    #[error("no reply from controller within {0:?}")]
    Timeout(Duration),
    #[error("controller still owes a reply to an earlier command")]
    Desynchronized,
    #[error("malformed command: {0}")]
    MalformedCommand(String),
}

/// Result of one delivery attempt, as seen by the frame loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Confirmed,
    /// The controller answered with something other than the confirmation.
    Rejected(String),
    TimedOut,
    Failed(String),
}

impl SendOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SendOutcome::Confirmed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SendOutcome::Confirmed => "confirmed",
            SendOutcome::Rejected(_) => "rejected",
            SendOutcome::TimedOut => "timed_out",
            SendOutcome::Failed(_) => "failed",
        }
    }
}

impl From<ProtocolError> for SendOutcome {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ConfirmationMismatch(reply) => SendOutcome::Rejected(reply),
            ProtocolError::Timeout(_) => SendOutcome::TimedOut,
            other => SendOutcome::Failed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub sent: u64,
    pub confirmed: u64,
    pub failed: u64,
}

/// Serialize the full joint state into a controller command.
pub fn format_command(joints: &JointStore) -> String {
    let values: Vec<String> = joints.values().iter().map(|v| format!("{:.3}", v)).collect();
    format!("{}{}{}", COMMAND_PREFIX, values.join(","), COMMAND_SUFFIX)
}

/// Parse the joint values back out of a controller command.
pub fn parse_command(message: &str) -> Result<[f64; JOINT_COUNT], ProtocolError> {
    let malformed = || ProtocolError::MalformedCommand(message.to_string());

    let body = message
        .trim()
        .strip_prefix(COMMAND_PREFIX)
        .and_then(|rest| rest.strip_suffix(COMMAND_SUFFIX))
        .ok_or_else(malformed)?;

    let mut values = [0.0; JOINT_COUNT];
    let mut fields = body.split(',');
    for slot in values.iter_mut() {
        let field = fields.next().ok_or_else(malformed)?;
        *slot = field.trim().parse().map_err(|_| malformed())?;
    }
    if fields.next().is_some() {
        return Err(malformed());
    }
    Ok(values)
}

/// Client side of the controller connection. Every call to
/// [`send_command`](Self::send_command) writes one command and blocks until
/// the controller replies, the response timeout expires, or the connection
/// faults. There is no retry and no reconnect.
pub struct ProtocolClient<S = TcpStream> {
    stream: S,
    buffer_size: usize,
    response_timeout: Duration,
    stats: DeliveryStats,
    /// Set when a reply timed out; that reply may still arrive.
    late_reply_pending: bool,
}

impl ProtocolClient<TcpStream> {
    pub fn connect(
        addr: &str,
        connect_timeout: Duration,
        response_timeout: Duration,
        buffer_size: usize,
    ) -> Result<Self, ProtocolError> {
        let connect_err = |source: io::Error| ProtocolError::Connect {
            addr: addr.to_string(),
            source,
        };

        let candidates: Vec<SocketAddr> = addr.to_socket_addrs().map_err(connect_err)?.collect();
        let mut last_err = None;
        let mut stream = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    debug!(%candidate, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        let stream = match stream {
            Some(s) => s,
            None => {
                let err = last_err.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "address resolved to no endpoints")
                });
                return Err(connect_err(err));
            }
        };

        stream.set_read_timeout(Some(response_timeout)).map_err(connect_err)?;
        stream.set_write_timeout(Some(response_timeout)).map_err(connect_err)?;
        stream.set_nodelay(true).map_err(connect_err)?;

        info!(addr, "connected to controller");
        Ok(Self::from_stream(stream, response_timeout, buffer_size))
    }
}

impl<S: Read + Write> ProtocolClient<S> {
    /// Wrap an already-connected stream. Timeouts must be configured on the
    /// stream itself; `response_timeout` is only used for reporting.
    pub fn from_stream(stream: S, response_timeout: Duration, buffer_size: usize) -> Self {
        Self {
            stream,
            buffer_size,
            response_timeout,
            stats: DeliveryStats::default(),
            late_reply_pending: false,
        }
    }

    /// Send the joint snapshot and wait for the controller's confirmation.
    /// Faults never escape; they are logged and reported in the outcome.
    pub fn send_command(&mut self, joints: &JointStore) -> SendOutcome {
        let message = format_command(joints);
        self.stats.sent += 1;

        match self.exchange(&message) {
            Ok(()) => {
                self.stats.confirmed += 1;
                SendOutcome::Confirmed
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(error = %e, "command not confirmed");
                SendOutcome::from(e)
            }
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    fn exchange(&mut self, message: &str) -> Result<(), ProtocolError> {
        if self.late_reply_pending {
            self.discard_late_reply()?;
        }

        debug!(command = message, "sending command");
        if let Err(e) = self.stream.write_all(message.as_bytes()).and_then(|_| self.stream.flush()) {
            return Err(self.classify(e));
        }

        let mut buf = vec![0u8; self.buffer_size];
        let n = loop {
            match self.stream.read(&mut buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let err = self.classify(e);
                    if matches!(err, ProtocolError::Timeout(_)) {
                        self.late_reply_pending = true;
                    }
                    return Err(err);
                }
                Ok(n) => break n,
            }
        };
        if n == 0 {
            return Err(ProtocolError::ShortRead);
        }

        let reply = String::from_utf8_lossy(&buf[..n]);
        let reply = reply.trim();
        debug!(reply, "received response");
        if reply == CONFIRMATION_TOKEN {
            Ok(())
        } else {
            Err(ProtocolError::ConfirmationMismatch(reply.to_string()))
        }
    }

    /// Wait up to the response timeout for the reply to a command that
    /// already timed out, and throw it away. Until it shows up no new command
    /// is written, so a stale reply is never taken for a fresh one.
    fn discard_late_reply(&mut self) -> Result<(), ProtocolError> {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            match self.stream.read(&mut buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(match self.classify(e) {
                        ProtocolError::Timeout(_) => ProtocolError::Desynchronized,
                        other => other,
                    })
                }
                Ok(0) => return Err(ProtocolError::ShortRead),
                Ok(n) => {
                    let stale = String::from_utf8_lossy(&buf[..n]);
                    warn!(reply = stale.trim(), "discarding late reply to an earlier command");
                    self.late_reply_pending = false;
                    return Ok(());
                }
            }
        }
    }

    fn classify(&self, err: io::Error) -> ProtocolError {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ProtocolError::Timeout(self.response_timeout),
            _ => ProtocolError::Transmission(err),
        }
    }
}

/// In-memory stream that replays canned replies and records every write.
#[cfg(test)]
pub(crate) struct ScriptedStream {
    replies: std::collections::VecDeque<io::Result<Vec<u8>>>,
    pub writes: Vec<String>,
}

#[cfg(test)]
impl ScriptedStream {
    pub fn new() -> Self {
        Self {
            replies: std::collections::VecDeque::new(),
            writes: Vec::new(),
        }
    }

    pub fn reply(mut self, text: &str) -> Self {
        self.replies.push_back(Ok(text.as_bytes().to_vec()));
        self
    }

    pub fn fail(mut self, kind: io::ErrorKind) -> Self {
        self.replies.push_back(Err(io::Error::new(kind, "scripted failure")));
        self
    }
}

#[cfg(test)]
impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.replies.pop_front() {
            Some(Ok(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writes.push(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joints::Joint;
    use std::net::TcpListener;
    use std::thread;

    fn client(stream: ScriptedStream) -> ProtocolClient<ScriptedStream> {
        ProtocolClient::from_stream(stream, Duration::from_millis(100), 1024)
    }

    #[test]
    fn test_format_initial_pose() {
        let joints = JointStore::default();
        assert_eq!(format_command(&joints), "1,(0.400,-101.980,162.100,0.560,43.930,1.730)(3,0)");
    }

    #[test]
    fn test_format_after_adjustment() {
        let mut joints = JointStore::default();
        joints.adjust(Joint::J1, 5.0);
        assert_eq!(format_command(&joints), "1,(5.400,-101.980,162.100,0.560,43.930,1.730)(3,0)");
    }

    #[test]
    fn test_parse_recovers_values() {
        let joints = JointStore::new([12.3456, -0.0004, 999.9999, -45.5, 0.0, 7.125]);
        let parsed = parse_command(&format_command(&joints)).unwrap();
        for (expected, parsed) in joints.values().iter().zip(parsed.iter()) {
            assert!((expected - parsed).abs() <= 0.0005 + 1e-12, "{expected} vs {parsed}");
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_command("1,(1,2,3,4,5)(3,0)").is_err());
        assert!(parse_command("1,(1,2,3,4,5,6,7)(3,0)").is_err());
        assert!(parse_command("(1,2,3,4,5,6)").is_err());
        assert!(parse_command("1,(1,2,x,4,5,6)(3,0)").is_err());
    }

    #[test]
    fn test_confirmed_delivery() {
        let mut client = client(ScriptedStream::new().reply("True\r\n"));
        let outcome = client.send_command(&JointStore::default());
        assert_eq!(outcome, SendOutcome::Confirmed);
        assert!(outcome.is_confirmed());
        assert_eq!(client.get_ref().writes, vec![format_command(&JointStore::default())]);
        assert_eq!(client.stats(), DeliveryStats { sent: 1, confirmed: 1, failed: 0 });
    }

    #[test]
    fn test_rejected_reply() {
        let mut client = client(ScriptedStream::new().reply("False"));
        let outcome = client.send_command(&JointStore::default());
        assert_eq!(outcome, SendOutcome::Rejected("False".to_string()));
        assert!(!outcome.is_confirmed());
        assert_eq!(client.stats().failed, 1);
    }

    #[test]
    fn test_confirmation_is_case_sensitive() {
        let mut client = client(ScriptedStream::new().reply("true"));
        assert!(!client.send_command(&JointStore::default()).is_confirmed());
    }

    #[test]
    fn test_closed_connection_is_failure() {
        let mut client = client(ScriptedStream::new());
        let outcome = client.send_command(&JointStore::default());
        assert!(matches!(outcome, SendOutcome::Failed(_)));
    }

    #[test]
    fn test_io_fault_does_not_stop_later_sends() {
        let stream = ScriptedStream::new()
            .fail(io::ErrorKind::ConnectionReset)
            .fail(io::ErrorKind::WouldBlock)
            .reply("True")
            .reply("True");
        let mut client = client(stream);
        let joints = JointStore::default();

        assert!(matches!(client.send_command(&joints), SendOutcome::Failed(_)));
        assert_eq!(client.send_command(&joints), SendOutcome::TimedOut);
        assert_eq!(client.send_command(&joints), SendOutcome::Confirmed);
        assert_eq!(client.stats(), DeliveryStats { sent: 3, confirmed: 1, failed: 2 });
    }

    #[test]
    fn test_late_reply_not_taken_for_next_command() {
        let stream = ScriptedStream::new()
            .fail(io::ErrorKind::WouldBlock)
            .reply("True")
            .reply("False");
        let mut client = client(stream);
        let joints = JointStore::default();

        assert_eq!(client.send_command(&joints), SendOutcome::TimedOut);
        assert_eq!(client.send_command(&joints), SendOutcome::Rejected("False".to_string()));
        assert_eq!(client.get_ref().writes.len(), 2);
    }

    #[test]
    fn test_missing_late_reply_blocks_new_commands() {
        let stream = ScriptedStream::new()
            .fail(io::ErrorKind::WouldBlock)
            .fail(io::ErrorKind::WouldBlock)
            .reply("True")
            .reply("True");
        let mut client = client(stream);
        let joints = JointStore::default();

        assert_eq!(client.send_command(&joints), SendOutcome::TimedOut);
        // Still waiting on the first reply: nothing new goes out
        assert!(matches!(client.send_command(&joints), SendOutcome::Failed(_)));
        assert_eq!(client.get_ref().writes.len(), 1);
        // The late reply finally lands and is discarded
        assert_eq!(client.send_command(&joints), SendOutcome::Confirmed);
        assert_eq!(client.get_ref().writes.len(), 2);
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = ProtocolClient::connect(
            &format!("127.0.0.1:{port}"),
            Duration::from_millis(500),
            Duration::from_millis(500),
            1024,
        );
        assert!(matches!(result, Err(ProtocolError::Connect { .. })));
    }

    #[test]
    fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = socket.read(&mut buf).unwrap();
            socket.write_all(b"True").unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let mut client = ProtocolClient::connect(
            &addr.to_string(),
            Duration::from_secs(1),
            Duration::from_secs(2),
            1024,
        )
        .unwrap();
        let joints = JointStore::default();
        assert_eq!(client.send_command(&joints), SendOutcome::Confirmed);
        assert_eq!(server.join().unwrap(), format_command(&joints));
    }

    #[test]
    fn test_tcp_silent_controller_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf);
            // Hold the socket open without replying until the client gives up
            thread::sleep(Duration::from_millis(400));
        });

        let mut client = ProtocolClient::connect(
            &addr.to_string(),
            Duration::from_secs(1),
            Duration::from_millis(100),
            1024,
        )
        .unwrap();
        assert_eq!(client.send_command(&JointStore::default()), SendOutcome::TimedOut);
        server.join().unwrap();
    }

    #[test]
    fn test_tcp_late_reply_discarded() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).unwrap();
            // Confirm the first command only after the client timed out
            thread::sleep(Duration::from_millis(300));
            socket.write_all(b"True").unwrap();
            let _ = socket.read(&mut buf).unwrap();
            socket.write_all(b"False").unwrap();
        });

        let mut client = ProtocolClient::connect(
            &addr.to_string(),
            Duration::from_secs(1),
            Duration::from_millis(200),
            1024,
        )
        .unwrap();
        let joints = JointStore::default();
        assert_eq!(client.send_command(&joints), SendOutcome::TimedOut);
        assert_eq!(client.send_command(&joints), SendOutcome::Rejected("False".to_string()));
        server.join().unwrap();
    }
}

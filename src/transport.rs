use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::error::Result;

/// Default Telnet port the devices listen on.
const DEFAULT_PORT: u16 = 23;

/// How long a single line read may block before reporting "no data".
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1500);

/// Line-oriented link to a device, addressed by an opaque connection key.
///
/// The protocol engine is written against this trait so it can run over a
/// pooled TCP socket in production and a scripted transport in tests.
/// Lines are raw bytes because Telnet negotiation payloads are not UTF-8.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one line to the connection for `key`, exactly as given.
    ///
    /// Command lines carry their own trailing carriage return; negotiation
    /// replies are sent unterminated.
    async fn send_line(&self, key: &str, line: &[u8]) -> Result<()>;

    /// Read the next line for `key`, trimmed of its line terminator.
    ///
    /// Returns `None` when the connection is idle or closed. Data that
    /// arrives without a terminator (negotiation byte sequences) is still
    /// delivered once the read deadline passes.
    async fn read_line(&self, key: &str) -> Option<Vec<u8>>;

    /// Whether a connection record currently exists for `key`.
    fn connection_exists(&self, key: &str) -> bool;

    /// Record an error against `key` for the surrounding observability layer.
    fn report_error(&self, key: &str, message: &str);
}

struct Conn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Pooled TCP transport.
///
/// Connections are opened lazily the first time a key is used and kept
/// alive across operations. A key is either `host` (connected on the
/// default Telnet port) or `host:port`. Each key's connection is guarded by
/// its own lock, so distinct devices can be driven concurrently.
pub struct TcpTransport {
    connections: StdMutex<HashMap<String, Arc<Mutex<Conn>>>>,
    errors: StdMutex<HashMap<String, Vec<String>>>,
    read_timeout: Duration,
    default_port: u16,
}

impl TcpTransport {
    /// Create a transport with the default port and read timeout.
    pub fn new() -> Self {
        Self {
            connections: StdMutex::new(HashMap::new()),
            errors: StdMutex::new(HashMap::new()),
            read_timeout: DEFAULT_READ_TIMEOUT,
            default_port: DEFAULT_PORT,
        }
    }

    /// Override how long a read waits before reporting "no data".
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Override the port used for keys that do not carry one.
    pub fn with_default_port(mut self, default_port: u16) -> Self {
        self.default_port = default_port;
        self
    }

    /// Errors reported against `key` so far.
    pub fn errors(&self, key: &str) -> Vec<String> {
        self.errors
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn address(&self, key: &str) -> String {
        if key.contains(':') {
            key.to_string()
        } else {
            format!("{key}:{}", self.default_port)
        }
    }

    async fn conn_for(&self, key: &str) -> std::io::Result<Arc<Mutex<Conn>>> {
        if let Some(conn) = self.connections.lock().unwrap().get(key) {
            return Ok(conn.clone());
        }

        let addr = self.address(key);
        info!(%addr, "connecting");
        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        let conn = Arc::new(Mutex::new(Conn {
            reader: BufReader::new(read_half),
            writer: write_half,
        }));
        self.connections
            .lock()
            .unwrap()
            .insert(key.to_string(), conn.clone());
        Ok(conn)
    }

    fn drop_connection(&self, key: &str) {
        if self.connections.lock().unwrap().remove(key).is_some() {
            debug!(key, "dropped pooled connection");
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_line(&self, key: &str, line: &[u8]) -> Result<()> {
        let conn = self.conn_for(key).await?;
        let mut conn = conn.lock().await;
        debug!(key, line = %String::from_utf8_lossy(line).trim_end(), "sending");
        if let Err(e) = conn.writer.write_all(line).await {
            drop(conn);
            self.drop_connection(key);
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_line(&self, key: &str) -> Option<Vec<u8>> {
        let conn = match self.conn_for(key).await {
            Ok(conn) => conn,
            Err(e) => {
                self.report_error(key, &format!("connect failed: {e}"));
                return None;
            }
        };

        let mut conn = conn.lock().await;
        let mut buf = Vec::new();
        // read_until is cancel safe: bytes read before the deadline stay in
        // buf, so an unterminated negotiation sequence is still delivered.
        let closed = match timeout(self.read_timeout, conn.reader.read_until(b'\n', &mut buf)).await
        {
            Ok(Ok(0)) => true,
            Ok(Ok(_)) => false,
            Ok(Err(e)) => {
                self.report_error(key, &format!("read failed: {e}"));
                true
            }
            Err(_) => false,
        };
        drop(conn);

        if closed {
            self.drop_connection(key);
        }
        while matches!(buf.last(), Some(b'\r' | b'\n')) {
            buf.pop();
        }
        if buf.is_empty() {
            None
        } else {
            debug!(key, line = %String::from_utf8_lossy(&buf), "received");
            Some(buf)
        }
    }

    fn connection_exists(&self, key: &str) -> bool {
        self.connections.lock().unwrap().contains_key(key)
    }

    fn report_error(&self, key: &str, message: &str) {
        error!(key, message);
        self.errors
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(message.to_string());
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::Transport;
    use crate::error::Result;

    /// Scripted transport for driving the protocol engine in tests.
    ///
    /// Reads are served from a queue of `Some(line)` / `None` (silence)
    /// entries; every sent line is recorded for assertion.
    pub(crate) struct MockTransport {
        reads: Mutex<VecDeque<Option<Vec<u8>>>>,
        sent: Mutex<Vec<Vec<u8>>>,
        exists: AtomicBool,
        fail_send: AtomicBool,
        errors: Mutex<Vec<String>>,
    }

    impl MockTransport {
        /// A transport whose session record already exists, so operations
        /// skip negotiation.
        pub(crate) fn connected() -> Self {
            Self {
                reads: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
                exists: AtomicBool::new(true),
                fail_send: AtomicBool::new(false),
                errors: Mutex::new(Vec::new()),
            }
        }

        /// A transport with no session record yet; the first read or send
        /// creates one, the way the socket pool does.
        pub(crate) fn disconnected() -> Self {
            let mock = Self::connected();
            mock.exists.store(false, Ordering::SeqCst);
            mock
        }

        pub(crate) fn push_line(&self, line: &str) {
            self.push_bytes(line.as_bytes());
        }

        pub(crate) fn push_bytes(&self, bytes: &[u8]) {
            self.reads.lock().unwrap().push_back(Some(bytes.to_vec()));
        }

        pub(crate) fn push_silence(&self) {
            self.reads.lock().unwrap().push_back(None);
        }

        pub(crate) fn fail_sends(&self) {
            self.fail_send.store(true, Ordering::SeqCst);
        }

        pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn sent_lines(&self) -> Vec<String> {
            self.sent()
                .iter()
                .map(|line| String::from_utf8_lossy(line).into_owned())
                .collect()
        }

        pub(crate) fn errors(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }

        pub(crate) fn remaining_reads(&self) -> usize {
            self.reads.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send_line(&self, _key: &str, line: &[u8]) -> Result<()> {
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "scripted failure").into());
            }
            self.exists.store(true, Ordering::SeqCst);
            self.sent.lock().unwrap().push(line.to_vec());
            Ok(())
        }

        async fn read_line(&self, _key: &str) -> Option<Vec<u8>> {
            self.exists.store(true, Ordering::SeqCst);
            self.reads.lock().unwrap().pop_front().flatten()
        }

        fn connection_exists(&self, _key: &str) -> bool {
            self.exists.load(Ordering::SeqCst)
        }

        fn report_error(&self, _key: &str, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn bare_key_gets_default_port() {
        let transport = TcpTransport::new();
        assert_eq!(transport.address("10.0.1.50"), "10.0.1.50:23");
        assert_eq!(transport.address("10.0.1.50:2023"), "10.0.1.50:2023");
    }

    #[test]
    fn default_port_override() {
        let transport = TcpTransport::new().with_default_port(10023);
        assert_eq!(transport.address("dsp.example"), "dsp.example:10023");
    }

    #[tokio::test]
    async fn pooled_connection_is_reused_across_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let key = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"first\r\nsecond\r\n").await.unwrap();
            // Hold the socket open until the client is done.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let transport = TcpTransport::new().with_read_timeout(Duration::from_millis(500));
        assert!(!transport.connection_exists(&key));

        assert_eq!(transport.read_line(&key).await, Some(b"first".to_vec()));
        assert!(transport.connection_exists(&key));
        assert_eq!(transport.read_line(&key).await, Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn idle_read_returns_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let key = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let transport = TcpTransport::new().with_read_timeout(Duration::from_millis(100));
        assert_eq!(transport.read_line(&key).await, None);
        // The connection itself survives an idle read.
        assert!(transport.connection_exists(&key));
    }

    #[tokio::test]
    async fn unterminated_bytes_are_delivered_on_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let key = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Telnet IAC DO ECHO, no terminator.
            stream.write_all(&[0xff, 0xfd, 0x01]).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let transport = TcpTransport::new().with_read_timeout(Duration::from_millis(200));
        assert_eq!(transport.read_line(&key).await, Some(vec![0xff, 0xfd, 0x01]));
    }

    #[tokio::test]
    async fn eof_drops_the_pooled_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let key = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"goodbye\r\n").await.unwrap();
            stream.flush().await.unwrap();
            // Dropping the stream closes the connection.
        });

        let transport = TcpTransport::new().with_read_timeout(Duration::from_millis(500));
        assert_eq!(transport.read_line(&key).await, Some(b"goodbye".to_vec()));
        assert_eq!(transport.read_line(&key).await, None);
        assert!(!transport.connection_exists(&key));
    }

    #[tokio::test]
    async fn send_reaches_the_device() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let key = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            tokio::io::AsyncBufReadExt::read_line(&mut reader, &mut line)
                .await
                .unwrap();
            line
        });

        let transport = TcpTransport::new();
        transport
            .send_line(&key, b"Mixer1 get level 1\r\n")
            .await
            .unwrap();
        assert_eq!(server.await.unwrap(), "Mixer1 get level 1\r\n");
    }

    #[tokio::test]
    async fn reported_errors_accumulate_per_key() {
        let transport = TcpTransport::new();
        transport.report_error("a", "first");
        transport.report_error("a", "second");
        transport.report_error("b", "other");
        assert_eq!(transport.errors("a"), vec!["first", "second"]);
        assert_eq!(transport.errors("b"), vec!["other"]);
        assert!(transport.errors("c").is_empty());
    }
}

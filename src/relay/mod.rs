//! Pose relay
//!
//! Forwards opaque pose/control text messages to the downstream rig
//! controller over a single persistent TCP connection. The relay is
//! fire-and-forget: a missing or broken sink drops messages silently
//! (logged only) and never surfaces an error to the control channel.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outbound sink. Boxed so tests can substitute an in-memory writer.
pub(crate) type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// Relay to the rig (actuator) controller
///
/// At most one sink at a time; reconnecting replaces it, a write
/// failure clears it. The sink mutex also serializes sends so
/// interleaved writes cannot corrupt the newline framing.
pub struct PoseRelay {
    sink: Mutex<Option<Sink>>,
}

impl PoseRelay {
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
        }
    }

    /// Attempt to connect to the rig controller. Best-effort: failure
    /// is logged and leaves the relay disconnected.
    pub async fn connect(&self, host: &str, port: u16) -> bool {
        info!("Connecting to rig controller at {}:{}...", host, port);
        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                self.attach(Box::new(stream)).await;
                info!("Connected to rig controller at {}:{}", host, port);
                true
            }
            Err(e) => {
                warn!(
                    "Could not connect to rig controller at {}:{}: {} \
                     (continuing without rig control, pose data will be dropped)",
                    host, port, e
                );
                false
            }
        }
    }

    /// Install a sink, replacing any existing one
    pub(crate) async fn attach(&self, sink: Sink) {
        *self.sink.lock().await = Some(sink);
    }

    /// Forward one message, newline-delimited
    ///
    /// No-op when disconnected. Any write or flush failure clears the
    /// sink; later sends become no-ops until `connect` succeeds again.
    pub async fn send(&self, message: &str) {
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            debug!("Pose message dropped: relay not connected");
            return;
        };

        let result = async {
            sink.write_all(message.as_bytes()).await?;
            sink.write_all(b"\n").await?;
            sink.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("Relay write failed, dropping sink: {}", e);
            *guard = None;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    /// Flush and close the sink gracefully. Teardown errors are
    /// swallowed; shutdown must continue regardless.
    pub async fn close(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.flush().await;
            let _ = sink.shutdown().await;
            info!("Rig controller connection closed");
        }
    }
}

impl Default for PoseRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncReadExt;

    /// Writer that fails every operation
    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken")))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn send_appends_newline_delimiter() {
        let (tx, mut rx) = tokio::io::duplex(256);
        let relay = PoseRelay::new();
        relay.attach(Box::new(tx)).await;

        relay.send(r#"{"type":"pose","x":0}"#).await;

        let mut buf = vec![0u8; 64];
        let n = rx.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"{\"type\":\"pose\",\"x\":0}\n");
    }

    #[tokio::test]
    async fn send_without_sink_is_noop() {
        let relay = PoseRelay::new();
        assert!(!relay.is_connected().await);
        relay.send("ping").await;
        assert!(!relay.is_connected().await);
    }

    #[tokio::test]
    async fn write_failure_clears_sink() {
        let relay = PoseRelay::new();
        relay.attach(Box::new(BrokenSink)).await;
        assert!(relay.is_connected().await);

        relay.send("ping").await;
        assert!(!relay.is_connected().await);

        // Subsequent sends are silent no-ops
        relay.send("ping").await;
        assert!(!relay.is_connected().await);
    }

    #[tokio::test]
    async fn reconnect_after_failure_restores_sends() {
        let relay = PoseRelay::new();
        relay.attach(Box::new(BrokenSink)).await;
        relay.send("lost").await;
        assert!(!relay.is_connected().await);

        let (tx, mut rx) = tokio::io::duplex(256);
        relay.attach(Box::new(tx)).await;
        relay.send("ping").await;

        let mut buf = vec![0u8; 16];
        let n = rx.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping\n");
    }

    #[tokio::test]
    async fn connect_to_real_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let relay = PoseRelay::new();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        assert!(relay.connect("127.0.0.1", addr.port()).await);

        let mut peer = accept.await.unwrap();
        relay.send("ping").await;

        let mut buf = vec![0u8; 16];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping\n");

        relay.close().await;
        assert!(!relay.is_connected().await);
    }

    #[tokio::test]
    async fn failed_connect_is_nonfatal() {
        // Bind then drop to get a port that refuses connections
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let relay = PoseRelay::new();
        assert!(!relay.connect("127.0.0.1", port).await);
        assert!(!relay.is_connected().await);
    }
}

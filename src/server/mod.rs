//! Demo HTTP/1.0 server for exercising the client.
//!
//! Each accepted connection gets one request read, a fixed blocking delay,
//! the canned response and a close. At most `max_workers` connections are
//! handled at once; the rest wait in the listen backlog.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

use crate::config::ServerConfig;

/// Example HTTP response a server could send.
pub const HTTP_OK_RESPONSE: &[u8] = b"
HTTP/1.0 200 OK
Content-type: text/html
Content-Length: 70

<!DOCTYPE html>
<html>
<body>

<h1>HELLO WORLD!</h1>

</body>
</html>
";

const REQUEST_BUF_SIZE: usize = 1024;

pub struct DemoServer {
    listener: TcpListener,
    delay: Duration,
    workers: Arc<Semaphore>,
}

impl DemoServer {
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        Ok(Self {
            listener,
            delay: config.delay,
            workers: Arc::new(Semaphore::new(config.max_workers.max(1))),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until `shutdown` changes or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!("demo server listening on {}", self.local_addr()?);

        loop {
            // Take a worker slot first so excess clients queue in the backlog.
            let permit = tokio::select! {
                permit = Arc::clone(&self.workers).acquire_owned() => permit?,
                _ = shutdown.changed() => break,
            };

            let (socket, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("accept error: {}", e);
                        continue;
                    }
                },
                _ = shutdown.changed() => break,
            };

            let delay = self.delay;
            tokio::spawn(async move {
                if let Err(e) = handle_conn(socket, peer, delay, permit).await {
                    error!("Error handling {}: {:?}", peer, e);
                }
            });
        }

        info!("demo server stopped");
        Ok(())
    }
}

async fn handle_conn(
    mut socket: TcpStream,
    peer: SocketAddr,
    delay: Duration,
    _permit: OwnedSemaphorePermit,
) -> anyhow::Result<()> {
    info!("Connected by {}", peer);

    let mut request = [0u8; REQUEST_BUF_SIZE];
    let n = socket.read(&mut request).await?;
    debug!(%peer, bytes = n, "request received");

    // Mimic a CPU intensive task on the blocking pool.
    tokio::task::spawn_blocking(move || std::thread::sleep(delay)).await?;

    socket.write_all(HTTP_OK_RESPONSE).await?;
    socket.shutdown().await?;

    info!("Done handling {}", peer);
    Ok(())
}

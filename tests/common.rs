#![allow(dead_code)]

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Once;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = aioreq::logging::init_logging();
    });
}

fn localhost() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
}

/// Binds an ephemeral port and runs `handler` on every accepted connection.
pub async fn spawn_peer<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(localhost())
        .await
        .expect("bind ephemeral failed");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(handler(stream));
        }
    });

    addr
}

/// A port nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind(localhost())
        .await
        .expect("bind ephemeral failed");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr
}

/// Consumes the request up to its blank line, so closing afterwards is a
/// clean FIN rather than a reset.
pub async fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut buf = [0u8; 256];
    while !request.ends_with(b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    request
}

/// Replies with `body` after `delay`, then closes.
pub async fn spawn_static(body: &'static [u8], delay: Duration) -> SocketAddr {
    spawn_peer(move |mut stream| async move {
        read_request(&mut stream).await;
        time::sleep(delay).await;
        let _ = stream.write_all(body).await;
        let _ = stream.shutdown().await;
    })
    .await
}

/// Sends back exactly the bytes of the request.
pub async fn spawn_echo() -> SocketAddr {
    spawn_peer(|mut stream| async move {
        let request = read_request(&mut stream).await;
        let _ = stream.write_all(&request).await;
        let _ = stream.shutdown().await;
    })
    .await
}

/// Writes `chunks` one by one with a pause in between.
pub async fn spawn_chunked(chunks: &'static [&'static [u8]]) -> SocketAddr {
    spawn_peer(move |mut stream| async move {
        read_request(&mut stream).await;
        for chunk in chunks {
            let _ = stream.write_all(chunk).await;
            let _ = stream.flush().await;
            time::sleep(Duration::from_millis(20)).await;
        }
        let _ = stream.shutdown().await;
    })
    .await
}

/// Reads the request and then never answers nor closes.
pub async fn spawn_silent() -> SocketAddr {
    spawn_peer(|mut stream| async move {
        read_request(&mut stream).await;
        time::sleep(Duration::from_secs(3600)).await;
        drop(stream);
    })
    .await
}

/// Sends `prefix`, then aborts the connection with a reset.
pub async fn spawn_reset_after(prefix: &'static [u8]) -> SocketAddr {
    spawn_peer(move |mut stream| async move {
        read_request(&mut stream).await;
        let _ = stream.write_all(prefix).await;
        let _ = stream.flush().await;
        time::sleep(Duration::from_millis(50)).await;
        #[allow(deprecated)]
        let _ = stream.set_linger(Some(Duration::ZERO));
        drop(stream);
    })
    .await
}

/// Polls `cond` until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = time::Instant::now() + limit;
    while time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

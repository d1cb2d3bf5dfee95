//! The client core: endpoints, per-connection sessions and the coordinator
//! that multiplexes them.

pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod session;

use bytes::Bytes;

use crate::config::ClientConfig;
use coordinator::Coordinator;
use endpoint::Endpoint;
use error::{BatchError, RequestError};
use session::{ConnectionGauge, Session, REQUEST_LINE};

/// Sends the request line to `host:port` and returns everything the peer
/// wrote before closing the connection.
pub async fn get_request(host: &str, port: u16) -> Result<Bytes, RequestError> {
    Session::fetch(
        Endpoint::new(host, port),
        REQUEST_LINE,
        &ClientConfig::default(),
        ConnectionGauge::new(),
    )
    .await
}

/// Fetches all endpoints concurrently on the caller's runtime with the
/// default configuration. Payloads come back in input order.
///
/// ```no_run
/// # async fn demo() -> Result<(), aioreq::BatchError> {
/// let payloads = aioreq::get_requests([("127.0.0.1", 5000u16), ("127.0.0.1", 5001u16)]).await?;
/// assert_eq!(payloads.len(), 2);
/// # Ok(())
/// # }
/// ```
pub async fn get_requests<I, E>(endpoints: I) -> Result<Vec<Bytes>, BatchError>
where
    I: IntoIterator<Item = E>,
    E: Into<Endpoint>,
{
    Coordinator::default().run(endpoints).await
}

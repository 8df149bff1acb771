//! The pluggable boundary between a session and the network.
//!
//! This plays the role `service::HttpService` played in the crate this one
//! grew out of, but trades its `tower_service`-style `poll_ready`/`call`
//! shape for two `async fn`s, and a response body is read by explicit pull
//! (`next_chunk`) rather than by implementing `http_body::Body` directly.
//! The session only ever asks for "the next chunk, when it's ready" —
//! there's no push path by which a transport can hand the session more data
//! than it asked for.

use async_trait::async_trait;
use http::{Request, Response};

/// A transport-level error that can tell an ordinary, expected timeout
/// apart from anything else gone wrong.
///
/// The session treats the two differently: a request that simply timed out
/// waiting for data ends the same way a normal end-of-stream does, while any
/// other transport error is a real failure. `is_timeout` defaults to `false`
/// so implementations that have no such notion don't need to do anything.
pub trait TransportError: std::error::Error + Send + Sync + 'static {
    fn is_timeout(&self) -> bool {
        false
    }
}

/// Opens HTTP requests and returns a response whose body can be pulled
/// chunk by chunk.
///
/// Implemented by [`HyperTransport`] by default (feature `hyper`); anything
/// else that can open a request and hand back a pull-able body can stand
/// in, including the in-memory mock used by this crate's own tests.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Error: TransportError;
    type Body: TransportBody<Error = Self::Error> + Send;

    async fn open(&self, request: Request<Vec<u8>>) -> Result<Response<Self::Body>, Self::Error>;
}

/// A response body read by explicit pull.
#[async_trait]
pub trait TransportBody: Send {
    type Error;

    /// Reads the next chunk, or `Ok(None)` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, Self::Error>;
}

#[cfg(feature = "hyper")]
pub use hyper_backed::HyperTransport;

#[cfg(feature = "hyper")]
mod hyper_backed {
    use async_trait::async_trait;
    use http::{Request, Response};
    use http_body::Body as _;
    use hyper_pkg::client::{Client, HttpConnector};
    use hyper_pkg::Body as HyperBody;
    use hyper_tls::HttpsConnector;

    use super::{Transport, TransportBody, TransportError};

    impl TransportError for hyper_pkg::Error {
        fn is_timeout(&self) -> bool {
            self.is_timeout()
        }
    }

    /// The default [`Transport`], backed by [`hyper`](hyper_pkg) with TLS
    /// support via `hyper-tls`, matching the connector the crate this one
    /// grew out of used by default.
    #[derive(Clone)]
    pub struct HyperTransport {
        client: Client<HttpsConnector<HttpConnector>, hyper_pkg::Body>,
    }

    impl Default for HyperTransport {
        fn default() -> Self {
            HyperTransport {
                client: Client::builder().build(HttpsConnector::new()),
            }
        }
    }

    impl HyperTransport {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl Transport for HyperTransport {
        type Error = hyper_pkg::Error;
        type Body = HyperBodyAdapter;

        async fn open(
            &self,
            request: http::Request<Vec<u8>>,
        ) -> Result<Response<Self::Body>, Self::Error> {
            let (parts, body) = request.into_parts();
            let request = Request::from_parts(parts, HyperBody::from(body));
            let response = self.client.request(request).await?;
            Ok(response.map(HyperBodyAdapter))
        }
    }

    /// Wraps [`hyper::Body`](hyper_pkg::Body) so its push-based
    /// `http_body::Body::poll_data` can be driven by a pull-shaped
    /// `next_chunk` instead.
    pub struct HyperBodyAdapter(HyperBody);

    #[async_trait]
    impl TransportBody for HyperBodyAdapter {
        type Error = hyper_pkg::Error;

        async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, Self::Error> {
            match self.0.data().await {
                Some(Ok(bytes)) => Ok(Some(bytes.to_vec())),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
pub mod mock {
    //! An in-memory [`Transport`] for deterministic session tests: it never
    //! touches the network, and yields exactly the chunks it was built
    //! with.

    use std::convert::Infallible;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use http::{Request, Response, StatusCode};

    use super::{Transport, TransportBody, TransportError};

    impl TransportError for Infallible {}

    pub struct MockTransport {
        status: StatusCode,
        chunks: Mutex<Vec<Vec<u8>>>,
        /// When true, the body never yields `Ok(None)` after its chunks run
        /// out — it just never completes again, the way a real idle
        /// keep-alive connection would. Lets a test hold a session open
        /// past its scripted chunks without racing an end-of-stream event.
        keep_open: bool,
    }

    impl MockTransport {
        /// A body that ends normally (`Ok(None)`) once `chunks` is exhausted.
        pub fn new(status: StatusCode, chunks: Vec<Vec<u8>>) -> Self {
            MockTransport {
                status,
                chunks: Mutex::new(chunks),
                keep_open: false,
            }
        }

        /// A body that stays open indefinitely once `chunks` is exhausted,
        /// for tests that drive a session past its initial chunks.
        pub fn persistent(status: StatusCode, chunks: Vec<Vec<u8>>) -> Self {
            MockTransport {
                status,
                chunks: Mutex::new(chunks),
                keep_open: true,
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        type Error = Infallible;
        type Body = MockBody;

        async fn open(&self, _request: Request<Vec<u8>>) -> Result<Response<Self::Body>, Self::Error> {
            let chunks = self.chunks.lock().unwrap().clone();
            let mut response = Response::new(MockBody {
                chunks,
                next: 0,
                keep_open: self.keep_open,
            });
            *response.status_mut() = self.status;
            Ok(response)
        }
    }

    pub struct MockBody {
        chunks: Vec<Vec<u8>>,
        next: usize,
        keep_open: bool,
    }

    #[async_trait]
    impl TransportBody for MockBody {
        type Error = Infallible;

        async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, Self::Error> {
            if self.next >= self.chunks.len() {
                if self.keep_open {
                    std::future::pending::<()>().await;
                }
                return Ok(None);
            }
            let chunk = self.chunks[self.next].clone();
            self.next += 1;
            Ok(Some(chunk))
        }
    }

    #[tokio::test]
    async fn yields_chunks_in_order_then_ends() {
        let transport = MockTransport::new(StatusCode::OK, vec![b"a".to_vec(), b"b".to_vec()]);
        let mut response = transport
            .open(Request::new(Vec::new()))
            .await
            .unwrap();
        assert_eq!(response.body_mut().next_chunk().await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(response.body_mut().next_chunk().await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(response.body_mut().next_chunk().await.unwrap(), None);
    }
}

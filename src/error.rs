//! Error type

pub use http::StatusCode;

use std::error;
use std::fmt::{self, Display, Formatter};

/// An error that can surface from starting, running, or addressing a
/// streaming session.
///
/// The `E` parameter is the transport's own error type (see
/// [`crate::transport::Transport`]), boxed by default the same way the
/// underlying HTTP client's error was boxed in the crate this type grew out
/// of.
#[derive(Debug)]
pub enum Error<E = Box<dyn error::Error + Send + Sync>> {
    /// The handler's `init` callback refused to start the session.
    InitRefused(String),
    /// The transport failed to open the request at all (DNS, connect,
    /// TLS, ...).
    TransportOpen(E),
    /// The server answered with a non-2xx status.
    Http(StatusCode),
    /// The transport failed partway through reading the response body.
    TransportMid(E),
    /// A complete record (a segment terminated by the frame separator)
    /// did not decode as JSON. Carries a short description; the raw bytes
    /// stay in the session's log rather than the error itself.
    InvalidJson(String),
    /// A handler callback panicked. The session always treats this as
    /// fatal: the panic is caught so one broken callback invocation can't
    /// poison the runtime, but the state it held is gone, so the session
    /// can't keep going as if nothing happened.
    HandlerPanicked(String),
    /// The handler asked the session to stop, or the facade handle was
    /// dropped.
    Stopped(String),
    /// The session actor itself is gone (it has already terminated) by the
    /// time a query reached it.
    SessionGone,
}

impl<E: error::Error + 'static> error::Error for Error<E> {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        use Error::*;

        match self {
            TransportOpen(e) | TransportMid(e) => Some(e),
            InitRefused(_) | Http(_) | InvalidJson(_) | HandlerPanicked(_) | Stopped(_)
            | SessionGone => None,
        }
    }
}

impl<E: Display> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use Error::*;

        match self {
            InitRefused(reason) => write!(f, "handler refused to start: {}", reason),
            TransportOpen(e) => write!(f, "failed to open request: {}", e),
            Http(code) => write!(f, "HTTP status code: {}", code),
            TransportMid(e) => write!(f, "transport error while streaming: {}", e),
            InvalidJson(desc) => write!(f, "invalid JSON record: {}", desc),
            HandlerPanicked(msg) => write!(f, "handler panicked: {}", msg),
            Stopped(reason) => write!(f, "session stopped: {}", reason),
            SessionGone => write!(f, "session actor is no longer running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_displays_the_status_code() {
        let err: Error<std::convert::Infallible> = Error::Http(StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "HTTP status code: 401 Unauthorized");
    }
}

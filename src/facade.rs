//! The crate's public entry points: starting a session and addressing one
//! once it's running.
//!
//! Mirrors the one-line method constructors (`Builder::filter`,
//! `Builder::sample`, ...) the crate this one grew out of exposed, but
//! returns a running [`SessionHandle`] directly instead of a lazily-built
//! request, since every method here commits to opening a connection.

use std::error;

use serde_json::Value;

use crate::credentials::Credentials;
use crate::error::Error;
use crate::handler::StreamHandler;
use crate::session::{self, SessionHandle, StartParams};
use crate::transport::Transport;
use crate::url::MethodOption;

#[cfg(feature = "hyper")]
use crate::transport::HyperTransport;

type BoxError = Box<dyn error::Error + Send + Sync>;

/// Credentials and method options needed to start a session, independent of
/// which streaming method is used.
pub struct StartOptions {
    pub username: String,
    pub password: String,
    pub options: Vec<MethodOption>,
}

impl StartOptions {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        StartOptions {
            username: username.into(),
            password: password.into(),
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: Vec<MethodOption>) -> Self {
        self.options = options;
        self
    }
}

/// Starts a new session against `base_url` using a caller-supplied
/// transport, dispatching callbacks to `handler`.
///
/// This is the general entry point every one-line method wrapper below
/// calls into; use it directly to stream from a method this crate doesn't
/// name explicitly, or to plug in a transport other than
/// [`HyperTransport`](crate::transport::HyperTransport).
pub async fn start<H, T>(
    handler: H,
    init_args: H::InitArgs,
    base_url: impl Into<String>,
    transport: T,
    opts: StartOptions,
) -> Result<SessionHandle, Error<BoxError>>
where
    H: StreamHandler,
    T: Transport,
{
    session::spawn(StartParams {
        handler,
        init_args,
        credentials: Credentials::new(opts.username, opts.password),
        transport,
        base_url: base_url.into(),
        options: opts.options,
    })
    .await
}

#[cfg(feature = "hyper")]
async fn start_with_default_transport<H>(
    handler: H,
    init_args: H::InitArgs,
    base_url: &str,
    opts: StartOptions,
) -> Result<SessionHandle, Error<BoxError>>
where
    H: StreamHandler,
{
    start(handler, init_args, base_url, HyperTransport::new(), opts).await
}

/// Filters the stream by keywords, users, and/or locations.
///
/// <https://stream.twitter.com/1.1/statuses/filter.json> (or whichever
/// equivalent endpoint `opts` is configured against via a different base
/// URL — the crate itself is agnostic to Twitter's specific hostnames).
#[cfg(feature = "hyper")]
pub async fn filter<H>(
    handler: H,
    init_args: H::InitArgs,
    base_url: &str,
    opts: StartOptions,
) -> Result<SessionHandle, Error<BoxError>>
where
    H: StreamHandler,
{
    start_with_default_transport(handler, init_args, base_url, opts).await
}

/// Subscribes to the full, unfiltered firehose.
#[cfg(feature = "hyper")]
pub async fn firehose<H>(
    handler: H,
    init_args: H::InitArgs,
    base_url: &str,
    opts: StartOptions,
) -> Result<SessionHandle, Error<BoxError>>
where
    H: StreamHandler,
{
    start_with_default_transport(handler, init_args, base_url, opts).await
}

/// Subscribes to public statuses that contain links.
#[cfg(feature = "hyper")]
pub async fn links<H>(
    handler: H,
    init_args: H::InitArgs,
    base_url: &str,
    opts: StartOptions,
) -> Result<SessionHandle, Error<BoxError>>
where
    H: StreamHandler,
{
    start_with_default_transport(handler, init_args, base_url, opts).await
}

/// Subscribes to a random sample of public statuses.
#[cfg(feature = "hyper")]
pub async fn sample<H>(
    handler: H,
    init_args: H::InitArgs,
    base_url: &str,
    opts: StartOptions,
) -> Result<SessionHandle, Error<BoxError>>
where
    H: StreamHandler,
{
    start_with_default_transport(handler, init_args, base_url, opts).await
}

/// Subscribes to an edited/retweet-focused subset of public statuses.
#[cfg(feature = "hyper")]
pub async fn retweet<H>(
    handler: H,
    init_args: H::InitArgs,
    base_url: &str,
    opts: StartOptions,
) -> Result<SessionHandle, Error<BoxError>>
where
    H: StreamHandler,
{
    start_with_default_transport(handler, init_args, base_url, opts).await
}

/// Switches a running session to a different method, cancelling whatever
/// request is currently in flight.
pub async fn switch_method(
    server: &SessionHandle,
    base_url: impl Into<String>,
    options: Vec<MethodOption>,
) -> Result<(), Error<BoxError>> {
    server.switch_method(base_url, options).await
}

/// Returns the base URL of the method `server` currently has in flight.
pub async fn current_method(server: &SessionHandle) -> Result<Option<String>, Error<BoxError>> {
    server.current_method().await
}

/// Issues a synchronous query against the handler behind `server`.
pub async fn call(server: &SessionHandle, request: Value) -> Result<Value, Error<BoxError>> {
    server.call(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{CallOutcome, InitOutcome, Outcome};
    use crate::transport::mock::MockTransport;
    use http::StatusCode;

    #[derive(Clone, Default)]
    struct Echo;

    impl StreamHandler for Echo {
        type State = ();
        type InitArgs = ();

        fn init(&mut self, _args: ()) -> InitOutcome<()> {
            InitOutcome::Start(())
        }

        fn handle_status(&mut self, _status: Value, state: ()) -> Outcome<()> {
            Outcome::continue_with(state)
        }

        fn handle_event(&mut self, _name: EventName, _raw: Value, state: ()) -> Outcome<()> {
            Outcome::continue_with(state)
        }

        fn handle_call(&mut self, request: Value, state: ()) -> CallOutcome<()> {
            CallOutcome::Reply {
                reply: request,
                outcome: Outcome::continue_with(state),
            }
        }

        fn handle_info(&mut self, _info: String, state: ()) -> Outcome<()> {
            Outcome::continue_with(state)
        }

        fn terminate(&mut self, _reason: Option<String>, _state: ()) {}
    }

    #[tokio::test]
    async fn start_opens_a_session_against_a_caller_supplied_transport() {
        let transport = MockTransport::persistent(StatusCode::OK, vec![]);
        let opts = StartOptions::new("user", "pass");

        let handle = start(Echo, (), "https://example.com/a.json", transport, opts)
            .await
            .unwrap();

        assert_eq!(
            current_method(&handle).await.unwrap(),
            Some("https://example.com/a.json".to_owned())
        );

        let reply = call(&handle, serde_json::json!({"ping": true}))
            .await
            .unwrap();
        assert_eq!(reply, serde_json::json!({"ping": true}));
    }

    #[tokio::test]
    async fn switch_method_moves_to_the_new_url() {
        let transport = MockTransport::persistent(StatusCode::OK, vec![]);
        let opts = StartOptions::new("user", "pass");

        let handle = start(Echo, (), "https://example.com/a.json", transport, opts)
            .await
            .unwrap();

        switch_method(&handle, "https://example.com/b.json", Vec::new())
            .await
            .unwrap();

        assert_eq!(
            current_method(&handle).await.unwrap(),
            Some("https://example.com/b.json".to_owned())
        );
    }
}

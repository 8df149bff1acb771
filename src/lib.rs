#![deny(intra_doc_link_resolution_failure)]
#![warn(missing_docs)]

/*!
# streamline

A long-lived actor for consuming a chunked, newline-delimited-JSON streaming
HTTP endpoint (in the shape of the legacy Twitter Streaming API) and
dispatching typed callbacks to a user-supplied handler.

## Overview

A session is a single-threaded actor: it owns a [`handler::StreamHandler`]
and the state threaded through its callbacks, opens one HTTP request at a
time through a pluggable [`transport::Transport`], and reassembles the
response body into JSON records as they arrive. Callers talk to a running
session only through a [`session::SessionHandle`], which can switch the
active method, ask what method is currently active, or issue a synchronous
query answered by the handler's own `handle_call` callback.

```no_run
use serde_json::Value;
use streamline::facade::{self, StartOptions};
use streamline::handler::{CallOutcome, EventName, InitOutcome, Outcome, StreamHandler};

struct Printer;

impl StreamHandler for Printer {
    type State = ();
    type InitArgs = ();

    fn init(&mut self, _args: ()) -> InitOutcome<()> {
        InitOutcome::Start(())
    }

    fn handle_status(&mut self, status: Value, state: ()) -> Outcome<()> {
        println!("{}", status);
        Outcome::continue_with(state)
    }

    fn handle_event(&mut self, _name: EventName, _event: Value, state: ()) -> Outcome<()> {
        Outcome::continue_with(state)
    }

    fn handle_call(&mut self, _request: Value, state: ()) -> CallOutcome<()> {
        CallOutcome::Reply { reply: Value::Null, outcome: Outcome::continue_with(state) }
    }

    fn handle_info(&mut self, info: String, state: ()) -> Outcome<()> {
        eprintln!("info: {}", info);
        Outcome::continue_with(state)
    }

    fn terminate(&mut self, _reason: Option<String>, _state: ()) {}
}

# #[tokio::main]
# async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
let opts = StartOptions::new("username", "password");
let _handle = facade::sample(
    Printer,
    (),
    "https://stream.example.com/1.1/statuses/sample.json",
    opts,
)
.await?;
# Ok(())
# }
```

## Stalls and keep-alives

The underlying streaming endpoint sends a blank line every 30 seconds or so
as a "keep-alive" signal; [`frame::FrameExtractor`] discards these, so a
handler never sees an empty record. This also means a handler cannot use the
absence of records to detect a stalled connection: set a timeout on the
transport itself (e.g. a read timeout on the `hyper` client) if you need one.
*/

pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod facade;
pub mod frame;
pub mod geo;
pub mod handler;
pub mod session;
pub mod transport;
pub mod url;

pub use credentials::Credentials;
pub use error::Error;
pub use handler::{CallOutcome, EventName, InitOutcome, Outcome, StreamHandler};
pub use session::{RequestToken, SessionHandle};

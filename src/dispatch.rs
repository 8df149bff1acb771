//! Invokes a [`StreamHandler`] callback and normalizes whatever it does
//! (returns normally, or panics) into a [`Dispatched`] the session can act
//! on without ever unwinding past this module.
//!
//! This is the Rust-shaped analog of the `bad_return(value)` safeguard
//! described for the callback boundary: Erlang converts a callback's
//! malformed response or raised exception into a predictable exit reason,
//! and `std::panic::catch_unwind` plays the same role here. Rust has no
//! equivalent to a `catch`-based control-flow success path, so this module
//! only ever uses unwinding to recover from a genuine callback bug, never
//! to signal an ordinary outcome.

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use crate::handler::{CallOutcome, EventName, InitOutcome, Outcome, StreamHandler};

/// The result of dispatching one callback invocation: either the handler's
/// own outcome, or a description of the panic it raised.
pub enum Dispatched<T> {
    Ok(T),
    Panicked(String),
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked with a non-string payload".to_owned()
    }
}

fn guard<T>(f: impl FnOnce() -> T) -> Dispatched<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Dispatched::Ok(value),
        Err(payload) => Dispatched::Panicked(panic_message(payload)),
    }
}

pub fn init<H: StreamHandler>(
    handler: &mut H,
    args: H::InitArgs,
) -> Dispatched<InitOutcome<H::State>> {
    guard(AssertUnwindSafe(|| handler.init(args)))
}

pub fn handle_status<H: StreamHandler>(
    handler: &mut H,
    status: Value,
    state: H::State,
) -> Dispatched<Outcome<H::State>> {
    guard(AssertUnwindSafe(|| handler.handle_status(status, state)))
}

pub fn handle_event<H: StreamHandler>(
    handler: &mut H,
    name: EventName,
    event: Value,
    state: H::State,
) -> Dispatched<Outcome<H::State>> {
    guard(AssertUnwindSafe(|| handler.handle_event(name, event, state)))
}

pub fn handle_call<H: StreamHandler>(
    handler: &mut H,
    request: Value,
    state: H::State,
) -> Dispatched<CallOutcome<H::State>> {
    guard(AssertUnwindSafe(|| handler.handle_call(request, state)))
}

pub fn handle_info<H: StreamHandler>(
    handler: &mut H,
    info: String,
    state: H::State,
) -> Dispatched<Outcome<H::State>> {
    guard(AssertUnwindSafe(|| handler.handle_info(info, state)))
}

/// `terminate` never has an outcome to hand back; it's invoked purely for
/// its side effects as the session tears down. A panic here is logged by
/// the caller and swallowed — the session is already shutting down, so
/// there is no state left to protect.
pub fn terminate<H: StreamHandler>(handler: &mut H, reason: Option<String>, state: H::State) {
    if let Dispatched::Panicked(msg) = guard(AssertUnwindSafe(|| handler.terminate(reason, state)))
    {
        tracing::warn!(panic = %msg, "terminate callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{CallOutcome, EventName, InitOutcome, Outcome, StreamHandler};

    struct Flaky {
        panic_on_status: bool,
    }

    impl StreamHandler for Flaky {
        type State = u32;
        type InitArgs = ();

        fn init(&mut self, _args: ()) -> InitOutcome<u32> {
            InitOutcome::Start(0)
        }

        fn handle_status(&mut self, _status: Value, state: u32) -> Outcome<u32> {
            if self.panic_on_status {
                panic!("boom");
            }
            Outcome::continue_with(state + 1)
        }

        fn handle_event(&mut self, _n: EventName, _e: Value, state: u32) -> Outcome<u32> {
            Outcome::continue_with(state)
        }

        fn handle_call(&mut self, _r: Value, state: u32) -> CallOutcome<u32> {
            CallOutcome::Reply {
                reply: Value::Null,
                outcome: Outcome::continue_with(state),
            }
        }

        fn handle_info(&mut self, _i: String, state: u32) -> Outcome<u32> {
            Outcome::continue_with(state)
        }

        fn terminate(&mut self, _reason: Option<String>, _state: u32) {}
    }

    #[test]
    fn well_behaved_callback_returns_its_outcome() {
        let mut handler = Flaky {
            panic_on_status: false,
        };
        match handle_status(&mut handler, Value::Null, 0) {
            Dispatched::Ok(Outcome::Continue(state)) => assert_eq!(state, 1),
            _ => panic!("expected Ok(Continue)"),
        }
    }

    #[test]
    fn panicking_callback_is_caught_and_reported() {
        let mut handler = Flaky {
            panic_on_status: true,
        };
        match handle_status(&mut handler, Value::Null, 0) {
            Dispatched::Panicked(msg) => assert_eq!(msg, "boom"),
            Dispatched::Ok(_) => panic!("expected a caught panic"),
        }
    }
}

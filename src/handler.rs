//! The user-supplied callback surface, and the outcomes it returns.
//!
//! Callbacks are ordinary synchronous methods rather than `async fn`, which
//! lets the dispatcher in [`crate::dispatch`] wrap every call in
//! `std::panic::catch_unwind` without fighting `UnwindSafe` bounds on a
//! future.

use serde_json::Value;

/// The name of a non-status event delivered on the stream.
///
/// Mirrors the event tags the legacy Twitter streaming wire format used
/// (`favorite`, `block`, `follow`, ...); anything this crate doesn't know
/// about by name is preserved as [`EventName::Custom`] rather than dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventName {
    /// Synthesized when a request's response headers arrive, before any
    /// record from the body has been dispatched. Never produced by
    /// [`EventName::from_wire`] — the wire never sends this tag itself.
    StreamStart,
    /// Synthesized when a 200 response ends normally.
    StreamEnd,
    /// Synthesized when a non-200 response ends; carries `{code, headers,
    /// body}` as its data.
    StreamError,
    Favorite,
    Unfavorite,
    ListCreated,
    ListDestroyed,
    ListUpdated,
    ListMemberAdded,
    ListMemberRemoved,
    ListUserSubscribed,
    ListUserUnsubscribed,
    QuotedTweet,
    AccessRevoked,
    Block,
    Unblock,
    Follow,
    Unfollow,
    UserUpdate,
    Custom(String),
}

impl EventName {
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "favorite" => EventName::Favorite,
            "unfavorite" => EventName::Unfavorite,
            "list_created" => EventName::ListCreated,
            "list_destroyed" => EventName::ListDestroyed,
            "list_updated" => EventName::ListUpdated,
            "list_member_added" => EventName::ListMemberAdded,
            "list_member_removed" => EventName::ListMemberRemoved,
            "list_user_subscribed" => EventName::ListUserSubscribed,
            "list_user_unsubscribed" => EventName::ListUserUnsubscribed,
            "quoted_tweet" => EventName::QuotedTweet,
            "access_revoked" => EventName::AccessRevoked,
            "block" => EventName::Block,
            "unblock" => EventName::Unblock,
            "follow" => EventName::Follow,
            "unfollow" => EventName::Unfollow,
            "user_update" => EventName::UserUpdate,
            other => EventName::Custom(other.to_owned()),
        }
    }
}

/// What a callback wants the session to do next.
///
/// This is the Rust-shaped analog of the `{ok, State}` / `{stop, Reason,
/// State}` return convention the callbacks mirror: instead of a tagged tuple
/// it's a two-variant enum, and instead of a panic/exit meaning "stop with
/// an error" the dispatcher converts a caught panic into
/// [`crate::error::Error::HandlerPanicked`] on the caller's behalf.
#[derive(Debug)]
pub enum Outcome<S> {
    /// Keep the session running with the (possibly updated) state.
    Continue(S),
    /// End the session. `reason` becomes part of the error the facade's
    /// awaiting callers and the `terminate` callback observe.
    Stop { state: S, reason: String },
}

impl<S> Outcome<S> {
    pub fn continue_with(state: S) -> Self {
        Outcome::Continue(state)
    }

    pub fn stop(state: S, reason: impl Into<String>) -> Self {
        Outcome::Stop {
            state,
            reason: reason.into(),
        }
    }
}

/// The result of [`StreamHandler::init`]: either an initial state to start
/// the session with, or a refusal to start at all.
#[derive(Debug)]
pub enum InitOutcome<S> {
    Start(S),
    Refuse { reason: String },
}

/// The result of [`StreamHandler::handle_call`]: an [`Outcome`] plus a reply
/// value sent back to whichever `call` is waiting on it.
#[derive(Debug)]
pub enum CallOutcome<S> {
    Reply {
        reply: Value,
        outcome: Outcome<S>,
    },
    /// Defer the reply to a later point. Unused by any callback in this
    /// crate today; kept so a future asynchronous reply path doesn't need a
    /// new variant.
    NoReply(Outcome<S>),
}

/// User-supplied callbacks dispatched by a running session.
///
/// `S` is the handler's own state, threaded through every callback the way
/// an actor's state is threaded through its message loop: each call receives
/// the state the previous call returned and hands back the state for the
/// next one.
pub trait StreamHandler: Send + 'static {
    type State: Send + 'static;
    /// Arguments passed to `init` when a session starts, e.g. a method name
    /// and filter parameters the handler wants to remember.
    type InitArgs: Send + 'static;

    /// Called once, before the session opens its first request. Returning
    /// [`InitOutcome::Refuse`] aborts the start entirely; no request is ever
    /// sent.
    fn init(&mut self, args: Self::InitArgs) -> InitOutcome<Self::State>;

    /// Called for every record whose top-level shape looks like a Tweet
    /// (i.e. any record that isn't recognized as an event, a control message
    /// or a limit notice).
    fn handle_status(&mut self, status: Value, state: Self::State) -> Outcome<Self::State>;

    /// Called for every record recognized as a named event.
    fn handle_event(
        &mut self,
        name: EventName,
        event: Value,
        state: Self::State,
    ) -> Outcome<Self::State>;

    /// Called when a caller issues [`crate::facade::call`] against the
    /// running session. The `request` value and the `reply` value are both
    /// opaque to the session; only the handler interprets them.
    fn handle_call(
        &mut self,
        request: Value,
        state: Self::State,
    ) -> CallOutcome<Self::State>;

    /// Called for session-internal notifications that aren't a reply to any
    /// particular caller: transport errors being retried, reconnect
    /// attempts, stall warnings and the like. `info` is a human-readable
    /// summary, not a wire record.
    fn handle_info(&mut self, info: String, state: Self::State) -> Outcome<Self::State>;

    /// Called exactly once as the session shuts down, however it was
    /// triggered (handler-requested stop, transport error, or the facade
    /// being dropped). `reason` is `None` only for a normal user-requested
    /// stop.
    fn terminate(&mut self, reason: Option<String>, state: Self::State);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_tag_is_preserved_verbatim() {
        assert_eq!(
            EventName::from_wire("banhammer_dropped"),
            EventName::Custom("banhammer_dropped".to_owned())
        );
    }

    #[test]
    fn known_event_tags_map_to_named_variants() {
        assert_eq!(EventName::from_wire("favorite"), EventName::Favorite);
        assert_eq!(EventName::from_wire("block"), EventName::Block);
    }
}

//! Shared SSE plumbing: every protocol folds a [`KiroEvent`] stream into its own response
//! fragment type, then this queues and serializes whatever that fold produces. One upstream
//! event can expand to zero, one, or several client-visible events, so a small queue sits
//! between the two stream layers rather than a 1:1 `map`.

use std::collections::VecDeque;
use std::task::Poll;

use axum::response::sse::Event;
use futures::{Stream, StreamExt};
use serde::Serialize;

use kiro_schema::kiro::KiroEvent;

use crate::error::KiroError;
use crate::flow::FlowStatus;
use crate::server::outcome::CancelGuard;
use crate::translate::estimate_tokens;

/// Reports the request's outcome via `guard` exactly once: `Success` when the upstream stream
/// ends cleanly, `Failure` if it errors. If neither happens because the client disconnected and
/// this stream got dropped first, `guard`'s own `Drop` reports `Cancelled`.
///
/// A mid-stream error never reaches the caller as a `Result::Err` on the returned stream — once
/// bytes have already gone out over SSE the client has no way to read an HTTP-level error any
/// more, so `on_error` folds it into one last in-band, protocol-shaped event instead and the
/// stream then ends cleanly.
pub fn build_sse_stream<S, T, F, E>(
    initial: Vec<T>,
    mut events: S,
    mut on_event: F,
    mut on_error: E,
    mut guard: Option<CancelGuard>,
) -> impl Stream<Item = Result<Event, KiroError>>
where
    S: Stream<Item = Result<KiroEvent, KiroError>> + Unpin,
    F: FnMut(KiroEvent) -> Vec<T>,
    E: FnMut(&KiroError) -> Vec<T>,
    T: Serialize,
{
    let mut queue: VecDeque<T> = initial.into();
    let mut tokens_out: u32 = 0;
    let mut done = false;
    futures::stream::poll_fn(move |cx| loop {
        if let Some(item) = queue.pop_front() {
            let event = Event::default()
                .json_data(item)
                .map_err(|err| KiroError::ProtocolTranslationError(err.to_string()));
            return Poll::Ready(Some(event));
        }
        if done {
            return Poll::Ready(None);
        }
        match futures::ready!(events.poll_next_unpin(cx)) {
            Some(Ok(kiro_event)) => {
                if let KiroEvent::AssistantResponse(e) = &kiro_event {
                    tokens_out += estimate_tokens(&e.content);
                }
                queue.extend(on_event(kiro_event));
            }
            Some(Err(err)) => {
                queue.extend(on_error(&err));
                done = true;
                if let Some(guard) = guard.take() {
                    guard.complete(FlowStatus::Failure, tokens_out);
                }
            }
            None => {
                done = true;
                if let Some(guard) = guard.take() {
                    guard.complete(FlowStatus::Success, tokens_out);
                }
            }
        }
    })
}

//! Upstream Client (spec §4.6): builds the HTTP call to the CodeWhisperer-style endpoint and
//! decodes its event-framed streaming response.

mod client;
mod stream;

pub use client::UpstreamClient;
pub use stream::decode_events;

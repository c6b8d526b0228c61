//! Decodes the upstream's event framing: length-prefixed events, each a small header of
//! key-value pairs followed by a JSON payload (spec §4.6). The header carries an `event-type`
//! key that selects which [`KiroEvent`] variant the payload deserializes into.

use bytes::Bytes;
use futures::Stream;
use kiro_schema::kiro::{
    AssistantResponseEvent, FollowupPromptEvent, KiroEvent, MessageStopEvent, ToolUseEvent,
};

use crate::error::KiroError;

const EVENT_TYPE_HEADER: &str = "event-type";

/// Spec §5: inter-chunk idle during streaming is classified as a Network error past this bound.
const INTER_CHUNK_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Incremental frame parser: feed it bytes as they arrive off the wire, pull complete frames out
/// as soon as enough bytes have accumulated. Kept separate from the async stream plumbing below
/// so the framing logic itself is unit-testable without a real HTTP response.
#[derive(Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn has_trailing_bytes(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Pulls one complete frame out of the buffer, if one is available, and decodes it into a
    /// [`KiroEvent`]. Returns `Ok(None)` when more bytes are needed.
    pub fn next_event(&mut self) -> Result<Option<KiroEvent>, KiroError> {
        // [ total_len: u32 BE ][ header_len: u32 BE ][ header_len bytes ][ remaining = payload ]
        if self.buf.len() < 8 {
            return Ok(None);
        }
        let total_len = u32::from_be_bytes(self.buf[0..4].try_into().unwrap()) as usize;
        if self.buf.len() < 4 + total_len {
            return Ok(None);
        }
        let header_len = u32::from_be_bytes(self.buf[4..8].try_into().unwrap()) as usize;
        if header_len > total_len.saturating_sub(4) {
            return Err(KiroError::ProtocolTranslationError(
                "upstream frame header length exceeds frame length".to_string(),
            ));
        }

        let header_start = 8;
        let header_end = header_start + header_len;
        let payload_end = 4 + total_len;
        let headers = parse_headers(&self.buf[header_start..header_end])?;
        let payload = &self.buf[header_end..payload_end];

        let event_type = headers
            .iter()
            .find(|(key, _)| key == EVENT_TYPE_HEADER)
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| {
                KiroError::ProtocolTranslationError("upstream frame missing event-type header".to_string())
            })?;

        let event = decode_payload(event_type, payload)?;
        self.buf.drain(0..payload_end);
        Ok(Some(event))
    }
}

fn parse_headers(mut bytes: &[u8]) -> Result<Vec<(String, String)>, KiroError> {
    let mut headers = Vec::new();
    while !bytes.is_empty() {
        let key_len = bytes[0] as usize;
        bytes = &bytes[1..];
        if bytes.len() < key_len + 2 {
            return Err(KiroError::ProtocolTranslationError(
                "truncated upstream frame header".to_string(),
            ));
        }
        let key = String::from_utf8_lossy(&bytes[..key_len]).into_owned();
        bytes = &bytes[key_len..];
        let value_len = u16::from_be_bytes(bytes[0..2].try_into().unwrap()) as usize;
        bytes = &bytes[2..];
        if bytes.len() < value_len {
            return Err(KiroError::ProtocolTranslationError(
                "truncated upstream frame header value".to_string(),
            ));
        }
        let value = String::from_utf8_lossy(&bytes[..value_len]).into_owned();
        bytes = &bytes[value_len..];
        headers.push((key, value));
    }
    Ok(headers)
}

fn decode_payload(event_type: &str, payload: &[u8]) -> Result<KiroEvent, KiroError> {
    match event_type {
        "assistantResponseMessage" | "assistantResponseEvent" => {
            Ok(KiroEvent::AssistantResponse(serde_json::from_slice::<
                AssistantResponseEvent,
            >(payload)?))
        }
        "toolUseEvent" => Ok(KiroEvent::ToolUse(serde_json::from_slice::<ToolUseEvent>(
            payload,
        )?)),
        "followupPromptEvent" => Ok(KiroEvent::FollowupPrompt(serde_json::from_slice::<
            FollowupPromptEvent,
        >(payload)?)),
        "messageStop" => Ok(KiroEvent::MessageStop(
            serde_json::from_slice::<MessageStopEvent>(payload).unwrap_or_default(),
        )),
        other => Err(KiroError::ProtocolTranslationError(format!(
            "unknown upstream event-type: {other}"
        ))),
    }
}

/// Wraps a raw byte stream (as returned by `reqwest::Response::bytes_stream`) into a lazy
/// sequence of decoded [`KiroEvent`]s.
pub fn decode_events<S, E>(bytes: S) -> impl Stream<Item = Result<KiroEvent, KiroError>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    futures::stream::try_unfold(
        (bytes, FrameDecoder::new()),
        |(mut bytes, mut decoder)| async move {
            loop {
                if let Some(event) = decoder.next_event()? {
                    return Ok(Some((event, (bytes, decoder))));
                }

                let next_chunk = tokio::time::timeout(INTER_CHUNK_IDLE_TIMEOUT, futures::StreamExt::next(&mut bytes)).await;
                match next_chunk {
                    Ok(Some(Ok(chunk))) => decoder.push(&chunk),
                    Ok(Some(Err(err))) => return Err(KiroError::Network(err.to_string())),
                    Ok(None) => {
                        if decoder.has_trailing_bytes() {
                            return Err(KiroError::Network(
                                "upstream stream ended mid-frame".to_string(),
                            ));
                        }
                        return Ok(None);
                    }
                    Err(_elapsed) => {
                        return Err(KiroError::Network("upstream stream idle timeout".to_string()));
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_frame(event_type: &str, payload: &[u8]) -> Vec<u8> {
        let mut header = Vec::new();
        header.push(EVENT_TYPE_HEADER.len() as u8);
        header.extend_from_slice(EVENT_TYPE_HEADER.as_bytes());
        header.extend_from_slice(&(event_type.len() as u16).to_be_bytes());
        header.extend_from_slice(event_type.as_bytes());

        let total_len = 4 + header.len() + payload.len();
        let mut frame = Vec::new();
        frame.extend_from_slice(&(total_len as u32).to_be_bytes());
        frame.extend_from_slice(&(header.len() as u32).to_be_bytes());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn decodes_a_single_complete_frame() {
        let frame = encode_frame("assistantResponseMessage", br#"{"content":"hi"}"#);
        let mut decoder = FrameDecoder::new();
        decoder.push(&frame);
        let event = decoder.next_event().unwrap().unwrap();
        match event {
            KiroEvent::AssistantResponse(event) => assert_eq!(event.content, "hi"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!decoder.has_trailing_bytes());
    }

    #[test]
    fn returns_none_until_the_frame_is_complete() {
        let frame = encode_frame("messageStop", br#"{"stopReason":"end_turn"}"#);
        let mut decoder = FrameDecoder::new();
        decoder.push(&frame[..frame.len() - 1]);
        assert!(decoder.next_event().unwrap().is_none());
        decoder.push(&frame[frame.len() - 1..]);
        assert!(decoder.next_event().unwrap().is_some());
    }

    #[test]
    fn decodes_consecutive_frames_from_one_buffer() {
        let mut buf = encode_frame("assistantResponseMessage", br#"{"content":"a"}"#);
        buf.extend(encode_frame("assistantResponseMessage", br#"{"content":"b"}"#));
        let mut decoder = FrameDecoder::new();
        decoder.push(&buf);
        assert!(decoder.next_event().unwrap().is_some());
        assert!(decoder.next_event().unwrap().is_some());
        assert!(decoder.next_event().unwrap().is_none());
    }

    #[test]
    fn unknown_event_type_is_a_protocol_translation_error() {
        let frame = encode_frame("somethingElse", b"{}");
        let mut decoder = FrameDecoder::new();
        decoder.push(&frame);
        assert!(decoder.next_event().is_err());
    }
}

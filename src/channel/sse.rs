use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream};
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt::Display;

use super::{ChannelEvent, EventStream, TranscriptionAlert, Transport};
use crate::config::EventNames;
use crate::error::ChannelError;
use crate::upload::PiiMatches;

/// One dispatched `event:`/`data:` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Longest unterminated line the decoder buffers before giving up on the link.
pub(crate) const MAX_LINE_BYTES: usize = 256 * 1024;

/// Incremental text/event-stream parser. Chunk boundaries may split lines
/// and multi-byte characters.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, ChannelError> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        if self.pending.len() > MAX_LINE_BYTES {
            self.pending.clear();
            return Err(ChannelError::Stream(format!(
                "line exceeds {MAX_LINE_BYTES} bytes without a terminator"
            )));
        }
        Ok(frames)
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[derive(Deserialize)]
struct DocumentAlertPayload {
    #[serde(default)]
    detected_pii: PiiMatches,
}

#[derive(Deserialize)]
struct MessagePayload {
    message: String,
}

#[derive(Deserialize)]
struct UpdatePayload {
    text: String,
}

#[derive(Deserialize)]
struct StatusPayload {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Map a wire frame onto a channel event. `Ok(None)` for names the client
/// does not consume.
pub(crate) fn decode_frame(
    names: &EventNames,
    frame: &SseFrame,
) -> Result<Option<ChannelEvent>, serde_json::Error> {
    let name = frame.event.as_str();
    let event = if name == names.document_alert {
        let payload: DocumentAlertPayload = serde_json::from_str(&frame.data)?;
        ChannelEvent::DocumentAlert {
            detected_pii: payload.detected_pii,
        }
    } else if name == names.transcription_alert {
        let alert: TranscriptionAlert = serde_json::from_str(&frame.data)?;
        ChannelEvent::TranscriptionAlert(alert)
    } else {
        match name {
            "error" => {
                let payload: MessagePayload = serde_json::from_str(&frame.data)?;
                ChannelEvent::ServerError {
                    message: payload.message,
                }
            }
            "transcription_update" => {
                let payload: UpdatePayload = serde_json::from_str(&frame.data)?;
                ChannelEvent::TranscriptionUpdate { text: payload.text }
            }
            "transcription_status" | "transcription_complete" => {
                let payload: StatusPayload = serde_json::from_str(&frame.data)?;
                let status = match payload.reason {
                    Some(reason) => format!("{} ({reason})", payload.status),
                    None => payload.status,
                };
                ChannelEvent::TranscriptionStatus { status }
            }
            other => {
                log::debug!("Ignoring event '{other}'");
                return Ok(None);
            }
        }
    };
    Ok(Some(event))
}

struct FrameState<B, E> {
    bytes: BoxStream<'static, Result<B, E>>,
    decoder: SseDecoder,
    ready: VecDeque<ChannelEvent>,
    names: EventNames,
}

/// Turn a raw byte stream into channel events. Undecodable frames are
/// logged and skipped. A byte-stream error or an oversized line ends the link.
pub(crate) fn event_stream<S, B, E>(bytes: S, names: EventNames) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = FrameState {
        bytes: bytes.boxed(),
        decoder: SseDecoder::default(),
        ready: VecDeque::new(),
        names,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.ready.pop_front() {
                return Some((Ok(event), st));
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = match st.decoder.feed(chunk.as_ref()) {
                        Ok(frames) => frames,
                        Err(e) => return Some((Err(e), st)),
                    };
                    for frame in frames {
                        match decode_frame(&st.names, &frame) {
                            Ok(Some(event)) => st.ready.push_back(event),
                            Ok(None) => {}
                            Err(e) => log::warn!("Dropping undecodable '{}' event: {e}", frame.event),
                        }
                    }
                }
                Some(Err(e)) => return Some((Err(ChannelError::Stream(e.to_string())), st)),
                None => return None,
            }
        }
    })
    .boxed()
}

/// Server-sent events over a long-lived HTTP GET.
pub struct SseTransport {
    client: reqwest::Client,
    names: EventNames,
}

impl SseTransport {
    pub fn new(names: EventNames) -> Self {
        Self {
            client: reqwest::Client::new(),
            names,
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn connect(&self, endpoint: &str) -> Result<EventStream, ChannelError> {
        let resp = self
            .client
            .get(endpoint)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ChannelError::Status(resp.status().as_u16()));
        }

        Ok(event_stream(resp.bytes_stream(), self.names.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: event.into(),
            data: data.into(),
        }
    }

    #[test]
    fn decoder_handles_split_chunks_and_crlf() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"event: pii_al").unwrap().is_empty());
        assert!(decoder.feed(b"ert\r\ndata: {\"type\":\"EMAIL\",").unwrap().is_empty());
        let frames = decoder.feed(b"\"value\":\"x@y.io\"}\r\n\r\n").unwrap();
        assert_eq!(
            frames,
            vec![frame("pii_alert", r#"{"type":"EMAIL","value":"x@y.io"}"#)]
        );
    }

    #[test]
    fn decoder_joins_multiline_data_and_skips_comments() {
        let mut decoder = SseDecoder::default();
        let frames = decoder
            .feed(b": keepalive\n\ndata: line one\ndata: line two\n\nevent: x\n\n")
            .unwrap();
        assert_eq!(frames, vec![frame("message", "line one\nline two")]);
    }

    #[test]
    fn decoder_survives_split_multibyte_characters() {
        let mut decoder = SseDecoder::default();
        let text = "data: {\"text\":\"naïve\"}\n\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(decoder.feed(&text[..split]).unwrap().is_empty());
        let frames = decoder.feed(&text[split..]).unwrap();
        assert_eq!(frames[0].data, "{\"text\":\"naïve\"}");
    }

    #[test]
    fn unterminated_line_over_the_cap_is_an_error() {
        let mut decoder = SseDecoder::default();
        let half = vec![b'x'; MAX_LINE_BYTES / 2 + 1];
        assert!(decoder.feed(b"data: ").unwrap().is_empty());
        assert!(decoder.feed(&half).unwrap().is_empty());
        assert!(matches!(decoder.feed(&half), Err(ChannelError::Stream(_))));
    }

    #[tokio::test]
    async fn oversized_line_ends_the_stream_after_earlier_events() {
        let flood = vec![b'a'; MAX_LINE_BYTES + 1];
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"event: transcription_update\ndata: {\"text\":\"before\"}\n\n".to_vec()),
            Ok(flood),
        ];
        let events: Vec<_> = event_stream(stream::iter(chunks), EventNames::default())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Ok(ChannelEvent::TranscriptionUpdate { text: "before".into() }));
        assert!(matches!(events[1], Err(ChannelError::Stream(_))));
    }

    #[test]
    fn wire_names_map_to_events() {
        let names = EventNames::default();

        let doc = decode_frame(&names, &frame("pii_detected", r#"{"detected_pii":{"Phone":["9876543210"]}}"#))
            .unwrap()
            .unwrap();
        assert_eq!(
            doc,
            ChannelEvent::DocumentAlert {
                detected_pii: PiiMatches::from([("Phone".into(), vec!["9876543210".into()])])
            }
        );

        let alert = decode_frame(
            &names,
            &frame("pii_alert", r#"{"type":"PII","value":"my card is 4111","source":"content","timestamp":"2025-01-01 10:00:00"}"#),
        )
        .unwrap()
        .unwrap();
        match alert {
            ChannelEvent::TranscriptionAlert(a) => {
                assert_eq!(a.pii_type, "PII");
                assert_eq!(a.source.as_deref(), Some("content"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let done = decode_frame(&names, &frame("transcription_complete", r#"{"status":"done","reason":"timeout"}"#))
            .unwrap()
            .unwrap();
        assert_eq!(done, ChannelEvent::TranscriptionStatus { status: "done (timeout)".into() });

        assert_eq!(
            decode_frame(&names, &frame("connection_status", r#"{"status":"connected"}"#)).unwrap(),
            None
        );
        assert!(decode_frame(&names, &frame("pii_alert", "not json")).is_err());
    }

    #[test]
    fn custom_alert_name_is_honoured() {
        let names = EventNames {
            transcription_alert: "pii_audio_detected".into(),
            ..EventNames::default()
        };
        let event = decode_frame(&names, &frame("pii_audio_detected", r#"{"type":"EMAIL","value":"a@b.co"}"#))
            .unwrap();
        assert!(matches!(event, Some(ChannelEvent::TranscriptionAlert(_))));
    }

    #[tokio::test]
    async fn byte_stream_yields_events_and_skips_bad_frames() {
        let chunks: Vec<Result<&'static [u8], String>> = vec![
            Ok(b"event: pii_alert\ndata: garbage\n\n".as_slice()),
            Ok(b"event: error\ndata: {\"message\":\"Speech recognition service unavailable\"}\n".as_slice()),
            Ok(b"\nevent: transcription_update\ndata: {\"text\":\"hello\"}\n\n".as_slice()),
            Err("reset by peer".into()),
        ];
        let events: Vec<_> = event_stream(stream::iter(chunks), EventNames::default())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                Ok(ChannelEvent::ServerError {
                    message: "Speech recognition service unavailable".into()
                }),
                Ok(ChannelEvent::TranscriptionUpdate { text: "hello".into() }),
                Err(ChannelError::Stream("reset by peer".into())),
            ]
        );
    }
}

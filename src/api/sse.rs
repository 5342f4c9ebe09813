use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::error::{AssistError, AssistResult};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Frame {
    Token(String),
    Failed(String),
    Done,
    Skip,
}

/// Classifies the data of one dispatched event.
fn parse_data(data: &str) -> Frame {
    let data = data.trim();
    if data.is_empty() {
        return Frame::Skip;
    }
    if data == DONE_SENTINEL {
        return Frame::Done;
    }

    match serde_json::from_str::<StreamFrame>(data) {
        Ok(StreamFrame {
            error: Some(message),
            ..
        }) => Frame::Failed(message),
        Ok(StreamFrame {
            token: Some(token), ..
        }) if !token.is_empty() => Frame::Token(token),
        Ok(_) => Frame::Skip,
        Err(err) => {
            let err = AssistError::TransientParse(err.to_string());
            log_warn!("ignoring stream event: {err}");
            Frame::Skip
        }
    }
}

fn stream_error<E: Into<AssistError>>(err: EventStreamError<E>) -> AssistError {
    match err {
        EventStreamError::Transport(err) => err.into(),
        EventStreamError::Utf8(err) => AssistError::TransientParse(err.to_string()),
        EventStreamError::Parser(err) => AssistError::TransientParse(err.to_string()),
    }
}

/// Turns a raw SSE byte stream into tokens, ending at the `[DONE]` sentinel
/// or the first error frame.
pub fn token_stream<S, E>(stream: S) -> impl Stream<Item = AssistResult<String>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<AssistError> + Send + 'static,
{
    let events = stream.eventsource().boxed();
    futures::stream::unfold((events, false), |(mut events, finished)| async move {
        if finished {
            return None;
        }
        loop {
            let event = match events.next().await? {
                Ok(event) => event,
                Err(err) => return Some((Err(stream_error(err)), (events, true))),
            };
            match parse_data(&event.data) {
                Frame::Token(token) => return Some((Ok(token), (events, false))),
                Frame::Failed(message) => {
                    return Some((Err(AssistError::network(message)), (events, true)))
                }
                Frame::Done => return None,
                Frame::Skip => continue,
            }
        }
    })
}

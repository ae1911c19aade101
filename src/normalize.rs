//! Flattening of Gmail API messages into [`EmailRecord`]s

use google_gmail1::api::{Message, MessagePart};
use std::collections::HashMap;

use crate::models::{EmailRecord, BODY_EXCERPT_CHARS};

const PLAIN_TEXT: &str = "text/plain";

/// Convert a full-format Gmail message into an [`EmailRecord`]
///
/// Header names match case-insensitively and the last occurrence of a
/// repeated header wins. Missing pieces become empty strings.
pub fn normalize(message: &Message) -> EmailRecord {
    let payload = message.payload.as_ref();
    let headers = payload.map(header_map).unwrap_or_default();
    let header = |name: &str| headers.get(name).cloned().unwrap_or_default();

    let body = payload.map(extract_body).unwrap_or_default();

    EmailRecord {
        id: message.id.clone().unwrap_or_default(),
        thread_id: message.thread_id.clone().unwrap_or_default(),
        date: header("date"),
        from: header("from"),
        to: header("to"),
        subject: header("subject"),
        body: truncate_chars(&body, BODY_EXCERPT_CHARS),
        labels: message.label_ids.clone().unwrap_or_default(),
    }
}

/// Lower-cased header name to value; later duplicates overwrite earlier ones
fn header_map(payload: &MessagePart) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for header in payload.headers.iter().flatten() {
        if let Some(name) = &header.name {
            map.insert(
                name.to_ascii_lowercase(),
                header.value.clone().unwrap_or_default(),
            );
        }
    }
    map
}

/// Body text of a message payload
///
/// Multipart messages yield their first `text/plain` part that carries data;
/// parts are not searched recursively. Single-part messages yield their own
/// body whatever its type.
fn extract_body(payload: &MessagePart) -> String {
    match &payload.parts {
        Some(parts) => parts
            .iter()
            .filter(|part| part.mime_type.as_deref() == Some(PLAIN_TEXT))
            .find_map(part_data)
            .map(|data| String::from_utf8_lossy(data).into_owned())
            .unwrap_or_default(),
        None => part_data(payload)
            .map(|data| String::from_utf8_lossy(data).into_owned())
            .unwrap_or_default(),
    }
}

/// Decoded body bytes of a part, if it has any
fn part_data(part: &MessagePart) -> Option<&[u8]> {
    part.body
        .as_ref()
        .and_then(|body| body.data.as_deref())
        .filter(|data| !data.is_empty())
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_index, _)) => s[..byte_index].to_string(),
        None => s.to_string(),
    }
}

use bytes::Bytes;
use parley_core::ResponseError;
use serde_json::Value;

use crate::scan;

const HEADER_END: &[u8] = b"\r\n\r\n";
const CLOSE_MARKER: &[u8] = b"--";
/// Line terminator preceding each boundary; it belongs to the delimiter.
const DELIMITER_PREFIX_LEN: usize = 2;

/// Binary payload part of a multipart reply.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPart {
    pub content_type: String,
    pub data: Bytes,
}

/// Typed parts recovered from a `multipart/mixed` body.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartBody {
    pub metadata: Value,
    pub audio: Option<AudioPart>,
}

enum PartKind {
    Metadata,
    Audio(String),
    Other,
}

/// Split a `multipart/mixed` body into its JSON metadata part and optional
/// audio part.
///
/// Each part spans from just after the delimiter to two bytes before the
/// next delimiter; headers end at the first blank line. Scanning stops at
/// the closing delimiter (`--boundary--`). A missing metadata part is a
/// [`ResponseError::MultipartParse`]; a missing audio part is not an error.
pub fn extract(body: &Bytes, boundary: &str) -> Result<MultipartBody, ResponseError> {
    if boundary.is_empty() {
        return Err(ResponseError::Malformed(
            "multipart response missing boundary".to_string(),
        ));
    }

    let delimiter = format!("--{}", boundary).into_bytes();
    let mut metadata = None;
    let mut audio = None;
    let mut current = scan::find(body, &delimiter, 0);

    while let Some(index) = current {
        let part_start = index + delimiter.len();
        if body.get(part_start..part_start + CLOSE_MARKER.len()) == Some(CLOSE_MARKER) {
            break;
        }
        let Some(next) = scan::find(body, &delimiter, part_start) else {
            tracing::debug!("multipart body ended without closing delimiter");
            break;
        };

        let header_end = match scan::find(body, HEADER_END, part_start) {
            Some(end) if end < next => end,
            _ => {
                tracing::debug!(offset = part_start, "skipping multipart part without headers");
                current = Some(next);
                continue;
            }
        };

        let headers = String::from_utf8_lossy(&body[part_start..header_end]);
        let body_start = header_end + HEADER_END.len();
        let body_end = next.saturating_sub(DELIMITER_PREFIX_LEN).max(body_start);

        match classify(&headers) {
            PartKind::Metadata if metadata.is_none() => {
                let value: Value = serde_json::from_slice(&body[body_start..body_end])
                    .map_err(|e| {
                        ResponseError::Malformed(format!("invalid JSON metadata part: {}", e))
                    })?;
                metadata = Some(value);
            }
            PartKind::Audio(content_type) if audio.is_none() => {
                audio = Some(AudioPart {
                    content_type,
                    data: body.slice(body_start..body_end),
                });
            }
            PartKind::Metadata | PartKind::Audio(_) => {
                tracing::debug!("ignoring duplicate multipart part");
            }
            PartKind::Other => {
                tracing::debug!(headers = %headers.trim(), "ignoring unrecognised multipart part");
            }
        }

        current = Some(next);
    }

    let metadata = metadata.ok_or_else(|| {
        ResponseError::MultipartParse("no application/json part found".to_string())
    })?;
    Ok(MultipartBody { metadata, audio })
}

fn classify(headers: &str) -> PartKind {
    let content_type = headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-type")
            .then(|| value.trim().to_string())
    });
    let Some(content_type) = content_type else {
        return PartKind::Other;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence == "application/json" {
        PartKind::Metadata
    } else if essence.starts_with("audio/") {
        PartKind::Audio(content_type)
    } else {
        PartKind::Other
    }
}

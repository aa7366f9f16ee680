use parley_core::ResponseError;

/// Response wire shape, selected from the declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    /// Line-oriented `data: <json>` stream. Also the fallback for unknown
    /// or missing content types.
    EventStream,
    /// One JSON object carrying the whole reply.
    SingleJson,
    /// `multipart/mixed` body with a JSON part and an optional audio part.
    Multipart { boundary: String },
}

impl ContentKind {
    pub fn parse(content_type: Option<&str>) -> Result<Self, ResponseError> {
        let Some(content_type) = content_type else {
            return Ok(ContentKind::EventStream);
        };
        let lower = content_type.to_ascii_lowercase();
        if lower.contains("multipart/mixed") {
            let boundary = boundary_param(content_type).ok_or_else(|| {
                ResponseError::Malformed("multipart response missing boundary".to_string())
            })?;
            Ok(ContentKind::Multipart { boundary })
        } else if lower.contains("application/json") {
            Ok(ContentKind::SingleJson)
        } else {
            Ok(ContentKind::EventStream)
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContentKind::EventStream => "event-stream",
            ContentKind::SingleJson => "single-json",
            ContentKind::Multipart { .. } => "multipart",
        }
    }
}

fn boundary_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

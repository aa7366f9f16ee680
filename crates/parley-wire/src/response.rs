use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};
use parley_core::ResponseError;
use std::fmt;
use std::pin::Pin;

/// Incrementally arriving body chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, ResponseError>> + Send>>;

/// Either a fully buffered body or a stream of chunks.
pub enum ResponseBody {
    Buffered(Bytes),
    Chunked(ChunkStream),
}

impl ResponseBody {
    pub fn chunked<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ResponseError>> + Send + 'static,
    {
        ResponseBody::Chunked(Box::pin(stream))
    }

    /// Chunked body replaying the given chunks in order.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<Result<Bytes, ResponseError>> =
            chunks.into_iter().map(|c| Ok(c.into())).collect();
        Self::chunked(stream::iter(chunks))
    }

    /// Read the whole body into memory.
    pub async fn collect(self) -> Result<Bytes, ResponseError> {
        match self {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Chunked(mut chunks) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = chunks.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    pub fn into_stream(self) -> ChunkStream {
        match self {
            ResponseBody::Buffered(bytes) => Box::pin(stream::once(async move { Ok(bytes) })),
            ResponseBody::Chunked(chunks) => chunks,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Buffered(bytes) => f
                .debug_tuple("Buffered")
                .field(&format_args!("{} bytes", bytes.len()))
                .finish(),
            ResponseBody::Chunked(_) => f.write_str("Chunked(..)"),
        }
    }
}

/// A backend reply as handed over by the transport, before normalization.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Option<ResponseBody>,
}

impl RawResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: Option<ResponseBody>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body,
        }
    }

    pub fn buffered(status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        Self::new(
            status,
            Some(content_type),
            Some(ResponseBody::Buffered(body.into())),
        )
    }

    pub fn chunked<I, B>(status: u16, content_type: &str, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self::new(
            status,
            Some(content_type),
            Some(ResponseBody::from_chunks(chunks)),
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

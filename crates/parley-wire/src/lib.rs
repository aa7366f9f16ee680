pub mod content_kind;
pub mod lines;
pub mod multipart;
pub mod normalizer;
pub mod response;
pub mod scan;

pub use content_kind::ContentKind;
pub use lines::LineBuffer;
pub use multipart::{AudioPart, MultipartBody};
pub use normalizer::normalize;
pub use response::{ChunkStream, RawResponse, ResponseBody};

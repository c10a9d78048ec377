mod codec;
mod http_archive;

pub use codec::{TranscriptCodec, INCOMPATIBLE_FORMAT};
pub use http_archive::HttpTranscriptArchive;

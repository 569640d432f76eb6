pub mod document;
pub mod session;

pub use document::{
    Analysis, DocumentError, DownloadId, FileId, Segment, SourceFile, SplitResult,
};
pub use session::{Phase, PhaseKind, Session, SplitOutput, UploadedDocument};

pub mod dto;
pub mod http_client;
pub mod splitter_api;

pub use http_client::SplitterClient;
pub use splitter_api::{DownloadedFile, SplitReceipt, SplitRequest, SplitterApi, UploadReceipt};

pub mod download_writer;
pub mod input_acquisitor;

pub use download_writer::DownloadWriter;
pub use input_acquisitor::InputAcquisitor;

pub mod config;
pub mod error;
pub mod image;
pub mod job;
pub mod pipeline;
pub mod scan;

// Re-export commonly used types
pub use config::{ConvertConfig, QualityPolicy};
pub use error::ConvertError;
pub use image::{Codec, DefaultCodec};
pub use job::{Job, JobState};
pub use pipeline::{BatchReport, Converted, Converter, JobOutcome, ProgressEvent};

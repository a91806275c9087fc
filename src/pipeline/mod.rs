//! The audio acquisition and analysis pipeline.
//!
//! Stages, leaves first: source strategy (external download tools with
//! fallback), format converter (ffmpeg), analysis client (feature
//! extraction service), result writer (track record + search index). The
//! two handlers wire the stages into the job queues.

mod analysis_client;
mod converter;
mod error;
mod handlers;
mod result_writer;
mod source_strategy;
mod tools;

pub use analysis_client::{
    map_analysis, AnalysisClient, AnalysisError, AnalysisResponse, TrackAnalysisUpdate,
    TrackAnalyzer,
};
pub use converter::{ConversionError, ConvertedAudio, FormatConverter, PlaybackFormat};
pub use error::PipelineError;
pub use handlers::{AnalyzeJobHandler, DownloadJobHandler};
pub use result_writer::ResultWriter;
pub use source_strategy::{Attempt, AudioSourceStrategy, SourceKind, SourceUrls};
pub use tools::{CommandOutput, CommandRunner, ProcessRunner, ToolError};

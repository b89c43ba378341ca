pub mod orchestrator;
pub mod phases;
pub mod state;

pub use orchestrator::{FormatPipeline, PipelineReport};
pub use phases::{ExportResult, ExportStatus, ExportedFile, StagedTree};
pub use state::PipelineState;

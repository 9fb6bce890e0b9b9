pub mod pipeline;

pub use pipeline::{
    AbsentSections, BuildOutput, ExecutionMode, NoteBuilder, PipelineOptions, PipelineReport, build,
};

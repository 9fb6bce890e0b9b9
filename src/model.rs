use consult_note::{PipelineOptions, PipelineReport};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct InputSummary {
    pub path: String,
    pub byte_len: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildCounts {
    pub segment_count: usize,
    pub populated_section_count: usize,
    pub absent_section_count: usize,
    pub diagnostic_count: usize,
    pub conflict_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub command: String,
    pub input: InputSummary,
    pub output_path: Option<String>,
    pub options: PipelineOptions,
    pub counts: BuildCounts,
    pub pipeline: PipelineReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentRecord {
    pub index: usize,
    pub kind: String,
    pub date: Option<String>,
    pub title: String,
    pub header_start: usize,
    pub header_end: usize,
    pub span_start: usize,
    pub span_end: usize,
    pub content_len: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentTable {
    pub manifest_version: u32,
    pub generated_at: String,
    pub input: InputSummary,
    pub segment_count: usize,
    pub segments: Vec<SegmentRecord>,
}

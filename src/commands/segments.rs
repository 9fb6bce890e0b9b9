use anyhow::{Context, Result};
use consult_note::pipeline::segment::{NoteSegment, Segmenter};
use tracing::info;

use crate::cli::SegmentsArgs;
use crate::model::{InputSummary, SegmentRecord, SegmentTable};
use crate::util::{now_utc_string, read_document, sha256_hex, write_json_pretty, write_text};

pub fn run(args: SegmentsArgs) -> Result<()> {
    let (document, raw) = read_document(&args.input)?;
    let segmenter = Segmenter::new()?;
    let segments = segmenter.segment(&document);

    let table = SegmentTable {
        manifest_version: 1,
        generated_at: now_utc_string(),
        input: InputSummary {
            path: args.input.display().to_string(),
            byte_len: raw.len(),
            sha256: sha256_hex(&raw),
        },
        segment_count: segments.len(),
        segments: segments.iter().map(segment_record).collect(),
    };

    match args.output.as_ref() {
        Some(path) => {
            write_json_pretty(path, &table)?;
            info!(path = %path.display(), segments = table.segment_count, "wrote segment table");
        }
        None => {
            let mut data =
                serde_json::to_string_pretty(&table).context("failed to serialize segment table")?;
            data.push('\n');
            write_text(None, &data)?;
        }
    }

    Ok(())
}

fn segment_record(segment: &NoteSegment) -> SegmentRecord {
    SegmentRecord {
        index: segment.index,
        kind: segment.kind.as_str().to_string(),
        date: segment.date.map(|date| date.to_string()),
        title: segment.title.clone(),
        header_start: segment.header.start,
        header_end: segment.header.end,
        span_start: segment.span.start,
        span_end: segment.span.end,
        content_len: segment.content.len(),
    }
}

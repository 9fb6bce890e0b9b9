use anyhow::Result;
use chrono::Utc;
use consult_note::{NoteBuilder, PipelineOptions};
use tracing::{info, warn};

use crate::cli::BuildArgs;
use crate::model::{BuildCounts, BuildRunManifest, InputSummary};
use crate::util::{now_utc_string, read_document, sha256_hex, utc_compact_string, write_json_pretty, write_text};

pub fn run(args: BuildArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let options = PipelineOptions {
        absent_sections: args.absent.into(),
        execution: args.execution.into(),
    };

    info!(
        input = %args.input.display(),
        run_id = %run_id,
        absent = options.absent_sections.as_str(),
        execution = options.execution.as_str(),
        "starting build"
    );

    let (document, raw) = read_document(&args.input)?;
    let builder = NoteBuilder::new(options)?;
    let output = builder.build_with_report(&document);

    write_text(args.output.as_deref(), &output.note)?;
    if let Some(path) = args.output.as_ref() {
        info!(path = %path.display(), "wrote consolidated note");
    }

    if output.report.segments.is_empty() {
        warn!(input = %args.input.display(), "no note headers recognised");
    }
    for conflict in &output.report.conflicts {
        warn!(
            family = conflict.family.as_str(),
            kept = %conflict.kept,
            found = %conflict.found,
            "conflicting values in document"
        );
    }

    let counts = BuildCounts {
        segment_count: output.report.segments.len(),
        populated_section_count: output.report.populated_sections.len(),
        absent_section_count: output.report.absent_sections.len(),
        diagnostic_count: output.report.diagnostics.len(),
        conflict_count: output.report.conflicts.len(),
    };
    info!(
        segments = counts.segment_count,
        populated_sections = counts.populated_section_count,
        absent_sections = counts.absent_section_count,
        diagnostics = counts.diagnostic_count,
        conflicts = counts.conflict_count,
        "build completed"
    );

    if let Some(report_path) = args.report.as_ref() {
        let manifest = BuildRunManifest {
            manifest_version: 1,
            run_id,
            started_at,
            completed_at: now_utc_string(),
            command: "build".to_string(),
            input: InputSummary {
                path: args.input.display().to_string(),
                byte_len: raw.len(),
                sha256: sha256_hex(&raw),
            },
            output_path: args.output.as_ref().map(|path| path.display().to_string()),
            options,
            counts,
            pipeline: output.report,
        };

        write_json_pretty(report_path, &manifest)?;
        info!(path = %report_path.display(), "wrote build report");
    }

    Ok(())
}

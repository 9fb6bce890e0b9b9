//! Segmentation and field-extraction pipeline that turns one multi-note
//! clinical document dump into a consolidated, fixed-order summary note.
//!
//! ```text
//! raw text -> Segmenter -> segments -> extractors (fan-out per segment)
//!          -> synthesizers (fan-in per field family) -> ConsolidatedNote -> text
//! ```

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

pub mod extract;
pub mod patterns;
pub mod render;
pub mod segment;
pub mod synthesize;

use extract::{
    BlockReader, DemographicsExtractor, Diagnostic, Diagnostics, EncounterExtractor,
    EncounterFields, Extraction, FieldExtractor, FieldFamily, PatientDemographics, PsaExtractor,
    SectionListExtractor, SectionTextExtractor, Source, TimeSeriesEntry,
};
use render::{CanonicalFields, ConsolidatedNote};
use segment::{NoteSegment, SegmentKind, Segmenter};
use synthesize::{Conflict, EncounterOrigin};

/// How sections with no canonical value are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentSections {
    #[default]
    Omit,
    Placeholder,
}

impl AbsentSections {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Omit => "omit",
            Self::Placeholder => "placeholder",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Parallel,
    Sequential,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineOptions {
    pub absent_sections: AbsentSections,
    pub execution: ExecutionMode,
}

/// Builds the consolidated note for one document with default options.
///
/// Data problems never surface as errors: unrecognised or partial input gives a
/// note with fewer sections. `Err` means the built-in rule tables failed to
/// compile.
pub fn build(document: &str) -> Result<String> {
    let builder = NoteBuilder::new(PipelineOptions::default())?;
    Ok(builder.build(document))
}

/// Per-segment extraction results for every segment-scoped field family.
#[derive(Debug, Clone)]
struct SegmentFindings {
    psa: Extraction<Vec<TimeSeriesEntry>>,
    surgical_history: Extraction<Vec<String>>,
    social_history: Extraction<String>,
    family_history: Extraction<Vec<String>>,
    imaging: Extraction<Vec<String>>,
    encounter: Extraction<EncounterFields>,
    diagnostics: Diagnostics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub index: usize,
    pub kind: SegmentKind,
    pub date: Option<String>,
    pub title: String,
    pub content_len: usize,
}

/// Everything a caller may want to know about one run besides the note text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub document_len: usize,
    pub segments: Vec<SegmentSummary>,
    pub segment_counts: BTreeMap<&'static str, usize>,
    pub populated_sections: Vec<&'static str>,
    pub absent_sections: Vec<&'static str>,
    pub encounter_origin: Option<EncounterOrigin>,
    pub diagnostics: Vec<Diagnostic>,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub note: String,
    pub report: PipelineReport,
}

#[derive(Debug)]
pub struct NoteBuilder {
    options: PipelineOptions,
    segmenter: Segmenter,
    demographics: DemographicsExtractor,
    psa: PsaExtractor,
    surgical_history: SectionListExtractor,
    social_history: SectionTextExtractor,
    family_history: SectionListExtractor,
    imaging: SectionListExtractor,
    encounter: EncounterExtractor,
}

impl NoteBuilder {
    pub fn new(options: PipelineOptions) -> Result<Self> {
        let blocks = BlockReader::new().context("failed to build block reader")?;

        Ok(Self {
            options,
            segmenter: Segmenter::new().context("failed to build segmenter")?,
            demographics: DemographicsExtractor::new()?,
            psa: PsaExtractor::new(blocks.clone())?,
            surgical_history: SectionListExtractor::surgical_history(blocks.clone())?,
            social_history: SectionTextExtractor::social_history(blocks.clone())?,
            family_history: SectionListExtractor::family_history(blocks.clone())?,
            imaging: SectionListExtractor::imaging(blocks.clone())?,
            encounter: EncounterExtractor::new(blocks)?,
        })
    }

    pub fn build(&self, document: &str) -> String {
        self.build_with_report(document).note
    }

    pub fn build_with_report(&self, document: &str) -> BuildOutput {
        let segments = self.segmenter.segment(document);

        let (demographic_results, findings) = match self.options.execution {
            ExecutionMode::Parallel => rayon::join(
                || self.extract_demographics(document, &segments),
                || {
                    segments
                        .par_iter()
                        .map(|segment| self.extract_segment(segment))
                        .collect::<Vec<SegmentFindings>>()
                },
            ),
            ExecutionMode::Sequential => (
                self.extract_demographics(document, &segments),
                segments
                    .iter()
                    .map(|segment| self.extract_segment(segment))
                    .collect::<Vec<SegmentFindings>>(),
            ),
        };

        let mut diagnostics = Diagnostics::default();
        let mut conflicts = Vec::<Conflict>::new();
        let mut psa = Vec::with_capacity(findings.len());
        let mut surgical_history = Vec::with_capacity(findings.len());
        let mut social_history = Vec::with_capacity(findings.len());
        let mut family_history = Vec::with_capacity(findings.len());
        let mut imaging = Vec::with_capacity(findings.len());
        let mut encounter = Vec::with_capacity(findings.len());
        for finding in findings {
            diagnostics.extend(finding.diagnostics);
            psa.push(finding.psa);
            surgical_history.push(finding.surgical_history);
            social_history.push(finding.social_history);
            family_history.push(finding.family_history);
            imaging.push(finding.imaging);
            encounter.push(finding.encounter);
        }

        let demographics = synthesize::merge_scalar(
            FieldFamily::Demographics,
            demographic_results,
            synthesize::demographics_key,
            &mut conflicts,
        );
        let (encounter, encounter_origin) = synthesize::resolve_encounter(&segments, &encounter);
        let psa = synthesize::merge_time_series(FieldFamily::PsaCurve, psa, &mut diagnostics);
        let surgical_history = synthesize::merge_list(surgical_history);
        let social_history = synthesize::merge_scalar(
            FieldFamily::SocialHistory,
            social_history,
            |value: &String| synthesize::text_key(value),
            &mut conflicts,
        );
        let family_history = synthesize::merge_list(family_history);
        let imaging = synthesize::merge_list(imaging);

        let note = ConsolidatedNote::assemble(&CanonicalFields {
            demographics: demographics.value(),
            encounter: encounter.value(),
            surgical_history: surgical_history.value().map(Vec::as_slice),
            social_history: social_history.value().map(String::as_str),
            family_history: family_history.value().map(Vec::as_slice),
            psa_curve: psa.value().map(Vec::as_slice),
            imaging: imaging.value().map(Vec::as_slice),
            conflicts: &conflicts,
            segments: &segments,
        });
        let text = note.render(self.options.absent_sections);

        let report = PipelineReport {
            document_len: document.len(),
            segment_counts: count_segments(&segments),
            segments: segments.iter().map(summarize_segment).collect(),
            populated_sections: note.populated_headers(),
            absent_sections: note.absent_headers(),
            encounter_origin,
            diagnostics: diagnostics.into_entries(),
            conflicts,
        };

        debug!(
            segments = report.segments.len(),
            populated = report.populated_sections.len(),
            diagnostics = report.diagnostics.len(),
            conflicts = report.conflicts.len(),
            "consolidated note built"
        );

        BuildOutput { note: text, report }
    }

    fn extract_segment(&self, segment: &NoteSegment) -> SegmentFindings {
        let mut diagnostics = Diagnostics::default();

        let findings = SegmentFindings {
            psa: self.psa.extract_segment(segment, &mut diagnostics),
            surgical_history: self.surgical_history.extract_segment(segment, &mut diagnostics),
            social_history: self.social_history.extract_segment(segment, &mut diagnostics),
            family_history: self.family_history.extract_segment(segment, &mut diagnostics),
            imaging: self.imaging.extract_segment(segment, &mut diagnostics),
            encounter: self.encounter.extract_segment(segment, &mut diagnostics),
            diagnostics,
        };

        debug!(
            segment_index = segment.index,
            kind = segment.kind.as_str(),
            psa = findings.psa.is_present(),
            surgical_history = findings.surgical_history.is_present(),
            social_history = findings.social_history.is_present(),
            family_history = findings.family_history.is_present(),
            imaging = findings.imaging.is_present(),
            encounter = findings.encounter.is_present(),
            "segment extracted"
        );

        findings
    }

    /// Every demographics occurrence in the document, attributed to the segment
    /// it falls in.
    fn extract_demographics(
        &self,
        document: &str,
        segments: &[NoteSegment],
    ) -> Vec<Extraction<PatientDemographics>> {
        self.demographics
            .extract_all(document)
            .into_iter()
            .map(|(offset, value)| {
                let source = segments
                    .iter()
                    .find(|segment| segment.contains(offset))
                    .map(|segment| Source::Segment(segment.index))
                    .unwrap_or(Source::Document);
                Extraction::present(value, source)
            })
            .collect()
    }
}

fn count_segments(segments: &[NoteSegment]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for segment in segments {
        *counts.entry(segment.kind.as_str()).or_insert(0) += 1;
    }
    counts
}

fn summarize_segment(segment: &NoteSegment) -> SegmentSummary {
    SegmentSummary {
        index: segment.index,
        kind: segment.kind,
        date: segment.date.map(|date| date.to_string()),
        title: segment.title.clone(),
        content_len: segment.content.len(),
    }
}

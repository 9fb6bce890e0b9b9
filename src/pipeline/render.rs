use super::extract::{EncounterFields, PatientDemographics, Source, TimeSeriesEntry};
use super::segment::NoteSegment;
use super::synthesize::Conflict;
use super::AbsentSections;

pub const PLACEHOLDER: &str = "Not documented.";

pub const PATIENT: &str = "PATIENT";
pub const CHIEF_COMPLAINT: &str = "CHIEF COMPLAINT";
pub const HISTORY_OF_PRESENT_ILLNESS: &str = "HISTORY OF PRESENT ILLNESS";
pub const PAST_SURGICAL_HISTORY: &str = "PAST SURGICAL HISTORY";
pub const SOCIAL_HISTORY: &str = "SOCIAL HISTORY";
pub const FAMILY_HISTORY: &str = "FAMILY HISTORY";
pub const PSA_CURVE: &str = "PSA CURVE";
pub const IMAGING: &str = "IMAGING";
pub const DATA_CONFLICTS: &str = "DATA CONFLICTS";
pub const NOTES_REVIEWED: &str = "NOTES REVIEWED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub header: &'static str,
    pub body: Option<Vec<String>>,
    pub informational: bool,
}

impl Section {
    fn field(header: &'static str, body: Option<Vec<String>>) -> Self {
        Self {
            header,
            body: body.filter(|lines| !lines.is_empty()),
            informational: false,
        }
    }

    fn informational(header: &'static str, lines: Vec<String>) -> Self {
        Self {
            header,
            body: Some(lines).filter(|lines| !lines.is_empty()),
            informational: true,
        }
    }

    pub fn is_populated(&self) -> bool {
        self.body.is_some()
    }
}

/// Canonical values handed to the renderer, one per field family.
#[derive(Debug, Default)]
pub struct CanonicalFields<'a> {
    pub demographics: Option<&'a PatientDemographics>,
    pub encounter: Option<&'a EncounterFields>,
    pub surgical_history: Option<&'a [String]>,
    pub social_history: Option<&'a str>,
    pub family_history: Option<&'a [String]>,
    pub psa_curve: Option<&'a [TimeSeriesEntry]>,
    pub imaging: Option<&'a [String]>,
    pub conflicts: &'a [Conflict],
    pub segments: &'a [NoteSegment],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedNote {
    sections: Vec<Section>,
}

impl ConsolidatedNote {
    /// Lays the canonical values out in the fixed section order.
    pub fn assemble(fields: &CanonicalFields<'_>) -> Self {
        let encounter = fields.encounter;
        let sections = vec![
            Section::field(PATIENT, fields.demographics.map(patient_lines)),
            Section::field(
                CHIEF_COMPLAINT,
                encounter
                    .and_then(|value| value.chief_complaint.as_deref())
                    .map(text_lines),
            ),
            Section::field(
                HISTORY_OF_PRESENT_ILLNESS,
                encounter
                    .and_then(|value| value.history_of_present_illness.as_deref())
                    .map(text_lines),
            ),
            Section::field(PAST_SURGICAL_HISTORY, fields.surgical_history.map(numbered_lines)),
            Section::field(SOCIAL_HISTORY, fields.social_history.map(text_lines)),
            Section::field(FAMILY_HISTORY, fields.family_history.map(bullet_lines)),
            Section::field(PSA_CURVE, fields.psa_curve.map(psa_lines)),
            Section::field(IMAGING, fields.imaging.map(bullet_lines)),
            Section::informational(DATA_CONFLICTS, conflict_lines(fields)),
            Section::informational(NOTES_REVIEWED, segment_lines(fields.segments)),
        ];

        Self { sections }
    }

    pub fn populated_headers(&self) -> Vec<&'static str> {
        self.sections
            .iter()
            .filter(|section| section.is_populated())
            .map(|section| section.header)
            .collect()
    }

    pub fn absent_headers(&self) -> Vec<&'static str> {
        self.sections
            .iter()
            .filter(|section| !section.informational && !section.is_populated())
            .map(|section| section.header)
            .collect()
    }

    pub fn render(&self, absent: AbsentSections) -> String {
        let mut blocks = Vec::<String>::new();

        for section in &self.sections {
            let body = match (&section.body, absent) {
                (Some(lines), _) => lines.join("\n"),
                (None, AbsentSections::Placeholder) if !section.informational => {
                    PLACEHOLDER.to_string()
                }
                (None, _) => continue,
            };
            blocks.push(format!("{}:\n{}", section.header, body));
        }

        if blocks.is_empty() {
            return String::new();
        }

        let mut output = blocks.join("\n\n");
        output.push('\n');
        output
    }
}

fn patient_lines(value: &PatientDemographics) -> Vec<String> {
    vec![format!("{} (SSN {})", value.formatted_name, value.masked_ssn())]
}

fn text_lines(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn numbered_lines(items: &[String]) -> Vec<String> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| format!("{}. {}", index + 1, item))
        .collect()
}

fn bullet_lines(items: &[String]) -> Vec<String> {
    items.iter().map(|item| format!("- {item}")).collect()
}

fn psa_lines(entries: &[TimeSeriesEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!("{}: {}", entry.date.format("%b %d, %Y"), entry.value);
            if let Some(annotation) = entry.annotation.as_deref() {
                line.push_str(&format!(" ({annotation})"));
            }
            if entry.conflict {
                line.push_str(" [conflicting values reported for this date]");
            }
            line
        })
        .collect()
}

fn conflict_lines(fields: &CanonicalFields<'_>) -> Vec<String> {
    let mut lines = fields
        .conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}: kept \"{}\"; also found \"{}\"{}",
                conflict.family.as_str(),
                conflict.kept,
                conflict.found,
                source_suffix(conflict.source),
            )
        })
        .collect::<Vec<String>>();

    if let Some(entries) = fields.psa_curve {
        let mut dates = entries
            .iter()
            .filter(|entry| entry.conflict)
            .map(|entry| entry.date)
            .collect::<Vec<_>>();
        dates.dedup();
        for date in dates {
            let values = entries
                .iter()
                .filter(|entry| entry.date == date)
                .map(|entry| entry.value.to_string())
                .collect::<Vec<String>>();
            lines.push(format!(
                "psa_curve: {} has values {}",
                date.format("%b %d, %Y"),
                values.join(", ")
            ));
        }
    }

    lines
}

fn source_suffix(source: Source) -> String {
    match source {
        Source::Segment(index) => format!(" (note {})", index + 1),
        Source::Document => String::new(),
    }
}

fn segment_lines(segments: &[NoteSegment]) -> Vec<String> {
    segments
        .iter()
        .map(|segment| {
            let date = segment
                .date
                .map(|date| date.format("%b %d, %Y").to_string())
                .unwrap_or_else(|| "undated".to_string());
            if segment.title.is_empty() {
                format!("{} {}", date, segment.kind.label())
            } else {
                format!("{} {} - {}", date, segment.kind.label(), segment.title)
            }
        })
        .collect()
}

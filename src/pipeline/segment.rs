use std::ops::Range;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::patterns::{DATE_TOKEN, lines_with_offsets, parse_clinical_date};

const HEADER_DATE_SCAN_LINES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    ConsultRequest,
    GuNote,
    PcpNote,
    Other,
}

impl SegmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentKind::ConsultRequest => "consult_request",
            SegmentKind::GuNote => "gu_note",
            SegmentKind::PcpNote => "pcp_note",
            SegmentKind::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SegmentKind::ConsultRequest => "Consult request",
            SegmentKind::GuNote => "GU note",
            SegmentKind::PcpNote => "Primary care note",
            SegmentKind::Other => "Note",
        }
    }
}

/// One note carved out of the raw document. `header` covers the marker line(s),
/// `span` the body that follows up to the next marker; `content` is `document[span]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSegment {
    pub index: usize,
    pub kind: SegmentKind,
    pub date: Option<NaiveDate>,
    pub title: String,
    pub header: Range<usize>,
    pub span: Range<usize>,
    pub content: String,
}

impl NoteSegment {
    pub fn contains(&self, offset: usize) -> bool {
        (self.header.start..self.span.end).contains(&offset)
    }
}

#[derive(Debug)]
enum Marker {
    Title { title: String, lines: usize },
    ConsultForm { title: String },
    DateOfNote { date: Option<NaiveDate> },
}

#[derive(Debug)]
pub struct Segmenter {
    local_title: Regex,
    standard_title: Regex,
    consult_form: Regex,
    date_of_note: Regex,
    header_date: Regex,
    classification: Vec<(SegmentKind, Regex)>,
}

impl Segmenter {
    pub fn new() -> Result<Self> {
        let classification = [
            (
                SegmentKind::ConsultRequest,
                r"(?i)\bCONSULT(?:ATION)?\b.*\b(?:REQUEST|REQ|RQST)\b|\bCONSULT(?:ATION)?\s+FORM\b",
            ),
            (
                SegmentKind::GuNote,
                r"(?i)\b(?:UROLOGY|UROLOGIC|GU|GENITOURINARY)\b",
            ),
            (SegmentKind::PcpNote, r"(?i)\b(?:PRIMARY\s+CARE|PCP|PACT)\b"),
        ]
        .into_iter()
        .map(|(kind, pattern)| {
            Regex::new(pattern)
                .with_context(|| format!("failed to compile {} classifier", kind.as_str()))
                .map(|regex| (kind, regex))
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            local_title: Regex::new(r"^[ \t]*LOCAL TITLE:[ \t]*(.*?)[ \t]*$")
                .context("failed to compile local title regex")?,
            standard_title: Regex::new(r"^[ \t]*STANDARD TITLE:[ \t]*(.*?)[ \t]*$")
                .context("failed to compile standard title regex")?,
            consult_form: Regex::new(
                r"^[ \t]*(?:(?i:consult(?:ation)?[ \t]+request)[ \t]*:[ \t]*(?P<service>.*?)|CONSULT(?:ATION)? REQUEST)[ \t]*$",
            )
            .context("failed to compile consult form regex")?,
            date_of_note: Regex::new(&format!(r"^[ \t]*DATE OF NOTE:[ \t]*{DATE_TOKEN}"))
                .context("failed to compile date-of-note regex")?,
            header_date: Regex::new(&format!(
                r"(?i)\b(?:DATE OF NOTE|ENTRY DATE|DATE OF REQUEST|REQUEST DATE|Requested)[ \t]*:[ \t]*{DATE_TOKEN}"
            ))
            .context("failed to compile header date regex")?,
            classification,
        })
    }

    pub fn classify(&self, title: &str) -> SegmentKind {
        self.classification
            .iter()
            .find(|(_, regex)| regex.is_match(title))
            .map(|(kind, _)| *kind)
            .unwrap_or(SegmentKind::Other)
    }

    /// Splits the document at recognised note markers. Text before the first
    /// marker belongs to no segment. Never fails; no markers means no segments.
    pub fn segment(&self, document: &str) -> Vec<NoteSegment> {
        #[derive(Debug)]
        struct ActiveSegment {
            kind: SegmentKind,
            title: String,
            date: Option<NaiveDate>,
            saw_date_marker: bool,
            header: Range<usize>,
        }

        let finalize = |active: ActiveSegment, end: usize, index: usize| -> NoteSegment {
            let span = active.header.end.min(end)..end;
            let content = document[span.clone()].to_string();
            let date = active.date.or_else(|| self.scan_header_date(&content));

            debug!(
                segment_index = index,
                kind = active.kind.as_str(),
                title = %active.title,
                content_len = content.len(),
                "segment closed"
            );

            NoteSegment {
                index,
                kind: active.kind,
                date,
                title: active.title,
                header: active.header,
                span,
                content,
            }
        };

        let lines = lines_with_offsets(document).collect::<Vec<(usize, &str)>>();
        let mut segments = Vec::new();
        let mut current: Option<ActiveSegment> = None;
        let mut index = 0usize;

        while index < lines.len() {
            let (line_start, line) = lines[index];
            let Some(marker) = self.detect_marker(&lines, index) else {
                index += 1;
                continue;
            };

            if let Marker::DateOfNote { date } = &marker {
                if let Some(active) = current.as_mut() {
                    if !active.saw_date_marker {
                        active.saw_date_marker = true;
                        active.date = *date;
                        index += 1;
                        continue;
                    }
                }
            }

            if let Some(active) = current.take() {
                let ordinal = segments.len();
                segments.push(finalize(active, line_start, ordinal));
            }

            let (kind, title, date, header_lines, saw_date_marker) = match marker {
                Marker::Title { title, lines } => (self.classify(&title), title, None, lines, false),
                Marker::ConsultForm { title } => {
                    (SegmentKind::ConsultRequest, title, None, 1, false)
                }
                Marker::DateOfNote { date } => (SegmentKind::Other, String::new(), date, 1, true),
            };

            let last_header_line = index + header_lines - 1;
            let header_end = lines
                .get(last_header_line + 1)
                .map(|(offset, _)| *offset)
                .unwrap_or(document.len());
            debug!(
                line = %line.trim(),
                kind = kind.as_str(),
                "segment marker"
            );

            current = Some(ActiveSegment {
                kind,
                title,
                date,
                saw_date_marker,
                header: line_start..header_end,
            });
            index += header_lines;
        }

        if let Some(active) = current.take() {
            let ordinal = segments.len();
            segments.push(finalize(active, document.len(), ordinal));
        }

        segments
    }

    fn detect_marker(&self, lines: &[(usize, &str)], index: usize) -> Option<Marker> {
        let line = lines[index].1.trim_end_matches('\r');

        if let Some(captures) = self.local_title.captures(line) {
            let local = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            let standard = lines.get(index + 1).and_then(|(_, next)| {
                self.standard_title
                    .captures(next.trim_end_matches('\r'))
                    .and_then(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
            });
            return Some(match standard {
                Some(title) if !title.is_empty() => Marker::Title { title, lines: 2 },
                Some(_) => Marker::Title {
                    title: local.to_string(),
                    lines: 2,
                },
                None => Marker::Title {
                    title: local.to_string(),
                    lines: 1,
                },
            });
        }

        if let Some(captures) = self.standard_title.captures(line) {
            let title = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            return Some(Marker::Title {
                title: title.to_string(),
                lines: 1,
            });
        }

        if let Some(captures) = self.consult_form.captures(line) {
            let title = match captures.name("service").map(|m| m.as_str().trim()) {
                Some(service) if !service.is_empty() => format!("CONSULT REQUEST: {service}"),
                _ => "CONSULT REQUEST".to_string(),
            };
            return Some(Marker::ConsultForm { title });
        }

        if let Some(captures) = self.date_of_note.captures(line) {
            let date = captures
                .name("date")
                .and_then(|m| parse_clinical_date(m.as_str()));
            return Some(Marker::DateOfNote { date });
        }

        None
    }

    fn scan_header_date(&self, content: &str) -> Option<NaiveDate> {
        content
            .lines()
            .take(HEADER_DATE_SCAN_LINES)
            .filter_map(|line| self.header_date.captures(line))
            .find_map(|captures| {
                captures
                    .name("date")
                    .and_then(|m| parse_clinical_date(m.as_str()))
            })
    }
}

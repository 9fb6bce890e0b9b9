//! Field extractors. Each one owns a single field family and evaluates an
//! ordered rule table against segment (or whole-document) text. Missing data
//! comes back as [`Extraction::Absent`]; malformed entries are dropped and
//! recorded in [`Diagnostics`].

use serde::Serialize;
use tracing::debug;

use super::segment::{NoteSegment, SegmentKind};

mod blocks;
mod demographics;
mod encounter;
mod psa;
mod sections;
#[cfg(test)]
mod tests;

pub use blocks::BlockReader;
pub use demographics::{DemographicsExtractor, PatientDemographics};
pub use encounter::{EncounterExtractor, EncounterFields};
pub use psa::{LabValue, PsaExtractor, TimeSeriesEntry};
pub use sections::{SectionListExtractor, SectionTextExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFamily {
    Demographics,
    PsaCurve,
    SurgicalHistory,
    SocialHistory,
    FamilyHistory,
    Imaging,
    Encounter,
}

impl FieldFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldFamily::Demographics => "demographics",
            FieldFamily::PsaCurve => "psa_curve",
            FieldFamily::SurgicalHistory => "surgical_history",
            FieldFamily::SocialHistory => "social_history",
            FieldFamily::FamilyHistory => "family_history",
            FieldFamily::Imaging => "imaging",
            FieldFamily::Encounter => "encounter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Scalar,
    List,
    TimeSeries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "segment_index")]
pub enum Source {
    Document,
    Segment(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Absence {
    EmptyContent,
    NoMatch,
    IneligibleSegment,
    AllEntriesMalformed,
}

impl Absence {
    pub fn as_str(self) -> &'static str {
        match self {
            Absence::EmptyContent => "empty_content",
            Absence::NoMatch => "no_match",
            Absence::IneligibleSegment => "ineligible_segment",
            Absence::AllEntriesMalformed => "all_entries_malformed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    Present { value: T, source: Source },
    Absent(Absence),
}

impl<T> Extraction<T> {
    pub fn present(value: T, source: Source) -> Self {
        Extraction::Present { value, source }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Extraction::Present { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Extraction::Present { value, .. } => Some(value),
            Extraction::Absent(_) => None,
        }
    }

    pub fn source(&self) -> Option<Source> {
        match self {
            Extraction::Present { source, .. } => Some(*source),
            Extraction::Absent(_) => None,
        }
    }

    pub fn absence(&self) -> Option<Absence> {
        match self {
            Extraction::Present { .. } => None,
            Extraction::Absent(reason) => Some(*reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub family: FieldFamily,
    pub source: Source,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn record(&mut self, family: FieldFamily, source: Source, message: impl Into<String>) {
        let message = message.into();
        debug!(family = family.as_str(), source = ?source, message = %message, "entry dropped");
        self.entries.push(Diagnostic {
            family,
            source,
            message,
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub trait FieldExtractor: Send + Sync {
    type Value: Send;

    fn family(&self) -> FieldFamily;

    fn shape(&self) -> FieldShape;

    fn eligible(&self, kind: SegmentKind) -> bool;

    fn extract(
        &self,
        text: &str,
        source: Source,
        diagnostics: &mut Diagnostics,
    ) -> Extraction<Self::Value>;

    /// Runs the extractor against one segment, honouring eligibility and
    /// treating empty content as absent.
    fn extract_segment(
        &self,
        segment: &NoteSegment,
        diagnostics: &mut Diagnostics,
    ) -> Extraction<Self::Value> {
        if !self.eligible(segment.kind) {
            return Extraction::Absent(Absence::IneligibleSegment);
        }
        if segment.content.trim().is_empty() {
            return Extraction::Absent(Absence::EmptyContent);
        }

        let result = self.extract(&segment.content, Source::Segment(segment.index), diagnostics);
        debug!(
            family = self.family().as_str(),
            shape = ?self.shape(),
            segment_index = segment.index,
            present = result.is_present(),
            "field extracted"
        );
        result
    }
}

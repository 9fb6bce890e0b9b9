use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::warn;

use super::extract::{
    Absence, Diagnostics, EncounterFields, Extraction, FieldFamily, PatientDemographics, Source,
    TimeSeriesEntry,
};
use super::patterns::collapse_whitespace;
use super::segment::{NoteSegment, SegmentKind};

/// A later value that disagreed with the canonical one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub family: FieldFamily,
    pub kept: String,
    pub found: String,
    pub source: Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterOrigin {
    ConsultRequest,
    NoteSynthesis,
}

/// Union of every series, exact `(date, value)` duplicates collapsed, newest first.
/// Same-date entries with different values are all kept and flagged.
pub fn merge_time_series(
    family: FieldFamily,
    results: Vec<Extraction<Vec<TimeSeriesEntry>>>,
    diagnostics: &mut Diagnostics,
) -> Extraction<Vec<TimeSeriesEntry>> {
    let mut merged = Vec::<TimeSeriesEntry>::new();
    let mut first_source = None;

    for result in results {
        let Extraction::Present { value, source } = result else {
            continue;
        };
        first_source.get_or_insert(source);

        for entry in value {
            if let Some(existing) = merged
                .iter_mut()
                .find(|kept| kept.date == entry.date && kept.value == entry.value)
            {
                if existing.annotation.is_none() {
                    existing.annotation = entry.annotation;
                }
                continue;
            }
            merged.push(entry);
        }
    }

    let Some(source) = first_source else {
        return Extraction::Absent(Absence::NoMatch);
    };

    let mut values_by_date = BTreeMap::<_, Vec<String>>::new();
    for entry in &merged {
        values_by_date
            .entry(entry.date)
            .or_default()
            .push(entry.value.to_string());
    }
    for (date, values) in values_by_date.iter().filter(|(_, values)| values.len() > 1) {
        warn!(family = family.as_str(), %date, values = ?values, "conflicting values for date");
        diagnostics.record(
            family,
            source,
            format!("conflicting values for {date}: {}", values.join(", ")),
        );
        for entry in merged.iter_mut().filter(|entry| entry.date == *date) {
            entry.conflict = true;
        }
    }

    merged.sort_by(|left, right| right.date.cmp(&left.date));
    Extraction::present(merged, source)
}

/// First-seen union. Items differing only by case, spacing or trailing
/// punctuation collapse to the first spelling.
pub fn merge_list(results: Vec<Extraction<Vec<String>>>) -> Extraction<Vec<String>> {
    let mut seen = HashSet::<String>::new();
    let mut merged = Vec::<String>::new();
    let mut first_source = None;

    for result in results {
        let Extraction::Present { value, source } = result else {
            continue;
        };
        first_source.get_or_insert(source);

        for item in value {
            if seen.insert(list_item_key(&item)) {
                merged.push(item);
            }
        }
    }

    match first_source {
        Some(source) if !merged.is_empty() => Extraction::present(merged, source),
        _ => Extraction::Absent(Absence::NoMatch),
    }
}

pub fn list_item_key(item: &str) -> String {
    collapse_whitespace(item)
        .trim_end_matches(['.', ',', ';', ':'])
        .trim()
        .to_lowercase()
}

/// First present value in document order wins; later values that differ
/// under `key` are reported as conflicts.
pub fn merge_scalar<T>(
    family: FieldFamily,
    results: Vec<Extraction<T>>,
    key: impl Fn(&T) -> String,
    conflicts: &mut Vec<Conflict>,
) -> Extraction<T> {
    let mut canonical: Option<(T, Source)> = None;

    for result in results {
        let Extraction::Present { value, source } = result else {
            continue;
        };

        match canonical.as_ref() {
            None => canonical = Some((value, source)),
            Some((kept, _)) => {
                let kept_key = key(kept);
                let found_key = key(&value);
                if kept_key != found_key {
                    warn!(
                        family = family.as_str(),
                        source = ?source,
                        "inconsistent value ignored"
                    );
                    conflicts.push(Conflict {
                        family,
                        kept: kept_key,
                        found: found_key,
                        source,
                    });
                }
            }
        }
    }

    match canonical {
        Some((value, source)) => Extraction::present(value, source),
        None => Extraction::Absent(Absence::NoMatch),
    }
}

pub fn demographics_key(value: &PatientDemographics) -> String {
    format!("{} {}", value.formatted_name, value.ssn)
}

pub fn text_key(value: &str) -> String {
    collapse_whitespace(value).to_lowercase()
}

/// Chief complaint and HPI. A consult request is authoritative when present:
/// its own result is used and notes are never consulted, even if it is absent.
/// Without one, each field is taken from the first GU note that has it, then
/// the first primary care note.
pub fn resolve_encounter(
    segments: &[NoteSegment],
    results: &[Extraction<EncounterFields>],
) -> (Extraction<EncounterFields>, Option<EncounterOrigin>) {
    let consults = segments
        .iter()
        .filter(|segment| segment.kind == SegmentKind::ConsultRequest)
        .collect::<Vec<&NoteSegment>>();

    if !consults.is_empty() {
        let resolved = consults
            .iter()
            .filter_map(|segment| results.get(segment.index))
            .find(|result| result.is_present())
            .cloned()
            .unwrap_or(Extraction::Absent(Absence::NoMatch));
        return (resolved, Some(EncounterOrigin::ConsultRequest));
    }

    let mut fields = EncounterFields::default();
    let mut first_source = None;
    for kind in [SegmentKind::GuNote, SegmentKind::PcpNote] {
        for segment in segments.iter().filter(|segment| segment.kind == kind) {
            let Some(Extraction::Present { value, source }) = results.get(segment.index) else {
                continue;
            };

            let mut contributed = false;
            if fields.chief_complaint.is_none() && value.chief_complaint.is_some() {
                fields.chief_complaint = value.chief_complaint.clone();
                contributed = true;
            }
            if fields.history_of_present_illness.is_none()
                && value.history_of_present_illness.is_some()
            {
                fields.history_of_present_illness = value.history_of_present_illness.clone();
                contributed = true;
            }
            if contributed {
                first_source.get_or_insert(*source);
            }
        }
    }

    match first_source {
        Some(source) => (
            Extraction::present(fields, source),
            Some(EncounterOrigin::NoteSynthesis),
        ),
        None => (Extraction::Absent(Absence::NoMatch), None),
    }
}

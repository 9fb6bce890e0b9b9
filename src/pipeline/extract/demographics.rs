use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use super::{Absence, Diagnostics, Extraction, FieldExtractor, FieldFamily, FieldShape, Source};
use crate::pipeline::patterns::{RuleTable, title_case_word};
use crate::pipeline::segment::SegmentKind;

const NAME: &str = r"[A-Z][A-Z'\-]+(?:[ ][A-Z][A-Z'\-]+)*,[ \t]*[A-Z][A-Z'\-]+(?:[ \t]+[A-Z][A-Z'\-.]*)*";
const SSN: &str = r"\d{3}-\d{2}-\d{4}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientDemographics {
    pub raw_name: String,
    pub formatted_name: String,
    pub ssn: String,
    pub ssn_last4: String,
}

impl PatientDemographics {
    pub fn masked_ssn(&self) -> String {
        format!("***-**-{}", self.ssn_last4)
    }
}

/// Whole-document demographics. Prefers a `NAME, SSN` line over a name line
/// with an `SSN:` token nearby. A name without an SSN is never returned.
#[derive(Debug)]
pub struct DemographicsExtractor {
    rules: RuleTable,
}

impl DemographicsExtractor {
    pub fn new() -> Result<Self> {
        let name_ssn_line =
            format!(r"(?mR)^[ \t]*(?P<name>{NAME})[ \t]*,?[ \t]*(?P<ssn>{SSN})\b");
        let name_then_ssn_nearby = format!(
            r"(?mR)^[ \t]*(?P<name>{NAME})[ \t]*\r?\n(?:.*\r?\n){{0,2}}?.*?\bSSN[ \t]*[:#]?[ \t]*(?P<ssn>{SSN})\b"
        );

        Ok(Self {
            rules: RuleTable::compile(
                "demographics",
                &[
                    ("name_ssn_line", name_ssn_line.as_str()),
                    ("name_then_ssn_nearby", name_then_ssn_nearby.as_str()),
                ],
            )?,
        })
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Every occurrence matched by the highest-precedence rule that matches
    /// at all, as `(byte offset, demographics)` in document order.
    pub fn extract_all(&self, text: &str) -> Vec<(usize, PatientDemographics)> {
        for rule in self.rules.rules() {
            let found = rule
                .regex
                .captures_iter(text)
                .filter_map(|captures| {
                    let offset = captures.get(0)?.start();
                    let name = captures.name("name")?.as_str();
                    let ssn = captures.name("ssn")?.as_str();
                    parse_demographics(name, ssn).map(|value| (offset, value))
                })
                .collect::<Vec<_>>();

            if !found.is_empty() {
                debug!(
                    rule = rule.name,
                    occurrences = found.len(),
                    "demographics matched"
                );
                return found;
            }
        }

        Vec::new()
    }
}

impl FieldExtractor for DemographicsExtractor {
    type Value = PatientDemographics;

    fn family(&self) -> FieldFamily {
        FieldFamily::Demographics
    }

    fn shape(&self) -> FieldShape {
        FieldShape::Scalar
    }

    fn eligible(&self, _kind: SegmentKind) -> bool {
        true
    }

    fn extract(
        &self,
        text: &str,
        source: Source,
        _diagnostics: &mut Diagnostics,
    ) -> Extraction<PatientDemographics> {
        match self.extract_all(text).into_iter().next() {
            Some((_, value)) => Extraction::present(value, source),
            None => Extraction::Absent(Absence::NoMatch),
        }
    }
}

fn parse_demographics(name: &str, ssn: &str) -> Option<PatientDemographics> {
    let (last, given) = name.split_once(',')?;
    let last = last.trim();
    let given = given.split_whitespace().collect::<Vec<&str>>();
    if last.is_empty() || given.is_empty() {
        return None;
    }

    let digits = ssn.chars().filter(char::is_ascii_digit).collect::<String>();
    if digits.len() != 9 {
        return None;
    }

    let formatted_name = given
        .iter()
        .map(|part| part.trim_end_matches('.'))
        .chain(last.split_whitespace())
        .map(title_case_word)
        .collect::<Vec<String>>()
        .join(" ");

    Some(PatientDemographics {
        raw_name: format!("{},{}", last, given.join(" ")),
        formatted_name,
        ssn: ssn.to_string(),
        ssn_last4: digits[5..].to_string(),
    })
}

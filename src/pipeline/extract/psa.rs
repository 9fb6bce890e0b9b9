use std::fmt;
use std::ops::Range;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use super::blocks::BlockReader;
use super::{Absence, Diagnostics, Extraction, FieldExtractor, FieldFamily, FieldShape, Source};
use crate::pipeline::patterns::{
    DATE_TOKEN, PSA_CURVE_LABEL, RuleTable, TIME_SUFFIX, anchor_pattern, lines_with_offsets,
    parse_clinical_date,
};
use crate::pipeline::segment::SegmentKind;

const VALUE_TOKEN: &str = r"(?P<value><?[ \t]*\d+(?:\.\d*)*)";
/// Specimen column of a lab table row (`03/17/2023 08:30  SERUM  PSA  2.88`).
const SPECIMEN: &str = r"(?:SERUM|PLASMA|BLOOD|SER/PLAS|SER|PLAS)";
const QUALIFIER: &str = r"(?:[ \t]*,?[ \t]*(?:TOTAL|SCREEN(?:ING)?|DIAGNOSTIC))?";
const UNIT_AND_FLAG: &str = r"[ \t]*(?:ng/ml)?[ \t]*(?:[HL]\*?(?:[ \t]|$))?[ \t]*";
const CURVE_ROW: &str = "curve_row";

/// A lab result as documented. `text` keeps the reported precision (`2.0`,
/// `2.50`); equality and ordering use `amount`.
#[derive(Debug, Clone, Serialize)]
pub struct LabValue {
    pub amount: f64,
    pub below_limit: bool,
    pub text: String,
}

impl LabValue {
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let (below_limit, digits) = match token.strip_prefix('<') {
            Some(rest) => (true, rest.trim()),
            None => (false, token),
        };
        let digits = digits.trim_end_matches('.');

        let amount = digits.parse::<f64>().ok()?;
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }

        let text = if below_limit {
            format!("<{digits}")
        } else {
            digits.to_string()
        };

        Some(Self {
            amount,
            below_limit,
            text,
        })
    }
}

impl PartialEq for LabValue {
    fn eq(&self, other: &Self) -> bool {
        self.amount == other.amount && self.below_limit == other.below_limit
    }
}

impl fmt::Display for LabValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesEntry {
    pub date: NaiveDate,
    pub value: LabValue,
    pub annotation: Option<String>,
    pub conflict: bool,
}

/// PSA values from lab rows, inline mentions and `PSA CURVE:` blocks.
/// Each line is matched once; the first rule that fits wins.
#[derive(Debug)]
pub struct PsaExtractor {
    rules: RuleTable,
    curve_anchors: RuleTable,
    blocks: BlockReader,
}

impl PsaExtractor {
    pub fn new(blocks: BlockReader) -> Result<Self> {
        let lab_row = format!(
            r"(?i)^[ \t]*(?:(?P<flag>[*!]|R|F)[ \t]+)?{DATE_TOKEN}{TIME_SUFFIX}[ \t]+(?:{SPECIMEN}[ \t]+)?(?:TOTAL[ \t]+)?PSA\b{QUALIFIER}[ \t]*[:=]?[ \t]*{VALUE_TOKEN}{UNIT_AND_FLAG}(?P<annotation>.*?)[ \t]*$"
        );
        let labeled_row = format!(
            r"(?i)^[ \t]*(?:TOTAL[ \t]+)?PSA\b{QUALIFIER}[ \t]*[:=\-]?[ \t]*{DATE_TOKEN}{TIME_SUFFIX}(?:[ \t]*[:=\-][ \t]*|[ \t]+){VALUE_TOKEN}{UNIT_AND_FLAG}(?P<annotation>.*?)[ \t]*$"
        );
        let inline_value = format!(
            r"(?i)\bPSA\b(?:[ \t]+(?:level|value|was|of|is))*[ \t]*[:=]?[ \t]*{VALUE_TOKEN}[ \t]*(?:ng/ml)?[ \t]*,?[ \t]*(?:on|dated|from|in)[ \t]+{DATE_TOKEN}(?P<annotation>.*?)[ \t]*$"
        );
        let curve_row = format!(
            r"(?i)^[ \t]*(?:[-*•][ \t]*)?{DATE_TOKEN}{TIME_SUFFIX}[ \t]*[:\-–]?[ \t]*(?:PSA[ \t]*[:=]?[ \t]*)?{VALUE_TOKEN}[ \t]*(?:ng/ml)?[ \t]*(?P<annotation>.*?)[ \t]*$"
        );

        let curve_anchor = anchor_pattern(PSA_CURVE_LABEL, false, false);

        Ok(Self {
            rules: RuleTable::compile(
                "psa",
                &[
                    ("lab_row", lab_row.as_str()),
                    ("labeled_row", labeled_row.as_str()),
                    ("inline_value", inline_value.as_str()),
                    (CURVE_ROW, curve_row.as_str()),
                ],
            )?,
            curve_anchors: RuleTable::compile("psa_curve_anchor", &[("psa_curve", &curve_anchor)])?,
            blocks,
        })
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    fn curve_ranges(&self, text: &str) -> Vec<Range<usize>> {
        self.blocks
            .all_blocks(text, &self.curve_anchors)
            .into_iter()
            .map(|block| block.range)
            .collect()
    }
}

impl FieldExtractor for PsaExtractor {
    type Value = Vec<TimeSeriesEntry>;

    fn family(&self) -> FieldFamily {
        FieldFamily::PsaCurve
    }

    fn shape(&self) -> FieldShape {
        FieldShape::TimeSeries
    }

    fn eligible(&self, _kind: SegmentKind) -> bool {
        true
    }

    fn extract(
        &self,
        text: &str,
        source: Source,
        diagnostics: &mut Diagnostics,
    ) -> Extraction<Vec<TimeSeriesEntry>> {
        let curve_ranges = self.curve_ranges(text);
        let mut entries = Vec::<TimeSeriesEntry>::new();
        let mut matched_lines = 0usize;

        for (offset, raw_line) in lines_with_offsets(text) {
            let line = raw_line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let in_curve = curve_ranges.iter().any(|range| range.contains(&offset));
            let Some((rule, captures)) = self
                .rules
                .first_match_where(line, |name| name != CURVE_ROW || in_curve)
            else {
                continue;
            };
            matched_lines += 1;

            let date_token = captures.name("date").map(|m| m.as_str()).unwrap_or("");
            let value_token = captures.name("value").map(|m| m.as_str()).unwrap_or("");

            let Some(date) = parse_clinical_date(date_token) else {
                diagnostics.record(
                    FieldFamily::PsaCurve,
                    source,
                    format!("unparseable PSA date '{date_token}' ({rule})"),
                );
                continue;
            };
            let Some(value) = LabValue::parse(value_token) else {
                diagnostics.record(
                    FieldFamily::PsaCurve,
                    source,
                    format!("unparseable PSA value '{value_token}' on {date} ({rule})"),
                );
                continue;
            };

            debug!(rule, %date, value = %value, "psa entry");
            entries.push(TimeSeriesEntry {
                date,
                value,
                annotation: captures
                    .name("annotation")
                    .and_then(|m| clean_annotation(m.as_str())),
                conflict: false,
            });
        }

        if entries.is_empty() {
            return Extraction::Absent(if matched_lines > 0 {
                Absence::AllEntriesMalformed
            } else {
                Absence::NoMatch
            });
        }

        entries.sort_by(|left, right| right.date.cmp(&left.date));
        Extraction::present(entries, source)
    }
}

fn clean_annotation(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_start_matches(['-', '–', ',', ';', ':'])
        .trim();
    let unwrapped = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(trimmed)
        .trim();

    if unwrapped.is_empty() {
        None
    } else {
        Some(unwrapped.to_string())
    }
}

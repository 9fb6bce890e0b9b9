use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::{Captures, Regex};

/// Date tokens as they show up in note dumps: `MAR 17, 2023`, `3/17/2023`, `2023-03-17`.
pub(crate) const DATE_TOKEN: &str =
    r"(?P<date>[A-Za-z]{3,9}\.?[ \t]+\d{1,2},?[ \t]+\d{4}|\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2})";

/// Optional time suffix following a date token (`@10:15`, ` 10:15:32`).
pub(crate) const TIME_SUFFIX: &str = r"(?:[ \t]*@?[ \t]*\d{1,2}:\d{2}(?::\d{2})?)?";

const DATE_FORMATS: &[&str] = &[
    "%b %d, %Y",
    "%b %d %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%Y-%m-%d",
];

/// Section labels shared by the extractor anchors and the block boundary.
pub(crate) const PAST_SURGICAL_HISTORY_LABEL: &str = r"PAST[ \t]+SURGICAL[ \t]+(?:HISTORY|HX)";
pub(crate) const SURGICAL_HISTORY_LABEL: &str = r"SURGICAL[ \t]+(?:HISTORY|HX)";
pub(crate) const PAST_SURGERIES_LABEL: &str = r"(?:PAST|PRIOR)[ \t]+SURGERIES";
pub(crate) const SOCIAL_HISTORY_LABEL: &str = r"SOCIAL[ \t]+(?:HISTORY|HX)";
pub(crate) const FAMILY_HISTORY_LABEL: &str = r"FAMILY[ \t]+(?:HISTORY|HX)";
pub(crate) const IMAGING_LABEL: &str = r"IMAGING(?:[ \t]+(?:STUDIES|RESULTS|FINDINGS))?";
pub(crate) const RADIOLOGY_LABEL: &str = r"RADIOLOGY(?:[ \t]+(?:REPORTS?|RESULTS))?";
pub(crate) const PSA_CURVE_LABEL: &str = r"PSA[ \t]+(?:CURVE|HISTORY|TREND)";
pub(crate) const CHIEF_COMPLAINT_LABEL: &str = r"CHIEF[ \t]+COMPLAINTS?";
pub(crate) const REASON_FOR_REQUEST_LABEL: &str = r"REASON[ \t]+FOR[ \t]+REQUEST";
pub(crate) const REASON_FOR_CONSULT_LABEL: &str = r"REASON[ \t]+FOR[ \t]+CONSULT(?:ATION)?";
pub(crate) const HISTORY_OF_PRESENT_ILLNESS_LABEL: &str =
    r"HISTORY[ \t]+OF[ \t]+(?:THE[ \t]+)?PRESENT[ \t]+ILLNESS";
pub(crate) const PSH_ABBREVIATION: &str = "PSH";
pub(crate) const SH_ABBREVIATION: &str = "SH|SHX";
pub(crate) const FH_ABBREVIATION: &str = "FH|FHX";
pub(crate) const CC_ABBREVIATION: &str = "CC";
pub(crate) const HPI_ABBREVIATION: &str = "HPI";

/// Every label that opens a new section, as `(pattern, exact_case)`. The
/// extracted families come first, then the other headings of a clinic note.
const SECTION_LABELS: &[(&str, bool)] = &[
    (PAST_SURGICAL_HISTORY_LABEL, false),
    (SURGICAL_HISTORY_LABEL, false),
    (PAST_SURGERIES_LABEL, false),
    (SOCIAL_HISTORY_LABEL, false),
    (FAMILY_HISTORY_LABEL, false),
    (IMAGING_LABEL, false),
    (RADIOLOGY_LABEL, false),
    (PSA_CURVE_LABEL, false),
    (CHIEF_COMPLAINT_LABEL, false),
    (REASON_FOR_REQUEST_LABEL, false),
    (REASON_FOR_CONSULT_LABEL, false),
    (HISTORY_OF_PRESENT_ILLNESS_LABEL, false),
    (PSH_ABBREVIATION, true),
    (SH_ABBREVIATION, true),
    (FH_ABBREVIATION, true),
    (CC_ABBREVIATION, true),
    (HPI_ABBREVIATION, true),
    (r"PAST[ \t]+MEDICAL[ \t]+(?:HISTORY|HX)", false),
    (r"(?:ACTIVE[ \t]+|OUTPATIENT[ \t]+)?MEDICATIONS", false),
    (r"ALLERGIES", false),
    (r"REVIEW[ \t]+OF[ \t]+SYSTEMS", false),
    (r"PHYSICAL[ \t]+EXAM(?:INATION)?", false),
    (r"VITAL[ \t]+SIGNS", false),
    (r"ASSESSMENT(?:[ \t]*(?:AND|&|/)[ \t]*PLAN)?", false),
    (r"PLAN", false),
    (r"PROBLEM[ \t]+LIST", false),
    (r"LABS|LAB(?:ORATORY)?[ \t]+(?:DATA|RESULTS)", false),
    (r"DATE[ \t]+OF[ \t]+NOTE", false),
    (r"ENTRY[ \t]+DATE", false),
    ("PMH|ROS|A/P|MEDS", true),
];

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    pub regex: Regex,
}

/// Ordered list of named patterns. Earlier rules take precedence over later ones.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn compile(table: &'static str, rows: &[(&'static str, &str)]) -> Result<Self> {
        let mut rules = Vec::with_capacity(rows.len());
        for (name, pattern) in rows {
            let regex = Regex::new(pattern)
                .with_context(|| format!("failed to compile {table} rule '{name}'"))?;
            rules.push(Rule { name, regex });
        }

        Ok(Self { rules })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.rules.iter().any(|rule| rule.regex.is_match(text))
    }

    pub fn first_match_where<'t>(
        &self,
        text: &'t str,
        admit: impl Fn(&str) -> bool,
    ) -> Option<(&'static str, Captures<'t>)> {
        self.rules
            .iter()
            .filter(|rule| admit(rule.name))
            .find_map(|rule| rule.regex.captures(text).map(|captures| (rule.name, captures)))
    }
}

fn label_group(label: &str, exact_case: bool) -> String {
    if exact_case {
        format!("(?:{label})")
    } else {
        format!("(?i:{label})")
    }
}

/// Builds a line-anchored section header pattern. The label is matched
/// case-insensitively unless `exact_case` is set (short abbreviations such as `SH`).
/// Text after the colon on the header line is captured as `inline`.
pub(crate) fn anchor_pattern(label: &str, exact_case: bool, colon_required: bool) -> String {
    let label = label_group(label, exact_case);
    if colon_required {
        format!(r"(?mR)^[ \t]*{label}[ \t]*:[ \t]*(?P<inline>.*?)[ \t]*$")
    } else {
        format!(
            r"(?mR)^[ \t]*{label}[ \t]*(?:\([^)\r\n]*\))?[ \t]*(?::[ \t]*(?P<inline>.*?))?[ \t]*$"
        )
    }
}

/// Where a multi-line field stops: a known section label (with or without
/// text after it), an all-caps label ending in a bare colon, a run of ten or
/// more `=`, or the end of the text. All-caps content such as
/// `CT ABDOMEN/PELVIS: no hydronephrosis` stays inside the block.
#[derive(Debug, Clone)]
pub struct Boundary {
    section_header: Regex,
    bare_label: Regex,
    rule_line: Regex,
}

impl Boundary {
    pub fn new() -> Result<Self> {
        let labels = SECTION_LABELS
            .iter()
            .map(|(label, exact_case)| label_group(label, *exact_case))
            .collect::<Vec<String>>()
            .join("|");

        Ok(Self {
            section_header: Regex::new(&format!(
                r"^[ \t]*(?:{labels})[ \t]*(?:\([^)]*\))?[ \t]*(?::.*)?$"
            ))
            .context("failed to compile section header regex")?,
            bare_label: Regex::new(r"^[ \t]*[A-Z][A-Z /&,()'\-]{2,}:[ \t]*$")
                .context("failed to compile bare label regex")?,
            rule_line: Regex::new(r"={10,}").context("failed to compile rule line regex")?,
        })
    }

    pub fn is_boundary(&self, line: &str) -> bool {
        let line = line.trim_end_matches('\r');
        self.rule_line.is_match(line)
            || self.bare_label.is_match(line)
            || self.section_header.is_match(line)
    }

    /// Byte offset where the block starting at `start` ends.
    pub fn block_end(&self, text: &str, start: usize) -> usize {
        for (offset, line) in lines_with_offsets(&text[start..]) {
            if self.is_boundary(line) {
                return start + offset;
            }
        }

        text.len()
    }
}

/// Iterates `(byte offset, line)` pairs. Lines exclude their `\n`.
pub(crate) fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0usize;
    text.split_inclusive('\n').map(move |raw| {
        let start = offset;
        offset += raw.len();
        (start, raw.strip_suffix('\n').unwrap_or(raw))
    })
}

/// Byte offset just past the line containing `position`.
pub(crate) fn next_line_start(text: &str, position: usize) -> usize {
    text[position..]
        .find('\n')
        .map(|index| position + index + 1)
        .unwrap_or(text.len())
}

pub fn parse_clinical_date(token: &str) -> Option<NaiveDate> {
    let cleaned = token
        .split('@')
        .next()
        .unwrap_or(token)
        .replace('.', "")
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ");
    let cleaned = normalize_month_spelling(&cleaned);

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
}

fn normalize_month_spelling(value: &str) -> String {
    let mut parts = value.splitn(2, ' ');
    let month = parts.next().unwrap_or_default();
    let rest = parts.next();
    let month = if month.eq_ignore_ascii_case("sept") {
        "Sep"
    } else {
        month
    };

    match rest {
        Some(rest) => format!("{month} {rest}"),
        None => month.to_string(),
    }
}

/// `STEPHEN` -> `Stephen`, `O'BRIEN` -> `O'Brien`, `SMITH-JONES` -> `Smith-Jones`.
pub fn title_case_word(word: &str) -> String {
    let mut output = String::with_capacity(word.len());
    let mut capitalize = true;
    for ch in word.chars() {
        if capitalize {
            output.extend(ch.to_uppercase());
        } else {
            output.extend(ch.to_lowercase());
        }
        capitalize = matches!(ch, '-' | '\'');
    }

    output
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<&str>>().join(" ")
}

use anyhow::Result;
use tracing::debug;

use super::blocks::BlockReader;
use super::{Absence, Diagnostics, Extraction, FieldExtractor, FieldFamily, FieldShape, Source};
use crate::pipeline::patterns::{
    FAMILY_HISTORY_LABEL, FH_ABBREVIATION, IMAGING_LABEL, PAST_SURGERIES_LABEL,
    PAST_SURGICAL_HISTORY_LABEL, PSH_ABBREVIATION, RADIOLOGY_LABEL, RuleTable, SH_ABBREVIATION,
    SOCIAL_HISTORY_LABEL, SURGICAL_HISTORY_LABEL, anchor_pattern,
};
use crate::pipeline::segment::SegmentKind;

/// Header-anchored list field: surgical history, family history, imaging.
#[derive(Debug)]
pub struct SectionListExtractor {
    family: FieldFamily,
    anchors: RuleTable,
    boilerplate: Option<RuleTable>,
    blocks: BlockReader,
}

impl SectionListExtractor {
    pub fn surgical_history(blocks: BlockReader) -> Result<Self> {
        Ok(Self {
            family: FieldFamily::SurgicalHistory,
            anchors: RuleTable::compile(
                "surgical_history_anchor",
                &[
                    (
                        "past_surgical_history",
                        &anchor_pattern(PAST_SURGICAL_HISTORY_LABEL, false, false),
                    ),
                    (
                        "surgical_history",
                        &anchor_pattern(SURGICAL_HISTORY_LABEL, false, false),
                    ),
                    (
                        "past_surgeries",
                        &anchor_pattern(PAST_SURGERIES_LABEL, false, false),
                    ),
                    ("psh", &anchor_pattern(PSH_ABBREVIATION, true, true)),
                ],
            )?,
            boilerplate: None,
            blocks,
        })
    }

    pub fn family_history(blocks: BlockReader) -> Result<Self> {
        Ok(Self {
            family: FieldFamily::FamilyHistory,
            anchors: RuleTable::compile(
                "family_history_anchor",
                &[
                    (
                        "family_history",
                        &anchor_pattern(FAMILY_HISTORY_LABEL, false, false),
                    ),
                    ("fh", &anchor_pattern(FH_ABBREVIATION, true, true)),
                ],
            )?,
            boilerplate: None,
            blocks,
        })
    }

    pub fn imaging(blocks: BlockReader) -> Result<Self> {
        Ok(Self {
            family: FieldFamily::Imaging,
            anchors: RuleTable::compile(
                "imaging_anchor",
                &[
                    (
                        "imaging",
                        &anchor_pattern(IMAGING_LABEL, false, false),
                    ),
                    (
                        "radiology",
                        &anchor_pattern(RADIOLOGY_LABEL, false, false),
                    ),
                ],
            )?,
            boilerplate: Some(RuleTable::compile(
                "imaging_boilerplate",
                &[
                    (
                        "exam_status",
                        r"(?i)^(?:exam[ \t]+date|exam[ \t]+status|report[ \t]+status|status)[ \t]*:",
                    ),
                    ("case_number", r"(?i)^case[ \t]*(?:#|no\.?|number)"),
                    (
                        "signature",
                        r"(?i)^(?:verified[ \t]+by|electronically[ \t]+signed|(?:primary[ \t]+)?interpreting[ \t]+(?:physician|radiologist|staff)|staff[ \t]+radiologist|resident)\b",
                    ),
                    (
                        "requesting",
                        r"(?i)^requesting[ \t]+(?:physician|provider|location)",
                    ),
                    ("banner", r"^\*{2,}.*\*{2,}$"),
                    (
                        "diagnostic_code",
                        r"(?i)^(?:primary|secondary)[ \t]+diagnostic[ \t]+code",
                    ),
                ],
            )?),
            blocks,
        })
    }

    pub fn anchors(&self) -> &RuleTable {
        &self.anchors
    }
}

impl FieldExtractor for SectionListExtractor {
    type Value = Vec<String>;

    fn family(&self) -> FieldFamily {
        self.family
    }

    fn shape(&self) -> FieldShape {
        FieldShape::List
    }

    fn eligible(&self, _kind: SegmentKind) -> bool {
        true
    }

    fn extract(
        &self,
        text: &str,
        source: Source,
        diagnostics: &mut Diagnostics,
    ) -> Extraction<Vec<String>> {
        let Some(block) = self.blocks.find_block(text, &self.anchors) else {
            return Extraction::Absent(Absence::NoMatch);
        };

        let mut lines = block.lines();
        if let Some(boilerplate) = self.boilerplate.as_ref() {
            lines.retain(|line| {
                let drop = boilerplate.is_match(line);
                if drop {
                    debug!(family = self.family.as_str(), line = %line, "boilerplate line skipped");
                }
                !drop
            });
        }

        let split = self.blocks.split_items(&lines);
        for message in split.dropped {
            diagnostics.record(self.family, source, message);
        }

        if split.items.is_empty() {
            return Extraction::Absent(Absence::NoMatch);
        }

        debug!(
            family = self.family.as_str(),
            rule = block.rule,
            items = split.items.len(),
            "section list extracted"
        );
        Extraction::present(split.items, source)
    }
}

/// Header-anchored free-text field (social history).
#[derive(Debug)]
pub struct SectionTextExtractor {
    family: FieldFamily,
    anchors: RuleTable,
    blocks: BlockReader,
}

impl SectionTextExtractor {
    pub fn social_history(blocks: BlockReader) -> Result<Self> {
        Ok(Self {
            family: FieldFamily::SocialHistory,
            anchors: RuleTable::compile(
                "social_history_anchor",
                &[
                    (
                        "social_history",
                        &anchor_pattern(SOCIAL_HISTORY_LABEL, false, false),
                    ),
                    ("sh", &anchor_pattern(SH_ABBREVIATION, true, true)),
                ],
            )?,
            blocks,
        })
    }

}

impl FieldExtractor for SectionTextExtractor {
    type Value = String;

    fn family(&self) -> FieldFamily {
        self.family
    }

    fn shape(&self) -> FieldShape {
        FieldShape::Scalar
    }

    fn eligible(&self, _kind: SegmentKind) -> bool {
        true
    }

    fn extract(&self, text: &str, source: Source, _diagnostics: &mut Diagnostics) -> Extraction<String> {
        match self.blocks.find_block(text, &self.anchors) {
            Some(block) => Extraction::present(block.lines().join("\n"), source),
            None => Extraction::Absent(Absence::NoMatch),
        }
    }
}

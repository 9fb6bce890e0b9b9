use anyhow::Result;
use serde::Serialize;

use super::blocks::BlockReader;
use super::{Absence, Diagnostics, Extraction, FieldExtractor, FieldFamily, FieldShape, Source};
use crate::pipeline::patterns::{
    CC_ABBREVIATION, CHIEF_COMPLAINT_LABEL, HISTORY_OF_PRESENT_ILLNESS_LABEL, HPI_ABBREVIATION,
    REASON_FOR_CONSULT_LABEL, REASON_FOR_REQUEST_LABEL, RuleTable, anchor_pattern,
};
use crate::pipeline::segment::SegmentKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncounterFields {
    pub chief_complaint: Option<String>,
    pub history_of_present_illness: Option<String>,
}

impl EncounterFields {
    pub fn is_empty(&self) -> bool {
        self.chief_complaint.is_none() && self.history_of_present_illness.is_none()
    }
}

/// Chief complaint and HPI as two bounded fields of a consult form or note.
#[derive(Debug)]
pub struct EncounterExtractor {
    chief_complaint: RuleTable,
    history: RuleTable,
    blocks: BlockReader,
}

impl EncounterExtractor {
    pub fn new(blocks: BlockReader) -> Result<Self> {
        Ok(Self {
            chief_complaint: RuleTable::compile(
                "chief_complaint_anchor",
                &[
                    (
                        "chief_complaint",
                        &anchor_pattern(CHIEF_COMPLAINT_LABEL, false, false),
                    ),
                    (
                        "reason_for_request",
                        &anchor_pattern(REASON_FOR_REQUEST_LABEL, false, false),
                    ),
                    (
                        "reason_for_consult",
                        &anchor_pattern(REASON_FOR_CONSULT_LABEL, false, false),
                    ),
                    ("cc", &anchor_pattern(CC_ABBREVIATION, true, true)),
                ],
            )?,
            history: RuleTable::compile(
                "hpi_anchor",
                &[
                    (
                        "history_of_present_illness",
                        &anchor_pattern(HISTORY_OF_PRESENT_ILLNESS_LABEL, false, false),
                    ),
                    ("hpi", &anchor_pattern(HPI_ABBREVIATION, true, false)),
                ],
            )?,
            blocks,
        })
    }

    fn field(&self, text: &str, anchors: &RuleTable) -> Option<String> {
        self.blocks
            .find_block(text, anchors)
            .map(|block| block.lines().join("\n"))
            .filter(|value| !value.is_empty())
    }
}

impl FieldExtractor for EncounterExtractor {
    type Value = EncounterFields;

    fn family(&self) -> FieldFamily {
        FieldFamily::Encounter
    }

    fn shape(&self) -> FieldShape {
        FieldShape::Scalar
    }

    fn eligible(&self, kind: SegmentKind) -> bool {
        matches!(
            kind,
            SegmentKind::ConsultRequest | SegmentKind::GuNote | SegmentKind::PcpNote
        )
    }

    fn extract(
        &self,
        text: &str,
        source: Source,
        _diagnostics: &mut Diagnostics,
    ) -> Extraction<EncounterFields> {
        let fields = EncounterFields {
            chief_complaint: self.field(text, &self.chief_complaint),
            history_of_present_illness: self.field(text, &self.history),
        };

        if fields.is_empty() {
            Extraction::Absent(Absence::NoMatch)
        } else {
            Extraction::present(fields, source)
        }
    }
}

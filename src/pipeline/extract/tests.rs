use super::*;
use crate::pipeline::segment::{NoteSegment, SegmentKind};
use chrono::NaiveDate;

fn blocks() -> BlockReader {
    BlockReader::new().expect("block reader builds")
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn run<E: FieldExtractor>(extractor: &E, text: &str) -> (Extraction<E::Value>, Diagnostics) {
    let mut diagnostics = Diagnostics::default();
    let result = extractor.extract(text, Source::Segment(0), &mut diagnostics);
    (result, diagnostics)
}

fn segment(kind: SegmentKind, content: &str) -> NoteSegment {
    NoteSegment {
        index: 3,
        kind,
        date: None,
        title: String::new(),
        header: 0..0,
        span: 0..content.len(),
        content: content.to_string(),
    }
}

#[test]
fn demographics_formats_name_and_masks_ssn() {
    let extractor = DemographicsExtractor::new().expect("demographics extractor builds");
    let (result, _) = run(&extractor, "KILE,STEPHEN A, 495-60-7007\n");

    let value = result.value().expect("demographics present");
    assert_eq!(value.raw_name, "KILE,STEPHEN A");
    assert_eq!(value.formatted_name, "Stephen A Kile");
    assert_eq!(value.ssn_last4, "7007");
    assert_eq!(value.masked_ssn(), "***-**-7007");
    assert_eq!(result.source(), Some(Source::Segment(0)));
}

#[test]
fn demographics_finds_ssn_on_following_lines() {
    let extractor = DemographicsExtractor::new().expect("demographics extractor builds");
    let text = "O'BRIEN,PATRICK J\nDOB: 01/02/1950\nSSN: 123-45-6789\n";
    let (result, _) = run(&extractor, text);

    let value = result.value().expect("demographics present");
    assert_eq!(value.formatted_name, "Patrick J O'Brien");
    assert_eq!(value.ssn_last4, "6789");
}

#[test]
fn demographics_prefers_name_ssn_line_over_nearby_ssn() {
    let extractor = DemographicsExtractor::new().expect("demographics extractor builds");
    assert_eq!(
        extractor.rules().names(),
        vec!["name_ssn_line", "name_then_ssn_nearby"]
    );

    let text = "SMITH,JOHN\nSSN: 111-22-3333\nKILE,STEPHEN A 495-60-7007\n";
    let found = extractor.extract_all(text);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].1.formatted_name, "Stephen A Kile");
    assert_eq!(found[0].0, text.find("KILE").expect("offset"));
}

#[test]
fn demographics_without_ssn_is_absent() {
    let extractor = DemographicsExtractor::new().expect("demographics extractor builds");
    let (result, _) = run(&extractor, "KILE,STEPHEN A\nDOB: 01/02/1950\n");

    assert_eq!(result.absence(), Some(Absence::NoMatch));
}

#[test]
fn lab_value_keeps_below_limit_marker() {
    let value = LabValue::parse("< 0.1").expect("value parses");
    assert!(value.below_limit);
    assert_eq!(value.to_string(), "<0.1");

    assert_eq!(LabValue::parse("2.88").map(|v| v.amount), Some(2.88));
    assert_eq!(LabValue::parse("2.0").map(|v| v.to_string()).as_deref(), Some("2.0"));
    assert_eq!(LabValue::parse("4.").map(|v| v.to_string()).as_deref(), Some("4"));
    assert_eq!(LabValue::parse("2.50"), LabValue::parse("2.5"));
    assert_eq!(LabValue::parse("1.2.3"), None);
    assert_eq!(LabValue::parse(""), None);
}

#[test]
fn psa_lab_rows_are_sorted_newest_first() {
    let extractor = PsaExtractor::new(blocks()).expect("psa extractor builds");
    assert_eq!(
        extractor.rules().names(),
        vec!["lab_row", "labeled_row", "inline_value", "curve_row"]
    );

    let text = "01/05/2022 PSA 3.1 H\nMAR 17, 2023 PSA 2.88\n";
    let (result, diagnostics) = run(&extractor, text);

    let entries = result.value().expect("psa present");
    assert!(diagnostics.is_empty());
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].date, date(2023, 3, 17));
    assert_eq!(entries[0].value.amount, 2.88);
    assert_eq!(entries[1].date, date(2022, 1, 5));
    assert_eq!(entries[1].value.amount, 3.1);
}

#[test]
fn psa_labeled_rows_put_the_date_after_the_label() {
    let extractor = PsaExtractor::new(blocks()).expect("psa extractor builds");

    let (spaced, _) = run(&extractor, "PSA  MAR 17, 2023  2.88\n");
    let entries = spaced.value().expect("psa present");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].date, date(2023, 3, 17));
    assert_eq!(entries[0].value.amount, 2.88);

    let (colon, _) = run(&extractor, "PSA: Mar 17, 2023 2.88\n");
    let entries = colon.value().expect("psa present");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].date, date(2023, 3, 17));
    assert_eq!(entries[0].value.to_string(), "2.88");
}

#[test]
fn psa_lab_row_skips_specimen_column() {
    let extractor = PsaExtractor::new(blocks()).expect("psa extractor builds");
    let (result, diagnostics) = run(&extractor, "03/17/2023 08:30  SERUM  PSA  2.88 ng/mL\n");

    let entries = result.value().expect("psa present");
    assert!(diagnostics.is_empty());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].date, date(2023, 3, 17));
    assert_eq!(entries[0].value.amount, 2.88);
    assert_eq!(entries[0].annotation, None);
}

#[test]
fn psa_inline_mention_with_date() {
    let extractor = PsaExtractor::new(blocks()).expect("psa extractor builds");
    let (result, _) = run(&extractor, "Patient reports PSA was 4.2 on 06/01/2021 at outside lab.\n");

    let entries = result.value().expect("psa present");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].date, date(2021, 6, 1));
    assert_eq!(entries[0].value.amount, 4.2);
}

#[test]
fn psa_curve_rows_need_a_curve_block() {
    let extractor = PsaExtractor::new(blocks()).expect("psa extractor builds");

    let curve = "PSA CURVE:\n03/17/2023 2.88\n01/05/2022 3.1 (on finasteride)\n";
    let (result, _) = run(&extractor, curve);
    let entries = result.value().expect("psa present");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].annotation.as_deref(), Some("on finasteride"));

    let (loose, _) = run(&extractor, "03/17/2023 2.88\n");
    assert_eq!(loose.absence(), Some(Absence::NoMatch));
}

#[test]
fn psa_with_only_bad_dates_is_malformed() {
    let extractor = PsaExtractor::new(blocks()).expect("psa extractor builds");
    let (result, diagnostics) = run(&extractor, "PSA CURVE:\n02/30/2023 2.88\n");

    assert_eq!(result.absence(), Some(Absence::AllEntriesMalformed));
    assert_eq!(diagnostics.entries().len(), 1);
    assert_eq!(diagnostics.entries()[0].family, FieldFamily::PsaCurve);
    assert_eq!(diagnostics.entries()[0].source, Source::Segment(0));
}

#[test]
fn surgical_history_joins_continuation_lines() {
    let extractor = SectionListExtractor::surgical_history(blocks()).expect("extractor builds");
    let text = "PAST SURGICAL HISTORY:\n1. Transurethral resection of prostate\n   in 2015\n2. Right knee arthroscopy\n3. Appendectomy\n4. Left inguinal hernia repair\nPSA CURVE:\n03/17/2023 2.88\n";
    let (result, diagnostics) = run(&extractor, text);

    assert!(diagnostics.is_empty());
    assert_eq!(
        result.value().expect("surgical history present"),
        &vec![
            "Transurethral resection of prostate in 2015".to_string(),
            "Right knee arthroscopy".to_string(),
            "Appendectomy".to_string(),
            "Left inguinal hernia repair".to_string(),
        ]
    );
}

#[test]
fn surgical_history_keeps_all_caps_procedures() {
    let extractor = SectionListExtractor::surgical_history(blocks()).expect("extractor builds");
    let text = "PAST SURGICAL HISTORY:\nRADICAL PROSTATECTOMY\nAPPENDECTOMY\nPSA CURVE:\n03/17/2023 0.1\n";
    let (result, _) = run(&extractor, text);

    assert_eq!(
        result.value().expect("surgical history present"),
        &vec!["RADICAL PROSTATECTOMY".to_string(), "APPENDECTOMY".to_string()]
    );
}

#[test]
fn surgical_history_drops_empty_enumerated_item() {
    let extractor = SectionListExtractor::surgical_history(blocks()).expect("extractor builds");
    let (result, diagnostics) = run(&extractor, "PSH:\n1. Cystoscopy\n2.\n");

    assert_eq!(
        result.value().expect("surgical history present"),
        &vec!["Cystoscopy".to_string()]
    );
    assert_eq!(diagnostics.entries().len(), 1);
    assert_eq!(diagnostics.entries()[0].message, "enumerated item 2 has no text");
}

#[test]
fn surgical_history_anchor_precedence() {
    let extractor = SectionListExtractor::surgical_history(blocks()).expect("extractor builds");
    assert_eq!(
        extractor.anchors().names(),
        vec!["past_surgical_history", "surgical_history", "past_surgeries", "psh"]
    );

    let text = "PSH: Vasectomy\n\nPast Surgical History:\nCystoscopy 2019\n";
    let (result, _) = run(&extractor, text);
    assert_eq!(
        result.value().expect("surgical history present"),
        &vec!["Cystoscopy 2019".to_string()]
    );
}

#[test]
fn header_followed_by_header_is_not_a_block() {
    let surgical = SectionListExtractor::surgical_history(blocks()).expect("extractor builds");
    let social = SectionTextExtractor::social_history(blocks()).expect("extractor builds");
    let text = "PAST SURGICAL HISTORY:\nSOCIAL HISTORY:\nLives alone.\n";

    let (surgical_result, _) = run(&surgical, text);
    assert_eq!(surgical_result.absence(), Some(Absence::NoMatch));

    let (social_result, _) = run(&social, text);
    assert_eq!(
        social_result.value().map(String::as_str),
        Some("Lives alone.")
    );
}

#[test]
fn social_history_keeps_inline_and_body_text() {
    let extractor = SectionTextExtractor::social_history(blocks()).expect("extractor builds");
    let text = "SOCIAL HISTORY: Former smoker, quit 2001.\nDrinks socially.\n==========\nOther text\n";
    let (result, _) = run(&extractor, text);

    assert_eq!(
        result.value().map(String::as_str),
        Some("Former smoker, quit 2001.\nDrinks socially.")
    );
}

#[test]
fn family_history_strips_bullets() {
    let extractor = SectionListExtractor::family_history(blocks()).expect("extractor builds");
    let text = "FAMILY HISTORY:\n- Father: prostate cancer at 68\n- Mother: breast cancer\n\nSOCIAL HISTORY:\nNever smoker.\n";
    let (result, _) = run(&extractor, text);

    assert_eq!(
        result.value().expect("family history present"),
        &vec![
            "Father: prostate cancer at 68".to_string(),
            "Mother: breast cancer".to_string(),
        ]
    );
}

#[test]
fn family_history_keeps_all_caps_relatives() {
    let extractor = SectionListExtractor::family_history(blocks()).expect("extractor builds");
    let text = "FAMILY HISTORY:\nFATHER: prostate cancer\nBROTHER: bladder cancer\nSOCIAL HISTORY:\nNever smoker.\n";
    let (result, _) = run(&extractor, text);

    assert_eq!(
        result.value().expect("family history present"),
        &vec![
            "FATHER: prostate cancer".to_string(),
            "BROTHER: bladder cancer".to_string(),
        ]
    );
}

#[test]
fn imaging_keeps_all_caps_study_lines() {
    let extractor = SectionListExtractor::imaging(blocks()).expect("extractor builds");
    let text = "IMAGING:\nCT ABDOMEN/PELVIS: no hydronephrosis\nMRI PROSTATE: PI-RADS 4 lesion\nASSESSMENT:\nBPH\n";
    let (result, _) = run(&extractor, text);

    assert_eq!(
        result.value().expect("imaging present"),
        &vec![
            "CT ABDOMEN/PELVIS: no hydronephrosis".to_string(),
            "MRI PROSTATE: PI-RADS 4 lesion".to_string(),
        ]
    );
}

#[test]
fn imaging_skips_report_boilerplate() {
    let extractor = SectionListExtractor::imaging(blocks()).expect("extractor builds");
    let text = "IMAGING:\nCT abdomen/pelvis 02/01/2023: no hydronephrosis\nExam Date: 02/01/2023\nCase #: 1234\nVerified By: DOE,JANE\nMRI prostate 01/10/2023 PI-RADS 4 lesion\n";
    let (result, _) = run(&extractor, text);

    assert_eq!(
        result.value().expect("imaging present"),
        &vec![
            "CT abdomen/pelvis 02/01/2023: no hydronephrosis".to_string(),
            "MRI prostate 01/10/2023 PI-RADS 4 lesion".to_string(),
        ]
    );
}

#[test]
fn encounter_reads_chief_complaint_and_history() {
    let extractor = EncounterExtractor::new(blocks()).expect("encounter extractor builds");
    let text = "CHIEF COMPLAINT: Elevated PSA\nHISTORY OF PRESENT ILLNESS:\n72 yo male with rising PSA.\nNo urinary retention.\nPAST SURGICAL HISTORY:\n1. Vasectomy\n";
    let (result, _) = run(&extractor, text);

    let fields = result.value().expect("encounter present");
    assert_eq!(fields.chief_complaint.as_deref(), Some("Elevated PSA"));
    assert_eq!(
        fields.history_of_present_illness.as_deref(),
        Some("72 yo male with rising PSA.\nNo urinary retention.")
    );
}

#[test]
fn encounter_accepts_reason_for_request() {
    let extractor = EncounterExtractor::new(blocks()).expect("encounter extractor builds");
    let (result, _) = run(&extractor, "REASON FOR REQUEST: Evaluate elevated PSA\n");

    let fields = result.value().expect("encounter present");
    assert_eq!(fields.chief_complaint.as_deref(), Some("Evaluate elevated PSA"));
    assert_eq!(fields.history_of_present_illness, None);
}

#[test]
fn encounter_skips_ineligible_and_empty_segments() {
    let extractor = EncounterExtractor::new(blocks()).expect("encounter extractor builds");
    let mut diagnostics = Diagnostics::default();

    let other = segment(SegmentKind::Other, "CHIEF COMPLAINT: Elevated PSA\n");
    assert_eq!(
        extractor.extract_segment(&other, &mut diagnostics).absence(),
        Some(Absence::IneligibleSegment)
    );

    let blank = segment(SegmentKind::GuNote, "  \n\n");
    assert_eq!(
        extractor.extract_segment(&blank, &mut diagnostics).absence(),
        Some(Absence::EmptyContent)
    );

    let consult = segment(SegmentKind::ConsultRequest, "CHIEF COMPLAINT: Elevated PSA\n");
    assert_eq!(
        extractor.extract_segment(&consult, &mut diagnostics).source(),
        Some(Source::Segment(3))
    );
}

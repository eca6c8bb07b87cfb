//! Stage completion rules.
//!
//! Each validator turns a partial submission into the completed section for its stage, or
//! returns every field problem it found so the form can highlight all of them at once.

use crate::constants::{MAX_PATIENT_AGE, MAX_PATIENT_INITIALS_CHARS};
use crate::model::{
    Actor, CodedEvent, DataEntry, DataEntryDraft, DataEntryPayload, FieldIssue, MedicalPayload,
    MedicalReview, QualityPayload, QualityReview, SeriousnessCriteria, SeriousnessCriterion,
    TriageData, TriagePayload,
};
use chrono::{DateTime, NaiveDate, Utc};
use pv_meddra::Terminology;
use pv_types::{non_blank, NonEmptyText, TextError};

type Issues = Vec<FieldIssue>;

fn required(field: &str, value: Option<&str>, issues: &mut Issues) -> Option<NonEmptyText> {
    let text = non_blank(value);
    if text.is_none() {
        issues.push(FieldIssue::new(field, "is required"));
    }
    text
}

fn optional(value: Option<&str>) -> Option<String> {
    non_blank(value).map(NonEmptyText::into_inner)
}

fn parse_date(field: &str, raw: &str, issues: &mut Issues) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            issues.push(FieldIssue::new(field, "must be a date in YYYY-MM-DD form"));
            None
        }
    }
}

/// Checks the four minimum criteria of a valid report.
pub fn validate_triage(payload: &TriagePayload) -> Result<TriageData, Issues> {
    let mut issues = Issues::new();

    let reporter_name = required("reporterName", payload.reporter_name.as_deref(), &mut issues);
    let patient_initials = match NonEmptyText::with_max_chars(
        payload.patient_initials.as_deref().unwrap_or_default(),
        MAX_PATIENT_INITIALS_CHARS,
    ) {
        Ok(text) => Some(text),
        Err(TextError::Empty) => {
            issues.push(FieldIssue::new("patientInitials", "is required"));
            None
        }
        Err(TextError::TooLong { max }) => {
            issues.push(FieldIssue::new(
                "patientInitials",
                format!("must be at most {max} characters"),
            ));
            None
        }
    };
    let product_name = required("productName", payload.product_name.as_deref(), &mut issues);
    let event_description = required(
        "eventDescription",
        payload.event_description.as_deref(),
        &mut issues,
    );

    match (reporter_name, patient_initials, product_name, event_description) {
        (Some(reporter_name), Some(patient_initials), Some(product_name), Some(event_description))
            if issues.is_empty() =>
        {
            Ok(TriageData {
                reporter_name,
                patient_initials,
                product_name,
                event_description,
            })
        }
        _ => Err(issues),
    }
}

/// Parses seriousness labels, rejecting unknown labels and repeats.
pub fn parse_seriousness(labels: &[String]) -> Result<SeriousnessCriteria, Issues> {
    let mut issues = Issues::new();
    let mut parsed = Vec::with_capacity(labels.len());
    for label in labels {
        match SeriousnessCriterion::parse(label) {
            Some(criterion) => parsed.push(criterion),
            None => issues.push(FieldIssue::new(
                "seriousnessCriteria",
                format!("unknown criterion '{label}'"),
            )),
        }
    }
    if !issues.is_empty() {
        return Err(issues);
    }
    SeriousnessCriteria::from_list(parsed).map_err(|dup| {
        vec![FieldIssue::new(
            "seriousnessCriteria",
            format!("'{dup}' is listed more than once"),
        )]
    })
}

/// Applies `payload` over `draft`. Blank strings clear a field. Returns the merged draft and
/// the names of the fields whose value changed.
pub fn merge_data_entry(
    draft: &DataEntryDraft,
    payload: &DataEntryPayload,
) -> Result<(DataEntryDraft, Vec<&'static str>), Issues> {
    fn apply(
        name: &'static str,
        slot: &mut Option<String>,
        incoming: Option<String>,
        changed: &mut Vec<&'static str>,
    ) {
        let value = optional(incoming.as_deref());
        if *slot != value {
            *slot = value;
            changed.push(name);
        }
    }

    let mut merged = draft.clone();
    let mut changed = Vec::new();

    if let Some(age) = &payload.patient_age {
        apply("patientAge", &mut merged.patient_age, Some(age.as_text()), &mut changed);
    }
    let text_fields: [(&'static str, &mut Option<String>, &Option<String>); 6] = [
        ("patientGender", &mut merged.patient_gender, &payload.patient_gender),
        ("patientDob", &mut merged.patient_dob, &payload.patient_dob),
        ("reporterType", &mut merged.reporter_type, &payload.reporter_type),
        ("reporterCountry", &mut merged.reporter_country, &payload.reporter_country),
        ("productIndication", &mut merged.product_indication, &payload.product_indication),
        ("onsetDate", &mut merged.onset_date, &payload.onset_date),
    ];
    for (name, slot, incoming) in text_fields {
        if incoming.is_some() {
            apply(name, slot, incoming.clone(), &mut changed);
        }
    }

    if let Some(labels) = &payload.seriousness_criteria {
        let criteria = parse_seriousness(labels)?;
        if merged.seriousness_criteria != criteria {
            merged.seriousness_criteria = criteria;
            changed.push("seriousnessCriteria");
        }
    }

    Ok((merged, changed))
}

/// Checks a merged data entry draft against the completion rules, relative to `today`.
pub fn validate_data_entry(draft: &DataEntryDraft, today: NaiveDate) -> Result<DataEntry, Issues> {
    let mut issues = Issues::new();

    let patient_age = match draft.patient_age.as_deref() {
        None => {
            issues.push(FieldIssue::new("patientAge", "is required"));
            None
        }
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(age) if (0..=i64::from(MAX_PATIENT_AGE)).contains(&age) => u8::try_from(age).ok(),
            Ok(_) => {
                issues.push(FieldIssue::new(
                    "patientAge",
                    format!("must be between 0 and {MAX_PATIENT_AGE}"),
                ));
                None
            }
            Err(_) => {
                issues.push(FieldIssue::new("patientAge", "must be a whole number"));
                None
            }
        },
    };

    let onset_date = match draft.onset_date.as_deref() {
        None => {
            issues.push(FieldIssue::new("onsetDate", "is required"));
            None
        }
        Some(raw) => parse_date("onsetDate", raw, &mut issues),
    };
    if let Some(onset) = onset_date {
        if onset > today {
            issues.push(FieldIssue::new("onsetDate", "cannot be in the future"));
        }
    }

    let patient_dob = draft
        .patient_dob
        .as_deref()
        .and_then(|raw| parse_date("patientDob", raw, &mut issues));
    if let (Some(dob), Some(onset)) = (patient_dob, onset_date) {
        if dob > onset {
            issues.push(FieldIssue::new("patientDob", "cannot be after the onset date"));
        }
    }

    match (patient_age, onset_date) {
        (Some(patient_age), Some(onset_date)) if issues.is_empty() => Ok(DataEntry {
            patient_age,
            patient_gender: draft.patient_gender.clone(),
            patient_dob,
            reporter_type: draft.reporter_type.clone(),
            reporter_country: draft.reporter_country.clone(),
            product_indication: draft.product_indication.clone(),
            onset_date,
            seriousness_criteria: draft.seriousness_criteria.clone(),
        }),
        _ => Err(issues),
    }
}

/// Checks the coded events and causality, and derives the IME flag.
///
/// Every event's `ptCode` must resolve through `terminology` to the preferred term named in
/// `pt`.
///
/// # Errors
///
/// Returns every failing field, including `events[i].ptCode` for an unknown or mismatched code.
pub fn validate_medical(
    payload: &MedicalPayload,
    terminology: &dyn Terminology,
) -> Result<MedicalReview, Issues> {
    let mut issues = Issues::new();

    if payload.events.is_empty() {
        issues.push(FieldIssue::new("events", "at least one coded event is required"));
    }

    let mut events = Vec::with_capacity(payload.events.len());
    for (i, event) in payload.events.iter().enumerate() {
        let pt = required(&format!("events[{i}].pt"), event.pt.as_deref(), &mut issues);
        let pt_code = required(
            &format!("events[{i}].ptCode"),
            event.pt_code.as_deref(),
            &mut issues,
        );
        let (Some(pt), Some(pt_code)) = (pt, pt_code) else {
            continue;
        };
        match terminology.preferred_term(pt_code.as_str()) {
            None => {
                issues.push(FieldIssue::new(
                    format!("events[{i}].ptCode"),
                    format!("{} is not a known MedDRA preferred term code", pt_code),
                ));
            }
            Some(entry) if !entry.pt.eq_ignore_ascii_case(pt.as_str()) => {
                issues.push(FieldIssue::new(
                    format!("events[{i}].ptCode"),
                    format!("{} codes '{}', not '{}'", pt_code, entry.pt, pt),
                ));
            }
            Some(_) => events.push(CodedEvent {
                verbatim: optional(event.verbatim.as_deref()),
                llt: optional(event.llt.as_deref()),
                llt_code: optional(event.llt_code.as_deref()),
                pt,
                pt_code,
                hlt: optional(event.hlt.as_deref()),
                soc: optional(event.soc.as_deref()),
            }),
        }
    }

    let causality = required("causality", payload.causality.as_deref(), &mut issues);

    match causality {
        Some(causality) if issues.is_empty() => {
            let ime = events.iter().any(|e| terminology.is_ime(e.pt.as_str()));
            Ok(MedicalReview {
                events,
                causality,
                listedness: optional(payload.listedness.as_deref()),
                narrative: optional(payload.narrative.as_deref()),
                comments: optional(payload.comments.as_deref()),
                ime,
            })
        }
        _ => Err(issues),
    }
}

/// Every QC checklist item must be confirmed before sign-off.
pub fn validate_quality(
    payload: &QualityPayload,
    actor: &Actor,
    at: DateTime<Utc>,
) -> Result<QualityReview, Issues> {
    let checklist = payload.checklist;
    let mut issues = Issues::new();
    for (field, confirmed) in [
        ("checklist.dataComplete", checklist.data_complete),
        ("checklist.codingVerified", checklist.coding_verified),
        ("checklist.narrativeReviewed", checklist.narrative_reviewed),
    ] {
        if !confirmed {
            issues.push(FieldIssue::new(field, "must be confirmed"));
        }
    }
    if !issues.is_empty() {
        return Err(issues);
    }

    Ok(QualityReview {
        comments: optional(payload.comments.as_deref()),
        checklist,
        signed_off_by: actor.username.clone(),
        signed_off_at: at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgeInput, CodedEventPayload, QcChecklist, Role};
    use pv_meddra::CodingAssist;

    fn fields(issues: &[FieldIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.field.as_str()).collect()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[test]
    fn triage_reports_every_missing_field() {
        let payload = TriagePayload {
            reporter_name: Some("Dr. Smith".into()),
            patient_initials: Some("  ".into()),
            product_name: None,
            event_description: Some("Nausea".into()),
        };
        let issues = validate_triage(&payload).unwrap_err();
        assert_eq!(fields(&issues), vec!["patientInitials", "productName"]);
    }

    #[test]
    fn triage_limits_initials_length() {
        let payload = TriagePayload {
            reporter_name: Some("Dr. Smith".into()),
            patient_initials: Some("ABCDEFGHIJK".into()),
            product_name: Some("Acetaminophen 500mg".into()),
            event_description: Some("Nausea".into()),
        };
        let issues = validate_triage(&payload).unwrap_err();
        assert_eq!(issues[0].field, "patientInitials");
        assert!(issues[0].message.contains("10"));
    }

    #[test]
    fn triage_trims_values() {
        let payload = TriagePayload {
            reporter_name: Some(" Dr. Smith ".into()),
            patient_initials: Some("A.B.".into()),
            product_name: Some("Acetaminophen 500mg".into()),
            event_description: Some("Nausea".into()),
        };
        let triage = validate_triage(&payload).unwrap();
        assert_eq!(triage.reporter_name.as_str(), "Dr. Smith");
    }

    #[test]
    fn merge_tracks_changed_fields_and_clears_blanks() {
        let draft = DataEntryDraft {
            patient_gender: Some("Female".into()),
            ..Default::default()
        };
        let payload = DataEntryPayload {
            patient_age: Some(AgeInput::Whole(45)),
            patient_gender: Some("".into()),
            reporter_type: None,
            ..Default::default()
        };
        let (merged, changed) = merge_data_entry(&draft, &payload).unwrap();
        assert_eq!(merged.patient_age.as_deref(), Some("45"));
        assert_eq!(merged.patient_gender, None);
        assert_eq!(changed, vec!["patientAge", "patientGender"]);
    }

    #[test]
    fn merge_rejects_duplicate_criteria() {
        let payload = DataEntryPayload {
            seriousness_criteria: Some(vec!["Death".into(), "Death".into()]),
            ..Default::default()
        };
        let issues = merge_data_entry(&DataEntryDraft::default(), &payload).unwrap_err();
        assert_eq!(fields(&issues), vec!["seriousnessCriteria"]);
    }

    #[test]
    fn data_entry_requires_age_and_onset() {
        let issues = validate_data_entry(&DataEntryDraft::default(), today()).unwrap_err();
        assert_eq!(fields(&issues), vec!["patientAge", "onsetDate"]);
    }

    #[test]
    fn data_entry_checks_ranges_and_dates() {
        let draft = DataEntryDraft {
            patient_age: Some("151".into()),
            onset_date: Some("2026-10-19".into()),
            patient_dob: Some("2026-10-20".into()),
            ..Default::default()
        };
        let issues = validate_data_entry(&draft, today()).unwrap_err();
        assert_eq!(fields(&issues), vec!["patientAge", "onsetDate", "patientDob"]);

        let draft = DataEntryDraft {
            patient_age: Some("forty".into()),
            onset_date: Some("01/10/2026".into()),
            ..Default::default()
        };
        let issues = validate_data_entry(&draft, today()).unwrap_err();
        assert_eq!(fields(&issues), vec!["patientAge", "onsetDate"]);
    }

    #[test]
    fn data_entry_accepts_boundary_values() {
        let draft = DataEntryDraft {
            patient_age: Some("150".into()),
            onset_date: Some("2026-10-18".into()),
            patient_dob: Some("1876-10-18".into()),
            ..Default::default()
        };
        let entry = validate_data_entry(&draft, today()).unwrap();
        assert_eq!(entry.patient_age, 150);
        assert_eq!(entry.onset_date, today());
    }

    #[test]
    fn medical_derives_ime_from_pt() {
        let payload = MedicalPayload {
            events: vec![CodedEventPayload {
                pt: Some("Anaphylactic reaction".into()),
                pt_code: Some("10002198".into()),
                ..Default::default()
            }],
            causality: Some("Probable".into()),
            ..Default::default()
        };
        let review = validate_medical(&payload, &CodingAssist::default()).unwrap();
        assert!(review.ime);

        let payload = MedicalPayload {
            events: vec![CodedEventPayload {
                pt: Some("Nausea".into()),
                pt_code: Some("10028813".into()),
                ..Default::default()
            }],
            causality: Some("Possible".into()),
            ..Default::default()
        };
        assert!(!validate_medical(&payload, &CodingAssist::default()).unwrap().ime);
    }

    #[test]
    fn medical_requires_events_codes_and_causality() {
        let issues = validate_medical(&MedicalPayload::default(), &CodingAssist::default())
            .unwrap_err();
        assert_eq!(fields(&issues), vec!["events", "causality"]);

        let payload = MedicalPayload {
            events: vec![CodedEventPayload {
                pt: Some("Nausea".into()),
                ..Default::default()
            }],
            causality: Some("Possible".into()),
            ..Default::default()
        };
        let issues = validate_medical(&payload, &CodingAssist::default()).unwrap_err();
        assert_eq!(fields(&issues), vec!["events[0].ptCode"]);
    }

    #[test]
    fn medical_rejects_pt_code_that_codes_another_term() {
        let coded = |pt: &str, code: &str| MedicalPayload {
            events: vec![CodedEventPayload {
                pt: Some(pt.into()),
                pt_code: Some(code.into()),
                ..Default::default()
            }],
            causality: Some("Possible".into()),
            ..Default::default()
        };

        let issues =
            validate_medical(&coded("Nausea", "10002198"), &CodingAssist::default()).unwrap_err();
        assert_eq!(fields(&issues), vec!["events[0].ptCode"]);
        assert!(issues[0].message.contains("Anaphylactic reaction"), "{}", issues[0].message);

        let issues =
            validate_medical(&coded("Nausea", "99999999"), &CodingAssist::default()).unwrap_err();
        assert_eq!(fields(&issues), vec!["events[0].ptCode"]);

        let review = validate_medical(&coded("nausea", "10028813"), &CodingAssist::default());
        assert!(review.is_ok());
    }

    #[test]
    fn quality_requires_full_checklist() {
        let actor = Actor::new(NonEmptyText::new("quality1").unwrap(), Role::Quality);
        let payload = QualityPayload {
            comments: None,
            checklist: QcChecklist {
                data_complete: true,
                coding_verified: false,
                narrative_reviewed: true,
            },
        };
        let issues = validate_quality(&payload, &actor, Utc::now()).unwrap_err();
        assert_eq!(fields(&issues), vec!["checklist.codingVerified"]);
    }
}

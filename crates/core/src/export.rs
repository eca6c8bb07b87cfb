//! Case → ICSR translation for E2B(R3) export.

use crate::config::CoreConfig;
use crate::error::{CaseError, CaseResult};
use crate::model::{Case, Stage};
use chrono::{DateTime, Utc};
use pv_e2b::{IcsrDrug, IcsrMessage, IcsrPatient, IcsrReaction, IcsrReporter, PatientSex};

/// Earliest stage at which a case can be exported.
pub const EXPORTABLE_FROM: Stage = Stage::MedicalReview;

fn patient_sex(raw: Option<&str>) -> Option<PatientSex> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("male" | "m") => Some(PatientSex::Male),
        Some("female" | "f") => Some(PatientSex::Female),
        _ => None,
    }
}

/// Builds the ICSR carrier for `case`. Reads only; the case is not changed.
pub fn icsr_for_case(
    cfg: &CoreConfig,
    case: &Case,
    now: DateTime<Utc>,
) -> CaseResult<IcsrMessage> {
    if case.stage < EXPORTABLE_FROM {
        return Err(CaseError::StageTooEarly {
            required: EXPORTABLE_FROM,
            actual: case.stage,
        });
    }
    let triage = case.triage.as_ref().ok_or_else(|| {
        CaseError::InvalidInput(format!("case {} has no triage data", case.case_number))
    })?;
    let data_entry = case.data_entry.as_ref();

    let seriousness: Vec<_> = data_entry
        .map(|d| d.seriousness_criteria.iter().map(|c| c.e2b_code()).collect())
        .unwrap_or_default();
    let onset = data_entry.map(|d| d.onset_date);

    let reactions = match &case.medical {
        Some(medical) => medical
            .events
            .iter()
            .map(|event| IcsrReaction {
                verbatim: event
                    .verbatim
                    .clone()
                    .or_else(|| Some(triage.event_description.to_string())),
                pt: Some(event.pt.to_string()),
                pt_code: Some(event.pt_code.to_string()),
                onset,
                seriousness: seriousness.clone(),
            })
            .collect(),
        None => vec![IcsrReaction {
            verbatim: Some(triage.event_description.to_string()),
            pt: None,
            pt_code: None,
            onset,
            seriousness: seriousness.clone(),
        }],
    };

    let number = case.case_number.as_str();
    Ok(IcsrMessage {
        batch_id: format!("{number}-B"),
        message_id: format!("{number}-M"),
        created_at: now,
        sender: cfg.e2b_sender().to_string(),
        receiver: cfg.e2b_receiver().to_string(),
        safety_report_id: number.to_string(),
        worldwide_id: format!("{}-{}", cfg.e2b_sender(), number),
        received_date: case.created_at.date_naive(),
        meddra_version: cfg.meddra_version().to_string(),
        reporter: IcsrReporter {
            name: triage.reporter_name.to_string(),
            qualification: data_entry.and_then(|d| d.reporter_type.clone()),
            country: data_entry.and_then(|d| d.reporter_country.clone()),
        },
        patient: IcsrPatient {
            initials: triage.patient_initials.to_string(),
            sex: patient_sex(data_entry.and_then(|d| d.patient_gender.as_deref())),
            birth_date: data_entry.and_then(|d| d.patient_dob),
            age_years: data_entry.map(|d| u32::from(d.patient_age)),
        },
        reactions,
        drugs: vec![IcsrDrug {
            name: triage.product_name.to_string(),
            indication: data_entry.and_then(|d| d.product_indication.clone()),
        }],
        causality: case.medical.as_ref().map(|m| m.causality.to_string()),
        narrative: case.medical.as_ref().and_then(|m| m.narrative.clone()),
    })
}

/// Renders `case` as E2B(R3) XML bytes.
pub fn export_case(cfg: &CoreConfig, case: &Case, now: DateTime<Utc>) -> CaseResult<Vec<u8>> {
    let message = icsr_for_case(cfg, case, now)?;
    Ok(pv_e2b::render(&message)?)
}

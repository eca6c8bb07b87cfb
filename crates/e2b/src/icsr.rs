//! ICSR domain carrier and the E2B(R3) renderer.

use crate::writer::XmlOut;
use crate::{E2bError, E2bResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// OIDs used by the ICH E2B(R3) implementation guide
// ============================================================================

const OID_BATCH_ID: &str = "2.16.840.1.113883.3.989.2.1.3.22";
const OID_MESSAGE_ID: &str = "2.16.840.1.113883.3.989.2.1.3.1";
const OID_WORLDWIDE_ID: &str = "2.16.840.1.113883.3.989.2.1.3.2";
const OID_SENDER_ID: &str = "2.16.840.1.113883.3.989.2.1.3.11";
const OID_RECEIVER_ID: &str = "2.16.840.1.113883.3.989.2.1.3.12";
const OID_REACTION_ID: &str = "2.16.840.1.113883.3.989.2.1.3.19";
const OID_INTERACTION: &str = "2.16.840.1.113883.1.6";
const OID_TRIGGER_EVENT: &str = "2.16.840.1.113883.1.18";
const OID_MESSAGE_TYPE: &str = "2.16.840.1.113883.3.989.2.1.1.1";
const OID_OBSERVATION_CODE: &str = "2.16.840.1.113883.3.989.2.1.1.19";
const OID_ORGANIZER_CODE: &str = "2.16.840.1.113883.3.989.2.1.1.20";
const OID_REPORT_RELATION: &str = "2.16.840.1.113883.3.989.2.1.1.22";
const OID_ACT_CODE: &str = "2.16.840.1.113883.5.4";
const OID_SEX: &str = "1.0.5218";
const OID_COUNTRY: &str = "1.0.3166.1.2.2";
const OID_MEDDRA: &str = "2.16.840.1.113883.6.163";

// ============================================================================
// Public domain-level types
// ============================================================================

/// Patient sex as coded by ISO/IEC 5218.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatientSex {
    Male,
    Female,
}

impl PatientSex {
    fn code(self) -> &'static str {
        match self {
            PatientSex::Male => "1",
            PatientSex::Female => "2",
        }
    }
}

/// E2B(R3) seriousness criteria (observation codes in the ICH code list).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriousnessCode {
    ResultsInDeath,
    LifeThreatening,
    Hospitalisation,
    Disability,
    CongenitalAnomaly,
    OtherMedicallyImportant,
}

impl SeriousnessCode {
    fn code(self) -> &'static str {
        match self {
            SeriousnessCode::ResultsInDeath => "34",
            SeriousnessCode::LifeThreatening => "21",
            SeriousnessCode::Hospitalisation => "33",
            SeriousnessCode::Disability => "35",
            SeriousnessCode::CongenitalAnomaly => "12",
            SeriousnessCode::OtherMedicallyImportant => "26",
        }
    }

    /// Every criterion, in the order the R3 guide lists them.
    pub const ALL: [SeriousnessCode; 6] = [
        SeriousnessCode::ResultsInDeath,
        SeriousnessCode::LifeThreatening,
        SeriousnessCode::Hospitalisation,
        SeriousnessCode::Disability,
        SeriousnessCode::CongenitalAnomaly,
        SeriousnessCode::OtherMedicallyImportant,
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcsrReporter {
    pub name: String,
    pub qualification: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    pub country: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcsrPatient {
    pub initials: String,
    pub sex: Option<PatientSex>,
    pub birth_date: Option<NaiveDate>,
    pub age_years: Option<u32>,
}

/// One reaction/event. Uncoded reactions (no MedDRA PT yet) carry only the verbatim text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcsrReaction {
    pub verbatim: Option<String>,
    pub pt: Option<String>,
    pub pt_code: Option<String>,
    pub onset: Option<NaiveDate>,
    /// Seriousness criteria met by this reaction; empty means non-serious.
    pub seriousness: Vec<SeriousnessCode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcsrDrug {
    pub name: String,
    pub indication: Option<String>,
}

/// Domain-level carrier for one individual case safety report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcsrMessage {
    pub batch_id: String,
    pub message_id: String,
    pub created_at: DateTime<Utc>,
    pub sender: String,
    pub receiver: String,
    /// Sender's safety report identifier (the case number).
    pub safety_report_id: String,
    /// Worldwide unique case identification number.
    pub worldwide_id: String,
    pub received_date: NaiveDate,
    pub meddra_version: String,
    pub reporter: IcsrReporter,
    pub patient: IcsrPatient,
    pub reactions: Vec<IcsrReaction>,
    pub drugs: Vec<IcsrDrug>,
    pub causality: Option<String>,
    pub narrative: Option<String>,
}

// ============================================================================
// Rendering
// ============================================================================

/// Render an ICSR as E2B(R3) XML bytes (UTF-8, indented).
///
/// # Errors
///
/// Returns [`E2bError::MissingField`] if the message has no reaction, no suspect drug or blank
/// patient initials, and [`E2bError::Xml`] if writing fails.
pub fn render(msg: &IcsrMessage) -> E2bResult<Vec<u8>> {
    if msg.reactions.is_empty() {
        return Err(E2bError::MissingField("reaction"));
    }
    if msg.drugs.is_empty() {
        return Err(E2bError::MissingField("drug"));
    }
    if msg.patient.initials.trim().is_empty() {
        return Err(E2bError::MissingField("patient initials"));
    }

    let created = msg.created_at.format("%Y%m%d%H%M%S").to_string();
    let mut xml = XmlOut::new()?;

    xml.start(
        "MCCI_IN200100UV01",
        &[
            ("xmlns", "urn:hl7-org:v3"),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            ("ITSVersion", "XML_1.0"),
        ],
    )?;
    xml.empty("id", &[("root", OID_BATCH_ID), ("extension", &msg.batch_id)])?;
    xml.empty("creationTime", &[("value", &created)])?;
    xml.empty("responseModeCode", &[("code", "D")])?;
    xml.empty(
        "interactionId",
        &[("root", OID_INTERACTION), ("extension", "MCCI_IN200100UV01")],
    )?;
    xml.empty("name", &[("code", "1"), ("codeSystem", OID_MESSAGE_TYPE)])?;

    write_message(&mut xml, msg, &created)?;

    write_device(&mut xml, "receiver", "RCV", OID_RECEIVER_ID, &msg.receiver)?;
    write_device(&mut xml, "sender", "SND", OID_SENDER_ID, &msg.sender)?;
    xml.end("MCCI_IN200100UV01")?;

    Ok(xml.finish())
}

fn write_device(
    xml: &mut XmlOut,
    element: &str,
    type_code: &str,
    oid: &str,
    id: &str,
) -> E2bResult<()> {
    xml.start(element, &[("typeCode", type_code)])?;
    xml.start(
        "device",
        &[("classCode", "DEV"), ("determinerCode", "INSTANCE")],
    )?;
    xml.empty("id", &[("root", oid), ("extension", id)])?;
    xml.end("device")?;
    xml.end(element)
}

fn write_message(xml: &mut XmlOut, msg: &IcsrMessage, created: &str) -> E2bResult<()> {
    xml.start("PORR_IN049016UV", &[])?;
    xml.empty(
        "id",
        &[("root", OID_MESSAGE_ID), ("extension", &msg.message_id)],
    )?;
    xml.empty("creationTime", &[("value", created)])?;
    xml.empty(
        "interactionId",
        &[("root", OID_INTERACTION), ("extension", "PORR_IN049016UV")],
    )?;
    xml.empty("processingCode", &[("code", "P")])?;
    xml.empty("processingModeCode", &[("code", "T")])?;
    xml.empty("acceptAckCode", &[("code", "AL")])?;
    write_device(xml, "receiver", "RCV", OID_RECEIVER_ID, &msg.receiver)?;
    write_device(xml, "sender", "SND", OID_SENDER_ID, &msg.sender)?;

    xml.start(
        "controlActProcess",
        &[("classCode", "CACT"), ("moodCode", "EVN")],
    )?;
    xml.empty(
        "code",
        &[("code", "PORR_TE049016UV"), ("codeSystem", OID_TRIGGER_EVENT)],
    )?;
    xml.empty("effectiveTime", &[("value", created)])?;
    xml.start("subject", &[("typeCode", "SUBJ")])?;
    write_investigation(xml, msg)?;
    xml.end("subject")?;
    xml.end("controlActProcess")?;
    xml.end("PORR_IN049016UV")
}

fn write_investigation(xml: &mut XmlOut, msg: &IcsrMessage) -> E2bResult<()> {
    let received = msg.received_date.format("%Y%m%d").to_string();

    xml.start(
        "investigationEvent",
        &[("classCode", "INVSTG"), ("moodCode", "EVN")],
    )?;
    xml.empty(
        "id",
        &[("root", OID_MESSAGE_ID), ("extension", &msg.safety_report_id)],
    )?;
    xml.empty(
        "id",
        &[("root", OID_WORLDWIDE_ID), ("extension", &msg.worldwide_id)],
    )?;
    xml.empty("code", &[("code", "PAT_ADV_EVNT"), ("codeSystem", OID_ACT_CODE)])?;
    if let Some(narrative) = msg.narrative.as_deref() {
        xml.text_element("text", &[], narrative)?;
    }
    xml.empty("statusCode", &[("code", "active")])?;
    xml.start("effectiveTime", &[])?;
    xml.empty("low", &[("value", &received)])?;
    xml.end("effectiveTime")?;
    xml.empty("availabilityTime", &[("value", &received)])?;

    xml.start("component", &[("typeCode", "COMP")])?;
    xml.start(
        "adverseEventAssessment",
        &[("classCode", "INVSTG"), ("moodCode", "EVN")],
    )?;
    xml.start("subject1", &[("typeCode", "SBJ")])?;
    xml.start("primaryRole", &[("classCode", "INVSBJ")])?;
    write_patient(xml, &msg.patient)?;
    for (index, reaction) in msg.reactions.iter().enumerate() {
        write_reaction(xml, index + 1, reaction, &msg.meddra_version)?;
    }
    write_drugs(xml, &msg.drugs)?;
    xml.end("primaryRole")?;
    xml.end("subject1")?;
    if let Some(causality) = msg.causality.as_deref() {
        xml.start("component1", &[("typeCode", "COMP")])?;
        xml.start(
            "causalityAssessment",
            &[("classCode", "OBS"), ("moodCode", "EVN")],
        )?;
        xml.empty("code", &[("code", "39"), ("codeSystem", OID_OBSERVATION_CODE)])?;
        xml.text_element("value", &[("xsi:type", "ST")], causality)?;
        xml.end("causalityAssessment")?;
        xml.end("component1")?;
    }
    xml.end("adverseEventAssessment")?;
    xml.end("component")?;

    write_reporter(xml, &msg.reporter)?;
    xml.end("investigationEvent")
}

fn write_patient(xml: &mut XmlOut, patient: &IcsrPatient) -> E2bResult<()> {
    xml.start(
        "player1",
        &[("classCode", "PSN"), ("determinerCode", "INSTANCE")],
    )?;
    xml.text_element("name", &[], patient.initials.trim())?;
    match patient.sex {
        Some(sex) => xml.empty(
            "administrativeGenderCode",
            &[("code", sex.code()), ("codeSystem", OID_SEX)],
        )?,
        None => xml.empty("administrativeGenderCode", &[("nullFlavor", "UNK")])?,
    }
    if let Some(dob) = patient.birth_date {
        let value = dob.format("%Y%m%d").to_string();
        xml.empty("birthTime", &[("value", &value)])?;
    }
    xml.end("player1")?;

    if let Some(age) = patient.age_years {
        let value = age.to_string();
        xml.start("subjectOf2", &[("typeCode", "SBJ")])?;
        xml.start("observation", &[("classCode", "OBS"), ("moodCode", "EVN")])?;
        xml.empty("code", &[("code", "3"), ("codeSystem", OID_OBSERVATION_CODE)])?;
        xml.empty(
            "value",
            &[("xsi:type", "PQ"), ("value", &value), ("unit", "a")],
        )?;
        xml.end("observation")?;
        xml.end("subjectOf2")?;
    }
    Ok(())
}

fn write_reaction(
    xml: &mut XmlOut,
    index: usize,
    reaction: &IcsrReaction,
    meddra_version: &str,
) -> E2bResult<()> {
    let reaction_id = format!("reaction-{index}");
    xml.start("subjectOf2", &[("typeCode", "SBJ")])?;
    xml.start("observation", &[("classCode", "OBS"), ("moodCode", "EVN")])?;
    xml.empty("id", &[("root", OID_REACTION_ID), ("extension", &reaction_id)])?;
    xml.empty("code", &[("code", "29"), ("codeSystem", OID_OBSERVATION_CODE)])?;
    if let Some(onset) = reaction.onset {
        let value = onset.format("%Y%m%d").to_string();
        xml.start("effectiveTime", &[])?;
        xml.empty("low", &[("value", &value)])?;
        xml.end("effectiveTime")?;
    }
    match (reaction.pt_code.as_deref(), reaction.pt.as_deref()) {
        (Some(code), Some(pt)) => xml.start(
            "value",
            &[
                ("xsi:type", "CE"),
                ("code", code),
                ("codeSystem", OID_MEDDRA),
                ("codeSystemVersion", meddra_version),
                ("displayName", pt),
            ],
        )?,
        _ => xml.start("value", &[("xsi:type", "CE"), ("nullFlavor", "NI")])?,
    }
    if let Some(verbatim) = reaction.verbatim.as_deref() {
        xml.text_element("originalText", &[], verbatim)?;
    }
    xml.end("value")?;

    for criterion in SeriousnessCode::ALL {
        let met = if reaction.seriousness.contains(&criterion) {
            "true"
        } else {
            "false"
        };
        xml.start("outboundRelationship2", &[("typeCode", "PERT")])?;
        xml.start("observation", &[("classCode", "OBS"), ("moodCode", "EVN")])?;
        xml.empty(
            "code",
            &[("code", criterion.code()), ("codeSystem", OID_OBSERVATION_CODE)],
        )?;
        xml.empty("value", &[("xsi:type", "BL"), ("value", met)])?;
        xml.end("observation")?;
        xml.end("outboundRelationship2")?;
    }

    xml.end("observation")?;
    xml.end("subjectOf2")
}

fn write_drugs(xml: &mut XmlOut, drugs: &[IcsrDrug]) -> E2bResult<()> {
    xml.start("subjectOf2", &[("typeCode", "SBJ")])?;
    xml.start(
        "organizer",
        &[("classCode", "CATEGORY"), ("moodCode", "EVN")],
    )?;
    xml.empty("code", &[("code", "4"), ("codeSystem", OID_ORGANIZER_CODE)])?;
    for drug in drugs {
        xml.start("component", &[("typeCode", "COMP")])?;
        xml.start(
            "substanceAdministration",
            &[("classCode", "SBADM"), ("moodCode", "EVN")],
        )?;
        xml.start("consumable", &[("typeCode", "CSM")])?;
        xml.start("instanceOfKind", &[("classCode", "INST")])?;
        xml.start(
            "kindOfProduct",
            &[("classCode", "MMAT"), ("determinerCode", "KIND")],
        )?;
        xml.text_element("name", &[], &drug.name)?;
        xml.end("kindOfProduct")?;
        xml.end("instanceOfKind")?;
        xml.end("consumable")?;
        if let Some(indication) = drug.indication.as_deref() {
            xml.start("inboundRelationship", &[("typeCode", "RSON")])?;
            xml.start("observation", &[("classCode", "OBS"), ("moodCode", "EVN")])?;
            xml.empty("code", &[("code", "19"), ("codeSystem", OID_OBSERVATION_CODE)])?;
            xml.start("value", &[("xsi:type", "CE")])?;
            xml.text_element("originalText", &[], indication)?;
            xml.end("value")?;
            xml.end("observation")?;
            xml.end("inboundRelationship")?;
        }
        xml.end("substanceAdministration")?;
        xml.end("component")?;
    }
    xml.end("organizer")?;
    xml.end("subjectOf2")
}

fn write_reporter(xml: &mut XmlOut, reporter: &IcsrReporter) -> E2bResult<()> {
    xml.start("outboundRelationship", &[("typeCode", "SPRT")])?;
    xml.start(
        "relatedInvestigation",
        &[("classCode", "INVSTG"), ("moodCode", "EVN")],
    )?;
    xml.empty("code", &[("code", "2"), ("codeSystem", OID_REPORT_RELATION)])?;
    xml.start("subjectOf2", &[("typeCode", "SUBJ")])?;
    xml.start(
        "controlActEvent",
        &[("classCode", "CACT"), ("moodCode", "EVN")],
    )?;
    xml.start("author", &[("typeCode", "AUT")])?;
    xml.start("assignedEntity", &[("classCode", "ASSIGNED")])?;
    xml.start(
        "assignedPerson",
        &[("classCode", "PSN"), ("determinerCode", "INSTANCE")],
    )?;
    xml.start("name", &[])?;
    xml.text_element("given", &[], &reporter.name)?;
    xml.end("name")?;
    if let Some(country) = reporter.country.as_deref() {
        xml.start("asLocatedEntity", &[("classCode", "LOCE")])?;
        xml.start(
            "location",
            &[("classCode", "COUNTRY"), ("determinerCode", "INSTANCE")],
        )?;
        xml.empty("code", &[("code", country), ("codeSystem", OID_COUNTRY)])?;
        xml.end("location")?;
        xml.end("asLocatedEntity")?;
    }
    xml.end("assignedPerson")?;
    if let Some(qualification) = reporter.qualification.as_deref() {
        xml.text_element("qualification", &[], qualification)?;
    }
    xml.end("assignedEntity")?;
    xml.end("author")?;
    xml.end("controlActEvent")?;
    xml.end("subjectOf2")?;
    xml.end("relatedInvestigation")?;
    xml.end("outboundRelationship")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> IcsrMessage {
        IcsrMessage {
            batch_id: "PV-20261018-3FA9C2-B".into(),
            message_id: "PV-20261018-3FA9C2-M".into(),
            created_at: Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap(),
            sender: "SKYVIG".into(),
            receiver: "EVHUMAN".into(),
            safety_report_id: "PV-20261018-3FA9C2".into(),
            worldwide_id: "GB-SKYVIG-PV-20261018-3FA9C2".into(),
            received_date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            meddra_version: "27.0".into(),
            reporter: IcsrReporter {
                name: "Dr. Smith".into(),
                qualification: Some("Physician".into()),
                country: Some("GB".into()),
            },
            patient: IcsrPatient {
                initials: "A.B.".into(),
                sex: Some(PatientSex::Female),
                birth_date: None,
                age_years: Some(45),
            },
            reactions: vec![IcsrReaction {
                verbatim: Some("felt sick <after> dose".into()),
                pt: Some("Nausea".into()),
                pt_code: Some("10028813".into()),
                onset: NaiveDate::from_ymd_opt(2026, 10, 1),
                seriousness: vec![SeriousnessCode::Hospitalisation],
            }],
            drugs: vec![IcsrDrug {
                name: "Acetaminophen 500mg".into(),
                indication: Some("Headache".into()),
            }],
            causality: Some("Possible".into()),
            narrative: Some("Patient experienced nausea.".into()),
        }
    }

    fn render_str(msg: &IcsrMessage) -> String {
        String::from_utf8(render(msg).expect("render should succeed")).expect("utf-8")
    }

    #[test]
    fn render_emits_batch_wrapper_and_identifiers() {
        let xml = render_str(&sample());
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<MCCI_IN200100UV01 xmlns=\"urn:hl7-org:v3\""));
        assert!(xml.contains("extension=\"PV-20261018-3FA9C2\""));
        assert!(xml.contains("<creationTime value=\"20261018093000\"/>"));
        assert!(xml.trim_end().ends_with("</MCCI_IN200100UV01>"));
    }

    #[test]
    fn render_codes_reaction_with_meddra_and_seriousness() {
        let xml = render_str(&sample());
        assert!(xml.contains("code=\"10028813\""));
        assert!(xml.contains("codeSystem=\"2.16.840.1.113883.6.163\""));
        assert!(xml.contains("codeSystemVersion=\"27.0\""));
        // hospitalisation (33) is flagged true, death (34) false
        let hosp = xml.find("code=\"33\"").expect("hospitalisation criterion");
        assert!(xml[hosp..].contains("value=\"true\""));
        assert_eq!(xml.matches("<outboundRelationship2").count(), 6);
    }

    #[test]
    fn render_uncoded_reaction_keeps_verbatim_only() {
        let mut msg = sample();
        msg.reactions[0].pt = None;
        msg.reactions[0].pt_code = None;
        let xml = render_str(&msg);
        assert!(xml.contains("<value xsi:type=\"CE\" nullFlavor=\"NI\">"));
        assert!(!xml.contains("codeSystem=\"2.16.840.1.113883.6.163\""));
        assert!(xml.contains("felt sick &lt;after&gt; dose"));
    }

    #[test]
    fn render_escapes_free_text() {
        let xml = render_str(&sample());
        assert!(xml.contains("felt sick &lt;after&gt; dose"));
        assert!(!xml.contains("<after>"));
    }

    #[test]
    fn render_marks_unknown_sex_with_null_flavor() {
        let mut msg = sample();
        msg.patient.sex = None;
        let xml = render_str(&msg);
        assert!(xml.contains("<administrativeGenderCode nullFlavor=\"UNK\"/>"));
    }

    #[test]
    fn render_requires_reaction_and_drug() {
        let mut msg = sample();
        msg.reactions.clear();
        assert!(matches!(render(&msg), Err(E2bError::MissingField("reaction"))));

        let mut msg = sample();
        msg.drugs.clear();
        assert!(matches!(render(&msg), Err(E2bError::MissingField("drug"))));
    }
}

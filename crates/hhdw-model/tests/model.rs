use std::collections::BTreeMap;

use chrono::NaiveDate;
use hhdw_model::{
    DateKey, DimensionKind, FactEvent, FactKind, NaturalKey, RawRecord, RunStatus, SurrogateId,
    Versioning,
};

#[test]
fn natural_key_folds_case_accents_and_spacing() {
    let a = NaturalKey::new("  eq-001 ").expect("key");
    let b = NaturalKey::new("EQ-001").expect("key");
    assert_eq!(a, b);

    let accented = NaturalKey::new("Compensar  Salud").expect("key");
    assert_eq!(accented.as_str(), "COMPENSAR SALUD");
    assert_eq!(
        NaturalKey::new("Sánitas").expect("key"),
        NaturalKey::new("SANITAS").expect("key")
    );
}

#[test]
fn natural_key_rejects_blank_and_null_tokens() {
    assert!(NaturalKey::new("   ").is_err());
    assert!(NaturalKey::new("nan").is_err());
    assert!(NaturalKey::from_cell(None).is_none());
    assert!(NaturalKey::from_cell(Some("NULL")).is_none());
}

#[test]
fn dimension_kinds_declare_versioning() {
    assert_eq!(DimensionKind::Patient.versioning(), Versioning::Scd2);
    assert_eq!(DimensionKind::Equipment.versioning(), Versioning::Scd2);
    assert_eq!(DimensionKind::Insurer.versioning(), Versioning::Overwrite);
    assert!(DimensionKind::Patient.is_date_attribute("fecha_ingreso"));
    assert!(!DimensionKind::Equipment.is_date_attribute("equipo"));
    assert_eq!(
        "dim_equipo".parse::<DimensionKind>().expect("parse"),
        DimensionKind::Equipment
    );
    assert!("nope".parse::<DimensionKind>().is_err());
}

#[test]
fn empty_attributes_cover_tracked_set() {
    let attrs = DimensionKind::Equipment.empty_attributes();
    assert_eq!(attrs.len(), 2);
    assert!(attrs.values().all(Option::is_none));
}

#[test]
fn raw_record_hides_blank_cells() {
    let mut values = BTreeMap::new();
    values.insert("serial".to_string(), " EQ-001 ".to_string());
    values.insert("estado".to_string(), "   ".to_string());
    let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("timestamp");
    let record = RawRecord::new(values, ts, "equipos");

    assert_eq!(record.get("serial"), Some("EQ-001"));
    assert_eq!(record.get("estado"), None);
    assert_eq!(record.raw("estado"), Some("   "));
    assert_eq!(record.get("missing"), None);
    assert_eq!(record.source_table(), "equipos");
}

#[test]
fn date_key_components() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 15).expect("date");
    let key = DateKey::from_date(date);
    assert_eq!((key.year, key.month, key.day), (2024, 1, 15));
    assert_eq!(key.as_int(), 20240115);
}

#[test]
fn fact_event_serializes_with_kind_tag() {
    let date = DateKey::from_date(NaiveDate::from_ymd_opt(2024, 3, 2).expect("date"));
    let event = FactEvent::Equipment(hhdw_model::EquipmentEvent {
        equipment_id: SurrogateId(1),
        patient_id: SurrogateId(2),
        insurer_id: None,
        date,
    });
    assert_eq!(event.kind(), FactKind::Equipment);
    let json = serde_json::to_value(&event).expect("serialize");
    assert_eq!(json["kind"], "equipment");
    assert_eq!(json["equipment_id"], 1);
}

#[test]
fn run_status_round_trips_text() {
    assert_eq!("ok".parse::<RunStatus>().expect("status"), RunStatus::Ok);
    assert_eq!(RunStatus::Error.to_string(), "ERROR");
}

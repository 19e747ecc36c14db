//! Inspection of exported files against the built-in role groups.

use std::fs;
use std::path::Path;

use hhdw_cli::inspect::{inspect_source, table_name_for};
use hhdw_map::roles::{EQUIPMENT_KEY, EVENT_DATE, INSURER, PATIENT_ID};
use hhdw_map::{RoleCatalog, RoleGroup};
use tempfile::TempDir;

#[test]
fn reports_format_headers_and_roles() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("Equipos Entregados.csv");
    fs::write(
        &path,
        "Serial;Equipo;Estado;Documento Paciente;EPS / Aseguradora;Fecha Entrega\n\
         EQ-001;PUMP A;ACTIVO;1001;Nueva EPS;20/02/2024\n\
         EQ-001;PUMP A;ACTIVO;1001;Nueva EPS;20/02/2024\n",
    )
    .expect("write");

    let catalog = RoleCatalog::builtin().expect("roles");
    let report = inspect_source(&path, &catalog).expect("inspect");

    assert_eq!(report.table, "equipos_entregados");
    assert_eq!(report.format.delimiter, b';');
    assert_eq!(report.rows, 1);
    assert_eq!(report.clean.duplicate_rows_dropped, 1);
    insta::assert_snapshot!(report.columns.join("\n"), @r"
    serial
    equipo
    estado
    documento_paciente
    eps_aseguradora
    fecha_entrega
    ");

    let (_, fact_roles) = report
        .roles
        .iter()
        .find(|(group, _)| *group == RoleGroup::EquipmentFact)
        .expect("equipment fact group");
    assert_eq!(fact_roles.get(EQUIPMENT_KEY), Some("serial"));
    assert_eq!(fact_roles.get(PATIENT_ID), Some("documento_paciente"));
    assert_eq!(fact_roles.get(INSURER), Some("eps_aseguradora"));
    assert_eq!(fact_roles.get(EVENT_DATE), Some("fecha_entrega"));
    assert!(report.complete_groups().any(|group| group == RoleGroup::EquipmentFact));
    assert!(!report.complete_groups().any(|group| group == RoleGroup::ServiceFact));
}

#[test]
fn missing_file_is_an_error() {
    let catalog = RoleCatalog::builtin().expect("roles");
    assert!(inspect_source(Path::new("/nonexistent/export.csv"), &catalog).is_err());
}

#[test]
fn table_names_come_from_file_stems() {
    assert_eq!(table_name_for(Path::new("/data/Maestro Medicamentos.CSV")), "maestro_medicamentos");
    assert_eq!(table_name_for(Path::new("pedidos-2024.txt")), "pedidos_2024");
}

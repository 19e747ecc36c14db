//! Integration tests for the encoding/delimiter ladders and source loading.

use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use hhdw_ingest::{IngestError, exclude_marked, load_source, read_source, read_source_bytes};
use tempfile::NamedTempFile;

fn write_bytes(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

fn ts() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

#[test]
fn reads_utf8_with_bom_and_semicolons() {
    let file = write_bytes("\u{feff}Serial;Equipo;Estado\nEQ-001;PUMP A;ACTIVO\n".as_bytes());
    let frame = read_source(file.path()).expect("read");
    assert_eq!(frame.headers, vec!["Serial", "Equipo", "Estado"]);
    assert_eq!(frame.rows, vec![vec!["EQ-001", "PUMP A", "ACTIVO"]]);
    assert_eq!(frame.format.encoding, "UTF-8");
    assert_eq!(frame.format.delimiter, b';');
    assert!(frame.format.sniffed);
}

#[test]
fn falls_back_to_windows_1252() {
    // "Identificación" and "Peñalosa" encoded as Latin-1
    let mut bytes = b"Identificaci\xf3n,Nombre\n".to_vec();
    bytes.extend_from_slice(b"123,Pe\xf1alosa\n");
    let file = write_bytes(&bytes);
    let frame = read_source(file.path()).expect("read");
    assert_eq!(frame.format.encoding, "windows-1252");
    assert_eq!(frame.headers, vec!["Identificación", "Nombre"]);
    assert_eq!(frame.rows[0][1], "Peñalosa");
}

#[test]
fn decodes_utf16_by_bom() {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in "a\tb\n1\t2\n".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let frame = read_source_bytes(&bytes, Path::new("utf16.tsv")).expect("read");
    assert_eq!(frame.format.encoding, "UTF-16LE");
    assert_eq!(frame.format.delimiter, b'\t');
    assert_eq!(frame.rows, vec![vec!["1", "2"]]);
}

#[test]
fn single_column_file_falls_through_to_fixed_delimiter() {
    let frame = read_source_bytes(b"codigo\nA1\nB2\n", Path::new("one.csv")).expect("read");
    assert!(!frame.format.sniffed);
    assert_eq!(frame.format.delimiter, b';');
    assert_eq!(frame.rows.len(), 2);
}

#[test]
fn empty_input_has_no_viable_format() {
    let err = read_source_bytes(b"  \n\n", Path::new("empty.csv")).expect_err("should fail");
    match err {
        IngestError::NoViableFormat { attempts, .. } => {
            // 2 encodings x 3 delimiter choices
            assert_eq!(attempts.len(), 6);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_file_is_reported() {
    let err = read_source(Path::new("/nonexistent/dir/equipos.csv")).expect_err("should fail");
    assert!(matches!(err, IngestError::FileNotFound { .. }));
}

#[test]
fn load_source_canonicalizes_and_cleans() {
    let contents = "Nº Pedido,Identificación Paciente,Insumo,Insumo\n\
                    P-1,123,<b>GASA</b>,X\n\
                    ,,,\n\
                    P-1,123,GASA,X\n\
                    P-2,DEMO-9,SONDA,Y\n";
    let file = write_bytes(contents.as_bytes());
    let loaded = load_source("pedidos", file.path(), ts()).expect("load");

    assert_eq!(
        loaded.table.columns,
        vec!["no_pedido", "identificacion_paciente", "insumo", "insumo_2"]
    );
    assert_eq!(loaded.table.len(), 2);
    assert_eq!(loaded.clean.empty_rows_dropped, 1);
    assert_eq!(loaded.clean.duplicate_rows_dropped, 1);

    let first = &loaded.table.records[0];
    assert_eq!(first.get("insumo"), Some("GASA"));
    assert_eq!(first.source_table(), "pedidos");
    assert_eq!(first.ingested_at(), ts());

    let mut table = loaded.table;
    let removed = exclude_marked(&mut table, "identificacion_paciente", "demo");
    assert_eq!(removed, 1);
    assert_eq!(table.len(), 1);
}

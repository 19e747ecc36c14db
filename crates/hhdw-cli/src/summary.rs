use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use hhdw_cli::inspect::InspectReport;
use hhdw_core::RunSummary;
use hhdw_model::{LedgerEntry, RunStatus};

pub fn print_run_summary(summary: &RunSummary) {
    println!("Run: {}", summary.started_at.format("%Y-%m-%d %H:%M:%S"));
    print_staging_table(summary);
    print_fact_table(summary);
    print_ledger_table(&summary.entries);
    let errors = summary.error_count();
    if errors > 0 {
        eprintln!("{errors} stage(s) recorded ERROR");
    }
}

fn print_staging_table(summary: &RunSummary) {
    if summary.staged.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Source"),
        header_cell("Format"),
        header_cell("Rows"),
        header_cell("Skipped lines"),
        header_cell("Duplicates"),
        header_cell("Test records"),
    ]);
    apply_summary_table_style(&mut table);
    for column in 2..=5 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for staged in &summary.staged {
        table.add_row(vec![
            Cell::new(&staged.table).fg(Color::Blue).add_attribute(Attribute::Bold),
            Cell::new(&staged.format),
            Cell::new(staged.stats.rows),
            count_cell(staged.stats.skipped_lines, Color::Yellow),
            count_cell(staged.stats.clean.duplicate_rows_dropped, Color::Yellow),
            count_cell(staged.excluded, Color::Yellow),
        ]);
    }
    println!();
    println!("Staging:");
    println!("{table}");
}

fn print_fact_table(summary: &RunSummary) {
    if summary.facts.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Fact"),
        header_cell("Candidates"),
        header_cell("Appended"),
        header_cell("Missing ref"),
        header_cell("Unresolved"),
        header_cell("Bad date"),
        header_cell("Created"),
    ]);
    apply_summary_table_style(&mut table);
    for column in 1..=6 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for report in &summary.facts {
        table.add_row(vec![
            Cell::new(report.kind.table_name()),
            Cell::new(report.candidates),
            Cell::new(report.facts).add_attribute(Attribute::Bold),
            count_cell(report.missing_reference, Color::Yellow),
            count_cell(report.unresolved, Color::Yellow),
            count_cell(report.unparseable_dates, Color::Yellow),
            count_cell(report.created_on_demand, Color::DarkYellow),
        ]);
    }
    println!();
    println!("Facts:");
    println!("{table}");
}

fn print_ledger_table(entries: &[LedgerEntry]) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Process"),
        header_cell("Status"),
        header_cell("Rows"),
        header_cell("Detail"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    align_column(&mut table, 2, CellAlignment::Right);
    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.process_name),
            status_cell(entry.status),
            Cell::new(entry.row_count),
            Cell::new(&entry.detail),
        ]);
    }
    println!();
    println!("Ledger:");
    println!("{table}");
}

pub fn print_inspect(report: &InspectReport) {
    println!("File: {}", report.path.display());
    println!("Staging table: {}", report.table);
    println!("Format: {}", report.format);
    println!(
        "Rows: {} ({} skipped lines, {} empty and {} duplicate rows dropped)",
        report.rows,
        report.skipped_lines,
        report.clean.empty_rows_dropped,
        report.clean.duplicate_rows_dropped
    );

    let mut headers = Table::new();
    headers.set_header(vec![header_cell("Original header"), header_cell("Column")]);
    apply_table_style(&mut headers);
    for (original, canonical) in report.original_headers.iter().zip(&report.columns) {
        headers.add_row(vec![Cell::new(original), Cell::new(canonical)]);
    }
    println!();
    println!("{headers}");

    let mut roles = Table::new();
    roles.set_header(vec![
        header_cell("Group"),
        header_cell("Role"),
        header_cell("Column"),
    ]);
    apply_table_style(&mut roles);
    for (group, map) in &report.roles {
        for (role, column) in map.iter() {
            let column_cell = match column {
                Some(column) => Cell::new(column).fg(Color::Green),
                None => dim_cell("-"),
            };
            roles.add_row(vec![
                Cell::new(group.name()).fg(Color::Blue),
                Cell::new(role),
                column_cell,
            ]);
        }
    }
    println!();
    println!("{roles}");

    let complete: Vec<&str> = report.complete_groups().map(|group| group.name()).collect();
    if complete.is_empty() {
        println!("No role group is fully resolved.");
    } else {
        println!("Fully resolved: {}", complete.join(", "));
    }
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn status_cell(status: RunStatus) -> Cell {
    match status {
        RunStatus::Ok => Cell::new(status.as_str()).fg(Color::Green),
        RunStatus::Error => Cell::new(status.as_str())
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

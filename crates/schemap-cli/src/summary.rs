use std::collections::BTreeMap;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use schemap_model::{
    ColumnDescriptions, ColumnDocument, ColumnMatchResult, MatchSource, TableMatchResult,
};

use crate::cli::BandPreset;
use crate::commands::RunOutcome;

/// Band names, best first. The last band catches everything under the
/// lowest cutoff.
const BANDS: [(&str, Color); 4] = [
    ("High", Color::Green),
    ("Medium", Color::Yellow),
    ("Low", Color::Red),
    ("Below low", Color::DarkGrey),
];

pub fn print_run_summary(outcome: &RunOutcome) {
    let report = &outcome.report;
    let cutoffs = outcome.bands.cutoffs();
    println!(
        "Columns: {}  Tables: {}",
        report.column_match_count, report.table_match_count
    );
    match &outcome.output {
        Some(path) => println!("Output: {}", path.display()),
        None => println!("Output: (dry run, nothing written)"),
    }
    if report.cancelled {
        eprintln!("Run was cancelled; results are partial.");
    }
    println!("{}", column_table(&report.column_matches, &cutoffs));
    println!("{}", table_match_table(&report.table_matches, &cutoffs));
    println!(
        "{}",
        counts_table(
            &report.count_by_source(),
            &band_counts(&report.column_matches, &cutoffs)
        )
    );
}

pub fn print_table_matches(tables: &[TableMatchResult]) {
    println!(
        "{}",
        table_match_table(tables, &BandPreset::default().cutoffs())
    );
}

pub fn print_columns(columns: &[ColumnDocument], descriptions: &ColumnDescriptions) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Column"),
        header_cell("Type"),
        header_cell("Description"),
    ]);
    apply_table_style(&mut table);
    for column in columns {
        let description = descriptions
            .get(column.id.as_str())
            .map_or_else(|| dim_cell("-"), Cell::new);
        let data_type = if column.data_type.is_empty() {
            dim_cell("-")
        } else {
            Cell::new(&column.data_type)
        };
        table.add_row(vec![id_cell(column.id.as_str()), data_type, description]);
    }
    println!("{table}");
}

fn column_table(matches: &[ColumnMatchResult], cutoffs: &[f64; 3]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Source"),
        header_cell("Best match"),
        header_cell("Confidence"),
        header_cell("Band"),
        header_cell("Via"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Center);
    for result in matches {
        let best = match &result.best_match {
            Some(target) => Cell::new(target),
            None => dim_cell("-"),
        };
        let band = band_of(result.confidence, cutoffs);
        table.add_row(vec![
            id_cell(result.source.as_str()),
            best,
            confidence_cell(result.confidence, band),
            band_cell(band),
            source_cell(result.match_source),
        ]);
    }
    table
}

fn table_match_table(tables: &[TableMatchResult], cutoffs: &[f64; 3]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Source table"),
        header_cell("Best match table"),
        header_cell("Confidence"),
        header_cell("Columns"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Right);
    for result in tables {
        let best = match &result.best_match_table {
            Some(name) => Cell::new(name),
            None => dim_cell("-"),
        };
        table.add_row(vec![
            id_cell(&result.source_table),
            best,
            confidence_cell(result.confidence, band_of(result.confidence, cutoffs)),
            Cell::new(result.column_match_count),
        ]);
    }
    table
}

fn counts_table(by_source: &BTreeMap<MatchSource, usize>, by_band: &[usize; 4]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Group"), header_cell("Columns")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    for (source, count) in by_source {
        table.add_row(vec![source_cell(*source), Cell::new(count)]);
    }
    for (band, count) in by_band.iter().enumerate() {
        table.add_row(vec![band_cell(band), count_cell(*count)]);
    }
    table
}

/// Index into `BANDS` of the first cutoff `confidence` reaches. NaN lands in
/// the last band.
fn band_of(confidence: f64, cutoffs: &[f64; 3]) -> usize {
    cutoffs
        .iter()
        .position(|cutoff| confidence >= *cutoff)
        .unwrap_or(cutoffs.len())
}

fn band_counts(matches: &[ColumnMatchResult], cutoffs: &[f64; 3]) -> [usize; 4] {
    let mut counts = [0; 4];
    for result in matches {
        counts[band_of(result.confidence, cutoffs)] += 1;
    }
    counts
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

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn id_cell(id: &str) -> Cell {
    Cell::new(id)
        .fg(Color::Blue)
        .add_attribute(Attribute::Bold)
}

fn confidence_cell(confidence: f64, band: usize) -> Cell {
    Cell::new(format!("{confidence:.4}")).fg(BANDS[band].1)
}

fn band_cell(band: usize) -> Cell {
    let (label, color) = BANDS[band];
    let cell = Cell::new(label).fg(color);
    if band == 0 {
        cell.add_attribute(Attribute::Bold)
    } else {
        cell
    }
}

fn source_cell(source: MatchSource) -> Cell {
    match source {
        MatchSource::Unmatched => dim_cell(source),
        source if source.is_fallback() => Cell::new(source).fg(Color::Yellow),
        source => Cell::new(source),
    }
}

fn count_cell(count: usize) -> Cell {
    if count > 0 {
        Cell::new(count).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

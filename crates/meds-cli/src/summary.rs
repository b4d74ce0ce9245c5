use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use meds_config::ColumnProjection;
use meds_cli::types::{FileSummary, ShardResult};

pub fn print_summary(result: &ShardResult) {
    println!("Input: {}", result.input_dir.display());
    println!("Output: {}", result.output_dir.display());
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Prefix"),
        header_cell("Format"),
        header_cell("Rows"),
        header_cell("Chunks"),
        header_cell("Written"),
        header_cell("Present"),
        header_cell("Contended"),
        header_cell("Failed"),
    ]);
    apply_summary_table_style(&mut table);
    for index in 2..8 {
        align_column(&mut table, index, CellAlignment::Right);
    }

    let mut files: Vec<&FileSummary> = result.files.iter().collect();
    files.sort_by(|a, b| a.prefix.cmp(&b.prefix));
    let mut total = FileTotals::default();
    for file in files {
        total.add(file);
        table.add_row(vec![
            Cell::new(&file.prefix)
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            Cell::new(file.format),
            Cell::new(file.rows),
            Cell::new(file.chunks),
            count_cell(file.written, Color::Green),
            dim_cell(file.already_present),
            count_cell(file.contended, Color::Yellow),
            count_cell(file.failed, Color::Red),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("-"),
        Cell::new(total.rows).add_attribute(Attribute::Bold),
        Cell::new(total.chunks).add_attribute(Attribute::Bold),
        count_cell(total.written, Color::Green).add_attribute(Attribute::Bold),
        dim_cell(total.already_present),
        count_cell(total.contended, Color::Yellow).add_attribute(Attribute::Bold),
        count_cell(total.failed, Color::Red).add_attribute(Attribute::Bold),
    ]);
    println!("{table}");
    print_skipped_table(result);
    println!("Elapsed: {:.2?}", result.elapsed);

    if !result.failures.is_empty() {
        eprintln!("Failed chunks:");
        for failure in &result.failures {
            eprintln!("- {}: {}", failure.output.display(), failure.message);
        }
    }
}

fn print_skipped_table(result: &ShardResult) {
    if result.skipped.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Skipped"),
        header_cell("Prefix"),
        header_cell("Reason"),
    ]);
    apply_table_style(&mut table);
    for skipped in &result.skipped {
        table.add_row(vec![
            dim_cell(skipped.path.display()),
            Cell::new(&skipped.prefix),
            Cell::new(&skipped.reason),
        ]);
    }
    println!("{table}");
}

/// Prints the columns each configured table is read with.
pub fn print_projection(projection: &ColumnProjection) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Prefix"),
        header_cell("Columns"),
        header_cell("Count"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    for (prefix, columns) in projection.iter() {
        table.add_row(vec![
            Cell::new(prefix)
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            Cell::new(columns.join(", ")),
            Cell::new(columns.len()),
        ]);
    }
    println!("{table}");
}

#[derive(Default)]
struct FileTotals {
    rows: usize,
    chunks: usize,
    written: usize,
    already_present: usize,
    contended: usize,
    failed: usize,
}

impl FileTotals {
    fn add(&mut self, file: &FileSummary) {
        self.rows += file.rows;
        self.chunks += file.chunks;
        self.written += file.written;
        self.already_present += file.already_present;
        self.contended += file.contended;
        self.failed += file.failed;
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn apply_table_style(table: &mut Table) {
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

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

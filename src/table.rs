use std::fmt::Write as _;

/// Widest a rendered cell may get before it is clipped with an ellipsis.
pub const MAX_CELL_WIDTH: usize = 48;

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let headers = headers.iter().map(|h| clip(h)).collect::<Vec<_>>();
    let rows = rows
        .iter()
        .map(|row| row.iter().take(headers.len()).map(|c| clip(c)).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }
    for width in &mut widths {
        *width = (*width).max(1);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(&headers, &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in &rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = widths
        .iter()
        .enumerate()
        .map(|(idx, width)| {
            let value = values.get(idx).map(String::as_str).unwrap_or("");
            let padding = width.saturating_sub(value.chars().count());
            format!("{value}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

/// Flattens control characters and clips the cell to [`MAX_CELL_WIDTH`].
fn clip(value: &str) -> String {
    let flattened = value
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect::<String>();
    if flattened.chars().count() <= MAX_CELL_WIDTH {
        return flattened;
    }
    let mut clipped = flattened
        .chars()
        .take(MAX_CELL_WIDTH - 1)
        .collect::<String>();
    clipped.push('…');
    clipped
}

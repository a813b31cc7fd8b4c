use std::fmt::Write as _;

/// Left-aligned plain-text table used by the `probe` and `plan` commands.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows
            .push(cells.into_iter().map(|cell| sanitize_cell(cell.into())).collect());
    }

    pub fn render(&self) -> String {
        let mut widths = self
            .headers
            .iter()
            .map(|header| header.chars().count().max(3))
            .collect::<Vec<_>>();
        for row in &self.rows {
            for (idx, cell) in row.iter().enumerate().take(widths.len()) {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }

        let mut output = String::new();
        let _ = writeln!(output, "{}", format_row(&self.headers, &widths));
        let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_row(&separator, &widths));
        for row in &self.rows {
            let _ = writeln!(output, "{}", format_row(row, &widths));
        }
        output
    }
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{value:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn sanitize_cell(value: String) -> String {
    if value.contains(['\n', '\r', '\t']) {
        value.replace(['\n', '\r', '\t'], " ")
    } else {
        value
    }
}

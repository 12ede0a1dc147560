//! Grid-style text tables with wrapped cells.
//!
//! ```text
//! +--------+-------+
//! | Name   | Value |
//! +========+=======+
//! | a      | 1     |
//! +--------+-------+
//! ```

/// Greedy word wrap; words longer than `width` are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        loop {
            let needed = if current_len == 0 { chars.len() } else { current_len + 1 + chars.len() };
            if needed <= width {
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(chars.iter());
                current_len += chars.len();
                break;
            }
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            // Word alone is too long for a line.
            let rest = chars.split_off(width);
            lines.push(chars.iter().collect());
            chars = rest;
        }
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Render headers and rows as a grid table, wrapping each cell at `max_width`.
pub fn grid_table(headers: &[String], rows: &[Vec<String>], max_width: usize) -> String {
    let columns = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or(0);
    if columns == 0 {
        return String::new();
    }

    let wrap_row = |cells: &[String]| -> Vec<Vec<String>> {
        (0..columns)
            .map(|c| wrap(cells.get(c).map(String::as_str).unwrap_or(""), max_width))
            .collect()
    };
    let header_cells = wrap_row(headers);
    let body: Vec<Vec<Vec<String>>> = rows.iter().map(|r| wrap_row(r)).collect();

    let widths: Vec<usize> = (0..columns)
        .map(|c| {
            std::iter::once(&header_cells)
                .chain(body.iter())
                .flat_map(|row| row[c].iter())
                .map(|line| line.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let rule = |fill: char| -> String {
        let mut line = String::from("+");
        for w in &widths {
            line.extend(std::iter::repeat_n(fill, w + 2));
            line.push('+');
        }
        line
    };

    let mut out = vec![rule('-')];
    render_row(&header_cells, &widths, &mut out);
    out.push(rule('='));
    for row in &body {
        render_row(row, &widths, &mut out);
        out.push(rule('-'));
    }
    if body.is_empty() {
        // Headers only: close the table under the header rule.
        out.pop();
        out.push(rule('-'));
    }
    out.join("\n")
}

fn render_row(cells: &[Vec<String>], widths: &[usize], out: &mut Vec<String>) {
    let height = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);
    for i in 0..height {
        let mut line = String::from("|");
        for (cell, width) in cells.iter().zip(widths) {
            let text = cell.get(i).map(String::as_str).unwrap_or("");
            let pad = width - text.chars().count();
            line.push(' ');
            line.push_str(text);
            line.extend(std::iter::repeat_n(' ', pad + 1));
            line.push('|');
        }
        out.push(line);
    }
}

//! HTML table reader: extracts `<table>` elements by index, takes the
//! header from `<th>` cells (or the first row), and infers column types
//! from cell text.

use fsq_common::{FsqError, Result};

use crate::fetch::ByteSource;
use crate::reader::ReaderContext;
use crate::table::{select_index, StringTableReader};

pub fn open(
    bytes: ByteSource,
    table_index: i64,
    ctx: ReaderContext,
) -> Result<StringTableReader> {
    let source = bytes.display();
    let text = String::from_utf8_lossy(&bytes.fetch_all()?).into_owned();
    let tables = extract_tables(&text);
    if tables.is_empty() {
        return Err(FsqError::Data(format!("{source}: no <table> found")));
    }
    let table = &tables[select_index(&source, tables.len(), table_index)?];
    if table.is_empty() {
        return Err(FsqError::Data(format!("{source}: selected table is empty")));
    }
    let columns: Vec<String> = table[0].iter().map(|c| c.trim().to_string()).collect();
    let records = table[1..]
        .iter()
        .map(|row| row.iter().map(|c| Some(c.clone())).collect())
        .collect();
    Ok(StringTableReader::new(source, columns, records, ctx))
}

/// All tables in document order; each table is rows of cell text with
/// the header row first.
fn extract_tables(html: &str) -> Vec<Vec<Vec<String>>> {
    let lower = html.to_ascii_lowercase();
    let mut tables = Vec::new();
    let mut pos = 0;
    while let Some(start) = find_from(&lower, "<table", pos) {
        let body_start = match find_from(&lower, ">", start) {
            Some(i) => i + 1,
            None => break,
        };
        let end = find_from(&lower, "</table>", body_start).unwrap_or(lower.len());
        let table_html = &html[body_start..end];
        let table_lower = &lower[body_start..end];
        let rows = extract_rows(table_html, table_lower);
        if !rows.is_empty() {
            tables.push(rows);
        }
        pos = end + 1;
    }
    tables
}

fn extract_rows(html: &str, lower: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut header: Option<Vec<String>> = None;
    let mut pos = 0;
    while let Some(start) = find_from(lower, "<tr", pos) {
        let body_start = match find_from(lower, ">", start) {
            Some(i) => i + 1,
            None => break,
        };
        let end = find_from(lower, "</tr>", body_start).unwrap_or(lower.len());
        let cells = extract_cells(&html[body_start..end], &lower[body_start..end]);
        let is_header_row = lower[body_start..end].contains("<th");
        if is_header_row && header.is_none() && rows.is_empty() {
            header = Some(cells);
        } else if !cells.is_empty() {
            rows.push(cells);
        }
        pos = end + 1;
    }
    match header {
        // Header row first; falls back to the first data row.
        Some(h) => {
            let mut out = vec![h];
            out.extend(rows);
            out
        }
        None => rows,
    }
}

fn extract_cells(html: &str, lower: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut pos = 0;
    loop {
        let th = find_from(lower, "<th", pos);
        let td = find_from(lower, "<td", pos);
        let start = match (th, td) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => break,
        };
        let body_start = match find_from(lower, ">", start) {
            Some(i) => i + 1,
            None => break,
        };
        let close_th = find_from(lower, "</th>", body_start);
        let close_td = find_from(lower, "</td>", body_start);
        let next_cell = {
            let nth = find_from(lower, "<th", body_start);
            let ntd = find_from(lower, "<td", body_start);
            match (nth, ntd) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        };
        let end = [close_th, close_td, next_cell]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(lower.len());
        cells.push(clean_text(&html[body_start..end]));
        // An unclosed cell ends where the next one starts; don't step
        // past that next opening tag.
        pos = if Some(end) == next_cell { end } else { end + 1 };
        if pos >= lower.len() {
            break;
        }
    }
    cells
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..].find(needle).map(|i| i + from)
}

/// Strips nested tags and decodes the common entities.
fn clean_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    decode_entities(out.trim())
}

pub(crate) fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';').filter(|i| *i <= 8) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            "nbsp" => out.push(' '),
            _ => {
                let decoded = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32);
                match decoded {
                    Some(c) => out.push(c),
                    None => {
                        out.push('&');
                        out.push_str(entity);
                        out.push(';');
                    }
                }
            }
        }
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    out
}

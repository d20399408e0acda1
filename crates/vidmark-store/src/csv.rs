//! Minimal RFC 4180 reading and writing for export tables.

use thiserror::Error;
use vidmark_core::ExportTable;

#[derive(Debug, Error, PartialEq)]
pub enum CsvError {
    #[error("empty CSV: no header line")]
    Empty,

    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("unexpected character after closing quote on line {line}")]
    TrailingAfterQuote { line: usize },
}

fn needs_quotes(field: &str) -> bool {
    field.contains([',', '"', '\n', '\r'])
}

fn write_field(out: &mut String, field: &str) {
    if needs_quotes(field) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

fn write_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a String>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_field(out, field);
    }
    out.push('\n');
}

/// Header line then one line per row, `\n`-terminated.
pub fn render_csv(table: &ExportTable) -> String {
    let mut out = String::new();
    write_record(&mut out, &table.columns);
    for row in &table.rows {
        write_record(&mut out, row);
    }
    out
}

/// Parse CSV text into a table. Accepts `\r\n` line endings and skips blank
/// lines between records.
pub fn parse_csv(text: &str) -> Result<ExportTable, CsvError> {
    let mut records = parse_records(text)?.into_iter();
    let columns = records.next().ok_or(CsvError::Empty)?;
    Ok(ExportTable {
        columns,
        rows: records.collect(),
    })
}

fn parse_records(text: &str) -> Result<Vec<Vec<String>>, CsvError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;
    // a record with one empty unquoted field is a blank line
    let mut touched = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if field.is_empty() => {
                touched = true;
                let start = line;
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            field.push('"');
                        }
                        Some('"') => break,
                        Some(ch) => {
                            if ch == '\n' {
                                line += 1;
                            }
                            field.push(ch);
                        }
                        None => return Err(CsvError::UnterminatedQuote { line: start }),
                    }
                }
                match chars.peek() {
                    None | Some(',') | Some('\n') | Some('\r') => {}
                    Some(_) => return Err(CsvError::TrailingAfterQuote { line }),
                }
            }
            ',' => {
                touched = true;
                record.push(std::mem::take(&mut field));
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                if touched || !field.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                touched = false;
            }
            other => {
                touched = true;
                field.push(other);
            }
        }
    }
    if touched || !field.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

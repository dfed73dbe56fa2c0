//! Plain-text tables: tabulated media and distributions in, sweep results out.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::medium::Medium;


/// How a text table is laid out.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TableFormat {
    /// Everything from this marker to the end of a line is ignored.
    #[serde(default = "default_comment")]
    pub comment: String,
    /// Field separator. Runs of whitespace when unset.
    #[serde(default)]
    pub delimiter: Option<String>,
    /// Lines skipped at the top of the file before anything else.
    #[serde(default)]
    pub skip_rows: usize,
}

fn default_comment() -> String {
    "#".to_string()
}

impl Default for TableFormat {
    fn default() -> Self {
        Self {
            comment: default_comment(),
            delimiter: None,
            skip_rows: 0,
        }
    }
}

/// Parses the selected columns of a table, one output column per entry of
/// `columns`, in that order.
pub fn parse_table(text: &str, format: &TableFormat, columns: &[usize]) -> Result<Array2<f64>> {
    let mut values = Vec::new();
    let mut rows = 0;

    for (number, line) in text.lines().enumerate().skip(format.skip_rows) {
        let content = match (format.comment.is_empty(), line.find(format.comment.as_str())) {
            (false, Some(start)) => &line[..start],
            _ => line,
        };
        if content.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = match &format.delimiter {
            Some(delimiter) => content.split(delimiter.as_str()).map(str::trim).collect(),
            None => content.split_whitespace().collect(),
        };
        for &column in columns {
            let field = fields.get(column).ok_or_else(|| {
                anyhow!(
                    "line {}: column {} requested but only {} found",
                    number + 1,
                    column,
                    fields.len()
                )
            })?;
            let value = field
                .parse::<f64>()
                .with_context(|| format!("line {}: cannot parse '{}' as a number", number + 1, field))?;
            values.push(value);
        }
        rows += 1;
    }

    if rows == 0 {
        return Err(anyhow!("table contains no data rows"));
    }
    Ok(Array2::from_shape_vec((rows, columns.len()), values)?)
}

pub fn read_table(path: &Path, format: &TableFormat, columns: &[usize]) -> Result<Array2<f64>> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
    parse_table(&text, format, columns).with_context(|| format!("malformed table {:?}", path))
}

/// Loads a medium from the `[λ, n, k]` columns of a table file.
pub fn read_medium(path: &Path, format: &TableFormat, columns: [usize; 3]) -> Result<Medium> {
    let table = read_table(path, format, &columns)?;
    let rows: Vec<[f64; 3]> = table.rows().into_iter().map(|r| [r[0], r[1], r[2]]).collect();
    let medium = Medium::from_rows(&rows).with_context(|| format!("invalid medium in {:?}", path))?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(medium.with_name(name))
}

/// Writes a tab-separated table with a `#` header.
pub fn write_tsv<W: Write>(writer: &mut W, header: &[String], columns: &[&str], rows: &[Vec<f64>]) -> Result<()> {
    for line in header {
        writeln!(writer, "# {}", line)?;
    }
    writeln!(writer, "# {}", columns.join("\t"))?;
    for row in rows {
        let line = row.iter().map(|value| format!("{:.6e}", value)).collect::<Vec<_>>();
        writeln!(writer, "{}", line.join("\t"))?;
    }
    Ok(())
}

/// Writes a tab-separated table to `path`, or to stdout when `path` is `None`.
pub fn write_tsv_to(path: Option<&Path>, header: &[String], columns: &[&str], rows: &[Vec<f64>]) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
            let mut writer = BufWriter::new(file);
            write_tsv(&mut writer, header, columns, rows)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            write_tsv(&mut writer, header, columns, rows)?;
        }
    }
    Ok(())
}

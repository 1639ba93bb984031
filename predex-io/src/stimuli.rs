use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use predex_core::StimulusItem;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("stimuli file not found: {0}")]
    Missing(PathBuf),
    #[error("cannot read workbook {path}: {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("cannot read csv {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("stimuli file is empty: {0}")]
    Empty(PathBuf),
    #[error("no sentence/text column or text-valued column in {0}")]
    NoTextColumn(PathBuf),
    #[error("no non-empty sentences in {0}")]
    NoSentences(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    fn is_text(&self) -> bool {
        matches!(self, Cell::Text(s) if !s.trim().is_empty())
    }

    fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            // Integral ids come back from spreadsheets as floats
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Header row plus data rows, all padded to the header width
#[derive(Debug, Default)]
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    fn column(&self, names: &[&str]) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    }

    fn first_text_column(&self) -> Option<usize> {
        (0..self.headers.len()).find(|&col| self.rows.iter().any(|row| row[col].is_text()))
    }
}

/// Reads sentences from the first sheet of an xlsx/xls/ods workbook or from
/// a csv file, chosen by extension.
pub fn load_stimuli(path: &Path) -> Result<Vec<StimulusItem>, SetupError> {
    if !path.exists() {
        return Err(SetupError::Missing(path.to_path_buf()));
    }
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    let table = if is_csv {
        read_csv(path)?
    } else {
        read_workbook(path)?
    };

    let items = items_from_table(&table, path)?;
    info!(path = %path.display(), sentences = items.len(), "stimuli loaded");
    Ok(items)
}

fn read_workbook(path: &Path) -> Result<Table, SetupError> {
    let workbook_err = |source| SetupError::Workbook {
        path: path.to_path_buf(),
        source,
    };
    let mut workbook = open_workbook_auto(path).map_err(workbook_err)?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(workbook_err)?,
        None => return Err(SetupError::Empty(path.to_path_buf())),
    };

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Err(SetupError::Empty(path.to_path_buf()));
    };
    let headers: Vec<String> = header.iter().map(|d| Cell::from(d).to_text()).collect();
    let rows = rows
        .map(|row| pad(row.iter().map(Cell::from).collect(), headers.len()))
        .collect();
    Ok(Table { headers, rows })
}

fn read_csv(path: &Path) -> Result<Table, SetupError> {
    let csv_err = |source| SetupError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_owned())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let cells = record
            .iter()
            .map(|field| {
                if field.trim().is_empty() {
                    Cell::Empty
                } else if let Ok(n) = field.trim().parse::<f64>() {
                    Cell::Number(n)
                } else {
                    Cell::Text(field.to_owned())
                }
            })
            .collect();
        rows.push(pad(cells, headers.len()));
    }
    Ok(Table { headers, rows })
}

fn pad(mut cells: Vec<Cell>, width: usize) -> Vec<Cell> {
    cells.resize(width, Cell::Empty);
    cells
}

fn items_from_table(table: &Table, path: &Path) -> Result<Vec<StimulusItem>, SetupError> {
    if table.headers.is_empty() || table.rows.is_empty() {
        return Err(SetupError::Empty(path.to_path_buf()));
    }

    let text_col = table
        .column(&["sentence", "text"])
        .or_else(|| table.first_text_column())
        .ok_or_else(|| SetupError::NoTextColumn(path.to_path_buf()))?;
    let id_col = table.column(&["id", "sentence_id"]);
    debug!(
        text_column = %table.headers[text_col],
        id_column = id_col.map(|c| table.headers[c].as_str()).unwrap_or("<generated>"),
        "stimulus columns"
    );

    let items: Vec<StimulusItem> = table
        .rows
        .iter()
        .enumerate()
        .filter_map(|(row, cells)| {
            let text = cells[text_col].to_text().trim().to_owned();
            if text.is_empty() {
                return None;
            }
            // Generated ids follow row position, so dropped rows leave gaps
            let id = match id_col {
                Some(col) => cells[col].to_text().trim().to_owned(),
                None => format!("S{:03}", row + 1),
            };
            Some(StimulusItem::new(id, text))
        })
        .collect();

    if items.is_empty() {
        return Err(SetupError::NoSentences(path.to_path_buf()));
    }
    Ok(items)
}

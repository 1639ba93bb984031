use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use predex_core::ResponseRecord;
use rust_xlsxwriter::{Workbook, XlsxError};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("cannot create output directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("xlsx write failed: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("json write failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("every output format failed, {records} records dumped to console")]
    Exhausted { records: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xlsx,
    Csv,
    Json,
}

impl Format {
    pub const CHAIN: [Format; 3] = [Format::Xlsx, Format::Csv, Format::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Xlsx => "xlsx",
            Format::Csv => "csv",
            Format::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Saved {
    pub path: PathBuf,
    pub format: Format,
}

/// Keeps file-name-safe characters, replacing the rest with `_`
pub fn sanitize_participant(participant: &str) -> String {
    let cleaned: String = participant
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_owned()
    } else {
        cleaned
    }
}

/// `<dir>/results_<participant>_<YYYYmmdd_HHMMSS>.xlsx`
pub fn output_path(dir: &Path, participant: &str, at: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "results_{}_{}.xlsx",
        sanitize_participant(participant),
        at.format("%Y%m%d_%H%M%S")
    ))
}

/// Writes the record table, stepping down xlsx → csv → json and finally to
/// the console when nothing else can be written.
pub struct ResultSink<W: Write> {
    console: W,
}

impl ResultSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ResultSink<W> {
    pub fn new(console: W) -> Self {
        Self { console }
    }

    pub fn into_console(self) -> W {
        self.console
    }

    /// `path` names the primary xlsx file; fallbacks swap its extension
    pub fn persist(
        &mut self,
        path: &Path,
        records: &[ResponseRecord],
    ) -> Result<Saved, PersistError> {
        let dir_result = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                fs::create_dir_all(dir).map_err(|source| PersistError::Directory {
                    path: dir.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        };

        if let Err(err) = dir_result {
            warn!(error = %err, "output directory unavailable");
        } else {
            for format in Format::CHAIN {
                let target = path.with_extension(format.extension());
                match write_format(format, &target, records) {
                    Ok(()) => {
                        info!(path = %target.display(), %format, records = records.len(), "results saved");
                        return Ok(Saved {
                            path: target,
                            format,
                        });
                    }
                    Err(err) => {
                        warn!(path = %target.display(), %format, error = %err, "write failed, trying next format")
                    }
                }
            }
        }

        error!(records = records.len(), "all output formats failed, dumping to console");
        self.dump(records)?;
        Err(PersistError::Exhausted {
            records: records.len(),
        })
    }

    /// Tab-separated rows with a header, quoted where a field holds a tab,
    /// quote or line break
    fn dump(&mut self, records: &[ResponseRecord]) -> Result<(), PersistError> {
        let mut out = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(&mut self.console);
        out.write_record(ResponseRecord::COLUMNS)?;
        for record in records {
            out.serialize(record)?;
        }
        out.flush()?;
        Ok(())
    }
}

fn write_format(format: Format, path: &Path, records: &[ResponseRecord]) -> Result<(), PersistError> {
    match format {
        Format::Xlsx => write_xlsx(path, records),
        Format::Csv => write_csv(path, records),
        Format::Json => write_json(path, records),
    }
}

fn write_xlsx(path: &Path, records: &[ResponseRecord]) -> Result<(), PersistError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("results")?;

    for (col, name) in ResponseRecord::COLUMNS.iter().enumerate() {
        sheet.write_string(0, col as u16, *name)?;
    }
    for (i, r) in records.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, &r.participant)?;
        sheet.write_number(row, 1, r.trial_index as f64)?;
        sheet.write_string(row, 2, &r.sentence_id)?;
        sheet.write_number(row, 3, r.step_index as f64)?;
        sheet.write_string(row, 4, &r.displayed_prefix)?;
        sheet.write_string(row, 5, &r.true_next_token)?;
        sheet.write_string(row, 6, &r.prediction)?;
        // NaN onset stays an empty cell
        if r.typing_onset_ms.is_finite() {
            sheet.write_number(row, 7, r.typing_onset_ms)?;
        }
        sheet.write_number(row, 8, r.confirm_rt_ms)?;
    }

    workbook.save(path)?;
    Ok(())
}

fn write_csv(path: &Path, records: &[ResponseRecord]) -> Result<(), PersistError> {
    let mut writer = csv::Writer::from_path(path)?;
    // Header comes from the serde field names
    for record in records {
        writer.serialize(record)?;
    }
    if records.is_empty() {
        writer.write_record(ResponseRecord::COLUMNS)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(path: &Path, records: &[ResponseRecord]) -> Result<(), PersistError> {
    let file = fs::File::create(path)?;
    let mut out = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, records)?;
    // Surface deferred write errors; this is the last file format tried
    let file = out.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()?;
    Ok(())
}

use std::collections::BTreeSet;
use std::path::Path;

use super::model::{CellValue, DatasetProfile, ParsedDataset, RawRow, ROW_LIMIT};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read a CSV file asynchronously and ingest it.
pub async fn ingest_file(path: &Path) -> Result<ParsedDataset> {
    let text = read_csv_file(path).await?;
    ingest(&text)
}

/// Read raw bytes and decode them as UTF-8.
///
/// Invalid UTF-8 is reported as a format error on the line holding the first
/// bad byte.
pub async fn read_csv_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await.map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|err| {
        let valid = &err.as_bytes()[..err.utf8_error().valid_up_to()];
        let line = valid.iter().filter(|&&b| b == b'\n').count() + 1;
        PipelineError::format(Some(line), "file is not valid UTF-8 text")
    })
}

/// Parse CSV text into a validated [`ParsedDataset`].
///
/// Layout: the first non-blank line is the header, later lines are split on
/// commas positionally against it. There is no quoting, so embedded commas
/// always split a field. Short rows are padded with empty values and extra
/// trailing fields are ignored. Only the first [`ROW_LIMIT`] data rows are
/// kept.
///
/// Accepted when the header has `time` and `flux` (light curve) or any of the
/// parameter-table columns; otherwise fails with
/// [`PipelineError::Validation`] naming the missing light-curve columns.
pub fn ingest(contents: &str) -> Result<ParsedDataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let mut records = reader.records().filter(|res| match res {
        // only lines that are blank after trimming; `,` is a row of empty cells
        Ok(record) => !(record.len() == 1 && record[0].is_empty()),
        Err(_) => true,
    });

    let header_record = match records.next() {
        Some(res) => res.map_err(csv_error)?,
        None => return Err(PipelineError::format(None, "file contains no lines")),
    };
    let headers = parse_headers(&header_record)?;

    let profile = DatasetProfile::detect(&headers)
        .map_err(|missing| PipelineError::Validation { missing })?;

    let mut rows = Vec::new();
    for res in records.take(ROW_LIMIT) {
        let record = res.map_err(csv_error)?;
        rows.push(build_row(&headers, &record));
    }

    log::debug!(
        "ingested {} rows x {} columns ({profile:?})",
        rows.len(),
        headers.len()
    );
    Ok(ParsedDataset::new(headers, rows, profile))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_headers(record: &csv::StringRecord) -> Result<Vec<String>> {
    let line = record.position().map(|p| p.line() as usize);
    let mut seen = BTreeSet::new();
    let mut headers = Vec::with_capacity(record.len());
    for name in record.iter() {
        if !seen.insert(name) {
            return Err(PipelineError::format(
                line,
                format!("duplicate column '{name}' in header"),
            ));
        }
        headers.push(name.to_string());
    }
    Ok(headers)
}

fn build_row(headers: &[String], record: &csv::StringRecord) -> RawRow {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let value = record
                .get(i)
                .map(CellValue::parse)
                .unwrap_or_else(|| CellValue::Text(String::new()));
            (header.clone(), value)
        })
        .collect()
}

fn csv_error(err: csv::Error) -> PipelineError {
    let line = err.position().map(|p| p.line() as usize);
    PipelineError::format(line, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_minimal_light_curve() {
        let ds = ingest("time,flux\n0,1.0\n1,0.9\n2,1.0\n").unwrap();
        assert_eq!(ds.headers, vec!["time", "flux"]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.profile, DatasetProfile::LightCurve);
        assert_eq!(ds.rows[1]["flux"], CellValue::Number(0.9));
    }

    #[test]
    fn row_count_is_capped() {
        let mut text = String::from("time,flux\n");
        for i in 0..1200 {
            text.push_str(&format!("{i},1.0\n"));
        }
        assert_eq!(ingest(&text).unwrap().len(), ROW_LIMIT);

        let short = "time,flux\n1,2\n3,4\n";
        assert_eq!(ingest(short).unwrap().len(), 2);
    }

    #[test]
    fn blank_lines_and_whitespace_are_ignored() {
        let ds = ingest("\n time , flux \r\n\n0, 1.0\n   \n1,0.5\n").unwrap();
        assert_eq!(ds.headers, vec!["time", "flux"]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows[0]["flux"], CellValue::Number(1.0));
    }

    #[test]
    fn comma_only_line_is_a_row_of_empty_cells() {
        let ds = ingest("time,flux\n0,1\n,\n2,3\n").unwrap();
        assert_eq!(ds.len(), 3);
        assert!(ds.rows[1]["time"].is_empty());
        assert!(ds.rows[1]["flux"].is_empty());
        assert_eq!(ds.rows[2]["flux"], CellValue::Number(3.0));
        assert_eq!(ds.light_curve_points().len(), 2);
    }

    #[test]
    fn ragged_rows_are_padded() {
        let ds = ingest("time,flux,flux_err\n0,1.0\n1,0.9,0.01,extra\n").unwrap();
        assert!(ds.rows[0]["flux_err"].is_empty());
        assert_eq!(ds.rows[1]["flux_err"], CellValue::Number(0.01));
        assert_eq!(ds.rows[1].len(), 3);
    }

    #[test]
    fn non_numeric_values_stay_text() {
        let ds = ingest("time,flux,note\n0,1.0,dip\n").unwrap();
        assert_eq!(ds.rows[0]["note"], CellValue::Text("dip".into()));
    }

    #[test]
    fn empty_input_is_a_format_error() {
        assert!(matches!(ingest(""), Err(PipelineError::Format { .. })));
        assert!(matches!(ingest("\n  \n"), Err(PipelineError::Format { .. })));
    }

    #[test]
    fn missing_columns_are_named() {
        match ingest("time,mag\n0,1\n") {
            Err(PipelineError::Validation { missing }) => assert_eq!(missing, vec!["flux"]),
            other => panic!("unexpected {other:?}"),
        }
        match ingest("a,b\n0,1\n") {
            Err(PipelineError::Validation { missing }) => {
                assert_eq!(missing, vec!["time", "flux"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parameter_tables_are_accepted() {
        let ds = ingest("pl_name,st_teff,pl_rade\nK2-18 b,3457,2.6\n").unwrap();
        assert_eq!(ds.profile, DatasetProfile::ParameterTable);
        assert_eq!(ds.rows[0]["pl_name"], CellValue::Text("K2-18 b".into()));
        assert!(ds.light_curve_points().is_empty());
    }

    #[test]
    fn duplicate_headers_are_rejected() {
        match ingest("time,flux,time\n0,1,2\n") {
            Err(PipelineError::Format { line, .. }) => assert_eq!(line, Some(1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_utf8_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"time,flux\n0,1.0\n1,\xff\n").unwrap();
        match read_csv_file(file.path()).await {
            Err(PipelineError::Format { line, .. }) => assert_eq!(line, Some(3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn ingests_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"time,flux,flux_err\n0,1.0,0.001\n0.5,0.98,0.001\n")
            .unwrap();
        let ds = ingest_file(file.path()).await.unwrap();
        let points = ds.light_curve_points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].flux_error, Some(0.001));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = ingest_file(Path::new("/definitely/not/here.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}

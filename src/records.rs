// Refund Record Store
//
// Loads the expected refunds from CSV (`tx_id, address, quantity, token`).
// Columns are positional; the header row is skipped. Any malformed row fails
// the whole load.

use crate::types::ExpectedRecord;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const COLUMNS: usize = 4;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed record at line {line}: {reason}")]
    Malformed { line: u64, reason: String },
    #[error("failed to read records: {0}")]
    Csv(#[from] csv::Error),
}

/// Load every record from the CSV file at `path`.
pub fn load_records(path: &Path) -> Result<Vec<ExpectedRecord>, RecordError> {
    let file = File::open(path).map_err(|source| RecordError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let records = read_records(file)?;
    info!(count = records.len(), path = %path.display(), "loaded expected refund records");
    Ok(records)
}

pub fn read_records<R: io::Read>(reader: R) -> Result<Vec<ExpectedRecord>, RecordError> {
    // `flexible` so short/long rows reach our own check with a line number
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    // Zero-byte input has no header row
    if reader.headers()?.is_empty() {
        return Err(RecordError::Malformed {
            line: 1,
            reason: "missing header row".to_string(),
        });
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map_or(0, |p| p.line());

        if row.len() != COLUMNS {
            return Err(RecordError::Malformed {
                line,
                reason: format!("expected {COLUMNS} columns, found {}", row.len()),
            });
        }

        let record: ExpectedRecord = row
            .deserialize(None)
            .map_err(|e| RecordError::Malformed {
                line,
                reason: e.to_string(),
            })?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "tx_id,address,quantity,token
d1e170f5,0xaAD7abCf4014B40256f3b5b9dC67D2e7d5e32071,337,EOS
d1e170f5,0x1111111111111111111111111111111111111111,12,EOS
";

    #[test]
    fn reads_rows_after_header() {
        let records = read_records(CSV.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tx_id, "d1e170f5");
        assert_eq!(records[0].quantity, "337");
        assert_eq!(records[1].token, "EOS");
    }

    #[test]
    fn header_names_do_not_matter() {
        let csv = "a,b,c,d\ntx,0xabc,1,EOS\n";
        let records = read_records(csv.as_bytes()).unwrap();
        assert_eq!(records[0].address, "0xabc");
    }

    #[test]
    fn wrong_column_count_is_fatal() {
        let csv = "tx_id,address,quantity,token\ntx,0xabc,1,EOS\ntx,0xdef,2\n";
        match read_records(csv.as_bytes()) {
            Err(RecordError::Malformed { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_has_no_records() {
        assert!(read_records("tx_id,address,quantity,token\n".as_bytes())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn empty_input_is_malformed() {
        match read_records("".as_bytes()) {
            Err(RecordError::Malformed { line, reason }) => {
                assert_eq!(line, 1);
                assert_eq!(reason, "missing header row");
            }
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_on_disk_is_malformed() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            load_records(file.path()),
            Err(RecordError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn missing_file_names_path() {
        let err = load_records(Path::new("/nonexistent/account.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/account.csv"));
    }
}

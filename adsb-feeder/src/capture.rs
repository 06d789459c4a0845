//! File-based input sources: raw I/Q sample files (fed to the producer
//! thread), pre-demodulated hex-line files, and timestamped CSV replay.
//!
//! Live RTL-SDR capture opens a device via `rtlsdr_mt` (behind the
//! `native-sdr` feature) and hands its callback buffer to the same
//! producer loop a file source feeds; see `main.rs`.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::thread;
use std::time::Duration;

use adsb_core::parse_raw_line;

/// Open a raw I/Q sample file for the producer thread to read from.
pub fn open_sample_file(path: &str) -> io::Result<File> {
    File::open(path)
}

// ---------------------------------------------------------------------------
// Raw hex-line ingestion (`*HEX;` or bare hex, one per line)
// ---------------------------------------------------------------------------

/// Read a file of raw Mode S hex lines, yielding cleaned hex strings in
/// file order. Blank lines, comments, and malformed entries are skipped.
pub fn read_hex_lines(path: &str) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(hex) = parse_raw_line(&line) {
            out.push(hex);
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// CSV replay
// ---------------------------------------------------------------------------

/// One row of a `timestamp_seconds, hex_payload` replay file.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    pub timestamp: f64,
    pub hex: String,
}

/// Parse a CSV replay file. Rows that fail to parse (bad timestamp, or a
/// hex payload `parse_raw_line` rejects) are skipped rather than aborting
/// the whole replay.
pub fn read_csv_replay(path: &str) -> io::Result<Vec<CsvRow>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(row) = parse_csv_row(&line) {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn parse_csv_row(line: &str) -> Option<CsvRow> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (ts_str, hex_str) = line.split_once(',')?;
    let timestamp: f64 = ts_str.trim().parse().ok()?;
    let hex = parse_raw_line(hex_str.trim())?;
    Some(CsvRow { timestamp, hex })
}

/// Replay `rows` through `on_frame`, sleeping between rows for the
/// recorded inter-arrival delay (the gap between each row's timestamp and
/// the previous one), so a CSV capture replays at its original pacing
/// instead of as fast as the CPU can parse it.
pub fn replay_with_delays(rows: &[CsvRow], mut on_frame: impl FnMut(&CsvRow)) {
    let mut last_ts: Option<f64> = None;
    for row in rows {
        if let Some(prev) = last_ts {
            let delay = row.timestamp - prev;
            if delay > 0.0 {
                thread::sleep(Duration::from_secs_f64(delay));
            }
        }
        on_frame(row);
        last_ts = Some(row.timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> String {
        let path = std::env::temp_dir().join(format!(
            "adsb-feeder-test-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_read_hex_lines_mixed_formats() {
        let path = write_temp(
            "8D4840D6202CC371C32CE0576098\n\
             *8d4840d6202cc371c32ce0576098;\n\
             # a comment\n\
             \n\
             not hex\n",
        );
        let lines = read_hex_lines(&path).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "8D4840D6202CC371C32CE0576098");
        assert_eq!(lines[1], "8D4840D6202CC371C32CE0576098");
    }

    #[test]
    fn test_parse_csv_row() {
        let row = parse_csv_row("1.5, 8D4840D6202CC371C32CE0576098").unwrap();
        assert_eq!(row.timestamp, 1.5);
        assert_eq!(row.hex, "8D4840D6202CC371C32CE0576098");
    }

    #[test]
    fn test_parse_csv_row_rejects_bad_timestamp() {
        assert!(parse_csv_row("not-a-number, 8D4840D6202CC371C32CE0576098").is_none());
    }

    #[test]
    fn test_parse_csv_row_skips_comment() {
        assert!(parse_csv_row("# header").is_none());
        assert!(parse_csv_row("").is_none());
    }

    #[test]
    fn test_read_csv_replay() {
        let path = write_temp(
            "timestamp,hex\n\
             1.0, 8D4840D6202CC371C32CE0576098\n\
             2.0, 8D406B902015A678D4D220AA4BDA\n",
        );
        let rows = read_csv_replay(&path).unwrap();
        // First line fails to parse as a timestamp ("timestamp") and is skipped.
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 1.0);
        assert_eq!(rows[1].timestamp, 2.0);
    }

    #[test]
    fn test_replay_with_delays_visits_every_row_in_order() {
        let rows = vec![
            CsvRow {
                timestamp: 0.0,
                hex: "A".to_string(),
            },
            CsvRow {
                timestamp: 0.001,
                hex: "B".to_string(),
            },
        ];
        let mut seen = Vec::new();
        replay_with_delays(&rows, |row| seen.push(row.hex.clone()));
        assert_eq!(seen, vec!["A".to_string(), "B".to_string()]);
    }
}

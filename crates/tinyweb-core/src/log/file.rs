//! Log file naming and rotation
//!
//! Files are named `<dir>/<YYYY>_<MM>_<DD>_<basename>`; a same-day overflow
//! appends `.<n>` where `n = line_count / split_lines`.
//!
//! Rotation happens before a line is written:
//! - the calendar date moved forward: open the plain dated name, reset the
//!   counter (a clock reading older than the open file's date never rotates)
//! - the counter hit a multiple of `split_lines`: open the suffixed name

use chrono::NaiveDate;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::LogError;

/// Open log file plus the counters that decide when it rotates
pub(crate) struct LogFile {
    dir: PathBuf,
    base: String,
    date: NaiveDate,
    count: u64,
    split_lines: u64,
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LogFile {
    /// Open the dated file derived from `base_path` for append
    pub(crate) fn open(
        base_path: &Path,
        split_lines: u64,
        date: NaiveDate,
    ) -> Result<Self, LogError> {
        let base = base_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .ok_or_else(|| LogError::Open {
                path: base_path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name"),
            })?;
        let dir = base_path.parent().map(Path::to_path_buf).unwrap_or_default();

        let path = dated_path(&dir, &base, date, None);
        let writer = open_append(&path)?;

        Ok(Self {
            dir,
            base,
            date,
            count: 0,
            split_lines: if split_lines == 0 { u64::MAX } else { split_lines },
            path,
            writer,
        })
    }

    /// Count one more line and rotate if the date or the line budget demands it
    ///
    /// On failure the previous file stays active.
    pub(crate) fn advance(&mut self, today: NaiveDate) -> Result<(), LogError> {
        self.count += 1;

        let new_day = today > self.date;
        if !new_day && self.count % self.split_lines != 0 {
            return Ok(());
        }

        let _ = self.writer.flush();
        let path = if new_day {
            dated_path(&self.dir, &self.base, today, None)
        } else {
            dated_path(&self.dir, &self.base, today, Some(self.count / self.split_lines))
        };
        let writer = open_append(&path)?;

        if new_day {
            self.date = today;
            self.count = 0;
        }
        self.writer = writer;
        self.path = path;
        Ok(())
    }

    #[inline]
    pub(crate) fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())
    }

    #[inline]
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }
}

/// Build `<dir>/<YYYY>_<MM>_<DD>_<base>[.<index>]`
pub(crate) fn dated_path(dir: &Path, base: &str, date: NaiveDate, index: Option<u64>) -> PathBuf {
    let name = match index {
        Some(n) => format!("{}_{}.{}", date.format("%Y_%m_%d"), base, n),
        None => format!("{}_{}", date.format("%Y_%m_%d"), base),
    };
    dir.join(name)
}

fn open_append(path: &Path) -> Result<BufWriter<File>, LogError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(BufWriter::new)
        .map_err(|source| LogError::Open {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_dated_path() {
        let p = dated_path(Path::new("/var/log"), "server", day(5), None);
        assert_eq!(p, PathBuf::from("/var/log/2024_01_05_server"));

        let p = dated_path(Path::new(""), "server", day(5), Some(3));
        assert_eq!(p, PathBuf::from("2024_01_05_server.3"));
    }

    #[test]
    fn test_open_rejects_directory_path() {
        let err = LogFile::open(Path::new("/"), 10, day(1)).err().unwrap();
        assert!(matches!(err, LogError::Open { .. }));
    }

    #[test]
    fn test_split_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = LogFile::open(&dir.path().join("app"), 3, day(1)).unwrap();

        file.advance(day(1)).unwrap();
        file.advance(day(1)).unwrap();
        assert!(file.path().ends_with("2024_01_01_app"));

        file.advance(day(1)).unwrap();
        assert!(file.path().ends_with("2024_01_01_app.1"));
        assert_eq!(file.count(), 3);
    }

    #[test]
    fn test_day_rotation_resets_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = LogFile::open(&dir.path().join("app"), 100, day(1)).unwrap();

        file.advance(day(1)).unwrap();
        file.advance(day(2)).unwrap();

        assert!(file.path().ends_with("2024_01_02_app"));
        assert_eq!(file.count(), 0);
    }

    #[test]
    fn test_earlier_date_keeps_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = LogFile::open(&dir.path().join("app"), 100, day(5)).unwrap();
        file.advance(day(6)).unwrap();
        file.advance(day(6)).unwrap();
        assert_eq!(file.count(), 1);

        file.advance(day(5)).unwrap();
        assert!(file.path().ends_with("2024_01_06_app"));
        assert_eq!(file.count(), 2);

        file.advance(day(6)).unwrap();
        assert!(file.path().ends_with("2024_01_06_app"));
        assert_eq!(file.count(), 3);
    }

    #[test]
    fn test_zero_split_never_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = LogFile::open(&dir.path().join("app"), 0, day(1)).unwrap();
        for _ in 0..50 {
            file.advance(day(1)).unwrap();
        }
        assert!(file.path().ends_with("2024_01_01_app"));
    }
}

//! Line-oriented command output and CSV reports

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Command output: stdout, or a file when `--out` is given
pub struct Output {
    writer: Box<dyn Write + Send>,
    path: Option<PathBuf>,
    lines: usize,
}

impl Output {
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(io::stdout()),
            path: None,
            lines: 0,
        }
    }

    /// Write to `path`, replacing any existing file
    pub fn file(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Box::new(BufWriter::new(file)),
            path: Some(path.to_path_buf()),
            lines: 0,
        })
    }

    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::file(p),
            None => Ok(Self::stdout()),
        }
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer,
            path: None,
            lines: 0,
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> Result<()> {
        writeln!(self.writer, "{}", text.as_ref())?;
        self.lines += 1;
        Ok(())
    }

    /// Lines written so far
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// The target file, if not stdout
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.lines)
    }
}

/// Parse a `--separator` value: a single byte, with `\t` accepted as an escape
pub fn parse_separator(value: &str) -> Result<u8> {
    match value {
        "\\t" | "tab" => Ok(b'\t'),
        s if s.len() == 1 => Ok(s.as_bytes()[0]),
        s => Err(Error::Usage(format!("separator must be a single character, got '{}'", s))),
    }
}

/// CSV report writer with a configurable separator
pub struct CsvOutput {
    writer: csv::Writer<Box<dyn Write + Send>>,
    rows: usize,
}

impl CsvOutput {
    pub fn create(path: &Path, separator: u8, header: &[&str]) -> Result<Self> {
        let file: Box<dyn Write + Send> = Box::new(BufWriter::new(File::create(path)?));
        Self::from_writer(file, separator, header)
    }

    pub fn from_writer(writer: Box<dyn Write + Send>, separator: u8, header: &[&str]) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new().delimiter(separator).from_writer(writer);
        writer.write_record(header)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn row<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(fields)?;
        self.rows += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

/// Format bytes to human-readable size
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Shared buffer so the test can read what was written
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut out = Output::open(Some(&path)).unwrap();
        out.line("first").unwrap();
        out.line(String::from("second")).unwrap();
        assert_eq!(out.path(), Some(path.as_path()));
        assert_eq!(out.finish().unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_csv_separator() {
        let buffer = SharedBuffer::default();
        let mut csv = CsvOutput::from_writer(Box::new(buffer.clone()), b';', &["key", "size"]).unwrap();
        csv.row(["a;b", "10"]).unwrap();
        csv.row(["c", "0"]).unwrap();
        assert_eq!(csv.finish().unwrap(), 2);
        assert_eq!(buffer.contents(), "key;size\n\"a;b\";10\nc;0\n");
    }

    #[test]
    fn test_parse_separator() {
        assert_eq!(parse_separator(",").unwrap(), b',');
        assert_eq!(parse_separator("\\t").unwrap(), b'\t');
        assert_eq!(parse_separator("\t").unwrap(), b'\t');
        assert!(parse_separator("::").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }
}

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tempfile::NamedTempFile;

use crate::errors::{GraphError, Result};

/// Opens a plain or gzip-compressed text file. Compression is detected from
/// the `.gz` extension.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|source| GraphError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);
    if is_gz {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Header, comment and blank lines of BED-like files.
pub fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("track")
        || trimmed.starts_with("browser")
}

/// Writes `path` through a temporary file in the same directory, renamed into
/// place only after `fill` succeeds. A failed write leaves any previous file
/// untouched.
pub fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        fill(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| GraphError::Io(e.error))?;

    Ok(())
}

/// Writes tab-separated rows atomically.
pub fn write_rows<I, R>(path: &Path, header: Option<&str>, rows: I) -> Result<()>
where
    I: IntoIterator<Item = R>,
    R: AsRef<str>,
{
    write_atomic(path, |w| {
        if let Some(header) = header {
            writeln!(w, "{header}")?;
        }
        for row in rows {
            writeln!(w, "{}", row.as_ref())?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Read;

    #[test]
    fn reads_gzip_transparently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bed.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b"chr1\t0\t10\n").unwrap();
        enc.finish().unwrap();

        let mut text = String::new();
        open_reader(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "chr1\t0\t10\n");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = open_reader(Path::new("/nonexistent/x.bed")).err().unwrap();
        assert!(matches!(err, GraphError::Read { .. }));
    }

    #[test]
    fn failed_fill_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        write_rows(&path, None, ["old"]).unwrap();

        let result = write_atomic(&path, |w| {
            writeln!(w, "partial")?;
            Err(GraphError::Configuration("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.tsv");
        write_rows(&path, Some("h"), ["1", "2"]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "h\n1\n2\n");
    }

    #[test]
    fn skippable_lines() {
        assert!(is_skippable(""));
        assert!(is_skippable("# comment"));
        assert!(is_skippable("track name=x"));
        assert!(!is_skippable("chr1\t0\t1"));
    }
}

//! Lazy chunked CSV reader

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::StringRecord;
use flate2::read::MultiGzDecoder;

use super::config::Compression;
use super::error::IngestError;

/// A bounded batch of rows read from the source
#[derive(Debug)]
pub struct Chunk {
    /// Position of this chunk in the sequence (0-based)
    pub index: usize,
    /// Raw rows, in source order
    pub rows: Vec<StringRecord>,
}

impl Chunk {
    /// Number of rows in the chunk
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the chunk has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Source line of the first row, when known
    pub fn first_line(&self) -> Option<u64> {
        self.rows
            .first()
            .and_then(|r| r.position())
            .map(|p| p.line())
    }
}

/// Reads a CSV source as a sequence of fixed-size chunks.
///
/// `next_chunk` yields `Ok(Some(chunk))` until the source is exhausted and
/// `Ok(None)` afterwards; running out of rows is never reported as an error.
pub struct ChunkReader {
    reader: csv::Reader<Box<dyn Read + Send>>,
    headers: StringRecord,
    chunk_size: usize,
    next_index: usize,
    rows_read: u64,
    exhausted: bool,
}

impl ChunkReader {
    /// Open a file, decompressing it on the fly when gzip-compressed
    pub fn open(
        path: &Path,
        compression: Compression,
        chunk_size: usize,
    ) -> Result<Self, IngestError> {
        if !path.is_file() {
            return Err(IngestError::FileNotFound(path.to_path_buf()));
        }

        let file = BufReader::new(File::open(path)?);
        let source: Box<dyn Read + Send> = match compression {
            Compression::Gzip => Box::new(MultiGzDecoder::new(file)),
            Compression::None => Box::new(file),
        };

        Self::from_reader(source, chunk_size, &path.display().to_string())
    }

    /// Wrap any reader producing CSV text
    pub fn from_reader(
        source: Box<dyn Read + Send>,
        chunk_size: usize,
        name: &str,
    ) -> Result<Self, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(source);

        let headers = reader.headers()?.clone();
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(IngestError::EmptySource(name.to_string()));
        }

        Ok(Self {
            reader,
            headers,
            chunk_size: chunk_size.max(1),
            next_index: 0,
            rows_read: 0,
            exhausted: false,
        })
    }

    /// Column names from the header row
    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    /// Total rows handed out so far
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Read the next chunk, or `None` once the source is exhausted
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, IngestError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(self.chunk_size.min(8192));
        while rows.len() < self.chunk_size {
            let mut record = StringRecord::new();
            if !self.reader.read_record(&mut record)? {
                self.exhausted = true;
                break;
            }
            rows.push(record);
        }

        if rows.is_empty() {
            return Ok(None);
        }

        let chunk = Chunk {
            index: self.next_index,
            rows,
        };
        self.next_index += 1;
        self.rows_read += chunk.len() as u64;
        Ok(Some(chunk))
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Chunk, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_chunk() {
            Ok(chunk) => chunk.map(Ok),
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression as GzLevel;
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    fn csv_text(rows: usize) -> String {
        let mut text = String::from("id,name\n");
        for i in 0..rows {
            text.push_str(&format!("{i},row_{i}\n"));
        }
        text
    }

    fn reader_for(text: String, chunk_size: usize) -> ChunkReader {
        ChunkReader::from_reader(Box::new(Cursor::new(text.into_bytes())), chunk_size, "test")
            .unwrap()
    }

    #[test]
    fn test_chunks_split_at_chunk_size() {
        let mut reader = reader_for(csv_text(250), 100);
        assert_eq!(reader.headers().iter().collect::<Vec<_>>(), vec!["id", "name"]);

        let sizes: Vec<usize> = std::iter::from_fn(|| reader.next_chunk().unwrap())
            .map(|c| c.len())
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(reader.rows_read(), 250);

        // Exhaustion is sticky
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_chunk() {
        let reader = reader_for(csv_text(200), 100);
        let chunks: Vec<Chunk> = reader.map(|c| c.unwrap()).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
        assert_eq!(chunks[1].first_line(), Some(102));
    }

    #[test]
    fn test_header_only_source_yields_nothing() {
        let mut reader = reader_for("id,name\n".to_string(), 10);
        assert_eq!(reader.headers().len(), 2);
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_empty_source_is_rejected() {
        let result = ChunkReader::from_reader(Box::new(Cursor::new(Vec::new())), 10, "empty.csv");
        assert!(matches!(result, Err(IngestError::EmptySource(name)) if name == "empty.csv"));
    }

    #[test]
    fn test_ragged_row_is_an_error() {
        let mut reader = reader_for("a,b\n1,2\n3\n".to_string(), 10);
        assert!(matches!(reader.next_chunk(), Err(IngestError::Csv(_))));
    }

    #[test]
    fn test_open_gzip_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv.gz");

        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), GzLevel::default());
        encoder.write_all(csv_text(30).as_bytes()).unwrap();
        encoder.finish().unwrap();

        let reader = ChunkReader::open(&path, Compression::Gzip, 8).unwrap();
        let total: usize = reader.map(|c| c.unwrap().len()).sum();
        assert_eq!(total, 30);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.csv");
        assert!(matches!(
            ChunkReader::open(&path, Compression::None, 10),
            Err(IngestError::FileNotFound(_))
        ));
    }
}

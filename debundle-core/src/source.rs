use crate::error::ScanError;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Half-open byte range `[start, end)` of the bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub ordinal: u64,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Read-only handle over a bundle file.
///
/// Shared between workers. Reads are positional, so they neither lock nor
/// move a shared cursor.
pub struct SourceFile {
    path: PathBuf,
    len: u64,
    f: File,
}

impl SourceFile {
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        let f = File::open(path)?;
        let md = f.metadata()?;
        if !md.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )
            .into());
        }
        Ok(Self {
            path: path.to_path_buf(),
            len: md.len(),
            f,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lazily cut `[0, len)` into chunks of `chunk_size` bytes; the last one may be shorter.
    pub fn chunks(&self, chunk_size: usize) -> Result<Chunks, ScanError> {
        if chunk_size == 0 {
            return Err(ScanError::InvalidChunkSize);
        }
        Ok(Chunks {
            len: self.len,
            size: chunk_size as u64,
            next_start: 0,
            next_ordinal: 0,
        })
    }

    /// Raw bytes of `chunk`; nothing is decoded here.
    pub fn read_chunk(&self, chunk: &Chunk) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; chunk.len() as usize];
        read_exact_at(&self.f, &mut buf, chunk.start)?;
        Ok(buf)
    }
}

#[cfg(unix)]
fn read_exact_at(f: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    f.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(f: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match f.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub struct Chunks {
    len: u64,
    size: u64,
    next_start: u64,
    next_ordinal: u64,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next_start >= self.len {
            return None;
        }
        let start = self.next_start;
        let end = start.saturating_add(self.size).min(self.len);
        let chunk = Chunk {
            ordinal: self.next_ordinal,
            start,
            end,
        };
        self.next_start = end;
        self.next_ordinal += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len - self.next_start.min(self.len);
        let n = left.div_ceil(self.size) as usize;
        (n, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source_with(bytes: &[u8]) -> (tempfile::NamedTempFile, SourceFile) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(bytes).unwrap();
        tmp.flush().unwrap();
        let src = SourceFile::open(tmp.path()).unwrap();
        (tmp, src)
    }

    #[test]
    fn chunks_cover_the_file_without_gaps() {
        let (_tmp, src) = source_with(b"0123456789abc");
        let chunks: Vec<_> = src.chunks(5).unwrap().collect();
        assert_eq!(
            chunks,
            vec![
                Chunk { ordinal: 0, start: 0, end: 5 },
                Chunk { ordinal: 1, start: 5, end: 10 },
                Chunk { ordinal: 2, start: 10, end: 13 },
            ]
        );
        let joined: Vec<u8> = chunks
            .iter()
            .flat_map(|c| src.read_chunk(c).unwrap())
            .collect();
        assert_eq!(joined, b"0123456789abc");
    }

    #[test]
    fn concurrent_reads_in_any_order_see_their_own_bytes() {
        let text: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let (_tmp, src) = source_with(&text);
        let src = std::sync::Arc::new(src);
        let chunks: Vec<_> = src.chunks(97).unwrap().collect();
        let handles: Vec<_> = chunks
            .into_iter()
            .rev()
            .map(|c| {
                let src = std::sync::Arc::clone(&src);
                std::thread::spawn(move || (c, src.read_chunk(&c).unwrap()))
            })
            .collect();
        for h in handles {
            let (c, bytes) = h.join().unwrap();
            assert_eq!(bytes, &text[c.start as usize..c.end as usize]);
        }
    }

    #[test]
    fn chunks_restart_on_each_call() {
        let (_tmp, src) = source_with(b"abcdef");
        assert_eq!(src.chunks(4).unwrap().count(), 2);
        assert_eq!(src.chunks(4).unwrap().size_hint(), (2, Some(2)));
        assert_eq!(src.chunks(100).unwrap().count(), 1);
    }

    #[test]
    fn empty_file_has_no_chunks() {
        let (_tmp, src) = source_with(b"");
        assert!(src.is_empty());
        assert_eq!(src.chunks(1).unwrap().next(), None);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let (_tmp, src) = source_with(b"x");
        assert!(matches!(src.chunks(0), Err(ScanError::InvalidChunkSize)));
    }

    #[test]
    fn missing_file_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceFile::open(&dir.path().join("nope.txt")).err().unwrap();
        assert!(matches!(err, ScanError::Io(_)));
        let err = SourceFile::open(dir.path()).err().unwrap();
        assert!(matches!(err, ScanError::Io(_)));
    }
}

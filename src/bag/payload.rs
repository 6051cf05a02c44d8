//! Named binary payloads under the bag's `data/` directory.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::BagError;

/// Copy exactly `length` bytes from `source` into a new file at `path`.
///
/// Streams through a fixed buffer.  A source that is shorter or longer than
/// `length` removes the partial file and fails with [`BagError::PayloadLength`].
pub(super) fn copy_exact<R: Read>(
    name:       &str,
    path:       &Path,
    length:     u64,
    mut source: R,
) -> Result<(), BagError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    let mut copied = io::copy(&mut source.by_ref().take(length), &mut out)?;
    out.flush()?;
    drop(out);
    if copied == length {
        // Count the overrun so the error reports the real source length.
        copied += io::copy(&mut source, &mut io::sink())?;
    }

    if copied != length {
        let _ = fs::remove_file(path);
        return Err(BagError::PayloadLength {
            name:     name.to_owned(),
            declared: length,
            actual:   copied,
        });
    }
    Ok(())
}

/// Readable view of one payload.
pub struct DataStream {
    name:   String,
    len:    u64,
    reader: BufReader<File>,
}

impl DataStream {
    pub(super) fn open(name: &str, path: &Path) -> Result<Self, BagError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { name: name.to_owned(), len, reader: BufReader::new(file) })
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn len(&self) -> u64 { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }
}

impl Read for DataStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

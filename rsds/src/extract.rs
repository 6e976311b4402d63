use std::{
    fs::File,
    io::{BufRead, BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::index::LocationRecord;

/// Random access reader for sequences in a line wrapped FASTA file
///
/// Keeps one open handle on the reference so that a worker can fetch many
/// transcripts without reopening the file.
pub struct SequenceExtractor {
    path: PathBuf,
    rdr: BufReader<File>,
    buf: Vec<u8>,
}

impl SequenceExtractor {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_owned();
        trace!("Opening reference file {} for random access", path.display());
        let f = File::open(&path)
            .with_context(|| format!("Error opening reference file {}", path.display()))?;
        Ok(Self {
            path,
            rdr: BufReader::new(f),
            buf: Vec::new(),
        })
    }

    /// Read the sequence starting at byte_start
    ///
    /// Lines are read until a header line, the end of the file or until
    /// byte_end - byte_start bases have been collected.  Line endings are
    /// stripped and the result is converted to upper case.  Sequence data
    /// must be ASCII.
    pub fn extract(&mut self, byte_start: u64, byte_end: u64) -> anyhow::Result<String> {
        if byte_end < byte_start {
            return Ok(String::new());
        }
        let needed = (byte_end - byte_start) as usize;
        self.rdr
            .seek(SeekFrom::Start(byte_start))
            .with_context(|| {
                format!("Error seeking to {} in {}", byte_start, self.path.display())
            })?;

        let mut seq: Vec<u8> = Vec::with_capacity(needed);
        while seq.len() < needed {
            self.buf.clear();
            let n = self
                .rdr
                .read_until(b'\n', &mut self.buf)
                .with_context(|| format!("Error reading from {}", self.path.display()))?;
            if n == 0 || self.buf.first() == Some(&b'>') {
                break;
            }
            let mut end = self.buf.len();
            while end > 0 && self.buf[end - 1].is_ascii_whitespace() {
                end -= 1
            }
            seq.extend_from_slice(&self.buf[..end]);
        }
        seq.truncate(needed);
        if !seq.is_ascii() {
            return Err(anyhow!(
                "Non-ASCII sequence data between bytes {} and {} of {}",
                byte_start,
                byte_end,
                self.path.display()
            ));
        }
        seq.make_ascii_uppercase();
        Ok(String::from_utf8(seq)?)
    }

    /// Fetch the complete sequence of a transcript
    pub fn fetch(&mut self, loc: &LocationRecord) -> anyhow::Result<String> {
        let mut seq = self
            .extract(loc.byte_start(), loc.byte_end())
            .with_context(|| format!("Error fetching sequence for transcript {}", loc.id()))?;
        if seq.len() < loc.seq_len() {
            warn!(
                "Transcript {}: expected {} bases, found {}",
                loc.id(),
                loc.seq_len(),
                seq.len()
            );
        }
        seq.truncate(loc.seq_len());
        Ok(seq)
    }
}

/// One off extraction of the bases between two byte offsets of a reference file
pub fn extract<P: AsRef<Path>>(path: P, byte_start: u64, byte_end: u64) -> anyhow::Result<String> {
    if byte_end < byte_start {
        return Ok(String::new());
    }
    SequenceExtractor::open(path)?.extract(byte_start, byte_end)
}

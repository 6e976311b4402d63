use std::{collections::HashMap, io::BufRead, path::Path, sync::Arc};

use compress_io::compress::CompressIo;
use utils::{get_next_line, is_blank_or_comment, parse_field};

use crate::error::SimError;

/// Transcripts shorter than this are not used for sampling
pub const MIN_SEQ_LEN: usize = 400;

/// Location of one transcript in the reference FASTA file
///
/// The byte span runs from the first base of the sequence to the end of
/// the last line, including the newline bytes of the wrapped lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRecord {
    id: Arc<str>,
    byte_start: u64,
    byte_end: u64,
    seq_len: usize,
}

impl LocationRecord {
    pub fn new(id: &str, seq_len: usize, offset: u64, line_width: usize) -> Self {
        let n_lines = (seq_len + line_width - 1) / line_width;
        Self {
            id: Arc::from(id),
            byte_start: offset,
            byte_end: offset + (seq_len + n_lines) as u64,
            seq_len,
        }
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn byte_start(&self) -> u64 {
        self.byte_start
    }

    pub fn byte_end(&self) -> u64 {
        self.byte_end
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }
}

/// The usable transcripts of the reference with lookup by name
pub struct ReferenceIndex {
    records: Vec<LocationRecord>,
    by_id: HashMap<Arc<str>, usize>,
}

impl ReferenceIndex {
    pub fn from_records(records: Vec<LocationRecord>) -> Self {
        let by_id = records
            .iter()
            .enumerate()
            .map(|(ix, r)| (Arc::clone(&r.id), ix))
            .collect();
        Self { records, by_id }
    }

    pub fn records(&self) -> &[LocationRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&LocationRecord> {
        self.by_id.get(id).map(|ix| &self.records[*ix])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse a FASTA index (.fai) file
///
/// Each line has the columns name, sequence length, byte offset, bases per line
/// and bytes per line.  Only the first four are used.  Sequences shorter than
/// MIN_SEQ_LEN are dropped.  A single malformed line aborts parsing.
pub fn parse_index<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<LocationRecord>> {
    let path = path.as_ref();
    debug!("Reading reference index from {}", path.display());
    if !path.is_file() {
        return Err(SimError::MissingIndex(path.to_owned()).into());
    }
    let mut rdr = CompressIo::new()
        .path(path)
        .bufreader()
        .map_err(|_| SimError::MissingIndex(path.to_owned()))?;
    read_index(&mut rdr, path)
}

fn read_index<R: BufRead>(rdr: &mut R, path: &Path) -> anyhow::Result<Vec<LocationRecord>> {
    let mut buf = String::new();
    let mut line = 0;
    let mut v = Vec::new();
    let mut n_short = 0;

    let malformed = |line: usize, reason: String| SimError::MalformedIndexLine {
        path: path.to_owned(),
        line,
        reason,
    };
    let bad_field = |line: usize, e: anyhow::Error| malformed(line, format!("{:#}", e));

    while let Some(fields) = get_next_line(rdr, &mut buf).map_err(|e| bad_field(line + 1, e))? {
        line += 1;
        if is_blank_or_comment(&fields) {
            continue;
        }
        if fields.len() < 4 {
            let reason = format!("expected 4 or more columns, found {}", fields.len());
            return Err(malformed(line, reason).into());
        }
        let seq_len: usize =
            parse_field(&fields, 1, "sequence length", line).map_err(|e| bad_field(line, e))?;
        let offset: u64 = parse_field(&fields, 2, "offset", line).map_err(|e| bad_field(line, e))?;
        let line_width: usize =
            parse_field(&fields, 3, "line width", line).map_err(|e| bad_field(line, e))?;
        if line_width == 0 {
            return Err(malformed(line, "line width is zero".to_owned()).into());
        }
        if seq_len >= MIN_SEQ_LEN {
            v.push(LocationRecord::new(fields[0], seq_len, offset, line_width))
        } else {
            n_short += 1
        }
    }
    debug!(
        "Read {} index lines; {} transcripts kept, {} shorter than {} dropped",
        line,
        v.len(),
        n_short,
        MIN_SEQ_LEN
    );
    Ok(v)
}

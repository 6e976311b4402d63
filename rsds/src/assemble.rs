use std::{fmt, io::Write};

use rand::Rng;

use crate::{
    config::{LibraryType, SimRng},
    quality::QualityModel,
};

/// Tag at the start of every read name
pub const TOOL_TAG: &str = concat!("RSDS_v", env!("CARGO_PKG_VERSION"));

const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

/// One simulated read
///
/// The sequence and quality strings always have the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    index: u64,
    read_len: usize,
    sequence: String,
    quality: String,
}

impl ReadRecord {
    pub fn new(index: u64, read_len: usize, sequence: String, quality: String) -> Self {
        debug_assert_eq!(sequence.len(), quality.len());
        Self {
            index,
            read_len,
            sequence,
            quality,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn identifier(&self) -> String {
        format!(
            "{}.{} {} length={}",
            TOOL_TAG, self.index, self.index, self.read_len
        )
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn quality(&self) -> &str {
        &self.quality
    }

    /// Move the read index by offset.  Used when reads are generated in
    /// batches numbered from zero.
    pub fn shift_index(&mut self, offset: u64) {
        self.index += offset
    }

    pub fn write_fastq<W: Write + ?Sized>(&self, w: &mut W) -> std::io::Result<()> {
        writeln!(w, "{}", self)
    }
}

impl fmt::Display for ReadRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "@{}\n{}\n+\n{}",
            self.identifier(),
            self.sequence,
            self.quality
        )
    }
}

/// Reads produced from one fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    Single(ReadRecord),
    /// (R1, R2)
    Pair(ReadRecord, ReadRecord),
}

impl Assembled {
    pub fn shift_index(&mut self, offset: u64) {
        match self {
            Self::Single(r) => r.shift_index(offset),
            Self::Pair(r1, r2) => {
                r1.shift_index(offset);
                r2.shift_index(offset)
            }
        }
    }
}

fn complement(c: char) -> char {
    match c {
        'A' => 'T',
        'T' => 'A',
        'C' => 'G',
        'G' => 'C',
        'a' => 't',
        't' => 'a',
        'c' => 'g',
        'g' => 'c',
        // N and other ambiguity codes are left as they are
        _ => c,
    }
}

pub fn reverse_complement(s: &str) -> String {
    s.chars().rev().map(complement).collect()
}

/// A random base different from c
fn substitute(c: char, rng: &mut SimRng) -> char {
    match BASES.iter().position(|b| *b == c.to_ascii_uppercase()) {
        Some(i) => BASES[(i + rng.gen_range(1..4)) % 4],
        None => BASES[rng.gen_range(0..4)],
    }
}

/// Replace the bases at the given positions by a different base
fn introduce_errors(seq: &str, errors: &[usize], rng: &mut SimRng) -> String {
    if errors.is_empty() {
        return seq.to_owned();
    }
    let mut mask = vec![false; seq.len()];
    for &i in errors {
        if let Some(m) = mask.get_mut(i) {
            *m = true
        }
    }
    seq.chars()
        .enumerate()
        .map(|(i, c)| if mask[i] { substitute(c, rng) } else { c })
        .collect()
}

/// Turns fragment sequences into reads with quality strings
pub struct ReadAssembler<'a> {
    read_len: usize,
    library: LibraryType,
    quality: &'a dyn QualityModel,
}

impl<'a> ReadAssembler<'a> {
    pub fn new(read_len: usize, library: LibraryType, quality: &'a dyn QualityModel) -> Self {
        debug_assert_eq!(read_len, quality.read_len());
        Self {
            read_len,
            library,
            quality,
        }
    }

    fn make_read(&self, index: u64, seq: &str, rng: &mut SimRng) -> ReadRecord {
        let q = self.quality.sample_quality(rng);
        let sequence = introduce_errors(seq, &q.errors, rng);
        ReadRecord::new(index, self.read_len, sequence, q.qual)
    }

    /// Build the read(s) for one fragment
    ///
    /// Single end: the fragment is the read.  Paired end: the first read_len
    /// bases form one mate and the reverse complement of the last read_len
    /// bases the other.  A coin flip decides which mate goes to R1.
    ///
    /// Returns None if the fragment is shorter than the read length
    /// (single end fragments must match it exactly).
    pub fn assemble(&self, fragment: &str, index: u64, rng: &mut SimRng) -> Option<Assembled> {
        let l = self.read_len;
        match self.library {
            LibraryType::SingleEnd => {
                if fragment.len() != l {
                    return None;
                }
                Some(Assembled::Single(self.make_read(index, fragment, rng)))
            }
            LibraryType::PairedEnd => {
                if fragment.len() < l || !fragment.is_ascii() {
                    return None;
                }
                let fwd = &fragment[..l];
                let rev = reverse_complement(&fragment[fragment.len() - l..]);
                let (s1, s2) = if rng.gen::<f64>() < 0.5 {
                    (rev.as_str(), fwd)
                } else {
                    (fwd, rev.as_str())
                };
                let r1 = self.make_read(index, s1, rng);
                let r2 = self.make_read(index, s2, rng);
                Some(Assembled::Pair(r1, r2))
            }
        }
    }
}

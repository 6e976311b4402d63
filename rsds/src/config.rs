use std::{
    fmt,
    path::{Path, PathBuf},
};

use rand_xoshiro::Xoshiro256StarStar;

use crate::{
    abundance::AbundanceMode, error::SimError, fraglen::FragmentLengthModel, index::ReferenceIndex,
    quality::QualityModel,
};

/// Random number generator used for all sampling
pub type SimRng = Xoshiro256StarStar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryType {
    SingleEnd,
    PairedEnd,
}

impl LibraryType {
    /// Exactly one of the two flags must be set
    pub fn from_flags(single_end: bool, paired_end: bool) -> Result<Self, SimError> {
        match (single_end, paired_end) {
            (true, false) => Ok(Self::SingleEnd),
            (false, true) => Ok(Self::PairedEnd),
            _ => Err(SimError::ConfigurationConflict),
        }
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SingleEnd => write!(f, "single-end"),
            Self::PairedEnd => write!(f, "paired-end"),
        }
    }
}

/// Config
///
/// Configuration info for the program
/// This is generated from the command line arguments
/// Once set it is read only
///
/// reference - path to reference (FASTA) file
/// index - usable transcripts from the reference index
/// library - single or paired end
/// read_len - length of simulated reads
/// abundance - how transcripts and read counts are chosen
/// quality - quality model
/// frag_lengths - fragment length model (paired end only)
/// seed - seed for the random number generator
/// output_prefix - prefix for output file names
/// threads - number of threads
///
pub struct Config {
    reference: PathBuf,
    index: ReferenceIndex,
    library: LibraryType,
    read_len: usize,
    abundance: AbundanceMode,
    quality: Box<dyn QualityModel>,
    frag_lengths: Option<Box<dyn FragmentLengthModel>>,
    seed: u64,
    output_prefix: String,
    threads: usize,
}

impl Config {
    pub fn new(
        reference: PathBuf,
        index: ReferenceIndex,
        library: LibraryType,
        read_len: usize,
        abundance: AbundanceMode,
        quality: Box<dyn QualityModel>,
    ) -> Self {
        Self {
            reference,
            index,
            library,
            read_len,
            abundance,
            quality,
            frag_lengths: None,
            seed: 1223,
            output_prefix: "rsds".to_string(),
            threads: 1,
        }
    }

    pub fn set_frag_lengths(&mut self, m: Box<dyn FragmentLengthModel>) {
        self.frag_lengths = Some(m)
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed
    }

    pub fn set_output_prefix<S: AsRef<str>>(&mut self, s: S) {
        self.output_prefix = s.as_ref().to_owned()
    }

    pub fn set_threads(&mut self, x: usize) {
        self.threads = x.max(1)
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }

    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }

    pub fn library(&self) -> LibraryType {
        self.library
    }

    pub fn read_len(&self) -> usize {
        self.read_len
    }

    pub fn abundance(&self) -> &AbundanceMode {
        &self.abundance
    }

    pub fn quality(&self) -> &dyn QualityModel {
        self.quality.as_ref()
    }

    pub fn frag_lengths(&self) -> Option<&dyn FragmentLengthModel> {
        self.frag_lengths.as_deref()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn output_prefix(&self) -> &str {
        &self.output_prefix
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::Context;
use flate2::{write::GzEncoder, Compression};

use crate::{assemble::Assembled, config::LibraryType};

type FastqWriter = BufWriter<GzEncoder<File>>;

/// Output file names for a prefix: one file for single end, R1 and R2 for
/// paired end
pub fn output_paths(prefix: &str, library: LibraryType) -> Vec<PathBuf> {
    match library {
        LibraryType::SingleEnd => vec![PathBuf::from(format!("{}.fastq.gz", prefix))],
        LibraryType::PairedEnd => vec![
            PathBuf::from(format!("{}_R1.fastq.gz", prefix)),
            PathBuf::from(format!("{}_R2.fastq.gz", prefix)),
        ],
    }
}

/// Compressed FASTQ output streams
///
/// Files are removed again if the output is dropped before `finish`
/// succeeds, so an aborted run never leaves truncated files behind.
pub struct FastqOutput {
    paths: Vec<PathBuf>,
    writers: Vec<FastqWriter>,
    n_written: u64,
    finished: bool,
}

impl FastqOutput {
    pub fn create(prefix: &str, library: LibraryType) -> anyhow::Result<Self> {
        let mut out = Self {
            paths: Vec::new(),
            writers: Vec::new(),
            n_written: 0,
            finished: false,
        };
        for p in output_paths(prefix, library) {
            debug!("Opening output file {}", p.display());
            let f = File::create(&p)
                .with_context(|| format!("Error creating output file {}", p.display()))?;
            out.paths.push(p);
            out.writers
                .push(BufWriter::new(GzEncoder::new(f, Compression::default())));
        }
        Ok(out)
    }

    /// Append the read(s) of one fragment
    pub fn write(&mut self, a: &Assembled) -> anyhow::Result<()> {
        match (a, self.writers.as_mut_slice()) {
            (Assembled::Single(r), [w]) => r.write_fastq(w),
            (Assembled::Pair(r1, r2), [w1, w2]) => {
                r1.write_fastq(w1).and_then(|_| r2.write_fastq(w2))
            }
            _ => return Err(anyhow!("Read type does not match output files")),
        }
        .with_context(|| format!("Error writing to {}", self.paths[0].display()))?;
        self.n_written += 1;
        Ok(())
    }

    /// Number of reads (single end) or read pairs (paired end) written
    pub fn n_written(&self) -> u64 {
        self.n_written
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Flush and close all files
    pub fn finish(mut self) -> anyhow::Result<u64> {
        for (w, p) in self.writers.drain(..).zip(self.paths.iter()) {
            let enc = w
                .into_inner()
                .map_err(|e| e.into_error())
                .with_context(|| format!("Error flushing {}", p.display()))?;
            let mut f = enc
                .finish()
                .with_context(|| format!("Error closing {}", p.display()))?;
            f.flush()?;
            debug!("Closed output file {}", p.display());
        }
        self.finished = true;
        Ok(self.n_written)
    }
}

impl Drop for FastqOutput {
    fn drop(&mut self) {
        if !self.finished {
            self.writers.clear();
            for p in self.paths.iter() {
                warn!("Removing incomplete output file {}", p.display());
                if let Err(e) = fs::remove_file(p) {
                    error!("Could not remove {}: {}", p.display(), e)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::ReadRecord;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;

    fn read_gz(p: &std::path::Path) -> String {
        let mut s = String::new();
        MultiGzDecoder::new(File::open(p).unwrap())
            .read_to_string(&mut s)
            .unwrap();
        s
    }

    fn rec(i: u64, s: &str) -> ReadRecord {
        ReadRecord::new(i, s.len(), s.to_owned(), "I".repeat(s.len()))
    }

    #[test]
    fn paired_output_files() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("sim").display().to_string();
        let mut out = FastqOutput::create(&prefix, LibraryType::PairedEnd).unwrap();
        out.write(&Assembled::Pair(rec(0, "ACGT"), rec(0, "TTGC"))).unwrap();
        out.write(&Assembled::Pair(rec(1, "GGGG"), rec(1, "CCCC"))).unwrap();
        assert!(out.write(&Assembled::Single(rec(2, "A"))).is_err());
        let paths = out.paths().to_vec();
        assert_eq!(out.finish().unwrap(), 2);
        assert!(paths[0].ends_with("sim_R1.fastq.gz"));
        let r1 = read_gz(&paths[0]);
        let r2 = read_gz(&paths[1]);
        assert_eq!(r1.lines().count(), 8);
        assert_eq!(r2.lines().nth(1), Some("TTGC"));
        // Identifiers match line by line
        for (a, b) in r1.lines().zip(r2.lines()).step_by(4) {
            assert_eq!(a, b)
        }
    }

    #[test]
    fn unfinished_output_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("sim").display().to_string();
        let mut out = FastqOutput::create(&prefix, LibraryType::SingleEnd).unwrap();
        out.write(&Assembled::Single(rec(0, "ACGT"))).unwrap();
        let p = out.paths()[0].clone();
        assert!(p.exists());
        drop(out);
        assert!(!p.exists());
    }
}

use std::path::Path;

use anyhow::Context;
use compress_io::compress::CompressIo;
use utils::{get_next_line, is_blank_or_comment, parse_field};

use crate::error::SimError;

/// Transcript abundance table
///
/// Parallel vectors of transcript ids, read counts and the proportion of
/// the total count for each transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountProfile {
    pub ids: Vec<String>,
    pub counts: Vec<u64>,
    pub proportions: Vec<f64>,
}

impl CountProfile {
    /// Build a profile from counts alone, deriving the proportions
    pub fn from_counts(ids: Vec<String>, counts: Vec<u64>) -> Self {
        let total: u64 = counts.iter().sum();
        let proportions = counts
            .iter()
            .map(|c| {
                if total > 0 {
                    *c as f64 / total as f64
                } else {
                    0.0
                }
            })
            .collect();
        Self {
            ids,
            counts,
            proportions,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Load a count profile
///
/// Expects tab separated columns: transcript id, count and optionally
/// proportion.  Fractional (expected) counts are rounded.  If no
/// proportions are given they are calculated from the counts.
pub fn load_profile<P: AsRef<Path>>(path: P) -> anyhow::Result<CountProfile> {
    let path = path.as_ref();
    debug!("Reading count profile from {}", path.display());
    let mut rdr = CompressIo::new()
        .path(path)
        .bufreader()
        .with_context(|| format!("Error opening count profile {}", path.display()))?;

    let malformed = |e: anyhow::Error| SimError::MalformedModel {
        path: path.to_owned(),
        reason: format!("{:#}", e),
    };

    let mut buf = String::new();
    let mut line = 0;
    let mut ids = Vec::new();
    let mut counts = Vec::new();
    let mut proportions = Vec::new();

    while let Some(fields) = get_next_line(&mut rdr, &mut buf)
        .with_context(|| format!("Error after reading {} lines from {}", line, path.display()))?
    {
        line += 1;
        if is_blank_or_comment(&fields) {
            continue;
        }
        let count: f64 = parse_field(&fields, 1, "count", line).map_err(malformed)?;
        if !(count >= 0.0) {
            return Err(malformed(anyhow!("line {}: negative count {}", line, count)).into());
        }
        if fields.len() > 2 {
            let p: f64 = parse_field(&fields, 2, "proportion", line).map_err(malformed)?;
            proportions.push(p)
        }
        ids.push(fields[0].to_owned());
        counts.push(count.round() as u64);
    }

    let profile = if proportions.is_empty() {
        CountProfile::from_counts(ids, counts)
    } else if proportions.len() == ids.len() {
        CountProfile {
            ids,
            counts,
            proportions,
        }
    } else {
        return Err(malformed(anyhow!("proportion column present on only some lines")).into());
    };

    debug!("Count profile has {} transcripts", profile.len());
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs::File, io::Write};

    fn profile_file(dir: &Path, content: &str) -> std::path::PathBuf {
        let p = dir.join("profile.txt");
        File::create(&p).unwrap().write_all(content.as_bytes()).unwrap();
        p
    }

    #[test]
    fn proportions_from_counts() {
        let dir = tempfile::tempdir().unwrap();
        let p = profile_file(dir.path(), "#id\tcount\ntx1\t50\ntx2\t29.6\n\ntx3\t20\n");
        let prof = load_profile(&p).unwrap();
        assert_eq!(prof.ids, vec!["tx1", "tx2", "tx3"]);
        assert_eq!(prof.counts, vec![50, 30, 20]);
        assert!((prof.proportions[1] - 0.3).abs() < 1e-12);
        let total: f64 = prof.proportions.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn explicit_proportions() {
        let dir = tempfile::tempdir().unwrap();
        let p = profile_file(dir.path(), "tx1\t5\t0.5\ntx2\t3\t0.3\ntx3\t2\t0.2\n");
        let prof = load_profile(&p).unwrap();
        assert_eq!(prof.proportions, vec![0.5, 0.3, 0.2]);
    }

    #[test]
    fn bad_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let p = profile_file(dir.path(), "tx1\t5\t0.5\ntx2\t3\n");
        assert!(load_profile(&p).is_err());
        let p = profile_file(dir.path(), "tx1\tmany\n");
        assert!(load_profile(&p).is_err());
        let p = profile_file(dir.path(), "tx1\t-4\n");
        assert!(load_profile(&p).is_err());
    }
}

use std::path::Path;

use anyhow::Context;
use compress_io::compress::CompressIo;
use rand::distributions::{Distribution, WeightedIndex};
use rand_distr::Normal;
use utils::{get_next_line, is_blank_or_comment, parse_field};

use crate::{config::SimRng, error::SimError};

/// Source of fragment lengths for paired end simulation
pub trait FragmentLengthModel: Send + Sync {
    fn sample_lengths(&self, n: usize, rng: &mut SimRng) -> Vec<usize>;
}

/// Normally distributed fragment lengths, truncated to integers
pub struct NormalLengths {
    mean: f64,
    sd: f64,
    dist: Normal<f64>,
}

impl NormalLengths {
    pub fn new(mean: f64, sd: f64) -> anyhow::Result<Self> {
        if !(mean.is_finite() && mean > 0.0 && sd.is_finite() && sd >= 0.0) {
            return Err(anyhow!(
                "Invalid fragment length distribution (mean {}, sd {})",
                mean,
                sd
            ));
        }
        let dist = Normal::new(mean, sd).with_context(|| {
            format!("Invalid fragment length distribution (mean {}, sd {})", mean, sd)
        })?;
        Ok(Self { mean, sd, dist })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn sd(&self) -> f64 {
        self.sd
    }
}

impl FragmentLengthModel for NormalLengths {
    fn sample_lengths(&self, n: usize, rng: &mut SimRng) -> Vec<usize> {
        // Negative draws become 0 and are later rejected as too short
        (0..n)
            .map(|_| self.dist.sample(rng).max(0.0) as usize)
            .collect()
    }
}

/// Fragment lengths resampled from an observed length distribution
///
/// The model file has one length per line with an optional weight column.
pub struct EmpiricalLengths {
    lengths: Vec<usize>,
    dist: WeightedIndex<f64>,
}

impl EmpiricalLengths {
    pub fn new(lengths: Vec<usize>, weights: Vec<f64>) -> anyhow::Result<Self> {
        let dist = WeightedIndex::new(&weights)
            .with_context(|| "Invalid weights for fragment length model")?;
        Ok(Self { lengths, dist })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        debug!("Reading fragment length model from {}", path.display());
        let mut rdr = CompressIo::new()
            .path(path)
            .bufreader()
            .with_context(|| format!("Error opening fragment length model {}", path.display()))?;

        let malformed = |e: anyhow::Error| SimError::MalformedModel {
            path: path.to_owned(),
            reason: format!("{:#}", e),
        };

        let mut buf = String::new();
        let mut line = 0;
        let mut lengths = Vec::new();
        let mut weights = Vec::new();
        while let Some(fields) = get_next_line(&mut rdr, &mut buf)
            .with_context(|| format!("Error after reading {} lines from {}", line, path.display()))?
        {
            line += 1;
            if is_blank_or_comment(&fields) {
                continue;
            }
            let l: usize = parse_field(&fields, 0, "fragment length", line).map_err(malformed)?;
            let w: f64 = if fields.len() > 1 {
                parse_field(&fields, 1, "weight", line).map_err(malformed)?
            } else {
                1.0
            };
            lengths.push(l);
            weights.push(w);
        }
        if lengths.is_empty() {
            return Err(malformed(anyhow!("no fragment lengths found")).into());
        }
        debug!("Fragment length model has {} entries", lengths.len());
        Self::new(lengths, weights).map_err(|e| malformed(e).into())
    }
}

impl FragmentLengthModel for EmpiricalLengths {
    fn sample_lengths(&self, n: usize, rng: &mut SimRng) -> Vec<usize> {
        (0..n)
            .map(|_| self.lengths[self.dist.sample(rng)])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::{fs::File, io::Write};

    #[test]
    fn normal_lengths_are_centred() {
        let mut rng: SimRng = SeedableRng::seed_from_u64(42);
        let m = NormalLengths::new(250.0, 25.0).unwrap();
        let v = m.sample_lengths(10000, &mut rng);
        assert_eq!(v.len(), 10000);
        let mean = v.iter().sum::<usize>() as f64 / v.len() as f64;
        assert!((mean - 249.5).abs() < 2.0, "mean {}", mean);
    }

    #[test]
    fn invalid_normal_parameters() {
        assert!(NormalLengths::new(250.0, -25.0).is_err());
        assert!(NormalLengths::new(-250.0, 25.0).is_err());
        assert!(NormalLengths::new(0.0, 25.0).is_err());
        assert!(NormalLengths::new(250.0, f64::NAN).is_err());
        assert!(NormalLengths::new(f64::INFINITY, 25.0).is_err());
        // A zero sd gives a fixed length
        let m = NormalLengths::new(300.0, 0.0).unwrap();
        let mut rng: SimRng = SeedableRng::seed_from_u64(1);
        assert!(m.sample_lengths(10, &mut rng).iter().all(|l| *l == 300));
    }

    #[test]
    fn empirical_lengths_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("fl.txt");
        File::create(&p)
            .unwrap()
            .write_all(b"# length\tweight\n200\t1\n300\t0\n350\n")
            .unwrap();
        let m = EmpiricalLengths::from_file(&p).unwrap();
        let mut rng: SimRng = SeedableRng::seed_from_u64(7);
        let v = m.sample_lengths(200, &mut rng);
        assert!(v.iter().all(|l| *l == 200 || *l == 350));
        assert!(v.contains(&200) && v.contains(&350));
    }

    #[test]
    fn empty_model_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("fl.txt");
        File::create(&p).unwrap().write_all(b"# nothing\n").unwrap();
        let e = EmpiricalLengths::from_file(&p).err().unwrap();
        assert!(matches!(e.downcast_ref::<SimError>(), Some(SimError::MalformedModel { .. })));
    }
}

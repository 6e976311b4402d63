use std::{collections::BTreeMap, path::Path};

use anyhow::Context;
use compress_io::compress::CompressIo;
use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};
use utils::{get_next_line, is_blank_or_comment, parse_field};

use crate::{config::SimRng, error::SimError};

pub const PHRED_OFFSET: u8 = 33;
pub const MAX_PHRED: u8 = 41;
const MIN_PHRED: u8 = 2;
const DEFAULT_PHRED: u8 = 40;

/// Quality string for one read together with the positions where the
/// model calls a sequencing error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualitySample {
    pub qual: String,
    pub errors: Vec<usize>,
}

/// Source of per base quality strings of a fixed read length
pub trait QualityModel: Send + Sync {
    fn read_len(&self) -> usize;
    fn sample_quality(&self, rng: &mut SimRng) -> QualitySample;
}

pub fn phred_to_prob(q: u8) -> f64 {
    10f64.powf(-(q as f64) / 10.0)
}

pub fn prob_to_phred(p: f64) -> u8 {
    if p <= 0.0 {
        MAX_PHRED
    } else {
        (-10.0 * p.log10())
            .round()
            .clamp(MIN_PHRED as f64, MAX_PHRED as f64) as u8
    }
}

fn error_positions(rng: &mut SimRng, probs: impl Iterator<Item = f64>) -> Vec<usize> {
    probs
        .enumerate()
        .filter_map(|(i, p)| if rng.gen::<f64>() < p { Some(i) } else { None })
        .collect()
}

/// Same quality at every position
///
/// Used when no quality model is supplied.  Errors are only generated if
/// an error rate is set.
pub struct ConstantQuality {
    read_len: usize,
    qual: String,
    error_rate: Option<f64>,
}

impl ConstantQuality {
    pub fn new(read_len: usize, error_rate: Option<f64>) -> Self {
        let phred = error_rate.map(prob_to_phred).unwrap_or(DEFAULT_PHRED);
        let c = (phred + PHRED_OFFSET) as char;
        Self {
            read_len,
            qual: std::iter::repeat(c).take(read_len).collect(),
            error_rate,
        }
    }
}

impl QualityModel for ConstantQuality {
    fn read_len(&self) -> usize {
        self.read_len
    }

    fn sample_quality(&self, rng: &mut SimRng) -> QualitySample {
        let errors = match self.error_rate {
            Some(p) if p > 0.0 => error_positions(rng, std::iter::repeat(p).take(self.read_len)),
            _ => Vec::new(),
        };
        QualitySample {
            qual: self.qual.clone(),
            errors,
        }
    }
}

struct PositionDist {
    phred: Vec<u8>,
    dist: WeightedIndex<f64>,
}

/// Position specific distributions of Phred scores
///
/// Read from a file with the tab separated columns position (0 based),
/// phred score and weight.  Reads longer than the model reuse the
/// distribution of the last modelled position.
pub struct PositionalQuality {
    read_len: usize,
    positions: Vec<PositionDist>,
    error_rate: Option<f64>,
}

impl PositionalQuality {
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        read_len: usize,
        error_rate: Option<f64>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        debug!("Reading quality model from {}", path.display());
        let mut rdr = CompressIo::new()
            .path(path)
            .bufreader()
            .with_context(|| format!("Error opening quality model {}", path.display()))?;

        let malformed = |reason: String| SimError::MalformedModel {
            path: path.to_owned(),
            reason,
        };

        let mut buf = String::new();
        let mut line = 0;
        let mut tab: BTreeMap<usize, Vec<(u8, f64)>> = BTreeMap::new();
        while let Some(fields) = get_next_line(&mut rdr, &mut buf)
            .with_context(|| format!("Error after reading {} lines from {}", line, path.display()))?
        {
            line += 1;
            if is_blank_or_comment(&fields) {
                continue;
            }
            let pos: usize = parse_field(&fields, 0, "position", line)
                .map_err(|e| malformed(format!("{:#}", e)))?;
            let q: u8 = parse_field(&fields, 1, "phred score", line)
                .map_err(|e| malformed(format!("{:#}", e)))?;
            let w: f64 = parse_field(&fields, 2, "weight", line)
                .map_err(|e| malformed(format!("{:#}", e)))?;
            if q > MAX_PHRED || !(w >= 0.0) {
                let reason = format!("line {}: invalid phred {} or weight {}", line, q, w);
                return Err(malformed(reason).into());
            }
            tab.entry(pos).or_default().push((q, w))
        }

        let mut positions = Vec::with_capacity(tab.len());
        for (i, (pos, v)) in tab.into_iter().enumerate() {
            if pos != i {
                return Err(malformed(format!("no entries for read position {}", i)).into());
            }
            let dist = WeightedIndex::new(v.iter().map(|(_, w)| *w))
                .map_err(|e| malformed(format!("position {}: {}", pos, e)))?;
            let phred = v.iter().map(|(q, _)| *q).collect();
            positions.push(PositionDist { phred, dist })
        }
        if positions.is_empty() {
            return Err(malformed("no quality distributions found".to_owned()).into());
        }
        if positions.len() < read_len {
            debug!(
                "Quality model covers {} positions; read length is {}",
                positions.len(),
                read_len
            );
        }
        Ok(Self {
            read_len,
            positions,
            error_rate,
        })
    }
}

impl QualityModel for PositionalQuality {
    fn read_len(&self) -> usize {
        self.read_len
    }

    fn sample_quality(&self, rng: &mut SimRng) -> QualitySample {
        let last = self.positions.len() - 1;
        let phred: Vec<u8> = (0..self.read_len)
            .map(|i| {
                let pd = &self.positions[i.min(last)];
                pd.phred[pd.dist.sample(rng)]
            })
            .collect();
        let errors = match self.error_rate {
            Some(p) => error_positions(rng, std::iter::repeat(p).take(self.read_len)),
            None => error_positions(rng, phred.iter().map(|q| phred_to_prob(*q))),
        };
        let qual = phred.iter().map(|q| (q + PHRED_OFFSET) as char).collect();
        QualitySample { qual, errors }
    }
}

use std::cmp::Ordering;

use rand::Rng;
use rand_distr::{Distribution, Gamma, Poisson};

use crate::{config::SimRng, error::SimError, index::ReferenceIndex, profile::CountProfile};

/// No selected transcript is ever assigned fewer reads (or fragments) than this
pub const MIN_ASSIGNED_COUNT: u64 = 1;

/// Negative binomial distribution of read counts
///
/// Sampled as a gamma-Poisson mixture: the Poisson rate is drawn from a gamma
/// distribution with shape `size` and scale `(1 - prob) / prob`.
#[derive(Debug, Clone)]
pub struct NegativeBinomial {
    size: f64,
    prob: f64,
    gamma: Gamma<f64>,
}

impl NegativeBinomial {
    pub fn new(size: f64, prob: f64) -> anyhow::Result<Self> {
        if !(size > 0.0) || !(prob > 0.0 && prob < 1.0) {
            return Err(anyhow!(
                "Invalid negative binomial parameters: size {} prob {}",
                size,
                prob
            ));
        }
        let gamma = Gamma::new(size, (1.0 - prob) / prob)
            .map_err(|e| anyhow!("Invalid negative binomial parameters: {}", e))?;
        Ok(Self { size, prob, gamma })
    }

    pub fn mean(&self) -> f64 {
        self.size * (1.0 - self.prob) / self.prob
    }
}

impl Distribution<u64> for NegativeBinomial {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let lambda = self.gamma.sample(rng);
        match Poisson::new(lambda) {
            Ok(p) => {
                let k: f64 = p.sample(rng);
                k as u64
            }
            // Rate underflowed to 0
            Err(_) => 0,
        }
    }
}

/// How transcripts and their read counts are chosen
#[derive(Debug, Clone)]
pub enum AbundanceMode {
    /// Counts from the negative binomial, transcripts drawn with replacement
    Parametric {
        total_reads: u64,
        dist: NegativeBinomial,
    },
    /// Counts taken directly from the profile
    Empirical { profile: CountProfile },
    /// Profile proportions scaled to a new total
    EmpiricalScaled {
        profile: CountProfile,
        total_reads: u64,
    },
}

impl AbundanceMode {
    /// Choose the mode from the inputs that are present
    pub fn select(
        profile: Option<CountProfile>,
        total_reads: Option<u64>,
        dist: NegativeBinomial,
    ) -> Result<Self, SimError> {
        match (profile, total_reads) {
            (None, None) => Err(SimError::EmptyAbundanceInput(
                "neither a read count nor a count profile was given".to_owned(),
            )),
            (_, Some(0)) => Err(SimError::EmptyAbundanceInput(
                "requested read count is zero".to_owned(),
            )),
            (Some(p), _) if p.is_empty() => Err(SimError::EmptyAbundanceInput(
                "count profile is empty".to_owned(),
            )),
            (None, Some(total_reads)) => Ok(Self::Parametric { total_reads, dist }),
            (Some(profile), None) => Ok(Self::Empirical { profile }),
            (Some(profile), Some(total_reads)) => Ok(Self::EmpiricalScaled {
                profile,
                total_reads,
            }),
        }
    }

    /// Assign read (fragment) counts to transcripts
    ///
    /// Returns one entry per selected transcript.  In parametric mode the same
    /// transcript may be selected more than once.
    pub fn assign(
        &self,
        index: &ReferenceIndex,
        rng: &mut SimRng,
    ) -> Result<Vec<Assignment>, SimError> {
        let v = match self {
            Self::Parametric { total_reads, dist } => {
                if index.is_empty() {
                    return Err(SimError::EmptyAbundanceInput(
                        "no usable transcripts in reference".to_owned(),
                    ));
                }
                let drawn: Vec<f64> = (0..*total_reads)
                    .map(|_| dist.sample(rng) as f64)
                    .collect();
                if drawn.iter().all(|x| *x == 0.0) {
                    return Err(SimError::EmptyAbundanceInput(
                        "all negative binomial draws were zero".to_owned(),
                    ));
                }
                scale_counts(&drawn, *total_reads)
                    .into_iter()
                    .map(|count| Assignment {
                        transcript: rng.gen_range(0..index.len()),
                        count,
                    })
                    .collect()
            }
            Self::Empirical { profile } => resolve(profile, index)?
                .into_iter()
                .map(|(transcript, i)| Assignment {
                    transcript,
                    count: profile.counts[i].max(MIN_ASSIGNED_COUNT),
                })
                .collect(),
            Self::EmpiricalScaled {
                profile,
                total_reads,
            } => {
                let res = resolve(profile, index)?;
                let props: Vec<f64> = res.iter().map(|(_, i)| profile.proportions[*i]).collect();
                scale_counts(&props, *total_reads)
                    .into_iter()
                    .zip(res.iter())
                    .map(|(count, (transcript, _))| Assignment {
                        transcript: *transcript,
                        count,
                    })
                    .collect()
            }
        };
        Ok(v)
    }
}

/// Read (fragment) count assigned to one transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    /// Position of the transcript in the reference index
    pub transcript: usize,
    pub count: u64,
}

/// Match profile ids to the reference index.  Returns pairs of
/// (index position, profile position)
fn resolve(
    profile: &CountProfile,
    index: &ReferenceIndex,
) -> Result<Vec<(usize, usize)>, SimError> {
    let v: Vec<_> = profile
        .ids
        .iter()
        .enumerate()
        .filter_map(|(i, id)| index.position(id).map(|t| (t, i)))
        .collect();
    let missing = profile.len() - v.len();
    if missing > 0 {
        warn!(
            "{} of {} profile transcripts are missing from the reference index or too short",
            missing,
            profile.len()
        );
    }
    if v.is_empty() {
        Err(SimError::EmptyAbundanceInput(
            "no profile transcript found in the reference index".to_owned(),
        ))
    } else {
        Ok(v)
    }
}

/// Scale weights to integer counts, one per weight
///
/// Each count is `round(total * weight / sum(weights))`, raised to
/// MIN_ASSIGNED_COUNT if it rounds to zero.  The counts are then adjusted
/// towards total without going below MIN_ASSIGNED_COUNT:
///
///   surplus - first remove one read from counts that were rounded up (most
///   rounded up first), then from the largest counts
///
///   deficit - add one read to the counts that were rounded down the most
///
/// The total is exceeded only when there are more weights than reads.
pub fn scale_counts(weights: &[f64], total: u64) -> Vec<u64> {
    let n = weights.len();
    let sum: f64 = weights.iter().sum();
    if !(sum > 0.0) || total == 0 {
        return vec![MIN_ASSIGNED_COUNT; n];
    }
    let exact: Vec<f64> = weights.iter().map(|w| total as f64 * w / sum).collect();
    let mut counts: Vec<u64> = exact
        .iter()
        .map(|x| (x.round() as u64).max(MIN_ASSIGNED_COUNT))
        .collect();
    let mut assigned: u64 = counts.iter().sum();

    let over = |counts: &[u64], i: usize| counts[i] as f64 - exact[i];
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        over(&counts, b)
            .partial_cmp(&over(&counts, a))
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    if assigned > total {
        for &i in order.iter() {
            if assigned == total {
                break;
            }
            if counts[i] > MIN_ASSIGNED_COUNT && over(&counts, i) > 0.0 {
                counts[i] -= 1;
                assigned -= 1;
            }
        }
    }
    while assigned > total {
        let mut large: Vec<usize> = (0..n).filter(|&i| counts[i] > MIN_ASSIGNED_COUNT).collect();
        if large.is_empty() {
            debug!(
                "{} entries at the minimum count exceed the target of {} reads",
                n, total
            );
            break;
        }
        large.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b)));
        for i in large {
            if assigned == total {
                break;
            }
            counts[i] -= 1;
            assigned -= 1;
        }
    }
    while assigned < total {
        for &i in order.iter().rev() {
            if assigned == total {
                break;
            }
            counts[i] += 1;
            assigned += 1;
        }
    }
    counts
}

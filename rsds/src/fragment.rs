use rand::Rng;

use crate::{config::SimRng, error::SimError};

/// Half open interval [start, end) on a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentCoordinate {
    pub start: usize,
    pub end: usize,
}

impl FragmentCoordinate {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// What to place on a transcript
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// `count` reads of a fixed length
    Single { read_len: usize, count: usize },
    /// One fragment for each of the sampled lengths
    Paired { lengths: &'a [usize] },
}

/// Last allowed start position for an interval of length l, or None if the
/// interval does not fit.  Starts are drawn from [0, seq_len - l - 1].
fn max_start(seq_len: usize, l: usize) -> Option<usize> {
    if l == 0 || seq_len <= l {
        None
    } else {
        Some(seq_len - l - 1)
    }
}

/// Generate start/end coordinates on a transcript of length seq_len
///
/// Starts are drawn uniformly with replacement.  For single end reads the
/// whole transcript is rejected if the read does not fit.  For paired end,
/// fragments that do not fit are dropped individually and the transcript is
/// only rejected when no fragment fits.
pub fn positions(
    id: &str,
    seq_len: usize,
    target: Target,
    rng: &mut SimRng,
) -> Result<Vec<FragmentCoordinate>, SimError> {
    match target {
        Target::Single { read_len, count } => {
            let m = max_start(seq_len, read_len).ok_or_else(|| SimError::DegenerateFragment {
                id: id.to_owned(),
                length: read_len,
                seq_len,
            })?;
            Ok((0..count)
                .map(|_| {
                    let start = rng.gen_range(0..=m);
                    FragmentCoordinate {
                        start,
                        end: start + read_len,
                    }
                })
                .collect())
        }
        Target::Paired { lengths } => {
            let mut v = Vec::with_capacity(lengths.len());
            for &l in lengths {
                if let Some(m) = max_start(seq_len, l) {
                    let start = rng.gen_range(0..=m);
                    v.push(FragmentCoordinate { start, end: start + l })
                }
            }
            if v.is_empty() && !lengths.is_empty() {
                Err(SimError::DegenerateFragment {
                    id: id.to_owned(),
                    length: lengths.iter().copied().min().unwrap_or(0),
                    seq_len,
                })
            } else {
                if v.len() < lengths.len() {
                    debug!(
                        "Transcript {}: {} of {} fragments too long for sequence of length {}",
                        id,
                        lengths.len() - v.len(),
                        lengths.len(),
                        seq_len
                    );
                }
                Ok(v)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn single_end_coordinates_are_valid() {
        let mut rng: SimRng = SeedableRng::seed_from_u64(101);
        for seq_len in [101, 150, 400, 1000, 5000] {
            let target = Target::Single {
                read_len: 100,
                count: 500,
            };
            let v = positions("tx", seq_len, target, &mut rng).unwrap();
            assert_eq!(v.len(), 500);
            for c in v {
                assert_eq!(c.len(), 100);
                assert!(c.end < seq_len);
            }
        }
    }

    #[test]
    fn single_end_starts_cover_range() {
        let mut rng: SimRng = SeedableRng::seed_from_u64(3);
        let target = Target::Single {
            read_len: 100,
            count: 10,
        };
        let v = positions("tx", 1000, target, &mut rng).unwrap();
        assert_eq!(v.len(), 10);
        assert!(v.iter().all(|c| c.start <= 899));
        // Starts are not all identical
        assert!(v.iter().any(|c| c.start != v[0].start));
    }

    #[test]
    fn tight_fit_starts_at_zero() {
        let mut rng: SimRng = SeedableRng::seed_from_u64(3);
        let target = Target::Single {
            read_len: 100,
            count: 5,
        };
        let v = positions("tx", 101, target, &mut rng).unwrap();
        assert!(v.iter().all(|c| c.start == 0 && c.end == 100));
    }

    #[test]
    fn paired_end_coordinates_are_valid() {
        let mut rng: SimRng = SeedableRng::seed_from_u64(17);
        let lengths = vec![150, 250, 300, 999, 1200, 499];
        let v = positions("tx", 1000, Target::Paired { lengths: &lengths }, &mut rng).unwrap();
        // 1200 does not fit
        let expected = [150, 250, 300, 999, 499];
        assert_eq!(v.len(), expected.len());
        for (c, l) in v.iter().zip(expected.iter()) {
            assert_eq!(c.len(), *l);
            assert!(c.end < 1000);
        }
    }

    #[test]
    fn degenerate_transcripts_are_rejected() {
        let mut rng: SimRng = SeedableRng::seed_from_u64(1);
        let target = Target::Single {
            read_len: 100,
            count: 3,
        };
        assert!(matches!(
            positions("short", 100, target, &mut rng),
            Err(SimError::DegenerateFragment { seq_len: 100, .. })
        ));
        let lengths = [450, 500];
        let e = positions("short", 420, Target::Paired { lengths: &lengths }, &mut rng);
        assert!(matches!(e, Err(SimError::DegenerateFragment { length: 450, .. })));
    }
}

use std::{collections::BTreeMap, thread};

use anyhow::Context;
use crossbeam_channel::{bounded, Receiver, Sender};
use rand::{Rng, SeedableRng};

use crate::{
    assemble::{Assembled, ReadAssembler},
    config::{Config, LibraryType, SimRng},
    extract::SequenceExtractor,
    fragment::{positions, Target},
    output::FastqOutput,
};

/// Reads to generate from one transcript.  Each job carries its own seed so
/// the reads do not depend on which thread handles the job.
#[derive(Debug)]
struct Job {
    ix: usize,
    transcript: usize,
    count: u64,
    seed: u64,
}

#[derive(Debug)]
struct JobResult {
    ix: usize,
    reads: Vec<Assembled>,
    skipped: bool,
}

impl JobResult {
    fn skip(ix: usize) -> Self {
        Self {
            ix,
            reads: Vec::new(),
            skipped: true,
        }
    }
}

/// Totals for a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Transcript entries that produced reads
    pub transcripts: usize,
    /// Transcript entries skipped because no fragment fitted
    pub skipped: usize,
    /// Reads (single end) or read pairs (paired end) written
    pub records: u64,
}

fn make_jobs(cfg: &Config) -> anyhow::Result<Vec<Job>> {
    let mut rng = SimRng::seed_from_u64(cfg.seed());
    let assignments = cfg
        .abundance()
        .assign(cfg.index(), &mut rng)
        .with_context(|| "Error assigning read counts to transcripts")?;
    Ok(assignments
        .into_iter()
        .enumerate()
        .map(|(ix, a)| Job {
            ix,
            transcript: a.transcript,
            count: a.count,
            seed: rng.gen(),
        })
        .collect())
}

fn run_job(cfg: &Config, ext: &mut SequenceExtractor, job: &Job) -> anyhow::Result<JobResult> {
    let loc = &cfg.index().records()[job.transcript];
    let id = loc.id();
    let read_len = cfg.read_len();
    let count = job.count as usize;
    trace!("Job {}: {} fragments from transcript {}", job.ix, count, id);

    let mut rng = SimRng::seed_from_u64(job.seed);
    let seq = ext.fetch(loc)?;

    let lengths = match cfg.library() {
        LibraryType::SingleEnd => Vec::new(),
        LibraryType::PairedEnd => {
            let model = cfg
                .frag_lengths()
                .ok_or_else(|| anyhow!("No fragment length model for paired end reads"))?;
            let mut v = model.sample_lengths(count, &mut rng);
            v.retain(|l| *l >= read_len);
            if v.is_empty() {
                warn!(
                    "Transcript {}: no sampled fragment holds reads of length {}; skipping",
                    id, read_len
                );
                return Ok(JobResult::skip(job.ix));
            }
            v
        }
    };
    let target = match cfg.library() {
        LibraryType::SingleEnd => Target::Single { read_len, count },
        LibraryType::PairedEnd => Target::Paired { lengths: &lengths },
    };

    let coords = match positions(id, seq.len(), target, &mut rng) {
        Ok(v) => v,
        Err(e) => {
            warn!("{}; skipping transcript", e);
            return Ok(JobResult::skip(job.ix));
        }
    };

    let asm = ReadAssembler::new(read_len, cfg.library(), cfg.quality());
    let mut reads = Vec::with_capacity(coords.len());
    for c in coords {
        let frag = seq
            .get(c.start..c.end)
            .ok_or_else(|| anyhow!("Transcript {}: invalid fragment {:?}", id, c))?;
        if let Some(a) = asm.assemble(frag, reads.len() as u64, &mut rng) {
            reads.push(a)
        }
    }
    Ok(JobResult {
        ix: job.ix,
        reads,
        skipped: false,
    })
}

/// Writes job results in job order
struct Collector {
    out: FastqOutput,
    next: usize,
    pending: BTreeMap<usize, JobResult>,
    transcripts: usize,
    skipped: usize,
}

impl Collector {
    fn new(out: FastqOutput) -> Self {
        Self {
            out,
            next: 0,
            pending: BTreeMap::new(),
            transcripts: 0,
            skipped: 0,
        }
    }

    fn add(&mut self, r: JobResult) -> anyhow::Result<()> {
        self.pending.insert(r.ix, r);
        while let Some(r) = self.pending.remove(&self.next) {
            self.emit(r)?;
            self.next += 1;
        }
        Ok(())
    }

    fn emit(&mut self, r: JobResult) -> anyhow::Result<()> {
        if r.skipped {
            self.skipped += 1;
            return Ok(());
        }
        self.transcripts += 1;
        // Read indices within a job start at zero
        let base = self.out.n_written();
        for mut a in r.reads {
            a.shift_index(base);
            self.out.write(&a)?
        }
        Ok(())
    }

    fn finish(self, n_jobs: usize) -> anyhow::Result<Summary> {
        if self.next != n_jobs || !self.pending.is_empty() {
            return Err(anyhow!(
                "Only {} of {} simulation jobs completed",
                self.next,
                n_jobs
            ));
        }
        let transcripts = self.transcripts;
        let skipped = self.skipped;
        let records = self.out.finish()?;
        Ok(Summary {
            transcripts,
            skipped,
            records,
        })
    }
}

fn single_threaded(cfg: &Config, jobs: Vec<Job>, coll: &mut Collector) -> anyhow::Result<()> {
    let mut ext = SequenceExtractor::open(cfg.reference())?;
    for job in jobs.iter() {
        coll.add(run_job(cfg, &mut ext, job)?)?
    }
    Ok(())
}

fn worker(
    cfg: &Config,
    ix: usize,
    r: Receiver<Job>,
    s: Sender<JobResult>,
) -> anyhow::Result<()> {
    trace!("Starting up simulation thread {}", ix);
    let mut ext = SequenceExtractor::open(cfg.reference())?;
    while let Ok(job) = r.recv() {
        let res = run_job(cfg, &mut ext, &job)?;
        if s.send(res).is_err() {
            break;
        }
    }
    trace!("Closing down simulation thread {}", ix);
    Ok(())
}

fn multi_threaded(
    cfg: &Config,
    nt: usize,
    jobs: Vec<Job>,
    coll: &mut Collector,
) -> anyhow::Result<()> {
    // Everything runs within a scope so that we can pass references to the threads
    thread::scope(|sc| {
        trace!("Spawning {} simulation threads", nt);
        let (job_snd, job_rcv) = bounded(nt * 4);
        let (res_snd, res_rcv) = bounded(nt * 4);
        let workers: Vec<_> = (0..nt)
            .map(|i| {
                let r = job_rcv.clone();
                let s = res_snd.clone();
                sc.spawn(move || worker(cfg, i + 1, r, s))
            })
            .collect();
        drop(job_rcv);
        drop(res_snd);

        let feeder = sc.spawn(move || {
            for job in jobs {
                if job_snd.send(job).is_err() {
                    debug!("Simulation threads closed before all jobs were sent");
                    break;
                }
            }
        });

        // Returning early drops the receiver, which closes down the workers
        for res in res_rcv.iter() {
            coll.add(res)?
        }

        if feeder.join().is_err() {
            return Err(anyhow!("Error joining job feeder thread"));
        }
        for (ix, jh) in workers.into_iter().enumerate() {
            match jh.join() {
                Ok(r) => r.with_context(|| {
                    format!("Error returned from simulation thread {}", ix + 1)
                })?,
                Err(_) => return Err(anyhow!("Error joining simulation thread {}", ix + 1)),
            }
        }
        Ok(())
    })
}

/// Run the simulation described by cfg and write the FASTQ output
///
/// Output files are only kept if the run completes.
pub fn simulate(cfg: &Config) -> anyhow::Result<Summary> {
    let jobs = make_jobs(cfg)?;
    let n_jobs = jobs.len();
    let total: u64 = jobs.iter().map(|j| j.count).sum();
    info!(
        "Simulating {} {} fragments from {} transcript entries",
        total,
        cfg.library(),
        n_jobs
    );

    let out = FastqOutput::create(cfg.output_prefix(), cfg.library())?;
    let mut coll = Collector::new(out);
    let nt = cfg.threads().min(n_jobs);
    if nt > 1 {
        multi_threaded(cfg, nt, jobs, &mut coll)?
    } else {
        single_threaded(cfg, jobs, &mut coll)?
    }
    let paths: Vec<_> = coll.out.paths().iter().map(|p| p.display().to_string()).collect();
    let summary = coll.finish(n_jobs)?;

    info!(
        "Wrote {} {} from {} transcript entries ({} skipped) to {}",
        summary.records,
        match cfg.library() {
            LibraryType::SingleEnd => "reads",
            LibraryType::PairedEnd => "read pairs",
        },
        summary.transcripts,
        summary.skipped,
        paths.join(", ")
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abundance::{AbundanceMode, NegativeBinomial},
        assemble::{reverse_complement, TOOL_TAG},
        fraglen::{EmpiricalLengths, NormalLengths},
        index::{parse_index, ReferenceIndex},
        profile::CountProfile,
        quality::ConstantQuality,
    };
    use flate2::read::MultiGzDecoder;
    use std::{
        fs::File,
        io::{Read, Write},
        path::{Path, PathBuf},
    };

    fn random_seq(n: usize, rng: &mut SimRng) -> String {
        (0..n).map(|_| ['A', 'C', 'G', 'T'][rng.gen_range(0..4)]).collect()
    }

    /// Write a FASTA file wrapped at 60 bases with its .fai index
    fn make_reference(dir: &Path, seqs: &[(&str, &str)]) -> PathBuf {
        let fasta = dir.join("ref.fa");
        let mut fa = Vec::new();
        let mut fai = String::new();
        for (id, s) in seqs {
            writeln!(fa, ">{}", id).unwrap();
            fai.push_str(&format!("{}\t{}\t{}\t60\t61\n", id, s.len(), fa.len()));
            for chunk in s.as_bytes().chunks(60) {
                fa.extend_from_slice(chunk);
                fa.push(b'\n');
            }
        }
        File::create(&fasta).unwrap().write_all(&fa).unwrap();
        File::create(dir.join("ref.fa.fai"))
            .unwrap()
            .write_all(fai.as_bytes())
            .unwrap();
        fasta
    }

    fn make_config(
        dir: &Path,
        fasta: &Path,
        library: LibraryType,
        read_len: usize,
        abundance: AbundanceMode,
        prefix: &str,
    ) -> Config {
        let index = ReferenceIndex::from_records(parse_index(dir.join("ref.fa.fai")).unwrap());
        let mut cfg = Config::new(
            fasta.to_owned(),
            index,
            library,
            read_len,
            abundance,
            Box::new(ConstantQuality::new(read_len, None)),
        );
        cfg.set_output_prefix(dir.join(prefix).display().to_string());
        cfg
    }

    fn read_gz(p: &Path) -> String {
        let mut s = String::new();
        MultiGzDecoder::new(File::open(p).unwrap())
            .read_to_string(&mut s)
            .unwrap();
        s
    }

    fn parametric(total_reads: u64) -> AbundanceMode {
        AbundanceMode::Parametric {
            total_reads,
            dist: NegativeBinomial::new(2.0, 0.01).unwrap(),
        }
    }

    #[test]
    fn single_end_smoke() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng: SimRng = SeedableRng::seed_from_u64(5);
        let tx = random_seq(1000, &mut rng);
        let fasta = make_reference(dir.path(), &[("tx1", &tx)]);
        let cfg = make_config(
            dir.path(),
            &fasta,
            LibraryType::SingleEnd,
            100,
            parametric(10),
            "se",
        );
        let summary = simulate(&cfg).unwrap();
        assert_eq!(summary.records, 10);
        assert_eq!(summary.skipped, 0);

        let s = read_gz(&dir.path().join("se.fastq.gz"));
        let lines: Vec<_> = s.lines().collect();
        assert_eq!(lines.len(), 40);
        for (i, rec) in lines.chunks(4).enumerate() {
            assert_eq!(rec[0], format!("@{}.{} {} length=100", TOOL_TAG, i, i));
            assert_eq!(rec[1].len(), 100);
            assert!(tx.contains(rec[1]));
            assert_eq!(rec[2], "+");
            assert_eq!(rec[3], "I".repeat(100));
        }
    }

    #[test]
    fn paired_end_mates_are_opposite_strands() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng: SimRng = SeedableRng::seed_from_u64(6);
        let tx = random_seq(1000, &mut rng);
        let fasta = make_reference(dir.path(), &[("tx1", &tx)]);
        let profile = CountProfile::from_counts(vec!["tx1".to_owned()], vec![20]);
        let mut cfg = make_config(
            dir.path(),
            &fasta,
            LibraryType::PairedEnd,
            50,
            AbundanceMode::Empirical { profile },
            "pe",
        );
        cfg.set_frag_lengths(Box::new(NormalLengths::new(250.0, 25.0).unwrap()));
        assert_eq!(simulate(&cfg).unwrap().records, 20);

        let r1 = read_gz(&dir.path().join("pe_R1.fastq.gz"));
        let r2 = read_gz(&dir.path().join("pe_R2.fastq.gz"));
        let r1: Vec<_> = r1.lines().collect();
        let r2: Vec<_> = r2.lines().collect();
        assert_eq!(r1.len(), 80);
        assert_eq!(r2.len(), 80);
        let fwd = |s: &str| tx.contains(s);
        let rev = |s: &str| tx.contains(&reverse_complement(s));
        let mut r1_fwd = 0;
        for (a, b) in r1.chunks(4).zip(r2.chunks(4)) {
            assert_eq!(a[0], b[0]);
            assert_eq!(a[1].len(), 50);
            assert_eq!(b[3].len(), 50);
            if fwd(a[1]) {
                assert!(rev(b[1]));
                r1_fwd += 1;
            } else {
                assert!(rev(a[1]) && fwd(b[1]));
            }
        }
        assert!(r1_fwd > 0 && r1_fwd < 20);
    }

    #[test]
    fn transcripts_without_fitting_fragments_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng: SimRng = SeedableRng::seed_from_u64(7);
        let long = random_seq(1000, &mut rng);
        let short = random_seq(450, &mut rng);
        let fasta = make_reference(dir.path(), &[("long", &long), ("short", &short)]);
        let profile =
            CountProfile::from_counts(vec!["long".to_owned(), "short".to_owned()], vec![5, 5]);
        let mut cfg = make_config(
            dir.path(),
            &fasta,
            LibraryType::PairedEnd,
            100,
            AbundanceMode::Empirical { profile },
            "skip",
        );
        cfg.set_frag_lengths(Box::new(EmpiricalLengths::new(vec![600], vec![1.0]).unwrap()));
        let summary = simulate(&cfg).unwrap();
        assert_eq!(
            summary,
            Summary {
                transcripts: 1,
                skipped: 1,
                records: 5
            }
        );
    }

    #[test]
    fn output_does_not_depend_on_thread_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng: SimRng = SeedableRng::seed_from_u64(8);
        let seqs: Vec<String> = (0..4).map(|i| random_seq(500 + 100 * i, &mut rng)).collect();
        let named: Vec<(String, &str)> = seqs
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("tx{}", i), s.as_str()))
            .collect();
        let named: Vec<(&str, &str)> = named.iter().map(|(n, s)| (n.as_str(), *s)).collect();
        let fasta = make_reference(dir.path(), &named);

        let run = |prefix: &str, threads: usize| {
            let mut cfg = make_config(
                dir.path(),
                &fasta,
                LibraryType::PairedEnd,
                75,
                parametric(200),
                prefix,
            );
            cfg.set_frag_lengths(Box::new(NormalLengths::new(250.0, 25.0).unwrap()));
            cfg.set_seed(99);
            cfg.set_threads(threads);
            let summary = simulate(&cfg).unwrap();
            let r1 = read_gz(&dir.path().join(format!("{}_R1.fastq.gz", prefix)));
            let r2 = read_gz(&dir.path().join(format!("{}_R2.fastq.gz", prefix)));
            (summary, r1, r2)
        };
        let a = run("a", 1);
        let b = run("b", 1);
        let c = run("c", 4);
        assert_eq!(a.0.records, 200);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn failed_run_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng: SimRng = SeedableRng::seed_from_u64(9);
        let tx = random_seq(600, &mut rng);
        make_reference(dir.path(), &[("tx1", &tx)]);
        let missing = dir.path().join("absent.fa");
        let cfg = make_config(
            dir.path(),
            &missing,
            LibraryType::SingleEnd,
            100,
            parametric(5),
            "fail",
        );
        assert!(simulate(&cfg).is_err());
        assert!(!dir.path().join("fail.fastq.gz").exists());
    }
}

use std::{
    ffi::OsString,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use clap::{crate_authors, crate_description, crate_name, crate_version};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use utils::{init_log, LogLevel};

use crate::{
    abundance::{AbundanceMode, NegativeBinomial},
    config::{Config, LibraryType},
    error::SimError,
    fraglen::{EmpiricalLengths, FragmentLengthModel, NormalLengths},
    index::{parse_index, ReferenceIndex},
    profile::load_profile,
    quality::{ConstantQuality, PositionalQuality, QualityModel},
};

/// Set up definition of command options for clap
fn cli_model() -> Command {
    Command::new(crate_name!())
        .about(crate_description!())
        .version(crate_version!())
        .author(crate_authors!())
        .arg(
            Arg::new("timestamp")
                .short('X')
                .long("timestamp")
                .value_parser(value_parser!(stderrlog::Timestamp))
                .value_name("GRANULARITY")
                .default_value("none")
                .help("Prepend log entries with a timestamp"),
        )
        .arg(
            Arg::new("loglevel")
                .short('l')
                .long("loglevel")
                .value_name("LOGLEVEL")
                .value_parser(value_parser!(LogLevel))
                .ignore_case(true)
                .default_value("info")
                .help("Set log level"),
        )
        .arg(
            Arg::new("quiet")
                .action(ArgAction::SetTrue)
                .long("quiet")
                .conflicts_with("loglevel")
                .help("Silence all output"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .help("Set number of threads [default: available cores]"),
        )
        .arg(
            Arg::new("read_length")
                .short('r')
                .long("read-length")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .default_value("101")
                .help("Set read length"),
        )
        .arg(
            Arg::new("num_reads")
                .short('n')
                .long("num-reads")
                .value_parser(value_parser!(u64))
                .value_name("INT")
                .help("Number of reads (single end) or read pairs (paired end) to simulate"),
        )
        .arg(
            Arg::new("reference")
                .short('f')
                .long("reference")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .required(true)
                .help("Reference transcriptome in FASTA format"),
        )
        .arg(
            Arg::new("index")
                .short('I')
                .long("index")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("FASTA index of reference [default: <reference>.fai]"),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .value_parser(value_parser!(u64))
                .value_name("INT")
                .default_value("1223")
                .help("Seed for random number generator"),
        )
        .arg(
            Arg::new("output_prefix")
                .short('o')
                .long("output-prefix")
                .value_parser(value_parser!(String))
                .value_name("STRING")
                .default_value("rsds")
                .help("Prefix for output files"),
        )
        .arg(
            Arg::new("quality_model")
                .short('q')
                .long("quality-model")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Position specific quality model [default: constant quality]"),
        )
        .arg(
            Arg::new("count_model")
                .short('c')
                .long("count-model")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Transcript count profile"),
        )
        .arg(
            Arg::new("error_rate")
                .short('e')
                .long("error-rate")
                .value_parser(value_parser!(f64))
                .allow_negative_numbers(true)
                .value_name("FLOAT")
                .help("Override per base error rate (negative values are ignored)"),
        )
        .arg(
            Arg::new("fl_dist")
                .long("fl-dist")
                .value_parser(value_parser!(f64))
                .num_args(2)
                .value_names(["MEAN", "SD"])
                .default_values(["250", "25"])
                .help("Mean and standard deviation of fragment lengths"),
        )
        .arg(
            Arg::new("fl_model")
                .long("fl-model")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Empirical fragment length distribution (overrides --fl-dist)"),
        )
        .arg(
            Arg::new("nb_size")
                .long("nb-size")
                .value_parser(value_parser!(f64))
                .value_name("FLOAT")
                .default_value("2.0")
                .help("Size parameter of negative binomial count distribution"),
        )
        .arg(
            Arg::new("nb_prob")
                .long("nb-prob")
                .value_parser(value_parser!(f64))
                .value_name("FLOAT")
                .default_value("0.01")
                .help("Success probability of negative binomial count distribution"),
        )
        .arg(
            Arg::new("single_end")
                .long("se")
                .action(ArgAction::SetTrue)
                .help("Simulate single end reads"),
        )
        .arg(
            Arg::new("paired_end")
                .long("pe")
                .action(ArgAction::SetTrue)
                .help("Simulate paired end reads"),
        )
}

fn default_index_path(reference: &Path) -> PathBuf {
    let mut s = OsString::from(reference.as_os_str());
    s.push(".fai");
    PathBuf::from(s)
}

fn error_rate(m: &ArgMatches) -> anyhow::Result<Option<f64>> {
    match m.get_one::<f64>("error_rate").copied() {
        Some(e) if e < 0.0 => Ok(None),
        Some(e) if e > 1.0 => Err(anyhow!("Error rate {} is greater than 1", e)),
        x => Ok(x),
    }
}

fn quality_model(
    m: &ArgMatches,
    read_len: usize,
    error_rate: Option<f64>,
) -> anyhow::Result<Box<dyn QualityModel>> {
    let q: Box<dyn QualityModel> = match m.get_one::<PathBuf>("quality_model") {
        Some(p) => Box::new(PositionalQuality::from_file(p, read_len, error_rate)?),
        None => Box::new(ConstantQuality::new(read_len, error_rate)),
    };
    Ok(q)
}

fn frag_length_model(m: &ArgMatches) -> anyhow::Result<Box<dyn FragmentLengthModel>> {
    let fl: Box<dyn FragmentLengthModel> = match m.get_one::<PathBuf>("fl_model") {
        Some(p) => Box::new(EmpiricalLengths::from_file(p)?),
        None => {
            let v: Vec<f64> = m
                .get_many::<f64>("fl_dist")
                .map(|it| it.copied().collect())
                .unwrap_or_default();
            match v.as_slice() {
                [mean, sd] => {
                    let n = NormalLengths::new(*mean, *sd)?;
                    debug!("Fragment lengths from normal({}, {})", n.mean(), n.sd());
                    Box::new(n)
                }
                _ => return Err(anyhow!("Expected two values (mean and sd) for --fl-dist")),
            }
        }
    };
    Ok(fl)
}

/// Build the Config from parsed command line options
///
/// All input files and models are read here, so that problems with the
/// input are reported before any output is created.
fn config_from_matches(m: &ArgMatches) -> anyhow::Result<Config> {
    let library = LibraryType::from_flags(m.get_flag("single_end"), m.get_flag("paired_end"))?;
    debug!("Library type: {}", library);

    let total_reads = m.get_one::<u64>("num_reads").copied();
    let count_model = m.get_one::<PathBuf>("count_model");
    if total_reads.is_none() && count_model.is_none() {
        return Err(SimError::EmptyAbundanceInput(
            "one or both of --num-reads and --count-model must be given".to_owned(),
        )
        .into());
    }

    // Required argument
    let reference = m.get_one::<PathBuf>("reference").unwrap().to_owned();
    if !reference.is_file() {
        return Err(anyhow!("Reference file {} not found", reference.display()));
    }
    let index_path = m
        .get_one::<PathBuf>("index")
        .cloned()
        .unwrap_or_else(|| default_index_path(&reference));
    let index = ReferenceIndex::from_records(parse_index(&index_path)?);
    if index.is_empty() {
        warn!("No usable transcripts in {}", index_path.display())
    } else {
        debug!("{} usable transcripts in reference index", index.len())
    }

    let profile = count_model.map(load_profile).transpose()?;
    let nb = NegativeBinomial::new(
        *m.get_one::<f64>("nb_size").unwrap(),
        *m.get_one::<f64>("nb_prob").unwrap(),
    )?;
    if total_reads.is_some() {
        debug!("Negative binomial count distribution with mean {:.1}", nb.mean());
    }
    let abundance = AbundanceMode::select(profile, total_reads, nb)?;

    let read_len = usize::from(*m.get_one::<NonZeroUsize>("read_length").unwrap());
    let quality = quality_model(m, read_len, error_rate(m)?)?;

    let mut cfg = Config::new(reference, index, library, read_len, abundance, quality);

    if library == LibraryType::PairedEnd {
        cfg.set_frag_lengths(frag_length_model(m)?)
    }

    cfg.set_seed(*m.get_one::<u64>("seed").unwrap());
    cfg.set_output_prefix(m.get_one::<String>("output_prefix").unwrap());
    cfg.set_threads(
        m.get_one::<NonZeroUsize>("threads")
            .map(|x| usize::from(*x))
            .unwrap_or_else(num_cpus::get),
    );
    Ok(cfg)
}

/// Handle command line options.  Set up Config structure
pub fn handle_cli() -> anyhow::Result<Config> {
    // Get matches from command line
    let m = cli_model().get_matches();

    // Setup logging
    init_log(&m)?;

    debug!("Processing command line options");
    config_from_matches(&m)
}

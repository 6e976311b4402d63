#[macro_use]
extern crate anyhow;

use std::{fmt, io::BufRead, str::FromStr};

use anyhow::Context;
use clap::ArgMatches;

/// LogLevel
///
/// Represents minimum level of messages that will be logged
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevel {
    pub level: usize,
}

impl FromStr for LogLevel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel { level: 0 }),
            "warn" => Ok(LogLevel { level: 1 }),
            "info" => Ok(LogLevel { level: 2 }),
            "debug" => Ok(LogLevel { level: 3 }),
            "trace" => Ok(LogLevel { level: 4 }),
            "none" => Ok(LogLevel { level: 5 }),
            _ => Err("no match"),
        }
    }
}

impl LogLevel {
    pub fn is_none(&self) -> bool {
        self.level > 4
    }
    pub fn get_level(&self) -> usize {
        if self.level > 4 {
            0
        } else {
            self.level
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_str = ["error", "warn", "info", "debug", "trace", "none"];
        if self.level < 6 {
            write!(f, "{}", level_str[self.level])
        } else {
            write!(f, "unknown")
        }
    }
}

/// Initialize logging from command line arguments
///
/// Expects the arguments `loglevel`, `quiet` and `timestamp` to be defined
/// in the clap model
pub fn init_log(m: &ArgMatches) -> anyhow::Result<()> {
    let verbose = m
        .get_one::<LogLevel>("loglevel")
        .copied()
        .unwrap_or(LogLevel { level: 2 });
    let quiet = verbose.is_none() || m.get_flag("quiet");
    let ts = m
        .get_one::<stderrlog::Timestamp>("timestamp")
        .cloned()
        .unwrap_or(stderrlog::Timestamp::Off);

    stderrlog::new()
        .quiet(quiet)
        .verbosity(verbose.get_level())
        .timestamp(ts)
        .init()
        .with_context(|| "Could not initialize logging")
}

/// Read in next line and split on tabs after trimming white space
pub fn get_next_line<'a, R: BufRead>(
    rdr: &mut R,
    buf: &'a mut String,
) -> anyhow::Result<Option<Vec<&'a str>>> {
    buf.clear();
    if rdr.read_line(buf)? == 0 {
        Ok(None)
    } else {
        Ok(Some(buf.trim().split('\t').collect()))
    }
}

/// Returns true for lines that carry no data (empty lines and `#` comments)
pub fn is_blank_or_comment(fields: &[&str]) -> bool {
    match fields.first() {
        None => true,
        Some(s) => s.is_empty() || s.starts_with('#'),
    }
}

/// Parse column `ix` of a split line, reporting the column name and line
/// number on failure
pub fn parse_field<T>(fields: &[&str], ix: usize, name: &str, line: usize) -> anyhow::Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
{
    let s = fields
        .get(ix)
        .ok_or_else(|| anyhow!("line {}: missing {} column", line, name))?;
    s.trim()
        .parse::<T>()
        .with_context(|| format!("line {}: could not parse {} from '{}'", line, name, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn log_level_names() {
        assert_eq!(LogLevel::from_str("WARN").unwrap().level, 1);
        assert!(LogLevel::from_str("none").unwrap().is_none());
        assert_eq!(LogLevel::from_str("none").unwrap().get_level(), 0);
        assert!(LogLevel::from_str("loud").is_err());
        assert_eq!(format!("{}", LogLevel { level: 3 }), "debug");
    }

    #[test]
    fn split_lines() {
        let mut rdr = Cursor::new("a\t1\t2\n\n# note\n");
        let mut buf = String::new();
        let f = get_next_line(&mut rdr, &mut buf).unwrap().unwrap();
        assert_eq!(f, vec!["a", "1", "2"]);
        let f = get_next_line(&mut rdr, &mut buf).unwrap().unwrap();
        assert!(is_blank_or_comment(&f));
        let f = get_next_line(&mut rdr, &mut buf).unwrap().unwrap();
        assert!(is_blank_or_comment(&f));
        assert!(get_next_line(&mut rdr, &mut buf).unwrap().is_none());
    }

    #[test]
    fn field_parsing() {
        let fields = vec!["tx1", "1200", "x"];
        let n: usize = parse_field(&fields, 1, "length", 4).unwrap();
        assert_eq!(n, 1200);
        let e = parse_field::<usize>(&fields, 2, "offset", 4).unwrap_err();
        assert!(format!("{:#}", e).contains("line 4"));
        assert!(parse_field::<usize>(&fields, 5, "width", 4).is_err());
    }
}

use std::{env, fmt, path::PathBuf, str::FromStr};

use clap::ArgMatches;

/// LogLevel
///
/// Represents minimum level of messages that will be logged
///
#[derive(Debug, Clone, Copy)]
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
pub fn init_log(m: &ArgMatches) {
    let verbose = m
        .get_one::<LogLevel>("loglevel")
        .copied()
        .unwrap_or_else(|| LogLevel::from_str("info").expect("Could not set loglevel info"));
    let quiet = verbose.is_none() || m.get_flag("quiet");
    let ts = m
        .get_one::<stderrlog::Timestamp>("timestamp")
        .copied()
        .unwrap_or(stderrlog::Timestamp::Off);

    stderrlog::new()
        .quiet(quiet)
        .verbosity(verbose.get_level())
        .timestamp(ts)
        .init()
        .unwrap();
}

/// Expand a leading tilde and $VAR / ${VAR} references in a user supplied
/// path the way a shell would.  References to unset variables (and a tilde
/// with no HOME set) are left untouched rather than reported as errors, so
/// the result can still produce a sensible file-not-found message downstream.
pub fn expand_path(s: &str) -> PathBuf {
    let expanded;
    let s = if s == "~" || s.starts_with("~/") {
        match env::var("HOME") {
            Ok(home) => {
                expanded = format!("{}{}", home, &s[1..]);
                expanded.as_str()
            }
            Err(_) => s,
        }
    } else {
        s
    };

    let mut out = String::with_capacity(s.len());
    let mut it = s.chars().peekable();
    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let braced = matches!(it.peek(), Some('{'));
        if braced {
            it.next();
        }
        let mut name = String::new();
        while let Some(&c) = it.peek() {
            if braced && c == '}' {
                break;
            }
            if !braced && !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            it.next();
        }
        let closed = if braced {
            matches!(it.next(), Some('}'))
        } else {
            true
        };
        match env::var(&name) {
            Ok(v) if closed && !name.is_empty() => out.push_str(&v),
            _ => {
                // Leave the reference as written
                out.push('$');
                if braced {
                    out.push('{');
                }
                out.push_str(&name);
                if braced && closed {
                    out.push('}');
                }
            }
        }
    }
    PathBuf::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_from_str() {
        assert_eq!(LogLevel::from_str("warn").unwrap().level, 1);
        assert_eq!(LogLevel::from_str("TRACE").unwrap().level, 4);
        assert!(LogLevel::from_str("chatty").is_err());
    }

    #[test]
    fn log_level_display() {
        assert_eq!(LogLevel { level: 2 }.to_string(), "info");
        assert_eq!(LogLevel { level: 5 }.to_string(), "none");
    }

    #[test]
    fn expand_plain_path() {
        assert_eq!(expand_path("/data/fastq"), PathBuf::from("/data/fastq"));
    }

    #[test]
    fn expand_tilde() {
        let home = env::var("HOME").expect("HOME not set in test environment");
        assert_eq!(
            expand_path("~/projects"),
            PathBuf::from(format!("{}/projects", home))
        );
        assert_eq!(expand_path("~"), PathBuf::from(home));
    }

    #[test]
    fn expand_env_var() {
        env::set_var("CS_UTILS_TEST_DIR", "/scratch");
        assert_eq!(
            expand_path("$CS_UTILS_TEST_DIR/bams"),
            PathBuf::from("/scratch/bams")
        );
        assert_eq!(
            expand_path("${CS_UTILS_TEST_DIR}/bams"),
            PathBuf::from("/scratch/bams")
        );
    }

    #[test]
    fn unset_var_left_untouched() {
        assert_eq!(
            expand_path("$CS_UTILS_TEST_UNSET/x"),
            PathBuf::from("$CS_UTILS_TEST_UNSET/x")
        );
        assert_eq!(
            expand_path("${CS_UTILS_TEST_UNSET}/x"),
            PathBuf::from("${CS_UTILS_TEST_UNSET}/x")
        );
    }

    #[test]
    fn tilde_in_middle_not_expanded() {
        assert_eq!(expand_path("/a/~b"), PathBuf::from("/a/~b"));
    }
}

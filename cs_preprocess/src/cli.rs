use std::{num::NonZeroUsize, path::PathBuf};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_parser, Arg, ArgAction,
    Command,
};

use anyhow::Context;

use utils::{init_log, LogLevel};

use crate::{config::Config, stage::Stage};

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
                .default_value("warn")
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
                .help("Set number of worker threads [default: cores value from the config]"),
        )
        .arg(
            Arg::new("target")
                .short('T')
                .long("target")
                .value_parser(value_parser!(Stage))
                .ignore_case(true)
                .default_value("ngsplot")
                .value_name("STAGE")
                .help("Run the pipeline up to this stage (align, fastqc, rmdup, tdf, phantompeak, ngsplot)"),
        )
        .arg(
            Arg::new("force")
                .action(ArgAction::SetTrue)
                .long("force")
                .help("Rerun all steps even when their outputs are up to date"),
        )
        .arg(
            Arg::new("dry_run")
                .action(ArgAction::SetTrue)
                .short('n')
                .long("dry-run")
                .help("Show the commands that would be run without running them"),
        )
        .arg(
            Arg::new("config_file")
                .value_parser(value_parser!(PathBuf))
                .value_name("CONFIG_FILE")
                .required(true)
                .help("YAML file describing the project layout and tool settings"),
        )
}

/// Handle command line options.  Set up Config structure
pub fn handle_cli() -> anyhow::Result<Config> {
    // Get matches from command line
    let m = cli_model().get_matches();

    // Setup logging
    init_log(&m);

    debug!("Processing command line options");

    let config_file = m
        .get_one::<PathBuf>("config_file")
        .expect("Missing config file");

    let mut cfg = Config::from_file(config_file)
        .with_context(|| format!("Error processing config file {}", config_file.display()))?;

    if let Some(nt) = m.get_one::<NonZeroUsize>("threads") {
        cfg.set_threads(usize::from(*nt))
    }

    let target = m
        .get_one::<Stage>("target")
        .copied()
        .expect("Missing default target stage");
    cfg.set_target(target);

    if m.get_flag("force") {
        cfg.set_force()
    }

    if m.get_flag("dry_run") {
        cfg.set_dry_run()
    }

    debug!(
        "Pipeline will run up to stage {} with {} worker(s)",
        cfg.target(),
        cfg.threads()
    );

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_model_is_consistent() {
        cli_model().debug_assert();
    }
}

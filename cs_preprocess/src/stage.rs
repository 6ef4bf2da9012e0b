use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{
    config::Config,
    input::{find_files, pattern_to_regex},
};

/// The pipeline stages.  Each stage runs one external tool over the files
/// produced by its predecessors; rmdup fans out into tdf and phantompeak,
/// which ngsplot merges back together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Align,
    FastQc,
    RmDup,
    Tdf,
    PhantomPeak,
    NgsPlot,
}

/// All stages in declaration (topological) order
pub const STAGES: [Stage; 6] = [
    Stage::Align,
    Stage::FastQc,
    Stage::RmDup,
    Stage::Tdf,
    Stage::PhantomPeak,
    Stage::NgsPlot,
];

pub const N_STAGES: usize = STAGES.len();

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Align => "align",
            Self::FastQc => "fastqc",
            Self::RmDup => "rmdup",
            Self::Tdf => "tdf",
            Self::PhantomPeak => "phantompeak",
            Self::NgsPlot => "ngsplot",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Align => 0,
            Self::FastQc => 1,
            Self::RmDup => 2,
            Self::Tdf => 3,
            Self::PhantomPeak => 4,
            Self::NgsPlot => 5,
        }
    }

    /// Stages that must complete before this one can start
    pub fn follows(&self) -> &'static [Stage] {
        match self {
            Self::Align => &[],
            Self::FastQc => &[Stage::Align],
            Self::RmDup => &[Stage::FastQc],
            Self::Tdf => &[Stage::RmDup],
            Self::PhantomPeak => &[Stage::RmDup],
            Self::NgsPlot => &[Stage::Tdf, Stage::PhantomPeak],
        }
    }

    /// Suffix appended to the input file name to form the log file
    fn log_suffix(&self) -> &'static str {
        match self {
            Self::Align => ".alignment.log",
            Self::FastQc => ".fastqc.log",
            Self::RmDup => ".rmdup.log",
            Self::Tdf => ".tdf.log",
            Self::PhantomPeak => ".phantomPeak.log",
            Self::NgsPlot => ".ngsplot.all.log",
        }
    }

    /// Directories that must exist before the stage dispatches jobs
    pub fn output_dirs(&self, cfg: &Config) -> Vec<PathBuf> {
        match self {
            Self::FastQc => vec![cfg.fastqc_path().to_owned()],
            Self::RmDup => vec![cfg.rmdup_path().to_owned()],
            Self::Tdf => vec![cfg.tdf_path().to_owned()],
            _ => Vec::new(),
        }
    }

    /// Discover the input files for the stage.  This runs when the stage
    /// becomes ready, as the inputs are the outputs of earlier stages.
    pub fn collect_inputs(&self, cfg: &Config) -> anyhow::Result<Vec<PathBuf>> {
        match self {
            Self::Align => {
                let reg = pattern_to_regex(cfg.input_pattern())?;
                find_files(cfg.fastq_dir(), &reg)
            }
            Self::FastQc | Self::RmDup => {
                let reg = pattern_to_regex("*.bam")?;
                find_files(cfg.data_path(), &reg)
            }
            Self::Tdf | Self::PhantomPeak => {
                let reg = pattern_to_regex("*.bam")?;
                find_files(cfg.rmdup_path(), &reg)
            }
            // Merge step; a single job over the rmdup directory
            Self::NgsPlot => Ok(vec![cfg.rmdup_path().to_owned()]),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "align" => Ok(Self::Align),
            "fastqc" => Ok(Self::FastQc),
            "rmdup" => Ok(Self::RmDup),
            "tdf" => Ok(Self::Tdf),
            "phantompeak" => Ok(Self::PhantomPeak),
            "ngsplot" => Ok(Self::NgsPlot),
            _ => Err("no match"),
        }
    }
}

/// A fully assembled external command plus the log file that captures the
/// child's stdout and stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: &'static str,
    pub args: Vec<OsString>,
    pub log: PathBuf,
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.program)?;
        for a in &self.args {
            write!(f, " {}", a.to_string_lossy())?;
        }
        Ok(())
    }
}

/// One schedulable unit: one external tool invocation over one input
#[derive(Debug)]
pub struct Task {
    stage: Stage,
    input: PathBuf,
    n_inputs: usize,
}

impl Task {
    pub fn new(stage: Stage, input: PathBuf, n_inputs: usize) -> Self {
        Self {
            stage,
            input,
            n_inputs,
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Log file for the task.  The stage suffix is appended to the full
    /// input file name; the merge step logs under the project name instead.
    pub fn log_path(&self, cfg: &Config) -> PathBuf {
        match self.stage {
            Stage::NgsPlot => cfg.rmdup_path().join(format!(
                "{}{}",
                cfg.project_name(),
                self.stage.log_suffix()
            )),
            _ => {
                let mut name = self
                    .input
                    .file_name()
                    .expect("Input file without a file name")
                    .to_os_string();
                name.push(self.stage.log_suffix());
                self.input.with_file_name(name)
            }
        }
    }

    /// Files whose modification times decide whether the task needs to rerun
    pub fn dep_files(&self, cfg: &Config) -> anyhow::Result<Vec<PathBuf>> {
        match self.stage {
            Stage::NgsPlot => {
                let reg = pattern_to_regex("*.bam")?;
                find_files(cfg.rmdup_path(), &reg)
            }
            _ => Ok(vec![self.input.clone()]),
        }
    }

    pub fn command(&self, cfg: &Config) -> CommandSpec {
        let log = self.log_path(cfg);
        let (program, args) = match self.stage {
            Stage::Align => {
                let cores = (cfg.threads() / self.n_inputs.max(1)).max(1);
                (
                    cfg.aligner().script(),
                    vec![
                        self.input.clone().into_os_string(),
                        cfg.bowtie_index().into(),
                        cfg.data_path().into(),
                        cfg.pair_end().as_arg().into(),
                        cores.to_string().into(),
                    ],
                )
            }
            Stage::FastQc => (
                "fastqc",
                vec![
                    "-o".into(),
                    cfg.fastqc_path().into(),
                    "-t".into(),
                    cfg.fastqc_threads().to_string().into(),
                    self.input.clone().into_os_string(),
                ],
            ),
            Stage::RmDup => {
                let program = if cfg.pair_end().is_paired() {
                    "rmdup_PE.bam.sh"
                } else {
                    "rmdup.bam.sh"
                };
                let mut args = vec![
                    self.input.clone().into_os_string(),
                    cfg.rmdup_path().into(),
                ];
                if let Some(buff) = cfg.bam_sort_buff() {
                    args.push(buff.into())
                }
                (program, args)
            }
            Stage::Tdf => {
                let mut tdf = cfg.tdf_path().join(
                    self.input
                        .file_name()
                        .expect("Input file without a file name"),
                );
                tdf.set_extension("tdf");
                (
                    "igvtools",
                    vec![
                        "count".into(),
                        self.input.clone().into_os_string(),
                        tdf.into_os_string(),
                        cfg.igv_genome().into(),
                    ],
                )
            }
            Stage::PhantomPeak => (
                "runPhantomPeak.sh",
                vec![self.input.clone().into_os_string()],
            ),
            Stage::NgsPlot => (
                "ngsplot_all.sh",
                vec![
                    cfg.rmdup_path().into(),
                    cfg.ngsplot_genome().into(),
                    cfg.project_name().into(),
                    cfg.threads().to_string().into(),
                    cfg.ngsplot_fraglen().to_string().into(),
                ],
            ),
        };
        CommandSpec { program, args, log }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> Config {
        Config::from_yaml(
            "\
project_dir: /proj
data_dir: data
input_files: \"*.fastq\"
aligner: bowtie
bowtie_index: /indexes/mm9
pair_end: \"no\"
cores: 8
IGV_genome: mm9
ngsplot_genome: mm9
ngsplot_fraglen: 150
project_name: k4me3
",
        )
        .unwrap()
    }

    fn args_of(spec: &CommandSpec) -> Vec<String> {
        spec.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn stage_graph() {
        assert!(Stage::Align.follows().is_empty());
        assert_eq!(Stage::FastQc.follows(), &[Stage::Align]);
        assert_eq!(Stage::Tdf.follows(), &[Stage::RmDup]);
        assert_eq!(Stage::PhantomPeak.follows(), &[Stage::RmDup]);
        assert_eq!(Stage::NgsPlot.follows(), &[Stage::Tdf, Stage::PhantomPeak]);
        for (ix, s) in STAGES.iter().enumerate() {
            assert_eq!(s.index(), ix);
        }
    }

    #[test]
    fn stage_from_str() {
        assert_eq!(Stage::from_str("fastqc").unwrap(), Stage::FastQc);
        assert_eq!(Stage::from_str("NGSPLOT").unwrap(), Stage::NgsPlot);
        assert!(Stage::from_str("plot").is_err());
    }

    #[test]
    fn align_command() {
        let cfg = test_cfg();
        let task = Task::new(Stage::Align, PathBuf::from("/proj/data/fastq/s1.fastq"), 2);
        let spec = task.command(&cfg);
        assert_eq!(spec.program, "fastq2bam_by_bowtie.sh");
        assert_eq!(
            args_of(&spec),
            ["/proj/data/fastq/s1.fastq", "/indexes/mm9", "/proj/data", "no", "4"]
        );
        assert_eq!(
            spec.log,
            PathBuf::from("/proj/data/fastq/s1.fastq.alignment.log")
        );
    }

    #[test]
    fn align_cores_floor_at_one() {
        let cfg = test_cfg();
        let task = Task::new(Stage::Align, PathBuf::from("/proj/data/fastq/s1.fastq"), 20);
        assert_eq!(args_of(&task.command(&cfg)).last().unwrap(), "1");
    }

    #[test]
    fn fastqc_command_uses_default_threads() {
        let cfg = test_cfg();
        let task = Task::new(Stage::FastQc, PathBuf::from("/proj/data/s1.bam"), 1);
        let spec = task.command(&cfg);
        assert_eq!(spec.program, "fastqc");
        assert_eq!(
            args_of(&spec),
            ["-o", "/proj/data/FastQC", "-t", "2", "/proj/data/s1.bam"]
        );
        assert_eq!(spec.log, PathBuf::from("/proj/data/s1.bam.fastqc.log"));
    }

    #[test]
    fn rmdup_command_single_end() {
        let cfg = test_cfg();
        let task = Task::new(Stage::RmDup, PathBuf::from("/proj/data/s1.bam"), 1);
        let spec = task.command(&cfg);
        assert_eq!(spec.program, "rmdup.bam.sh");
        assert_eq!(args_of(&spec), ["/proj/data/s1.bam", "/proj/data/rmdup"]);
    }

    #[test]
    fn rmdup_command_paired_with_sort_buffer() {
        let cfg = Config::from_yaml(
            "\
project_dir: /proj
data_dir: data
input_files: \"*.fastq\"
bowtie_index: /indexes/mm9
pair_end: \"yes\"
cores: 8
bam_sort_buff: 2G
IGV_genome: mm9
ngsplot_genome: mm9
ngsplot_fraglen: 150
project_name: k4me3
",
        )
        .unwrap();
        let task = Task::new(Stage::RmDup, PathBuf::from("/proj/data/s1.bam"), 1);
        let spec = task.command(&cfg);
        assert_eq!(spec.program, "rmdup_PE.bam.sh");
        assert_eq!(
            args_of(&spec),
            ["/proj/data/s1.bam", "/proj/data/rmdup", "2G"]
        );
    }

    #[test]
    fn tdf_command_swaps_extension() {
        let cfg = test_cfg();
        let task = Task::new(Stage::Tdf, PathBuf::from("/proj/data/rmdup/s1.bam"), 1);
        let spec = task.command(&cfg);
        assert_eq!(spec.program, "igvtools");
        assert_eq!(
            args_of(&spec),
            [
                "count",
                "/proj/data/rmdup/s1.bam",
                "/proj/data/rmdup/tdf/s1.tdf",
                "mm9"
            ]
        );
        assert_eq!(spec.log, PathBuf::from("/proj/data/rmdup/s1.bam.tdf.log"));
    }

    #[test]
    fn phantompeak_command() {
        let cfg = test_cfg();
        let task = Task::new(Stage::PhantomPeak, PathBuf::from("/proj/data/rmdup/s1.bam"), 1);
        let spec = task.command(&cfg);
        assert_eq!(spec.program, "runPhantomPeak.sh");
        assert_eq!(args_of(&spec), ["/proj/data/rmdup/s1.bam"]);
        assert_eq!(
            spec.log,
            PathBuf::from("/proj/data/rmdup/s1.bam.phantomPeak.log")
        );
    }

    #[test]
    fn ngsplot_merge_command() {
        let cfg = test_cfg();
        let task = Task::new(Stage::NgsPlot, cfg.rmdup_path().to_owned(), 1);
        let spec = task.command(&cfg);
        assert_eq!(spec.program, "ngsplot_all.sh");
        assert_eq!(
            args_of(&spec),
            ["/proj/data/rmdup", "mm9", "k4me3", "8", "150"]
        );
        assert_eq!(
            spec.log,
            PathBuf::from("/proj/data/rmdup/k4me3.ngsplot.all.log")
        );
    }

    #[test]
    fn output_dirs_per_stage() {
        let cfg = test_cfg();
        assert!(Stage::Align.output_dirs(&cfg).is_empty());
        assert_eq!(
            Stage::FastQc.output_dirs(&cfg),
            [PathBuf::from("/proj/data/FastQC")]
        );
        assert_eq!(
            Stage::Tdf.output_dirs(&cfg),
            [PathBuf::from("/proj/data/rmdup/tdf")]
        );
    }

    #[test]
    fn command_display_renders_argv() {
        let cfg = test_cfg();
        let task = Task::new(Stage::PhantomPeak, PathBuf::from("/proj/data/rmdup/s1.bam"), 1);
        assert_eq!(
            task.command(&cfg).to_string(),
            "runPhantomPeak.sh /proj/data/rmdup/s1.bam"
        );
    }
}

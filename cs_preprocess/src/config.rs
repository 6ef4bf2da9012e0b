use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

use utils::expand_path;

use crate::stage::Stage;

/// -t value passed to fastqc when fastqc_threads is not set in the config
const DEFAULT_FASTQC_THREADS: usize = 2;

/// Supported aligners.  The choice selects which wrapper script performs
/// the FASTQ to BAM step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aligner {
    Bowtie,
    Bowtie2,
}

impl Aligner {
    pub fn script(&self) -> &'static str {
        match self {
            Self::Bowtie => "fastq2bam_by_bowtie.sh",
            Self::Bowtie2 => "fastq2bam_by_bowtie2.sh",
        }
    }
}

/// Pairing mode of the sequencing run.  Forwarded verbatim to the align
/// script and used to select the single or paired end rmdup script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairEnd {
    Yes,
    No,
}

impl PairEnd {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, Self::Yes)
    }
}

/// Raw form of the YAML project file
#[derive(Debug, Deserialize)]
struct ConfigFile {
    project_dir: String,
    data_dir: String,
    input_files: String,
    #[serde(default)]
    aligner: Option<Aligner>,
    bowtie_index: String,
    pair_end: PairEnd,
    #[serde(default)]
    cores: Option<usize>,
    #[serde(default)]
    fastqc_threads: Option<usize>,
    #[serde(default)]
    bam_sort_buff: Option<String>,
    #[serde(rename = "IGV_genome")]
    igv_genome: String,
    ngsplot_genome: String,
    ngsplot_fraglen: usize,
    project_name: String,
}

impl ConfigFile {
    fn validate(&self) -> anyhow::Result<()> {
        let non_empty = [
            (self.project_dir.as_str(), "project_dir"),
            (self.data_dir.as_str(), "data_dir"),
            (self.input_files.as_str(), "input_files"),
            (self.bowtie_index.as_str(), "bowtie_index"),
            (self.igv_genome.as_str(), "IGV_genome"),
            (self.ngsplot_genome.as_str(), "ngsplot_genome"),
            (self.project_name.as_str(), "project_name"),
        ];
        for (v, key) in non_empty {
            if v.trim().is_empty() {
                return Err(anyhow!("{} must not be empty", key));
            }
        }
        if self.cores == Some(0) {
            return Err(anyhow!("cores must be greater than 0"));
        }
        if self.fastqc_threads == Some(0) {
            return Err(anyhow!("fastqc_threads must be greater than 0"));
        }
        if self.ngsplot_fraglen == 0 {
            return Err(anyhow!("ngsplot_fraglen must be greater than 0"));
        }
        Ok(())
    }
}

/// Config
///
/// Configuration info for a pipeline run, generated from the YAML project
/// file plus command line options.  Once set it is read only.
///
/// fastq_dir - directory holding the input FASTQ files
/// data_path - alignment output directory (project_dir/data_dir)
/// fastqc_path / rmdup_path / tdf_path - per stage output directories
/// input_pattern - wildcard pattern selecting FASTQ files in fastq_dir
/// threads - number of worker threads (config cores, command line override)
///
pub struct Config {
    fastq_dir: PathBuf,
    data_path: PathBuf,
    fastqc_path: PathBuf,
    rmdup_path: PathBuf,
    tdf_path: PathBuf,
    input_pattern: String,
    aligner: Aligner,
    bowtie_index: PathBuf,
    pair_end: PairEnd,
    threads: usize,
    fastqc_threads: usize,
    bam_sort_buff: Option<String>,
    igv_genome: String,
    ngsplot_genome: String,
    ngsplot_fraglen: usize,
    project_name: String,
    target: Stage,
    force: bool,
    dry_run: bool,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        Self::from_yaml(&text)
    }

    pub(crate) fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let raw: ConfigFile =
            serde_yaml::from_str(text).with_context(|| "Error parsing config file")?;
        raw.validate().with_context(|| "Invalid config file")?;

        let project_dir = expand_path(&raw.project_dir);
        let data_path = project_dir.join(expand_path(&raw.data_dir));
        let fastq_dir = data_path.join("fastq");
        let fastqc_path = data_path.join("FastQC");
        let rmdup_path = data_path.join("rmdup");
        let tdf_path = rmdup_path.join("tdf");

        Ok(Self {
            fastq_dir,
            data_path,
            fastqc_path,
            rmdup_path,
            tdf_path,
            input_pattern: raw.input_files,
            aligner: raw.aligner.unwrap_or(Aligner::Bowtie),
            bowtie_index: expand_path(&raw.bowtie_index),
            pair_end: raw.pair_end,
            threads: raw.cores.unwrap_or_else(num_cpus::get),
            fastqc_threads: raw.fastqc_threads.unwrap_or(DEFAULT_FASTQC_THREADS),
            bam_sort_buff: raw.bam_sort_buff,
            igv_genome: raw.igv_genome,
            ngsplot_genome: raw.ngsplot_genome,
            ngsplot_fraglen: raw.ngsplot_fraglen,
            project_name: raw.project_name,
            target: Stage::NgsPlot,
            force: false,
            dry_run: false,
        })
    }

    pub fn set_threads(&mut self, nt: usize) {
        self.threads = nt
    }

    pub fn set_target(&mut self, target: Stage) {
        self.target = target
    }

    pub fn set_force(&mut self) {
        self.force = true
    }

    pub fn set_dry_run(&mut self) {
        self.dry_run = true
    }

    pub fn fastq_dir(&self) -> &Path {
        &self.fastq_dir
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn fastqc_path(&self) -> &Path {
        &self.fastqc_path
    }

    pub fn rmdup_path(&self) -> &Path {
        &self.rmdup_path
    }

    pub fn tdf_path(&self) -> &Path {
        &self.tdf_path
    }

    pub fn input_pattern(&self) -> &str {
        &self.input_pattern
    }

    pub fn aligner(&self) -> Aligner {
        self.aligner
    }

    pub fn bowtie_index(&self) -> &Path {
        &self.bowtie_index
    }

    pub fn pair_end(&self) -> PairEnd {
        self.pair_end
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn fastqc_threads(&self) -> usize {
        self.fastqc_threads
    }

    pub fn bam_sort_buff(&self) -> Option<&str> {
        self.bam_sort_buff.as_deref()
    }

    pub fn igv_genome(&self) -> &str {
        &self.igv_genome
    }

    pub fn ngsplot_genome(&self) -> &str {
        &self.ngsplot_genome
    }

    pub fn ngsplot_fraglen(&self) -> usize {
        self.ngsplot_fraglen
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn target(&self) -> Stage {
        self.target
    }

    pub fn force(&self) -> bool {
        self.force
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

use std::{
    fs::File,
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};

use crate::{
    config::Config,
    controller::{Completed, Job, JobRequest, RunJob},
};

/// Pause before re-requesting when no job is currently runnable
const WAIT_DELAY: Duration = Duration::from_millis(250);

/// Launch the external command with stdout and stderr redirected into the
/// job's log file and wait for it to finish.  A non-zero exit status is
/// logged and otherwise ignored; failure to launch is an error.
fn run_job(cfg: &Config, job: &RunJob) -> anyhow::Result<()> {
    let cmd = &job.cmd;
    if cfg.dry_run() {
        info!(
            "{}: would run: {} (log {})",
            job.stage,
            cmd,
            cmd.log.display()
        );
        return Ok(());
    }

    debug!("{}: running: {}", job.stage, cmd);
    let log = File::create(&cmd.log)
        .with_context(|| format!("Could not create log file {}", cmd.log.display()))?;
    let log2 = log
        .try_clone()
        .with_context(|| format!("Could not duplicate log file handle {}", cmd.log.display()))?;
    let status = Command::new(cmd.program)
        .args(&cmd.args)
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log2))
        .status()
        .with_context(|| format!("Could not run {}", cmd.program))?;

    if !status.success() {
        warn!(
            "{} exited with {} (see {})",
            cmd.program,
            status,
            cmd.log.display()
        );
    }
    Ok(())
}

/// Worker loop.  Requests jobs from the controller and executes them until
/// None is received
pub fn worker(
    cfg: &Config,
    ix: usize,
    snd: Sender<JobRequest>,
    recv: Receiver<Option<Job>>,
) -> anyhow::Result<()> {
    debug!("Worker {} starting up", ix);
    snd.send(JobRequest {
        prev_results: Completed::None,
        task_idx: ix,
    })?;

    while let Some(job) = recv.recv()? {
        trace!("Worker {} received job {:?}", ix, job);
        let res = match job {
            Job::Run(rj) => {
                let r = run_job(cfg, &rj);
                Completed::Task(rj.stage, r)
            }
            Job::Wait => {
                thread::sleep(WAIT_DELAY);
                Completed::None
            }
        };
        snd.send(JobRequest {
            prev_results: res,
            task_idx: ix,
        })?;
    }
    debug!("Worker {} closing down", ix);
    Ok(())
}

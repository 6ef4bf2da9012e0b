/// Coordination of jobs between worker tasks
///
/// The pool of worker threads request jobs from and return completions to
/// the controller.  Each worker returns the result of its previous job (if
/// any) and requests a new one.  If no more jobs will become available then
/// None is returned and the worker exits.
///
/// A stage becomes ready when every stage it follows is done.  Its input
/// files are discovered at that point (they are the outputs of the earlier
/// stages), its output directories are created, and one job per input is
/// queued, skipping jobs whose log file is already newer than their
/// dependencies.  Jobs from all ready stages are handed out together, so
/// independent stages overlap.
///
/// A job that fails to launch stops the run: no new jobs are handed out,
/// outstanding ones are drained, and the error is returned.  A job whose
/// child process exits with a non-zero status is only logged by the worker;
/// missing outputs surface when a later stage finds no inputs.
use std::{collections::VecDeque, fs, time::SystemTime};

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};

use crate::{
    config::Config,
    stage::{CommandSpec, Stage, Task, N_STAGES, STAGES},
};

/// A job sent to a worker in response to a JobRequest
#[derive(Debug)]
pub enum Job {
    /// Run the command, capturing its output in the log file
    Run(RunJob),
    /// No job is currently runnable but more will become available
    Wait,
}

#[derive(Debug)]
pub struct RunJob {
    pub stage: Stage,
    pub cmd: CommandSpec,
}

/// The workers send their results back as Completed objects
#[derive(Debug)]
pub enum Completed {
    /// Result of a Run job for the given stage
    Task(Stage, anyhow::Result<()>),
    /// Returned initially and after a Wait job
    None,
}

/// Sent from a worker to request a new job
#[derive(Debug)]
pub struct JobRequest {
    pub prev_results: Completed,
    pub task_idx: usize, // Id of worker (used to select the reply channel)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    Waiting,
    Running,
    Done,
}

/// Dependency bookkeeping for the stages taking part in a run
#[derive(Debug)]
pub struct Schedule {
    active: [bool; N_STAGES],
    state: [StageState; N_STAGES],
}

impl Schedule {
    /// Active set is the target stage plus its transitive predecessors
    pub fn new(target: Stage) -> Self {
        let mut active = [false; N_STAGES];
        let mut stack = vec![target];
        while let Some(s) = stack.pop() {
            if !active[s.index()] {
                active[s.index()] = true;
                stack.extend_from_slice(s.follows());
            }
        }
        Self {
            active,
            state: [StageState::Waiting; N_STAGES],
        }
    }

    pub fn is_active(&self, s: Stage) -> bool {
        self.active[s.index()]
    }

    /// Active stages whose predecessors have all completed and that have
    /// not yet started
    pub fn ready(&self) -> Vec<Stage> {
        STAGES
            .iter()
            .copied()
            .filter(|s| {
                self.active[s.index()]
                    && self.state[s.index()] == StageState::Waiting
                    && s.follows()
                        .iter()
                        .all(|p| self.state[p.index()] == StageState::Done)
            })
            .collect()
    }

    pub fn set_running(&mut self, s: Stage) {
        self.state[s.index()] = StageState::Running
    }

    pub fn set_done(&mut self, s: Stage) {
        self.state[s.index()] = StageState::Done
    }

    pub fn all_done(&self) -> bool {
        STAGES
            .iter()
            .all(|s| !self.active[s.index()] || self.state[s.index()] == StageState::Done)
    }
}

/// A task is up to date when its log file exists and is at least as new as
/// every file it depends on
fn task_up_to_date(task: &Task, cfg: &Config) -> anyhow::Result<bool> {
    let log = task.log_path(cfg);
    let log_time = match fs::metadata(&log).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return Ok(false),
    };
    for dep in task.dep_files(cfg)? {
        let t: Option<SystemTime> = fs::metadata(&dep).and_then(|m| m.modified()).ok();
        match t {
            Some(t) if t <= log_time => (),
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Discover jobs for every stage that has become ready.  Stages that end
/// up with no jobs (nothing discovered, or everything up to date) complete
/// immediately, which can make further stages ready in turn.
fn start_ready_stages(
    cfg: &Config,
    sched: &mut Schedule,
    queue: &mut VecDeque<RunJob>,
    remaining: &mut [usize; N_STAGES],
) -> anyhow::Result<()> {
    let mut progress = true;
    while progress {
        progress = false;
        for stage in sched.ready() {
            sched.set_running(stage);
            for d in stage.output_dirs(cfg) {
                fs::create_dir_all(&d)
                    .with_context(|| format!("Could not create output directory {}", d.display()))?;
            }
            let inputs = stage
                .collect_inputs(cfg)
                .with_context(|| format!("Error collecting input files for stage {}", stage))?;
            if inputs.is_empty() {
                warn!("No input files found for stage {}", stage);
            }
            let n = inputs.len();
            let mut jobs = 0;
            for input in inputs {
                let task = Task::new(stage, input, n);
                if !cfg.force() && task_up_to_date(&task, cfg)? {
                    debug!(
                        "Stage {}: {} is up to date; skipping",
                        stage,
                        task.input().display()
                    );
                    continue;
                }
                queue.push_back(RunJob {
                    stage,
                    cmd: task.command(cfg),
                });
                jobs += 1;
            }
            remaining[stage.index()] = jobs;
            if jobs == 0 {
                info!("Stage {} has nothing to do", stage);
                sched.set_done(stage);
                progress = true;
            } else {
                info!("Starting stage {} with {} job(s)", stage, jobs);
            }
        }
    }
    Ok(())
}

/// Main loop.  Receives messages from the workers and allocates jobs in
/// stage dependency order.  Ends when channel r is closed (i.e., when all
/// workers exit) or on error
pub fn controller(
    cfg: &Config,
    r: Receiver<JobRequest>,
    svec: Vec<Sender<Option<Job>>>,
) -> anyhow::Result<()> {
    debug!("Controller thread starting up");

    let mut sched = Schedule::new(cfg.target());
    for s in STAGES.iter().filter(|s| !sched.is_active(**s)) {
        debug!("Stage {} not needed for target {}", s, cfg.target());
    }
    let mut queue: VecDeque<RunJob> = VecDeque::new();
    let mut remaining = [0usize; N_STAGES];
    let mut failed: Option<anyhow::Error> = None;

    start_ready_stages(cfg, &mut sched, &mut queue, &mut remaining)?;

    while let Ok(jr) = r.recv() {
        trace!("Controller received request {:?}", jr);

        if let Completed::Task(stage, res) = jr.prev_results {
            remaining[stage.index()] -= 1;
            if let Err(e) = res {
                error!("Job in stage {} failed: {:#}", stage, e);
                if failed.is_none() {
                    failed = Some(e)
                }
            } else if remaining[stage.index()] == 0 {
                info!("Stage {} complete", stage);
                sched.set_done(stage);
                if failed.is_none() {
                    if let Err(e) = start_ready_stages(cfg, &mut sched, &mut queue, &mut remaining)
                    {
                        error!("{:#}", e);
                        failed = Some(e)
                    }
                }
            }
        }

        let job = if failed.is_some() {
            // Drain outstanding jobs and let the workers exit
            None
        } else if let Some(j) = queue.pop_front() {
            Some(Job::Run(j))
        } else if !sched.all_done() {
            Some(Job::Wait)
        } else {
            None
        };

        trace!(
            "Controller sending back job {:?} for task {}",
            job,
            jr.task_idx
        );
        svec[jr.task_idx - 1]
            .send(job)
            .expect("Error sending message to task");
    }
    debug!("Controller thread closing down");

    match failed {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

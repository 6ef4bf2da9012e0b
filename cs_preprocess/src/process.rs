use std::thread;

use crossbeam_channel::bounded;

use crate::{config::Config, controller::controller, worker::worker};

/// Create the worker pool and the controller and run the pipeline to
/// completion.  Workers pull jobs from the controller over a shared
/// request channel and each receives its replies on its own channel.
pub fn run_pipeline(cfg: &Config) -> anyhow::Result<()> {
    info!(
        "Starting pipeline for project {} (target stage {}, {} worker(s))",
        cfg.project_name(),
        cfg.target(),
        cfg.threads()
    );

    let res: anyhow::Result<()> = thread::scope(|sc| {
        let nt = cfg.threads();

        // Channel for a worker to request a new job
        let (send_ctrl, recv_ctrl) = bounded(nt * 8);

        // Storage for channels by which a worker receives a new job
        let mut send_job = Vec::with_capacity(nt);

        // Spawn workers
        let join_handles: Vec<_> = (0..nt)
            .map(|ix| {
                let (s, r) = bounded(1);
                send_job.push(s);
                let snd = send_ctrl.clone();
                sc.spawn(move || worker(cfg, ix + 1, snd, r))
            })
            .collect();
        // The controller exits when all request senders are gone
        drop(send_ctrl);

        let control_jh = sc.spawn(move || controller(cfg, recv_ctrl, send_job));

        let mut res = control_jh.join().expect("Controller thread panicked");
        for (ix, jh) in join_handles.into_iter().enumerate() {
            if let Err(e) = jh.join().expect("Worker thread panicked") {
                warn!("Worker {} exited with error: {:#}", ix + 1, e);
                if res.is_ok() {
                    res = Err(e)
                }
            }
        }
        res
    });

    if res.is_ok() {
        info!("Pipeline finished");
    }
    res
}

//! Background timer thread
//!
//! Runs a single-threaded tokio runtime whose only job is to fire the
//! scheduler once per resolution until told to shut down.

use crate::scheduler::Core;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{info, warn};

pub(crate) struct Driver {
    shutdown_tx: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

impl Driver {
    pub(crate) fn spawn(core: Arc<Core>) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let resolution = core.resolution();
        let period = resolution
            .to_std()
            .unwrap_or(std::time::Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("tick-scheduler".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let mut interval = tokio::time::interval(period);
                    // Skip the first tick (immediate)
                    interval.tick().await;

                    loop {
                        tokio::select! {
                            _ = interval.tick() => core.fire(),
                            _ = &mut shutdown_rx => break,
                        }
                    }
                });
            })?;

        info!(%resolution, "Scheduler driver started");
        Ok(Self {
            shutdown_tx,
            thread,
        })
    }

    /// Signal the thread and wait for it, unless called from the thread
    /// itself (the last owner can be dropped inside a firing), in which case
    /// it exits once the current firing returns.
    pub(crate) fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if self.thread.thread().id() == thread::current().id() {
            return;
        }
        if self.thread.join().is_err() {
            warn!("Scheduler driver thread panicked");
        }
        info!("Scheduler driver stopped");
    }
}

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::debug;

use crate::engine::StoreEngine;

use super::cycle::run_cycle;
use super::FlushPhase;

/// Starts the background thread that fires debounced flushes.
pub(crate) fn spawn_worker(engine: Arc<StoreEngine>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("soulstore-flush".into())
        .spawn(move || worker_loop(&engine))
}

fn worker_loop(engine: &StoreEngine) {
    loop {
        let mut st = engine.state.lock();
        if st.worker_stop {
            debug!("store.flush.worker_exit");
            break;
        }
        if !st.timer.is_due(Instant::now()) {
            // A flush on another thread notifies when it completes.
            let deadline = match st.timer.phase() {
                FlushPhase::Flushing => None,
                _ => st.timer.deadline(),
            };
            match deadline {
                Some(deadline) => {
                    engine.wakeup.wait_until(&mut st, deadline);
                }
                None => engine.wakeup.wait(&mut st),
            }
            continue;
        }

        let generation = st.timer.generation();
        let nothing_to_ack = st.batch.pending().is_empty();
        drop(st);

        if nothing_to_ack && engine.pipeline.in_flight() {
            let mut st = engine.state.lock();
            if st.timer.generation() == generation {
                st.timer.defer(Instant::now(), engine.options.busy_retry);
                debug!(
                    retry_ms = engine.options.busy_retry.as_millis() as u64,
                    "store.flush.deferred_busy"
                );
            }
            continue;
        }

        run_cycle(engine);
    }
}

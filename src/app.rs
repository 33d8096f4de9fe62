//! Pipeline orchestration: wire the three threads, run, shut down in order.
//!
//! Shutdown is a domino triggered by SIGINT/SIGTERM: the receiver stops
//! and drops the input sender; the processing thread drains the backlog
//! and drops the tape; the output thread drains the tape and exits. Each
//! stage finishes its in-flight work before the next one learns anything.

use std::io;
use std::thread;

use crossbeam_channel::unbounded;

use crate::config::Config;
use crate::engine::Engine;
use crate::ingress::UdpReceiver;
use crate::output::{self, Tape};

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the pipeline until a termination signal arrives. Returns after
    /// all three threads have drained and joined.
    pub fn run(self) -> io::Result<()> {
        let (out_tx, out_rx) = unbounded();
        let (in_tx, in_rx) = unbounded();

        let receiver = UdpReceiver::bind(self.config.port)?;
        let port = receiver.local_addr()?.port();
        let stop = receiver.stop_handle()?;

        ctrlc::set_handler(move || stop.stop())
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

        let output_thread = output::spawn_writer(out_rx)?;

        let engine = Engine::new(self.config.clone(), Tape::new(out_tx));
        let processing_thread = thread::Builder::new()
            .name("processing".into())
            .spawn(move || engine.run(in_rx))?;

        let receiver_thread = thread::Builder::new()
            .name("receiver".into())
            .spawn(move || receiver.run(in_tx))?;

        tracing::info!(port, "engine ready");

        // The receiver blocks in the kernel until the signal handler's
        // stop handle unblocks it; joining it is our wait-for-shutdown.
        receiver_thread
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "receiver thread panicked"))?;
        processing_thread
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "processing thread panicked"))?;
        output_thread
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output thread panicked"))?;

        tracing::info!("shutdown complete");
        Ok(())
    }
}

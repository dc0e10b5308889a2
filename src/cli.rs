use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "batchd")]
#[command(about = "Self-hosted OpenAI-compatible batch inference control plane", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API, scheduler, heartbeat, and webhook dispatcher in
    /// one process (default single-GPU-box deployment).
    Serve,

    /// Run only the scheduler loop, heartbeat, and webhook dispatcher
    /// against a shared store directory, for operators who split the API
    /// and scheduler into separate processes.
    Scheduler,
}

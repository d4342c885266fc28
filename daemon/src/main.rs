use anyhow::Result;
use log::info;
use shared::Config;
use std::sync::Arc;

mod command;
mod controller;
mod daemon;
mod diagnostics;
mod runner;

use crate::daemon::Daemon;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting siglog daemon");

    let config = Config::load()?;
    let socket_path = config.ipc.socket_path.clone();
    info!(
        "Capture tool {:?}, output under {:?}",
        config.capture.executable_path(),
        config.capture.base_log_path
    );

    let daemon = Arc::new(Daemon::new(config)?);
    daemon.serve(&socket_path).await
}

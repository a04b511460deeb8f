use anyhow::Context;
use liso::config::{Config, USAGE};
use liso::server::Server;
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

fn main() -> anyhow::Result<ExitCode> {
    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("lisod: {}\n\n{}", e, USAGE);
            return Ok(ExitCode::FAILURE);
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(cfg.log_level);
    match &cfg.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            subscriber
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => subscriber.with_writer(std::io::stderr).init(),
    }

    if let Some(port) = cfg.https_port {
        tracing::warn!(port, "HTTPS is not supported; only plain HTTP is served");
    }

    let addr = cfg.listen_addr();
    let mut server = Server::bind(cfg).with_context(|| format!("cannot listen on {}", addr))?;
    server.run().context("event loop failed")?;

    Ok(ExitCode::SUCCESS)
}

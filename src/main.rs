use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

mod config;
use config::ServerConfig;

mod consumer;
use consumer::Consumer;

mod events;
mod queue;
mod webhooks;

#[derive(Parser)]
#[clap(version = "0.1")]
struct Opts {
    /// Configuration file for hookrelay
    #[clap(short, long, parse(from_os_str))]
    config: PathBuf,
    /// Command to run for each received event; the event's owner, repo,
    /// branch and commit are appended as arguments. Events are printed to
    /// stdout when no command is given.
    command: Vec<String>,
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();
    let config_file = File::open(&opts.config)
        .with_context(|| format!("couldn't open {}:", opts.config.display()))?;
    let config: ServerConfig = serde_yaml::from_reader(BufReader::new(config_file))
        .context("couldn't parse config file")?;
    config.validate().context("invalid config")?;

    let (sender, receiver) = queue::dispatch_queue();

    let consumer = Consumer::new(opts.command);
    tokio::spawn(async move { consumer.run(receiver).await });

    let rocket = webhooks::rocket(config, sender);
    rocket.launch().await.map(|_| ()).map_err(|err| anyhow::anyhow!(err))
}

use std::{fs::File, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use env_logger::Target;
use pmilib::{
    cfg::{Config, Network, Refresh, Settings},
    plumbing,
};

/// Generate producer map info: where every block producer's nodes are, per country and as map
/// markers.
#[derive(Parser, Debug)]
#[clap(about)]
struct Cli {
    #[clap(flatten)]
    network: NetworkArgs,

    /// Refresh the producers cache (implies --bpjsons and --logos)
    #[clap(long, short = 'p')]
    producers: bool,

    /// Refresh the bp.json caches (implies --logos)
    #[clap(long, short = 'b')]
    bpjsons: bool,

    /// Refresh the logo caches
    #[clap(long, short = 'l')]
    logos: bool,

    /// Write the log to this file instead of stdout
    #[clap(long, short = 'o')]
    output: Option<PathBuf>,

    /// TOML file with endpoint, cache and timeout settings
    #[clap(long, short = 'c')]
    config: Option<PathBuf>,

    /// Directory the caches and generated files live in
    #[clap(long)]
    dir: Option<PathBuf>,

    #[clap(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct NetworkArgs {
    /// Use the main network
    #[clap(long, short = 'm')]
    mainnet: bool,

    /// Use the test network
    #[clap(long, short = 't')]
    testnet: bool,
}

impl NetworkArgs {
    fn network(&self) -> Network {
        if self.testnet {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let target = match &cli.output {
        Some(path) => Target::Pipe(Box::new(
            File::create(path).context(format!("Cannot create {}", path.display()))?,
        )),
        None => Target::Stdout,
    };
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("pmilib", cli.verbose.log_level_filter())
        .filter_module("genpmi", cli.verbose.log_level_filter())
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .target(target)
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut config = match &cli.config {
        Some(file) => Config::from_file(file).await?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.dir {
        config.base_dir = dir.clone();
    }
    let refresh = Refresh::new(cli.producers, cli.bpjsons, cli.logos);
    let settings = Settings::new(cli.network.network(), config, refresh);

    plumbing::run(&settings).await?;
    Ok(())
}

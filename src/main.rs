use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use structopt::StructOpt;
use tracing::{debug, info};

use ucihost::cancel::CancelToken;
use ucihost::config::Config;
use ucihost::pool::{Pool, ProcessEngineFactory};
use ucihost::uci::Limit;

#[derive(Debug, StructOpt)]
#[structopt(name = "ucihost", about = "UCI chess engine driver")]
struct Opt {
    /// Config file
    #[structopt(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Name of the engine (as registered in the config file) to query
    #[structopt(short, long)]
    engine: String,

    /// Position to search from, in FEN. Defaults to the standard starting position.
    #[structopt(long)]
    fen: Option<String>,

    /// Search depth, in plies.
    #[structopt(long, default_value = "12")]
    depth: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();
    debug!(?opt, "ucihost started");

    let raw_config = std::fs::read_to_string(&opt.config)
        .wrap_err_with(|| format!("reading config file {:?}", opt.config))?;
    let config: Config = toml::from_str(&raw_config).wrap_err("parsing config file")?;

    let mut pool = Pool::new(config.pool.capacity);
    for (name, engine) in &config.engines {
        pool.register(
            name.clone(),
            Arc::new(ProcessEngineFactory { spec: engine.to_process_spec() }),
        );
    }

    let session = pool
        .checkout(&opt.engine, CancelToken::never())
        .await
        .wrap_err_with(|| format!("checking out engine {:?}", opt.engine))?;

    session
        .set_position(opt.fen.as_deref(), &[], CancelToken::never())
        .await?;

    let best_move = session
        .get_best_move(Limit::Depth(opt.depth), CancelToken::never())
        .await?;

    info!(best_move, "search complete");
    println!("{best_move}");

    session.dispose().await?;

    Ok(())
}

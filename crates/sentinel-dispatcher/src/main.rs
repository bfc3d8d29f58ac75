use anyhow::Result;
use clap::Parser as _;
use sentinel_dispatcher::config::Config;

fn main() -> Result<()> {
    let config = Config::parse();
    let log = sentinel_util::log::logger(config.log_level);
    sentinel_dispatcher::run(config, log)
}

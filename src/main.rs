use std::process::ExitCode;

use anyhow::{anyhow, Result};

mod cache;
mod cli;
mod compress;
mod config;
mod digest;
mod loader;
mod parser;
mod repo;
mod scan;
mod sign;
#[cfg(test)]
mod testutil;
mod version;
mod writer;

use config::{Action, ColorScheme, Config};

fn main() -> Result<ExitCode> {
    let argv: Vec<String> = std::env::args().collect();
    let args: cli::Args = argh::from_env();
    env_logger::init();

    if args.version {
        println!("repoman {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let action = cli::resolve_action(&argv)
        .ok_or_else(|| anyhow!("no action specified (-U, -R, -Q or -V)"))?;
    let db_path = args.db_path().ok_or_else(|| anyhow!("not enough arguments"))?;
    let targets = args.targets().to_vec();
    let config = Config {
        action,
        clean: args.clean,
        info: args.info,
        sign: args.sign,
        files: args.files,
        key: args.key,
        colstr: ColorScheme::new(args.color),
    };

    let mut repo = repo::find_repo(&db_path, &config)?;

    let rc = match config.action {
        Action::Verify => repo.verify(),
        Action::Update => repo.update(&config, &targets)?,
        Action::Remove => repo.remove(&config, &targets)?,
        Action::Query => repo.query(&config, &targets)?,
    };

    // only the mutating actions rewrite the index
    if matches!(config.action, Action::Update | Action::Remove) {
        repo.flush(&config)?;
    }

    Ok(if rc == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

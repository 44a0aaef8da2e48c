mod backend;
mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Compile(args) => {
            let config = run::load_config(cli.config.as_deref())?;
            run::run_compile(args, &config)
        }
        Command::Replay(args) => {
            let config = run::load_config(cli.config.as_deref())?;
            run::run_replay(args, &config)
        }
        Command::Where => run::run_where(cli.config.as_deref()),
    }
}

use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use archivist::cli::{Cli, Command, ConfigCommand, UserCommand};
use archivist::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let config = Config::load(&args.config)?;
            archivist::logging::init(&config.log_level).context("init logging")?;
            tracing::debug!(?config, "loaded config");
            archivist::server::run(config).await.context("serve")?;
        }
        Command::User {
            command: UserCommand::Create(args),
        } => {
            archivist::logging::init("warn").context("init logging")?;
            archivist::admin::create_user(args)
                .await
                .context("user create")?;
        }
        Command::User {
            command: UserCommand::Delete(args),
        } => {
            archivist::logging::init("warn").context("init logging")?;
            archivist::admin::delete_user(args)
                .await
                .context("user delete")?;
        }
        Command::Config {
            command: ConfigCommand::Default,
        } => {
            print!("{}", Config::default_yaml()?);
        }
    }

    Ok(())
}

use std::io;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, error::ErrorKind};
use tracing_subscriber::EnvFilter;

use kvmhv::app;
use kvmhv::cli::{Cli, Commands};
use kvmhv::resolve_driver_config;

const LOG_ENV: &str = "KVMHV_LOG";

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(64),
            };
        }
    };

    init_tracing();

    let Cli {
        config,
        json,
        command,
    } = cli;

    let command = match command {
        Some(cmd) => cmd,
        None => {
            let mut command = Cli::command();
            let _ = command.print_help();
            println!();
            return ExitCode::from(64);
        }
    };

    let load = || resolve_driver_config(config.as_deref());
    let exit = match command {
        Commands::Start(args) => load().and_then(|c| app::handle_start(args, c)).map(success),
        Commands::Stop(args) => load().and_then(|c| app::handle_stop(args, c)).map(success),
        Commands::Reboot(args) => load().and_then(|c| app::handle_reboot(args, c)).map(success),
        Commands::Console(args) => load().and_then(|c| app::handle_console(args, c)).map(success),
        Commands::Info(args) => load().and_then(|c| app::handle_info(args, c, json)).map(success),
        Commands::List => load().and_then(|c| app::handle_list(c, json)).map(success),
        Commands::NodeInfo => load().and_then(|c| app::handle_node_info(c, json)).map(success),
        Commands::Verify => load().and_then(app::handle_verify),
        Commands::Validate(args) => app::handle_validate(args).map(success),
    };

    match exit {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            app::exit_code(&err)
        }
    }
}

fn success(_: ()) -> ExitCode {
    ExitCode::SUCCESS
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

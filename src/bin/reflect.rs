//! Reflect Client Binary
//!
//! Formats one command for the daemon, sends it over the relay and prints the
//! reply.

use clap::Parser;
use reflect::cli::ClientCli;
use reflect::client::send_command;
use reflect::config::ConfigLoader;
use reflect::executor::Reply;
use reflect::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{debug, error};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = ClientCli::parse();

    let config = ConfigLoader::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        process::exit(1);
    });

    let mut logging = if cli.verbose {
        config.logging.clone()
    } else {
        LoggingConfig::default()
    };
    if !cli.verbose {
        logging.level = "off".to_string();
    }
    if let Err(e) = init_logging(Some(&logging)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let cwd = std::env::current_dir().unwrap_or_default();
    let line = cli.command.to_line(&cwd);
    let addr = cli.addr.unwrap_or(config.daemon.listen_addr);
    debug!(addr = %addr, command = %line, "Sending command");

    match send_command(&addr, &line).await {
        Ok(Reply::Success) => println!("{}", Reply::Success),
        Ok(Reply::Fail) => {
            println!("{}", Reply::Fail);
            process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Command not delivered");
            eprintln!("{}", e);
            process::exit(2);
        }
    }
}

use clap::Parser;
use dotenvy::dotenv;
use log::*;
use recon_server::{
    cli::{handle_command, Arguments, Command},
    config::ServerConfig,
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let command = args.command.unwrap_or(Command::Run);
    let config = ServerConfig::from_env_or_default();
    if matches!(command, Command::Run) {
        info!("🚀️ Starting the reconciliation daemon");
    }
    match handle_command(command, config).await {
        Ok(()) => debug!("Bye!"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        },
    }
}

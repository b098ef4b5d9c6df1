use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_etl(config_path: &str) -> anyhow::Result<()> {
    let summary = datalake::run_etl_pipeline(config_path)
        .await
        .with_context(|| format!("ETL run with config '{}' failed", config_path))?;

    for table in &summary.tables {
        println!("{:<10} {:>10} rows  {:>4} files", table.table, table.rows, table.files);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = Command::new("Data Lake ETL")
        .version("1.0")
        .about("Builds the song-play star schema from raw JSON logs")
        .subcommand(
            Command::new("etl")
                .about("Run the song catalog and event log pipeline")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("json-logs")
                        .long("json-logs")
                        .action(ArgAction::SetTrue)
                        .help("Emit logs as JSON lines"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("etl", etl_matches)) => {
            init_logging(etl_matches.get_flag("json-logs"));
            let config_path = etl_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/datalake.toml");
            info!(config = config_path, "Starting ETL pipeline");

            if let Err(e) = run_etl(config_path).await {
                error!("{:#}", e);
                process::exit(1);
            }
        }
        _ => {
            eprintln!("Please specify a valid subcommand. Use --help for usage information.");
            process::exit(1);
        }
    }
}

use clap::Parser;
use haze::{DehazeConfig, quantize};
use std::{fs, path::PathBuf};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Optional JSON configuration. Missing fields use the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print a one-line summary per table instead of JSON.
    #[arg(long)]
    summary: bool,
}

fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path).expect("failed to read config");
            serde_json::from_str(&json).expect("failed to parse config")
        }
        None => DehazeConfig::default(),
    };

    let contracts = quantize::contracts(&config).expect("configuration has no valid tables");
    match args.summary {
        true => contracts.iter().for_each(|c| println!("{c}")),
        false => println!("{}", serde_json::to_string_pretty(&contracts).unwrap()),
    }
}

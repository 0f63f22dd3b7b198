use std::{path::PathBuf, process};

use clap::Parser;
use env_logger::Env;
use featplot::{FeatPlotResult, FeatureMatrix, RenderOptions, save_heatmap};

#[derive(Parser, Debug)]
#[command(name = "featplot")]
#[command(about = "Render a binary feature file as a heat-map image")]
#[command(version)]
struct Args {
    /// Binary feature file to read
    #[arg(short = 'i', long = "input_file_name")]
    input_file_name: PathBuf,

    /// PNG file to write
    #[arg(short = 'o', long = "output_file_name")]
    output_file_name: PathBuf,

    /// Pixels per matrix cell along each axis
    #[arg(long, default_value_t = 1)]
    scale: u32,
}

fn run(args: &Args) -> FeatPlotResult<()> {
    let mut matrix = FeatureMatrix::open(&args.input_file_name)?;
    matrix.zero_first_column();

    let options = RenderOptions { scale: args.scale };
    save_heatmap(&matrix, &options, &args.output_file_name)
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::debug!("{:?}", args);

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

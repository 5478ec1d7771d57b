use clap::Parser;
use haze::prelude::*;
use image::{ExtendedColorType, ImageReader};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the hazy input image.
    #[arg(long)]
    image: PathBuf,

    /// Path to write the dehazed image to.
    #[arg(short, long)]
    output: PathBuf,

    /// Optional JSON configuration. Missing fields use the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the haze removal strength.
    #[arg(long)]
    omega: Option<f64>,

    /// Optional path to write the refined transmission map to.
    #[arg(long)]
    transmission: Option<PathBuf>,

    /// Optional path to write the edge map to.
    #[arg(long)]
    edges: Option<PathBuf>,
}

fn main() {
    // Register an event subscriber that prints events to STDOUT.
    let subscriber = tracing_subscriber::FmtSubscriber::new();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path).expect("failed to read config");
            serde_json::from_str(&json).expect("failed to parse config")
        }
        None => DehazeConfig::default(),
    };
    if let Some(omega) = args.omega {
        config = config.with_omega(omega);
    }

    let raw_image = ImageReader::open(&args.image)
        .expect("failed to read input image")
        .decode()
        .expect("failed to decode input image")
        .into_rgb8();

    info!("decoded input image");

    let (width, height) = raw_image.dimensions();
    let hazy = RgbImage::from_rgb8(raw_image.as_raw(), height as usize, width as usize)
        .expect("decoded image is rectangular");

    let (corrected, diagnostics) = dehaze(&hazy, &config).expect("failed to dehaze image");
    info!(
        light = ?diagnostics.atmospheric_light.color(),
        timings = ?diagnostics.timings,
        "dehazed image"
    );

    image::save_buffer(
        &args.output,
        &corrected.to_rgb8(),
        width,
        height,
        ExtendedColorType::Rgb8,
    )
    .expect("failed to write output image");

    if let Some(path) = &args.transmission {
        save_gray(path, diagnostics.refined_transmission.map(), |t| *t);
    }

    if let Some(path) = &args.edges {
        match &diagnostics.edges {
            Some(edges) => save_gray(path, edges.map(), |class| class.index() as f64 / 2.),
            None => info!("transmission policy computes no edge map"),
        }
    }
}

/// Write `map` as an 8-bit grayscale image, mapping each cell to [0, 1] with `level`.
fn save_gray<T>(path: &Path, map: &Grid<T>, level: impl Fn(&T) -> f64) {
    let bytes: Vec<u8> = map
        .as_slice()
        .iter()
        .map(|cell| (level(cell).clamp(0.0, 1.0) * 255.).round() as u8)
        .collect();

    image::save_buffer(
        path,
        &bytes,
        map.cols() as u32,
        map.rows() as u32,
        ExtendedColorType::L8,
    )
    .expect("failed to write map");
}

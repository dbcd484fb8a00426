use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use image::{Rgb, RgbImage};
use log::info;

use haar_cascade::{
    train, train_more, Cascade, ConsoleLogger, DirSampleSource, DualImage, Error, IntegralImage,
    Match, Requirements, Result, ScanParams,
};

/// Layers of the default training schedule: a few permissive layers to
/// thin the negatives, then stricter ones over the survivors.
const EARLY_LAYERS: usize = 4;
const LATE_LAYERS: usize = 7;
const DEFAULT_INITIAL_RETENTION: f64 = 0.99;

/// Feature budget when appending a single layer by hand.
const ADDLAYER_MAX_FEATURES: usize = 1000;

/// Fraction of the smaller rectangle two detections must share to be
/// merged into one.
const OVERLAP_THRESHOLD: f64 = 0.7;

#[derive(Parser)]
#[command(about = "Train and run Haar feature cascade classifiers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a new cascade from directories of samples
    Train {
        /// Directory of positive samples, all of one size
        pos_dir: PathBuf,
        /// Directory of background images
        neg_dir: PathBuf,
        /// Where to write the cascade JSON
        output_file: PathBuf,
        /// Positive retention of the very first layer
        initial_retention: Option<f64>,
    },
    /// Append one layer to an existing cascade
    Addlayer {
        pos_dir: PathBuf,
        neg_dir: PathBuf,
        /// Cascade JSON, rewritten in place
        cascade_file: PathBuf,
        /// Positive retention for the new layer
        retention: f64,
        /// Negative exclusion for the new layer
        exclusion: f64,
    },
    /// Scan an image with a cascade and annotate the detections
    Detect {
        cascade_file: PathBuf,
        input_image: PathBuf,
        output_image: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = err.print();
            return code;
        }
    };

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Train {
            pos_dir,
            neg_dir,
            output_file,
            initial_retention,
        } => run_train(
            &pos_dir,
            &neg_dir,
            &output_file,
            initial_retention.unwrap_or(DEFAULT_INITIAL_RETENTION),
        ),
        Command::Addlayer {
            pos_dir,
            neg_dir,
            cascade_file,
            retention,
            exclusion,
        } => run_addlayer(&pos_dir, &neg_dir, &cascade_file, retention, exclusion),
        Command::Detect {
            cascade_file,
            input_image,
            output_image,
        } => run_detect(&cascade_file, &input_image, &output_image),
    }
}

fn run_train(
    pos_dir: &Path,
    neg_dir: &Path,
    output_file: &Path,
    initial_retention: f64,
) -> Result<()> {
    info!("Loading samples ...");
    let samples = DirSampleSource::load(pos_dir, neg_dir)?;

    let mut requirements = vec![
        Requirements {
            positive_retention: 0.995,
            negative_exclusion: 0.6,
            max_features: 100,
        };
        EARLY_LAYERS
    ];
    requirements.extend(
        std::iter::repeat(Requirements {
            positive_retention: 1.0,
            negative_exclusion: 0.8,
            max_features: 100,
        })
        .take(LATE_LAYERS),
    );
    requirements[0].positive_retention = initial_retention;

    let cascade = train(&requirements, &samples, &ConsoleLogger)?;

    fs::write(output_file, serde_json::to_vec(&cascade)?)?;
    Ok(())
}

fn run_addlayer(
    pos_dir: &Path,
    neg_dir: &Path,
    cascade_file: &Path,
    retention: f64,
    exclusion: f64,
) -> Result<()> {
    let mut cascade: Cascade =
        serde_json::from_str(&fs::read_to_string(cascade_file)?)?;

    info!("Loading samples ...");
    let samples = DirSampleSource::load(pos_dir, neg_dir)?;

    if let Some(actual) = samples.window_size() {
        let expected = (cascade.window_width, cascade.window_height);
        if !cascade.layers.is_empty() && actual != expected {
            return Err(Error::WindowMismatch { expected, actual });
        }
    }

    info!("Adding layer ...");
    let requirements = [Requirements {
        positive_retention: retention,
        negative_exclusion: exclusion,
        max_features: ADDLAYER_MAX_FEATURES,
    }];
    train_more(&mut cascade, &requirements, &samples, &ConsoleLogger)?;

    fs::write(cascade_file, serde_json::to_vec(&cascade)?)?;
    Ok(())
}

fn run_detect(cascade_file: &Path, input_image: &Path, output_image: &Path) -> Result<()> {
    let cascade: Cascade =
        serde_json::from_str(&fs::read_to_string(cascade_file)?)?;

    let decoded = image::open(input_image)?;
    let rgb = decoded.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let pixels: Vec<f64> = rgb
        .pixels()
        .map(|p| (p[0] as f64 + p[1] as f64 + p[2] as f64) / (3.0 * 255.0))
        .collect();
    let dual = DualImage::new(&IntegralImage::from_bitmap(&pixels, width, height)?);

    let matches = cascade
        .scan(&dual, ScanParams::default())
        .join_overlaps(OVERLAP_THRESHOLD);
    info!("Found {} matches.", matches.len());

    let mut annotated = rgb;
    for m in matches.iter() {
        draw_match(&mut annotated, m);
    }
    annotated.save(output_image)?;
    Ok(())
}

/// Draws a one-pixel red outline of the match.
fn draw_match(img: &mut RgbImage, m: &Match) {
    let color = Rgb([0xff, 0x00, 0x00]);
    let (left, top) = (m.x as u32, m.y as u32);
    let right = (m.x + m.width) as u32 - 1;
    let bottom = (m.y + m.height) as u32 - 1;
    for x in left..=right {
        img.put_pixel(x, top, color);
        img.put_pixel(x, bottom, color);
    }
    for y in top..=bottom {
        img.put_pixel(left, y, color);
        img.put_pixel(right, y, color);
    }
}

use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use flexi_logger::Logger;
use image::{ImageReader, RgbImage};
use log::info;
use target_align::cli::{CliArgs, CliError, USAGE};
use target_align::{MatchesWriter, ObserverSet, OverlayWriter, TargetFinder, TargetFinderStrategy};
use target_core::init_thread_pool;

fn main() -> ExitCode {
    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(CliError::HelpRequested) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> anyhow::Result<()> {
    let _logger = Logger::try_with_str(&args.log_level)
        .context("invalid log specification")?
        .start()?;

    let config = args.load_config().context("failed to load configuration")?;
    info!("{}", config.summary());
    if let Err(e) = init_thread_pool(config.threads) {
        log::warn!("using the existing thread pool: {}", e);
    }

    let scene = load_rgb(&args.scene)?;
    let reference = load_rgb(&args.reference)?;
    info!(
        "scene {}x{}, reference {}x{}",
        scene.width(),
        scene.height(),
        reference.width(),
        reference.height()
    );

    let finder = TargetFinder::new(TargetFinderStrategy::FeatureMatch(config));
    let mut observers = ObserverSet::default();
    if let Some(path) = &args.matches {
        observers.push(MatchesWriter::new(path));
    }
    if let Some(path) = &args.overlay {
        observers.push(OverlayWriter::new(path));
    }

    let t0 = Instant::now();
    let result = finder
        .process_with(&reference, &scene, &mut observers)
        .context("alignment failed")?;
    println!("Time taken: {:.2?}", t0.elapsed());

    let [tl, tr, br, bl] = result.corners;
    println!(
        "Corners: ({}, {}) ({}, {}) ({}, {}) ({}, {})",
        tl.x, tl.y, tr.x, tr.y, br.x, br.y, bl.x, bl.y
    );
    println!("Image Similarity: {:.2}", result.similarity);

    result
        .aligned
        .save(&args.aligned)
        .with_context(|| format!("failed to write {}", args.aligned.display()))?;
    println!("Saved aligned image as {}", args.aligned.display());
    Ok(())
}

fn load_rgb(path: &Path) -> anyhow::Result<RgbImage> {
    let img = ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(img.to_rgb8())
}

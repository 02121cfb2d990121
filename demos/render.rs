use anyhow::{bail, Context, Error};

use binorbit::dataset::{Dataset, WavPairDataset};
use binorbit::progress::{CancelToken, Stage};
use binorbit::render::Renderer;

use std::env;
use std::path::Path;

// One full turn around the head, in seconds
const ROTATION_PERIOD: f64 = 10.0;
// Audio convolved with a single HRIR, in seconds
const BLOCK_DURATION: f64 = 0.1;

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 4 {
        bail!("Usage: {} INPUT_WAV OUTPUT_WAV HRIR_DIR|SOFA_FILE", args[0].clone());
    }

    let input = &args[1];
    let output = &args[2];
    let hrirs = Path::new(&args[3]);

    let renderer = Renderer::builder()
        .with_block_duration(BLOCK_DURATION)
        .with_rotation_period(ROTATION_PERIOD)
        .build()?;

    if hrirs.is_dir() {
        let dataset = WavPairDataset::open(hrirs).context("Open HRIR directory failed")?;
        run(&renderer, input, output, &dataset)
    } else {
        open_sofa(&renderer, input, output, hrirs)
    }
}

#[cfg(feature = "sofa")]
fn open_sofa(renderer: &Renderer, input: &str, output: &str, path: &Path) -> Result<(), Error> {
    let dataset = binorbit::dataset::SofaDataset::open(path).context("Open sofa file failed")?;
    run(renderer, input, output, &dataset)
}

#[cfg(not(feature = "sofa"))]
fn open_sofa(_: &Renderer, _: &str, _: &str, path: &Path) -> Result<(), Error> {
    bail!("{} is not a directory and SOFA support is disabled", path.display())
}

fn run<D: Dataset>(renderer: &Renderer, input: &str, output: &str, dataset: &D) -> Result<(), Error> {
    println!(
        "Dataset: {} directions, {} taps at {} Hz",
        dataset.len(),
        dataset.filter_len(),
        dataset.sample_rate()
    );

    let progress = |stage: Stage, percent: u8| println!("{stage:?}: {percent}%");

    renderer
        .render_file_with(input, output, dataset, &progress, &CancelToken::new())
        .context("Render failed")?;

    Ok(())
}

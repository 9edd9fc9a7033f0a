//! kepubify - converts EPUB files to Kobo KePub files and back

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use clap::Parser;
use env_logger::Env;

use lib_kepub::{InputConfig, KepubError, KepubOperations, Kepubify, OutputConfig};

#[derive(Parser)]
#[command(name = "kepubify")]
#[command(version, about = "Converts EPUB files to Kobo KePub files", long_about = None)]
#[command(after_help = "EXAMPLES:
    kepubify book.epub book.kepub.epub              Convert EPUB to KePub
    kepubify --reverse book.kepub.epub book.epub    Convert KePub back to EPUB
    kepubify --info book.epub                       Show book metadata")]
struct Cli {
    /// Input file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file
    #[arg(value_name = "OUTPUT", required_unless_present = "info")]
    output: Option<PathBuf>,

    /// Show book metadata without converting
    #[arg(short, long)]
    info: bool,

    /// Convert a KePub file back to a plain EPUB file
    #[arg(short, long)]
    reverse: bool,

    /// Do not add the hyphenation stylesheet
    #[arg(long)]
    no_hyphenate: bool,

    /// Force hyphenation off on the device
    #[arg(long)]
    disable_hyphenation: bool,

    /// Skip the markup cleanup
    #[arg(long)]
    no_clean: bool,

    /// Add the Kobo layout style hacks
    #[arg(long)]
    style_hacks: bool,

    /// Replace straight quotes, dashes and ellipses with typographic ones
    #[arg(long)]
    smarten_punctuation: bool,

    /// Skip content documents that fail to convert
    #[arg(long)]
    skip_failed: bool,

    /// Fail on DRM-encumbered files instead of copying them unchanged
    #[arg(long)]
    reject_drm: bool,

    /// Script to inject into every content document
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Directory receiving a copy of the converted file
    #[arg(long, value_name = "DIR")]
    copy_dir: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Only print warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let result = match (&cli.output, cli.info) {
        (_, true) => show_info(&cli),
        (Some(output), false) if cli.reverse => convert_from(&cli, output),
        (Some(output), false) => convert_to(&cli, output),
        (None, false) => Err(KepubError::ResourceNotFound {
            resource: "OUTPUT".to_string(),
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn show_info(cli: &Cli) -> Result<(), KepubError> {
    let data = fs::read(&cli.input)?;
    let metadata = Kepubify::new().read_metadata(&data)?;

    println!("File: {}", cli.input.display());
    if let Some(title) = &metadata.title {
        println!("Title: {title}");
    }
    if !metadata.authors.is_empty() {
        println!("Authors: {}", metadata.authors.join(", "));
    }
    if let Some(language) = &metadata.language {
        println!("Language: {language}");
    }
    if let Some(series) = &metadata.series {
        match metadata.series_index {
            Some(index) => println!("Series: {series} #{index}"),
            None => println!("Series: {series}"),
        }
    }
    for (scheme, value) in &metadata.identifiers {
        println!("Identifier ({scheme}): {value}");
    }
    for (name, value) in &metadata.custom {
        println!("{name}: {value}");
    }

    Ok(())
}

fn convert_to(cli: &Cli, output: &Path) -> Result<(), KepubError> {
    let mut config = OutputConfig::new();
    config
        .set_hyphenate(!cli.no_hyphenate)
        .set_disable_hyphenation(cli.disable_hyphenation)
        .set_clean_markup(!cli.no_clean)
        .set_style_hacks(cli.style_hacks)
        .set_smarten_punctuation(cli.smarten_punctuation)
        .set_best_effort(cli.skip_failed)
        .set_reject_drm_encumbered(cli.reject_drm);
    if let Some(script) = &cli.script {
        config.set_kobo_script(fs::read(script)?);
    }
    if let Some(copy_dir) = &cli.copy_dir {
        config.set_copy_dir(copy_dir.clone());
    }
    if let Some(seconds) = cli.timeout {
        config.set_timeout(Duration::from_secs(seconds));
    }

    let report = Kepubify::new().convert_file(&cli.input, output, &config)?;
    log::info!(
        "{} written, {} spans added, {} documents skipped",
        output.display(),
        report.spans_added,
        report.skipped.len()
    );

    Ok(())
}

fn convert_from(cli: &Cli, output: &Path) -> Result<(), KepubError> {
    let mut config = InputConfig::new();
    config
        .set_clean_markup(!cli.no_clean)
        .set_best_effort(cli.skip_failed)
        .set_reject_drm_encumbered(cli.reject_drm);
    if let Some(seconds) = cli.timeout {
        config.set_timeout(Duration::from_secs(seconds));
    }

    let data = fs::read(&cli.input)?;
    let outcome = Kepubify::new().convert_from_kepub(&data, &config)?;
    fs::write(output, &outcome.data)?;
    log::info!(
        "{} written, {} Kobo markers removed",
        output.display(),
        outcome.report.markers_removed
    );

    Ok(())
}

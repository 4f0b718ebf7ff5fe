use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use dceassist::{
    config::Config,
    logging,
    processing::{AnalysisPipeline, SUMMARY_FILE_NAME, SourceDocument},
};

#[derive(Parser)]
#[command(
    name = "dce-summarize",
    about = "Summarize tender PDFs into a single synthesis PDF"
)]
struct Cli {
    /// PDF files to analyze, in order.
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Destination of the generated PDF.
    #[arg(long, short, default_value = SUMMARY_FILE_NAME)]
    output: PathBuf,
    /// Print the Markdown synthesis on stdout.
    #[arg(long)]
    print: bool,
    /// Log pipeline progress at debug level.
    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init_cli_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("invalid configuration")?;
    let documents = cli
        .files
        .iter()
        .map(|path| source_document(path))
        .collect::<Result<Vec<_>>>()?;

    let pipeline = AnalysisPipeline::from_config(&config).context("failed to build LLM client")?;
    let workdir = tempfile::tempdir().context("failed to create working directory")?;
    let outcome = pipeline
        .analyze(documents, workdir.path().to_path_buf())
        .await
        .context("analysis failed")?;

    if let Some(parent) = cli.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::copy(&outcome.pdf_path, &cli.output)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    for report in &outcome.documents {
        eprintln!(
            "{}: {} pages ({} OCR, {} after retry, {} via pdftotext), {}/{} chunks answered",
            report.name,
            report.pages,
            report.ocr_pages,
            report.ocr_retries,
            report.pdftotext_pages,
            report.chunk_outputs,
            report.chunks
        );
    }
    eprintln!("PDF written to {}", cli.output.display());
    if cli.print {
        println!("{}", outcome.summary_markdown);
    }
    Ok(())
}

fn source_document(path: &Path) -> Result<SourceDocument> {
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        bail!("Seuls les PDF sont acceptés: {}", path.display());
    }
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(SourceDocument {
        name,
        path: path.to_path_buf(),
    })
}

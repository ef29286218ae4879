//! adamus-ingest CLI entry point

use adamus_ingest::{
    commands::{cmd_ingest, print_ingest_stats, IngestOptions, IngestStats},
    config::{IngestArgs, OcrConfig},
    error::{Error, Result},
    progress::LogWriterFactory,
    source::{select_images, ImageFolder, PageSource, PdfDocument, VisionClient},
    sql::SqlClient,
    store::{RemoteStore, SourceType},
    Settings,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "adamus-ingest")]
#[command(version, about = "Ingest scanned pages and PDFs into the study material store", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output the run summary and log lines as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a folder of page images through OCR
    Images {
        /// Folder holding the page scans
        #[arg(long, env = "ADAMUS_INPUT_PATH")]
        input: PathBuf,

        /// OCR endpoint (defaults to the Vision annotate endpoint)
        #[arg(long, env = "ADAMUS_OCR_URL")]
        ocr_url: Option<String>,

        #[command(flatten)]
        args: IngestArgs,
    },

    /// Ingest the text layer of a PDF
    Pdf {
        /// PDF file to ingest
        #[arg(long, env = "ADAMUS_PDF_PATH")]
        pdf: PathBuf,

        #[command(flatten)]
        args: IngestArgs,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json {
        registry
            .with(fmt::layer().json().with_writer(LogWriterFactory))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(LogWriterFactory))
            .init();
    }

    let stats = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "adamus-ingest", &mut std::io::stdout());
            return Ok(());
        }

        Commands::Images {
            input,
            ocr_url,
            args,
        } => ingest_images(&input, ocr_url.as_deref(), &args).await?,

        Commands::Pdf { pdf, args } => ingest_pdf(&pdf, &args).await?,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_ingest_stats(&stats);
    }

    Ok(())
}

fn remote_store(settings: &Settings) -> Result<RemoteStore> {
    let client = SqlClient::new(&settings.sql)?;
    Ok(RemoteStore::new(client, &settings.sql.schema))
}

async fn ingest_images(
    input: &Path,
    ocr_url: Option<&str>,
    args: &IngestArgs,
) -> Result<IngestStats> {
    let (settings, secrets) = args.resolve(input, SourceType::Image)?;
    let ocr = OcrConfig::resolve(ocr_url, &secrets)?;

    let images = select_images(input)?;
    if images.is_empty() {
        return Err(Error::NoInput(format!(
            "no .jpg, .jpeg or .png files in {}",
            input.display()
        )));
    }
    info!("images: {}", images.len());

    let folder = ImageFolder::new(images, VisionClient::new(&ocr)?)?;
    let store = remote_store(&settings)?;

    cmd_ingest(&store, &folder, &IngestOptions::from(&settings)).await
}

async fn ingest_pdf(pdf: &Path, args: &IngestArgs) -> Result<IngestStats> {
    let (settings, _secrets) = args.resolve(pdf, SourceType::Pdf)?;

    // Extraction failures abort before anything is written remotely
    let document = PdfDocument::open(pdf, &settings.material.source_uri)?;
    info!("pages: {}", document.pages().len());

    let store = remote_store(&settings)?;

    cmd_ingest(&store, &document, &IngestOptions::from(&settings)).await
}

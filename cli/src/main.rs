//! pdfsift CLI - PDF content extraction tool

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use pdfsift::extract::OpenDocument;
use pdfsift::{
    ArtifactKind, ArtifactOutcome, Error, ExtractionLoader, ExtractionObserver, ExtractionReport,
    ExtractorConfig, LopdfOpener, PasswordPrompt, PdfExtractor, PdfOpener, PdfSource, TextVariant,
};

#[derive(Parser)]
#[command(name = "pdfsift")]
#[command(version)]
#[command(about = "Extract PDF text, tables, images and metadata to disk", long_about = None)]
struct Cli {
    /// Root directory for extraction output
    #[arg(
        long,
        global = true,
        env = "PDFSIFT_EXTRACTIONS_DIR",
        value_name = "DIR",
        default_value = pdfsift::config::DEFAULT_EXTRACTIONS_DIR
    )]
    extractions_dir: PathBuf,

    /// Password attempts allowed when prompting
    #[arg(
        long = "max-attempts",
        global = true,
        env = "PDFSIFT_MAX_PASSWORD_ATTEMPTS",
        default_value_t = pdfsift::config::DEFAULT_MAX_PASSWORD_ATTEMPTS
    )]
    max_password_attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text, tables, images and metadata from a PDF
    Extract {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output directory (default: <extractions-dir>/<stem>_extracted)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Document password; a single attempt is made
        #[arg(short, long, env = "PDFSIFT_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Prompt for the password on stdin
        #[arg(short, long, conflicts_with = "password")]
        interactive: bool,

        /// Only detect tables from text alignment, ignoring ruling lines
        #[arg(long)]
        no_ruling_lines: bool,
    },

    /// Show document information
    Info {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Document password
        #[arg(short, long, env = "PDFSIFT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Summarize an extraction directory
    Summary {
        /// Extraction directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the full text of an extraction directory
    Text {
        /// Extraction directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Use reading-order text
        #[arg(long)]
        sorted: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = ExtractorConfig::new()
        .with_extractions_dir(&cli.extractions_dir)
        .with_max_password_attempts(cli.max_password_attempts);

    let result = match cli.command {
        Commands::Extract {
            input,
            output,
            password,
            interactive,
            no_ruling_lines,
        } => {
            let config = if no_ruling_lines {
                config.text_aligned_tables_only()
            } else {
                config
            };
            cmd_extract(config, &input, output.as_deref(), password.as_deref(), interactive)
        }
        Commands::Info { input, password } => cmd_info(&input, password.as_deref()),
        Commands::Summary { dir, json } => cmd_summary(&dir, json),
        Commands::Text { dir, sorted } => cmd_text(&dir, sorted),
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        report_error(&e);
        std::process::exit(1);
    }
}

fn report_error(e: &Error) {
    match e {
        Error::PasswordRequired => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            eprintln!("  Pass {} or {} to unlock it.", "--password".bold(), "--interactive".bold());
        }
        e if e.is_auth_failure() => {
            eprintln!("{}: {}", "Access denied".red().bold(), e);
        }
        _ => eprintln!("{}: {}", "Error".red().bold(), e),
    }
}

/// Reads passwords from stdin.
struct StdinPrompt;

impl PasswordPrompt for StdinPrompt {
    fn prompt(&mut self, attempt: u32, max_attempts: u32) -> Option<String> {
        eprint!("Password ({}/{}): ", attempt, max_attempts);
        io::stderr().flush().ok()?;

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

/// Drives a progress bar from extraction events.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new() -> Self {
        let bar = ProgressBar::hidden();
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

impl ExtractionObserver for ProgressObserver {
    fn on_unlocked(&self, _path: &Path, page_count: u32) {
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_length(u64::from(page_count));
    }

    fn on_page_start(&self, page: u32, _total: u32) {
        self.bar.set_message(format!("page {}", page));
        self.bar.set_position(u64::from(page.saturating_sub(1)));
    }

    fn on_artifact(&self, page: u32, kind: ArtifactKind, outcome: &ArtifactOutcome) {
        if let ArtifactOutcome::Failed(message) = outcome {
            self.bar.println(format!(
                "{} page {} {}: {}",
                "warning:".yellow().bold(),
                page,
                kind,
                message
            ));
        }
        if kind == ArtifactKind::Images {
            self.bar.inc(1);
        }
    }

    fn on_finished(&self, result: &pdfsift::Result<ExtractionReport>) {
        match result {
            Ok(_) => self.bar.finish_with_message("Done!"),
            Err(_) => self.bar.abandon(),
        }
    }
}

fn cmd_extract(
    config: ExtractorConfig,
    input: &Path,
    output: Option<&Path>,
    password: Option<&str>,
    interactive: bool,
) -> pdfsift::Result<()> {
    let output_dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => {
            config.ensure_directories()?;
            config.output_dir_for(input)
        }
    };
    let extractor = PdfExtractor::new(config)?.with_observer(ProgressObserver::new());

    let report = if interactive {
        extractor.extract_interactive_to(input, &output_dir, &mut StdinPrompt)?
    } else {
        extractor.extract_to(input, &output_dir, password)?
    };

    println!("\n{}", "Extraction complete".green().bold());
    println!("  {} {}", "Output:".bold(), report.output_dir.display());
    println!("  {} {}", "Pages:".bold(), report.page_count);
    println!("  {} {}", "Tables:".bold(), report.tables_written);
    println!("  {} {}", "Images:".bold(), report.images_written);

    if !report.is_clean() {
        println!("\n{}", "Page failures:".yellow().bold());
        for failure in &report.page_failures {
            println!("  {} {}", "├─".dimmed(), failure.to_error());
        }
    }

    Ok(())
}

fn cmd_info(input: &Path, password: Option<&str>) -> pdfsift::Result<()> {
    let source = LopdfOpener::default().open(input)?;
    let mut doc = OpenDocument::new(source, input);
    doc.unlock(password)?;
    let metadata = doc.metadata()?;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: PDF {}", "Format".bold(), metadata.pdf_version);
    println!("{}: {}", "Pages".bold(), metadata.page_count);
    println!(
        "{}: {}",
        "Encrypted".bold(),
        if metadata.encrypted { "Yes" } else { "No" }
    );

    if !metadata.is_empty() {
        println!();
        println!("{}", "Metadata".cyan().bold());
        println!("{}", "─".repeat(40).dimmed());
        for (key, value) in &metadata.entries {
            println!("{}: {}", key.as_str().bold(), value);
        }
    }

    if let Some(created) = metadata.created() {
        println!("{}: {}", "Created".bold(), created);
    }
    if let Some(modified) = metadata.modified() {
        println!("{}: {}", "Modified".bold(), modified);
    }

    Ok(())
}

fn cmd_summary(dir: &Path, json: bool) -> pdfsift::Result<()> {
    let loader = ExtractionLoader::new(dir);
    let summary = loader.summary()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", "Extraction Summary".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "Text files".bold(), summary.text_files);
    for name in &summary.text_samples {
        println!("  {} {}", "├─".dimmed(), name);
    }
    println!("{}: {}", "Table files".bold(), summary.table_files);
    for name in &summary.table_samples {
        println!("  {} {}", "├─".dimmed(), name);
    }

    match loader.metadata()? {
        Some(metadata) => println!("\n{}", metadata.trim_end()),
        None => println!("\n{}", "No metadata available".dimmed()),
    }

    Ok(())
}

fn cmd_text(dir: &Path, sorted: bool) -> pdfsift::Result<()> {
    let variant = if sorted {
        TextVariant::Sorted
    } else {
        TextVariant::Raw
    };
    println!("{}", ExtractionLoader::new(dir).full_text(variant)?);
    Ok(())
}

fn cmd_version() {
    println!("{} {}", "pdfsift".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("PDF content extraction tool");
    println!();
    println!("License: MIT");
}

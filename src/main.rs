use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod media;
mod metadata;
mod state;
mod sync;

#[cfg(test)]
mod test_support;

use config::SyncConfig;
use metadata::analysis::{self, ClassificationStats, Difference, FileReport, GraphComparison};
use metadata::{read_metadata, MetadataBag};
use state::data::{CorrectionSet, MutationOutcome};
use sync::{Session, SyncRequest};

/// Keeps an InvokeAI-style image catalog in sync with its output directory
#[derive(Debug, Parser)]
#[command(name = "invoke-catalog-sync", version, about)]
struct Cli {
    /// TOML config file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where the catalog and images live
#[derive(Debug, Args)]
struct CatalogArgs {
    /// SQLite catalog database
    #[arg(long, env = "CATALOG_SYNC_DB")]
    catalog: PathBuf,

    /// Output directory holding the images
    #[arg(long, env = "CATALOG_SYNC_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Column holding the image file name
    #[arg(long, default_value = "image_name")]
    image_column: String,

    /// Table to check (repeatable)
    #[arg(long = "table", default_value = "images")]
    tables: Vec<String>,
}

impl CatalogArgs {
    fn into_request(self) -> SyncRequest {
        SyncRequest {
            catalog_path: self.catalog,
            output_dir: self.output_dir,
            image_column: self.image_column,
            tables: self.tables,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute the full correction set (creates the thumbnail folder if absent)
    Scan(CatalogArgs),
    /// List images without a thumbnail
    Thumbnails(CatalogArgs),
    /// Add catalog rows for uncataloged final images
    RestoreEntries(CatalogArgs),
    /// Delete catalog rows whose image file is gone
    RemoveEntries(CatalogArgs),
    /// Generate missing thumbnails
    RestoreThumbnails(CatalogArgs),
    /// Analyze PNG files in a directory
    Analyze {
        directory: PathBuf,
        /// Show detailed metadata for each file
        #[arg(short, long)]
        detailed: bool,
    },
    /// Filter PNG files by a text chunk value
    Filter {
        directory: PathBuf,
        key: String,
        value: String,
        #[arg(short, long)]
        detailed: bool,
        /// Save the matching paths to a file
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
    /// List PNG files that are neither final nor intermediate
    Unknown {
        directory: PathBuf,
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
    /// Show the metadata of a single PNG file
    Inspect { file: PathBuf },
    /// Compare the metadata of two PNG files
    Compare {
        first: PathBuf,
        second: PathBuf,
        #[arg(short, long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref())?;
    let json = cli.json;

    match cli.command {
        Command::Scan(args) => {
            let session = Session::new(args.into_request(), config)?;
            let set = session.scan()?;
            emit(json, &set, print_correction_set)?;
        }
        Command::Thumbnails(args) => {
            let session = Session::new(args.into_request(), config)?;
            let missing = session.check_thumbnails()?;
            emit(json, &missing, |missing| {
                println!("Missing thumbnails: {}", missing.len());
                for item in missing {
                    println!("  {}", item.file_name);
                }
            })?;
        }
        Command::RestoreEntries(args) => {
            let session = Session::new(args.into_request(), config)?;
            let set = session.reconcile()?;
            let outcome = session.restore_catalog_entries(&set.missing_entries).await?;
            emit(json, &outcome, print_outcome)?;
        }
        Command::RemoveEntries(args) => {
            let session = Session::new(args.into_request(), config)?;
            let set = session.reconcile()?;
            let outcome = session.remove_entries(&set.removed_entries)?;
            emit(json, &outcome, print_outcome)?;
        }
        Command::RestoreThumbnails(args) => {
            let session = Session::new(args.into_request(), config)?;
            let missing = session.check_thumbnails()?;
            let outcome = session.restore_thumbnails(&missing).await?;
            emit(json, &outcome, print_outcome)?;
        }
        Command::Analyze {
            directory,
            detailed,
        } => {
            let reports = analysis::analyze_directory(&directory, config.fan_out).await?;
            let stats = ClassificationStats::tally(&reports);
            emit(json, &AnalysisOutput { reports: &reports, stats }, |out| {
                println!("Found {} PNG files", out.reports.len());
                if detailed {
                    out.reports.iter().for_each(print_report);
                }
                print_stats(&out.stats);
            })?;
        }
        Command::Filter {
            directory,
            key,
            value,
            detailed,
            save,
        } => {
            let reports = analysis::analyze_directory(&directory, config.fan_out).await?;
            let matches = analysis::filter_by_text(&reports, &key, &value);
            if let Some(output) = &save {
                analysis::save_file_list(matches.iter().map(|r| r.path.as_path()), output)?;
            }
            let stats = ClassificationStats::tally(matches.iter().copied());
            emit(json, &MatchOutput { total: reports.len(), matches: &matches, stats }, |out| {
                println!(
                    "Found {} matching PNG files out of {} total",
                    out.matches.len(),
                    out.total
                );
                for report in out.matches {
                    if detailed {
                        print_report(report);
                    } else {
                        println!("{}", report.path.display());
                    }
                }
                print_stats(&out.stats);
            })?;
        }
        Command::Unknown { directory, save } => {
            let reports = analysis::analyze_directory(&directory, config.fan_out).await?;
            let matches = analysis::unknown_reports(&reports);
            if let Some(output) = &save {
                analysis::save_file_list(matches.iter().map(|r| r.path.as_path()), output)?;
            }
            let stats = ClassificationStats::tally(&reports);
            emit(json, &MatchOutput { total: reports.len(), matches: &matches, stats }, |out| {
                println!(
                    "Found {} unknown PNG files out of {} total",
                    out.matches.len(),
                    out.total
                );
                for report in out.matches {
                    println!("{}", report.path.display());
                }
                print_stats(&out.stats);
            })?;
        }
        Command::Inspect { file } => {
            ensure_png(&file)?;
            let report = analysis::read_report(&file);
            emit(json, &report, print_report)?;
        }
        Command::Compare {
            first,
            second,
            detailed,
        } => {
            ensure_png(&first)?;
            ensure_png(&second)?;
            let (a, b) = (read_metadata(&first), read_metadata(&second));
            let comparison = analysis::compare(&a, &b);
            emit(json, &comparison, |c| print_comparison(c, &a, &b, detailed))?;
        }
    }

    info!("Done");
    Ok(())
}

#[derive(Serialize)]
struct AnalysisOutput<'a> {
    reports: &'a [FileReport],
    stats: ClassificationStats,
}

#[derive(Serialize)]
struct MatchOutput<'a> {
    total: usize,
    matches: &'a [&'a FileReport],
    stats: ClassificationStats,
}

/// Print JSON or the human-readable form
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn ensure_png(path: &Path) -> Result<()> {
    let is_png = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if !is_png {
        bail!("{} is not a PNG file", path.display());
    }
    if !path.is_file() {
        bail!("{} does not exist", path.display());
    }
    Ok(())
}

fn print_correction_set(set: &CorrectionSet) {
    println!("Missing images: {}", set.missing_images.len());
    for item in &set.missing_images {
        println!("  {}#{} {}", item.table, item.row_id, item.image_path);
    }
    println!("Removable entries: {}", set.removed_entries.len());
    for item in &set.removed_entries {
        println!("  {}#{} {}", item.table, item.row_id, item.image_path);
    }
    println!("Uncataloged images: {}", set.missing_entries.len());
    for item in &set.missing_entries {
        println!("  {}", item.file_name);
    }
    println!("Missing thumbnails: {}", set.missing_thumbnails.len());
    for item in &set.missing_thumbnails {
        println!("  {}", item.file_name);
    }
}

fn print_outcome<C: std::fmt::Debug>(outcome: &MutationOutcome<C>) {
    let mark = if outcome.success { "✅" } else { "ℹ️ " };
    println!("{} {}", mark, outcome.message);
    println!("   {:?}", outcome.counts);
}

fn print_report(report: &FileReport) {
    let bag: &MetadataBag = &report.metadata;
    println!("\nFile: {}", report.file_name);
    match bag.header {
        Some(header) => {
            println!("Size: {}x{}", header.width, header.height);
            println!("Bit Depth: {}", header.bit_depth);
            println!("Color Type: {}", header.color_type);
        }
        None => println!("Size: unknown"),
    }
    println!("Classification: {}", report.classification);
    println!("Text Chunks ({}):", bag.len());
    if bag.is_empty() {
        println!("  No text chunks found");
    }
    for (key, value) in bag.entries() {
        println!("  {}: {}", key, value);
    }
}

fn print_stats(stats: &ClassificationStats) {
    println!("\nStatistics:");
    println!("- Intermediate Images: {}", stats.intermediate_images);
    println!("- Final Images: {}", stats.final_images);
    println!("- Unknown Images: {}", stats.unknown_images);
    println!("- Total Images: {}", stats.total());
}

fn print_comparison(
    comparison: &analysis::MetadataComparison,
    first: &MetadataBag,
    second: &MetadataBag,
    detailed: bool,
) {
    println!("=== Basic Properties ===");
    let [a, b] = comparison.dimensions;
    let same = if a == b { "SAME" } else { "DIFFERENT" };
    println!("Image size: {:?} vs {:?} [{}]", a, b, same);
    let [a, b] = comparison.byte_len;
    let same = if a == b { "SAME" } else { "DIFFERENT" };
    println!("File size: {} vs {} bytes [{}]", a, b, same);

    println!("\n=== Text Chunks ===");
    for diff in &comparison.text {
        match diff.status {
            Difference::MissingInFirst => println!("{}: [MISSING IN FILE 1]", diff.key),
            Difference::MissingInSecond => println!("{}: [MISSING IN FILE 2]", diff.key),
            Difference::Different => {
                println!("{}: [DIFFERENT]", diff.key);
                if detailed && diff.key != metadata::reader::GRAPH_KEY {
                    println!("  File 1: {}", truncate(first.get(&diff.key).unwrap_or(""), 100));
                    println!("  File 2: {}", truncate(second.get(&diff.key).unwrap_or(""), 100));
                }
            }
            Difference::Same if detailed => println!("{}: [SAME]", diff.key),
            Difference::Same => {}
        }
    }
    match comparison.text_differences() {
        0 => println!("All text chunks are identical"),
        n => println!("Found {} differences in text chunks", n),
    }

    println!("\n=== InvokeAI Graph ===");
    match &comparison.graph {
        GraphComparison::NeitherHasGraph => println!("No InvokeAI graph data in either file"),
        GraphComparison::MissingInFirst => println!("InvokeAI graph data missing in file 1"),
        GraphComparison::MissingInSecond => println!("InvokeAI graph data missing in file 2"),
        GraphComparison::InvalidInFirst => println!("Invalid InvokeAI graph data in file 1"),
        GraphComparison::InvalidInSecond => println!("Invalid InvokeAI graph data in file 2"),
        GraphComparison::Compared {
            first,
            second,
            nodes,
        } => {
            println!("Nodes: {} vs {}", first.nodes, second.nodes);
            println!(
                "Intermediate nodes: {} vs {}",
                first.intermediate_nodes, second.intermediate_nodes
            );
            println!("Final nodes: {} vs {}", first.final_nodes, second.final_nodes);
            if detailed {
                for node in nodes {
                    println!("{:?}", node);
                }
                match nodes.len() {
                    0 => println!("All nodes are identical"),
                    n => println!("Found {} differences in nodes", n),
                }
            }
        }
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &value[..index]),
        None => value.to_string(),
    }
}

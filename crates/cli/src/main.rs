//! CLI tool for turning dealership report decks into KPI summary emails.

use anyhow::{Context, Result};
use clap::Parser;
use kpi_core::deck::{classify_deck, local_kpis, structured_document};
use kpi_core::ingest::ingest_response;
use kpi_core::provider::request_kpis;
use kpi_core::render::{render_batch_html, render_batch_plain, BatchEntry};
use kpi_core::{
    CommandProvider, Email, EmailRenderer, KpiNormalizer, KpiRecord, RetryPolicy, VlaRepairScope,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Turn dealership marketing report decks into KPI summary emails.
#[derive(Parser, Debug)]
#[command(name = "kpi-report")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input report decks (.pptx)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Report period label, e.g. "April 2025"
    #[arg(short, long, env = "KPI_PERIOD")]
    period: String,

    /// Output directory (default: same as input file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the plain-text email to stdout instead of writing files
    #[arg(long)]
    print: bool,

    /// External command that reads the prompt and deck on stdin and prints
    /// the KPI JSON on stdout
    #[arg(long, env = "KPI_LLM_COMMAND", conflicts_with = "response")]
    llm_command: Option<String>,

    /// Use a saved provider response instead of calling a provider
    #[arg(long)]
    response: Option<PathBuf>,

    /// Provider attempts before giving up on a deck
    #[arg(long, env = "KPI_LLM_RETRIES", default_value = "3")]
    retries: u32,

    /// Store name fragment the PMAX/VLA split repair applies to (repeatable)
    #[arg(long = "vla-repair-store", value_name = "NAME")]
    vla_repair_stores: Vec<String>,

    /// Apply the PMAX/VLA split repair to every store
    #[arg(long, conflicts_with = "vla_repair_stores")]
    vla_repair_any_store: bool,

    /// Also write the structured document sent to the provider
    #[arg(long)]
    dump_document: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Where raw KPIs come from.
enum KpiSource {
    /// The field parser over the deck itself.
    Local,
    /// A saved provider response.
    Response(String),
    /// An external provider command.
    Command(CommandProvider, RetryPolicy),
}

/// A deck that made it all the way to a rendered email.
#[derive(Debug)]
struct Processed {
    filename: String,
    kpis: KpiRecord,
    email: Email,
    document: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let succeeded = run(&args)?;
    if succeeded == 0 {
        anyhow::bail!("No report decks were processed successfully");
    }
    Ok(())
}

/// Process every input, returning how many succeeded.
fn run(args: &Args) -> Result<usize> {
    let source = kpi_source(args)?;
    let normalizer = KpiNormalizer::new().with_vla_repair_scope(vla_repair_scope(args));
    let renderer = EmailRenderer::new();

    let mut processed = Vec::new();
    for input_path in &args.input {
        if args.verbose {
            eprintln!("Processing: {}", input_path.display());
        }

        let outcome = process_file(input_path, args, &source, &normalizer, &renderer)
            .and_then(|result| {
                if args.print {
                    println!("{}\n", result.email.plain);
                } else {
                    let written = write_deck_outputs(input_path, args, &result)?;
                    if args.verbose {
                        for path in written {
                            eprintln!("Written to: {}", path.display());
                        }
                    }
                }
                Ok(result)
            });

        match outcome {
            Ok(result) => processed.push(result),
            Err(e) => {
                log::error!("{}: {:#}", input_path.display(), e);
                eprintln!("Error processing {}: {:#}", input_path.display(), e);
            }
        }
    }

    if processed.len() >= 2 && !args.print {
        let first = args.input.first().map(PathBuf::as_path).unwrap_or(Path::new("."));
        let batch = get_output_dir(first, args.output.as_deref())
            .and_then(|output_dir| write_batch(&output_dir, &processed, &args.period));
        if let Err(e) = batch {
            log::error!("Batch output: {:#}", e);
            eprintln!("Error writing batch files: {:#}", e);
        }
    }

    Ok(processed.len())
}

fn kpi_source(args: &Args) -> Result<KpiSource> {
    if let Some(path) = &args.response {
        if args.input.len() > 1 {
            anyhow::bail!("--response can only be used with a single input deck");
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read response {}", path.display()))?;
        return Ok(KpiSource::Response(text));
    }

    if let Some(command) = &args.llm_command {
        let provider = CommandProvider::from_command_line(command)
            .with_context(|| format!("Invalid provider command {:?}", command))?;
        let policy = RetryPolicy::new(args.retries, RetryPolicy::default().initial_delay);
        return Ok(KpiSource::Command(provider, policy));
    }

    Ok(KpiSource::Local)
}

fn vla_repair_scope(args: &Args) -> VlaRepairScope {
    if args.vla_repair_any_store {
        VlaRepairScope::AnyStore
    } else if args.vla_repair_stores.is_empty() {
        VlaRepairScope::default()
    } else {
        VlaRepairScope::Stores(args.vla_repair_stores.clone())
    }
}

/// Process a single report deck.
fn process_file(
    input_path: &Path,
    args: &Args,
    source: &KpiSource,
    normalizer: &KpiNormalizer,
    renderer: &EmailRenderer,
) -> Result<Processed> {
    let deck = kpi_pptx::open_deck(input_path)
        .with_context(|| format!("Failed to read {}", input_path.display()))?;

    if args.verbose {
        eprintln!("  Found {} slides", deck.slides.len());
    }

    let slides = classify_deck(&deck);
    let document = structured_document(&slides);

    let raw = match source {
        KpiSource::Local => local_kpis(&slides),
        KpiSource::Response(text) => report_notice(input_path, ingest_response(text)),
        KpiSource::Command(provider, policy) => {
            let outcome = request_kpis(provider, &document, policy)
                .with_context(|| format!("Provider failed for {}", input_path.display()))?;
            report_notice(input_path, outcome)
        }
    };

    let kpis = normalizer.normalize(raw);
    let email = renderer.render(&kpis, &args.period);

    Ok(Processed {
        filename: deck.filename,
        kpis,
        email,
        document,
    })
}

/// Print an extraction notice and continue with whatever was recovered.
fn report_notice(input_path: &Path, outcome: kpi_core::IngestOutcome) -> KpiRecord {
    if let Some(failure) = &outcome.failure {
        eprintln!(
            "Warning: {}: {}; continuing with an empty report",
            input_path.display(),
            failure
        );
    }
    outcome.record
}

/// Filename-safe form of a label: spaces and path separators become `_`.
fn file_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() || matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

/// Common prefix of a deck's artifacts, e.g. `Palmer_CDJR_April_2025`.
fn artifact_stem(kpis: &KpiRecord, period: &str) -> String {
    format!(
        "{}_{}",
        file_label(kpis.store_name_or_default()),
        file_label(period)
    )
}

/// Write everything one deck produces, including the optional document dump.
fn write_deck_outputs(input_path: &Path, args: &Args, processed: &Processed) -> Result<Vec<PathBuf>> {
    let output_dir = get_output_dir(input_path, args.output.as_deref())?;
    let mut written = write_artifacts(&output_dir, processed, &args.period)?;
    if args.dump_document {
        let stem = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let path = output_dir.join(format!("{}_document.txt", stem));
        write_output(&path, &processed.document)?;
        written.push(path);
    }
    Ok(written)
}

/// Write the HTML, plain-text and JSON artifacts for one deck.
fn write_artifacts(output_dir: &Path, processed: &Processed, period: &str) -> Result<Vec<PathBuf>> {
    let stem = artifact_stem(&processed.kpis, period);
    let files = [
        (format!("{}_email.html", stem), processed.email.html.as_str()),
        (format!("{}_email.txt", stem), processed.email.plain.as_str()),
    ];

    let mut written = Vec::new();
    for (name, content) in files {
        let path = output_dir.join(name);
        write_output(&path, content)?;
        written.push(path);
    }

    let json_path = output_dir.join(format!("{}_kpis.json", stem));
    write_output(&json_path, &processed.kpis.to_json_pretty())?;
    written.push(json_path);

    Ok(written)
}

/// Write the combined emails and KPI mappings of a batch.
fn write_batch(output_dir: &Path, processed: &[Processed], period: &str) -> Result<()> {
    let entries: Vec<BatchEntry<'_>> = processed
        .iter()
        .map(|p| BatchEntry {
            filename: &p.filename,
            store: p.kpis.store_name_or_default(),
            email: &p.email,
        })
        .collect();

    let label = file_label(period);
    write_output(
        &output_dir.join(format!("all_emails_{}.txt", label)),
        &render_batch_plain(&entries),
    )?;
    write_output(
        &output_dir.join(format!("all_emails_{}.html", label)),
        &render_batch_html(&entries),
    )?;

    let all_kpis: serde_json::Map<String, serde_json::Value> = processed
        .iter()
        .map(|p| (p.filename.clone(), p.kpis.to_json()))
        .collect();
    let json = serde_json::to_string_pretty(&all_kpis).context("Failed to serialize KPIs")?;
    write_output(&output_dir.join(format!("all_kpis_{}.json", label)), &json)?;

    Ok(())
}

/// Determine the output directory for a processed file.
fn get_output_dir(input_path: &Path, output_dir: Option<&Path>) -> Result<PathBuf> {
    match output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
            Ok(dir.to_path_buf())
        }
        None => Ok(input_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))),
    }
}

/// Write output to a file.
fn write_output(path: &Path, content: &str) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;

    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write to {}", path.display()))?;

    Ok(())
}

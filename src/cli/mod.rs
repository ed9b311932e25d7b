//! limebag CLI
//!
//! Replays recorded explanation-oracle output against a test table, applies
//! the top-K fairness policy and writes the rank/value report tables.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::auditor::{AuditRun, ReplayAuditor};
use crate::config::AuditSettings;
use crate::report::{
    export, parse_table, write_report, ExportMode, ExportOptions, MedianSummaryReporter,
    StatisticalReporter,
};
use crate::utils::{column_names, DataLoader};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(235, 110, 100) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv_line(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "limebag")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fairness audit over local feature-attribution explanations")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Audit recorded explanations and write report tables
    Audit {
        /// JSON file: one array of [feature_index, weight] pairs per test row
        #[arg(short, long)]
        explanations: PathBuf,

        /// Test table (CSV with header); column names label the features
        #[arg(short, long)]
        data: PathBuf,

        /// Sensitive feature indices, comma separated
        #[arg(short, long, value_delimiter = ',')]
        sensitive: Option<Vec<usize>>,

        /// Number of top-ranked features to check
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Directory for lime_rank.txt / lime_val.txt
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Tables to write (ranks, values, both)
        #[arg(short, long, default_value = "both")]
        mode: String,

        /// Whether larger numbers rank first; defaults to true for values, false for ranks
        #[arg(long)]
        higher: Option<bool>,

        /// Print summaries as Markdown tables
        #[arg(long)]
        markup: bool,

        /// End report tables with a line break
        #[arg(long)]
        trailing_newline: bool,

        /// JSON settings file; command-line flags take precedence
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write a JSON run summary here
        #[arg(long)]
        json_summary: Option<PathBuf>,
    },

    /// Summarize a written report table
    Inspect {
        /// lime_rank.txt or lime_val.txt
        #[arg(short, long)]
        report: PathBuf,

        /// Whether larger numbers rank first; inferred from the file name when omitted
        #[arg(long)]
        higher: Option<bool>,

        /// Print as a Markdown table
        #[arg(long)]
        markup: bool,
    },
}

fn parse_modes(mode: &str) -> anyhow::Result<Vec<ExportMode>> {
    if mode.eq_ignore_ascii_case("both") {
        Ok(ExportMode::ALL.to_vec())
    } else {
        Ok(vec![mode.parse::<ExportMode>()?])
    }
}

fn print_run(run: &AuditRun, feature_names: &[String]) {
    kv_line("Run", &run.run_id.to_string());
    kv_line("Instances", &run.total_instances.to_string());
    kv_line("Processed", &run.processed().to_string());
    kv_line("Skipped", &run.skipped.len().to_string());

    let violations = format!(
        "{} ({:.1}%)",
        run.violation_count,
        run.violation_rate() * 100.0
    );
    let violations = if run.violation_count > 0 { bad(&violations) } else { ok(&violations) };
    println!("  {:<18} {}", muted("Unfair"), violations);

    if run.violation_count > 0 {
        println!();
        println!("  {:<10} {:<20} {:>6}", muted("Instance"), muted("Feature"), muted("Rank"));
        println!("  {}", dim(&"─".repeat(40)));
        for result in run.unfair() {
            if let Some(hit) = result.offense {
                let name = feature_names
                    .get(hit.feature_index)
                    .map(String::as_str)
                    .unwrap_or("?");
                println!("  {:<10} {:<20} {:>6}", result.instance_index, name, hit.rank);
            }
        }
    }

    for skipped in &run.skipped {
        println!(
            "  {} instance {} {}",
            bad("!"),
            skipped.instance_index,
            dim(&skipped.reason.to_string())
        );
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_audit(
    explanations_path: &Path,
    data_path: &Path,
    sensitive: Option<Vec<usize>>,
    top_k: Option<usize>,
    out_dir: &Path,
    mode: &str,
    higher: Option<bool>,
    markup: bool,
    trailing_newline: bool,
    config_path: Option<&Path>,
    json_summary: Option<&Path>,
) -> anyhow::Result<()> {
    section("Audit");

    let mut settings = match config_path {
        Some(path) => AuditSettings::from_json_file(path)?,
        None => AuditSettings::default(),
    };
    if let Some(sensitive) = sensitive {
        settings.sensitive = sensitive;
    }
    if let Some(k) = top_k {
        settings.top_k = k;
    }
    settings.trailing_newline |= trailing_newline;
    let modes = parse_modes(mode)?;

    let loader = DataLoader::new();

    step_run("Loading test table");
    let start = Instant::now();
    let df = loader.load_csv(data_path)?;
    let feature_names = column_names(&df);
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    step_run("Loading explanations");
    let explanations = loader.load_explanations(explanations_path)?;
    step_done(&format!("{} instances", explanations.len()));

    if explanations.len() != df.height() {
        anyhow::bail!(
            "{} explanations recorded for {} test rows",
            explanations.len(),
            df.height()
        );
    }

    step_run(&format!(
        "Auditing top-{} for {:?}",
        settings.top_k,
        settings.sensitive
    ));
    let auditor = ReplayAuditor::new(feature_names.clone(), settings.sensitive.clone(), settings.top_k)?;
    let run = auditor.run(explanations)?;
    step_done(&format!("{} ms", run.elapsed_ms));

    println!();
    print_run(&run, &feature_names);

    let options = ExportOptions::default().with_trailing_newline(settings.trailing_newline);
    let reporter = MedianSummaryReporter::new();
    if run.processed() == 0 {
        println!();
        println!(
            "  {} {}",
            bad("!"),
            format!("all {} instances were skipped; no report written", run.total_instances).white()
        );
    }
    for mode in modes.into_iter().filter(|_| run.processed() > 0) {
        let path = write_report(&run.profiles, mode, out_dir, &options)?;
        section(&format!("Report: {}", mode));
        kv_line("File", &path.display().to_string());
        println!();

        let table = export(&run.profiles, mode, &options)?;
        let higher_is_better = higher.unwrap_or_else(|| mode.higher_is_better());
        for line in reporter.compare(&table, higher_is_better, markup)?.lines() {
            println!("  {}", line);
        }
    }

    if let Some(path) = json_summary {
        let json = serde_json::to_string_pretty(&run.summary())?;
        std::fs::write(path, json)?;
        println!();
        kv_line("Summary", &path.display().to_string());
    }

    println!();
    Ok(())
}

pub fn cmd_inspect(report_path: &Path, higher: Option<bool>, markup: bool) -> anyhow::Result<()> {
    section("Inspect");

    let text = std::fs::read_to_string(report_path)?;
    let groups = parse_table(&text)?;
    let instances = groups.first().map(|(_, values)| values.len()).unwrap_or(0);

    kv_line("File", &report_path.display().to_string());
    kv_line("Features", &groups.len().to_string());
    kv_line("Instances", &instances.to_string());
    println!();

    let inferred = report_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n == ExportMode::Values.file_name())
        .unwrap_or(false);
    let output = MedianSummaryReporter::new().compare(&text, higher.unwrap_or(inferred), markup)?;
    for line in output.lines() {
        println!("  {}", line);
    }

    println!();
    Ok(())
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Audit {
            explanations,
            data,
            sensitive,
            top_k,
            out_dir,
            mode,
            higher,
            markup,
            trailing_newline,
            config,
            json_summary,
        } => cmd_audit(
            &explanations,
            &data,
            sensitive,
            top_k,
            &out_dir,
            &mode,
            higher,
            markup,
            trailing_newline,
            config.as_deref(),
            json_summary.as_deref(),
        ),
        Commands::Inspect { report, higher, markup } => cmd_inspect(&report, higher, markup),
    }
}

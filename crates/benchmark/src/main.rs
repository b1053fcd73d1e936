//! perfgate: Lighthouse benchmark gate
//!
//! Audits the build of the current revision, stores the report and diffs it
//! against a baseline revision's stored report.

use std::{collections::BTreeSet, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use perfgate::{
  BenchmarkRun, ComparisonStatus, Digests, GitCli, LighthouseCli, MetricSet, Report, ReportFormat, ReportStore,
  RunConfig, RunOutcome, compare,
};
use perfgate_core::Config;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "perfgate")]
#[command(about = "Lighthouse benchmark gate: audit, store and compare reports per git revision")]
#[command(version)]
struct Cli {
  /// Enable verbose logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Audit the current revision and compare it against a benchmark
  Run {
    /// URL to audit (overrides audit.target_url / audit.url_template)
    #[arg(long)]
    url: Option<String>,

    /// Compare against a ref; without a value the trunk ref is used
    #[arg(long, num_args = 0..=1, require_equals = true, value_name = "REF")]
    benchmark: Option<Option<String>>,

    /// Local run: audit even on trunk and never publish
    #[arg(long)]
    local: bool,

    /// Allow writing and publishing the trunk baseline
    #[arg(long)]
    update_baseline: bool,

    /// Show the browser window and produce an HTML report
    #[arg(long)]
    headful: bool,

    /// Report formats to write (repeatable)
    #[arg(long = "format", value_name = "FORMAT")]
    formats: Vec<ReportFormat>,

    /// Commit and push the written reports
    #[arg(long)]
    publish: bool,

    /// Config file (default: .perfgate.toml, then user config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reports directory (overrides storage.reports_dir)
    #[arg(long)]
    reports_dir: Option<PathBuf>,
  },

  /// Compare two stored JSON reports offline
  Compare {
    /// Baseline report file (JSON)
    baseline: PathBuf,

    /// Current report file (JSON)
    current: PathBuf,

    /// Reports directory to persist the digests into
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Revision the digests are stored under
    #[arg(long, default_value = "local")]
    revision: String,

    /// Config file (default: .perfgate.toml, then user config)
    #[arg(long)]
    config: Option<PathBuf>,
  },

  /// Write a commented default .perfgate.toml
  Init {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  // Setup logging
  let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
  let subscriber = FmtSubscriber::builder()
    .with_max_level(level)
    .with_target(false)
    .finish();
  tracing::subscriber::set_global_default(subscriber)?;

  match cli.command {
    Commands::Run {
      url,
      benchmark,
      local,
      update_baseline,
      headful,
      formats,
      publish,
      config,
      reports_dir,
    } => {
      let args = RunArgs {
        url,
        benchmark,
        local,
        update_baseline,
        headful,
        formats,
        publish,
        reports_dir,
      };
      let code = run_benchmark(load_config(config.as_ref())?, args).await?;
      if code != 0 {
        std::process::exit(code);
      }
      Ok(())
    }
    Commands::Compare {
      baseline,
      current,
      output,
      revision,
      config,
    } => compare_reports(load_config(config.as_ref())?, baseline, current, output, revision).await,
    Commands::Init { force } => init_config(force).await,
  }
}

struct RunArgs {
  url: Option<String>,
  benchmark: Option<Option<String>>,
  local: bool,
  update_baseline: bool,
  headful: bool,
  formats: Vec<ReportFormat>,
  publish: bool,
  reports_dir: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
  match path {
    Some(path) => Ok(Config::load_from(path)?),
    None => {
      let cwd = std::env::current_dir().context("Failed to read current directory")?;
      Ok(Config::load_for_project(&cwd))
    }
  }
}

async fn run_benchmark(mut config: Config, args: RunArgs) -> anyhow::Result<i32> {
  if let Some(reports_dir) = args.reports_dir {
    config.storage.reports_dir = reports_dir;
  }

  let mut run_config = RunConfig::from_config(&config);
  run_config.benchmark_ref = args
    .benchmark
    .map(|reference| reference.unwrap_or_else(|| config.benchmark.trunk_ref.clone()));
  run_config.is_local_run = args.local;
  run_config.update_baseline = args.update_baseline;
  if let Some(url) = args.url {
    run_config.target_url = Some(url);
  }
  if args.headful {
    run_config.audit = run_config.audit.headful();
    run_config.output_formats = BTreeSet::from([ReportFormat::Html]);
  }
  if !args.formats.is_empty() {
    run_config.output_formats = args.formats.into_iter().collect();
  }

  let store = ReportStore::from_config(&config.storage);
  let git = Arc::new(GitCli::from_config(&config.benchmark));
  let lighthouse = Arc::new(LighthouseCli::from_config(&config.audit));
  let run = BenchmarkRun::new(run_config, store, git, lighthouse);

  let outcome = run.run().await;
  match &outcome {
    RunOutcome::Done(summary) => {
      match &summary.comparison {
        ComparisonStatus::Compared {
          baseline,
          regressions,
          improvements,
        } => info!(
          "Compared {} against {}: {} regressions, {} improvements",
          summary.revision, baseline, regressions, improvements
        ),
        ComparisonStatus::BaselineMissing { baseline } => {
          warn!("No baseline report for {}, comparison skipped", baseline)
        }
        ComparisonStatus::BaselineUnreadable { baseline, reason } => {
          warn!("Baseline report for {} unreadable ({}), comparison skipped", baseline, reason)
        }
        ComparisonStatus::BaselineIsCurrent | ComparisonStatus::NotRequested => {}
      }

      if args.publish
        && let Err(e) = run.publish(summary, &config.publish).await
      {
        error!("Publishing failed: {}", e);
        return Ok(1);
      }
    }
    RunOutcome::Skipped { revision } => info!("Nothing to do on {}", revision),
    RunOutcome::Failed { stage, error } => error!("Run failed while {}: {}", stage, error),
  }

  Ok(outcome.exit_code())
}

async fn compare_reports(
  config: Config,
  baseline: PathBuf,
  current: PathBuf,
  output: Option<PathBuf>,
  revision: String,
) -> anyhow::Result<()> {
  info!("Comparing {} vs {}", baseline.display(), current.display());

  let baseline_content = tokio::fs::read_to_string(&baseline)
    .await
    .with_context(|| format!("Failed to read {}", baseline.display()))?;
  let current_content = tokio::fs::read_to_string(&current)
    .await
    .with_context(|| format!("Failed to read {}", current.display()))?;

  let baseline_report = Report::from_json("baseline", &baseline_content)?;
  let current_report = Report::from_json(&revision, &current_content)?;

  let metrics = MetricSet::from_config(&config.benchmark);
  let outcomes = compare(&current_report, &baseline_report, &metrics);
  let digests = Digests::build(&outcomes, &revision);

  // Print markdown summary
  println!("{}", digests.to_markdown());

  // Save if output specified
  if let Some(output) = output {
    let store = ReportStore::new(output, config.storage.folder_prefix.clone());
    let folder = store.recreate_folder(&revision).await?;
    digests.persist(&store).await?;
    info!("Digests saved to: {}", folder.display());
  }

  if !digests.regressions.is_empty() {
    std::process::exit(1);
  }

  Ok(())
}

async fn init_config(force: bool) -> anyhow::Result<()> {
  let cwd = std::env::current_dir().context("Failed to read current directory")?;
  let path = Config::project_config_path(&cwd);

  if path.exists() && !force {
    anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
  }

  tokio::fs::write(&path, Config::generate_template()).await?;
  println!("Created config: {}", path.display());
  Ok(())
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use obench_db::{
    CsvResultStore, ResultStore, ResultsConfig, header_line, list_results_files, reduce_rows,
    resolve_results_file, summarize_log, writer::encode_records,
};
use obench_lib::{
    benchmark::{TestDefinition, load_suite},
    constants::env,
    model::{FilterOutcome, ModelFilter},
    notify::LogNotifier,
    ollama::{InferenceClient, OllamaClient},
};
use obench_runner::{
    BenchmarkRun, ResultCallback,
    http_store::HttpResultStore,
    renderer::{render_cumulative_chart, render_result_as_tree, render_table},
    report::{format_model_size, log_report, suite_report},
    run_pending_benchmarks,
    state::BenchState,
};
use obench_types::{ModelSummary, TestResult};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Arithmetic benchmarks for locally-hosted Ollama models.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct StorageArgs {
    /// Directory holding results files [env: OBENCH_DATA_DIR]
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Run name; results go to `results-<slug>.csv` [env: OBENCH_RUN_NAME]
    #[arg(long, global = true)]
    run_name: Option<String>,

    /// Explicit results file name, e.g. `results-nightly.csv`
    #[arg(long, global = true)]
    file: Option<String>,

    /// Use an obench-api server instead of the local file, e.g. `http://127.0.0.1:4567`
    #[arg(long, global = true)]
    api_url: Option<String>,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Ollama base URL [env: OLLAMA_HOST, OLLAMA_PORT]
    #[arg(long)]
    ollama_url: Option<String>,

    /// Case-insensitive regular expression on model names
    #[arg(long)]
    filter: Option<String>,

    /// Minimum parameter count in billions
    #[arg(long)]
    min_size: Option<f64>,

    /// Maximum parameter count in billions
    #[arg(long)]
    max_size: Option<f64>,

    /// Model to skip; may be repeated
    #[arg(long = "exclude")]
    excluded: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every pending test for the selected models
    Run {
        #[command(flatten)]
        models: ModelArgs,

        /// Directory of benchmark suite files
        #[arg(long, default_value = "benchmarks/")]
        benchmarks: PathBuf,

        /// Repeats per case [env: OBENCH_RUNS_PER_TEST]
        #[arg(long)]
        runs: Option<u32>,

        /// Generation budget per call [env: OBENCH_NUM_PREDICT]
        #[arg(long)]
        num_predict: Option<u32>,

        /// HTTP timeout in seconds [env: OBENCH_HTTP_TIMEOUT_SECONDS]
        #[arg(long)]
        timeout: Option<u64>,

        /// Print a per-case tree for each finished test
        #[arg(long)]
        tree: bool,
    },
    /// Show the comparison table and progress chart for a results file
    Results,
    /// List models on the daemon after filtering
    Models {
        #[command(flatten)]
        models: ModelArgs,
    },
    /// Delete the results file
    Clear,
    /// Write the raw results CSV to a file or stdout
    Export {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List results files in the data directory
    Files,
}

impl StorageArgs {
    fn config(&self) -> ResultsConfig {
        let data_dir = self
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(env::storage::data_dir()));
        let run_name = self.run_name.clone().or_else(env::runs::run_name);
        let file = resolve_results_file(self.file.as_deref(), run_name.as_deref(), None);
        ResultsConfig::new(data_dir).with_file_name(&file)
    }

    fn store(&self) -> Result<Box<dyn ResultStore>> {
        let config = self.config();
        match &self.api_url {
            Some(url) => {
                let timeout = Duration::from_secs(env::ollama::http_timeout_seconds());
                let store = HttpResultStore::new(url, Some(config.file_name.clone()), timeout)
                    .context("Failed to create API result store")?;
                Ok(Box::new(store))
            }
            None => Ok(Box::new(CsvResultStore::from_config(&config))),
        }
    }
}

impl ModelArgs {
    fn filter(&self) -> ModelFilter {
        let mut filter = ModelFilter::default().with_size_range(self.min_size, self.max_size);
        if let Some(pattern) = &self.filter {
            filter = filter.with_pattern(pattern);
        }
        for model in &self.excluded {
            filter = filter.exclude(model);
        }
        filter
    }

    fn client(&self, num_predict: Option<u32>, timeout: Option<u64>) -> Result<OllamaClient> {
        let url = self.ollama_url.clone().unwrap_or_else(env::ollama::url);
        let num_predict = num_predict.unwrap_or_else(env::ollama::num_predict);
        let timeout = Duration::from_secs(timeout.unwrap_or_else(env::ollama::http_timeout_seconds));
        OllamaClient::new(url, num_predict, timeout).context("Failed to create Ollama client")
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,obench_runner=debug,obench_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match &cli.command {
        Command::Run {
            models,
            benchmarks,
            runs,
            num_predict,
            timeout,
            tree,
        } => {
            run_command(&cli.storage, models, benchmarks, *runs, *num_predict, *timeout, *tree)
                .await
        }
        Command::Results => results_command(&cli.storage).await,
        Command::Models { models } => models_command(models).await,
        Command::Clear => {
            let store = cli.storage.store()?;
            store.clear().await.context("Failed to clear results")?;
            println!("Cleared {}", store.location());
            Ok(())
        }
        Command::Export { output } => export_command(&cli.storage, output.as_deref()).await,
        Command::Files => {
            let config = cli.storage.config();
            let files = list_results_files(&config.data_dir).with_context(|| {
                format!("Failed to list results files in {}", config.data_dir.display())
            })?;
            for file in files {
                println!("{file}");
            }
            Ok(())
        }
    }
}

async fn run_command(
    storage: &StorageArgs,
    model_args: &ModelArgs,
    benchmarks: &Path,
    runs: Option<u32>,
    num_predict: Option<u32>,
    timeout: Option<u64>,
    tree: bool,
) -> Result<()> {
    let repeat_count = runs.unwrap_or_else(env::runs::runs_per_test);
    let suite = load_suite(benchmarks, repeat_count)
        .with_context(|| format!("Failed to load benchmarks from {}", benchmarks.display()))?;
    if suite.is_empty() {
        bail!("No benchmark files found in {}", benchmarks.display());
    }
    info!(tests = suite.len(), repeat_count, "Loaded benchmark suite");

    let client = model_args.client(num_predict, timeout)?;
    let store = storage.store()?;
    let filter = model_args.filter();

    let available = client
        .list_models()
        .await
        .with_context(|| format!("Failed to load models from {}", client.base_url()))?;
    let selected = match filter.apply(&available) {
        FilterOutcome::Selected(models) => models,
        FilterOutcome::InvalidPattern { pattern, error } => {
            bail!("Invalid model filter '{pattern}': {error}")
        }
    };
    if selected.is_empty() {
        println!("No models match the current filters.");
        return Ok(());
    }

    let rows = store
        .read_all_rows()
        .await
        .with_context(|| format!("Failed to read results from {}", store.location()))?;
    let mut state = BenchState::from_latest(&reduce_rows(&rows));

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Stopping after the current test");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let print_tree = |model: &ModelSummary, definition: &TestDefinition, result: &TestResult| {
        println!("{}", render_result_as_tree(&model.name, definition.name(), result));
    };
    let observer = LogNotifier::new();
    let run = BenchmarkRun {
        client: &client,
        store: store.as_ref(),
        observer: &observer,
        suite: &suite,
        filter: &filter,
        cancel: &cancel,
        on_result: tree.then_some(&print_tree as &ResultCallback<'_>),
    };
    let summary = run_pending_benchmarks(&run, &selected, &mut state).await?;

    let report = suite_report(&suite, &available, &filter, &state);
    println!("{}", render_table(&report));
    println!(
        "Ran {} test(s), skipped {} complete, {} failure(s) reported{}",
        summary.tests_run,
        summary.tests_skipped,
        observer.total(),
        if summary.cancelled { " (stopped early)" } else { "" }
    );
    Ok(())
}

async fn results_command(storage: &StorageArgs) -> Result<()> {
    let store = storage.store()?;
    let rows = store
        .read_all_rows()
        .await
        .with_context(|| format!("Failed to read results from {}", store.location()))?;
    let summary = summarize_log(&rows);
    let report = log_report(&summary);

    println!(
        "{} test(s), max score {}, {} model(s)",
        summary.tests.len(),
        summary.max_total(),
        summary.models.len()
    );
    if let Some(at) = summary.last_updated() {
        println!("Last updated: {}", at.format("%Y-%m-%d %H:%M"));
    }
    println!("{}", render_table(&report));
    println!("{}", render_cumulative_chart(&report));
    Ok(())
}

async fn models_command(model_args: &ModelArgs) -> Result<()> {
    let client = model_args.client(None, None)?;
    let available = client
        .list_models()
        .await
        .with_context(|| format!("Failed to load models from {}", client.base_url()))?;
    let filter = model_args.filter();
    match filter.apply(&available) {
        FilterOutcome::Selected(models) => {
            for model in models {
                let size = format_model_size(model.size_b, model.size_bytes)
                    .unwrap_or_else(|| "n/a".to_string());
                let note = if filter.is_excluded(&model.name) {
                    " (excluded)"
                } else {
                    ""
                };
                println!("{}\t{size}{note}", model.name);
            }
            Ok(())
        }
        FilterOutcome::InvalidPattern { pattern, error } => {
            bail!("Invalid model filter '{pattern}': {error}")
        }
    }
}

async fn export_command(storage: &StorageArgs, output: Option<&Path>) -> Result<()> {
    let text = if storage.api_url.is_some() {
        let rows = storage.store()?.read_all_rows().await?;
        let body = encode_records(rows.iter().map(|row| row.to_record()))?;
        let mut text = header_line();
        text.push_str(&String::from_utf8_lossy(&body));
        text
    } else {
        obench_db::export_csv(&storage.config().path())?
    };
    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Exported results");
        }
        None => print!("{text}"),
    }
    Ok(())
}

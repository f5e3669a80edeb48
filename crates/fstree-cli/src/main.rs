//! Thin CLI binary: parses arguments, resolves credentials, and drives
//! [`fstree::Orchestrator`] -- mirroring `crawler.py::main`'s argument
//! surface and sequencing.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fstree_control::ControlFileWatcher;
use fstree_error::Error;
use fstree_store::Store;
use fstree_types::{FsId, ThrottleConfig};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "fstree", about = "Crawl the FamilySearch Tree API and extract a graph snapshot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a fresh crawl.
    Run(RunArgs),
    /// Resume a crawl, reusing an existing database's queues.
    Resume(RunArgs),
    /// Print the current checkpoint/resume status as JSON.
    Checkpoint {
        #[arg(long)]
        status: bool,
        #[arg(long)]
        outdir: PathBuf,
        #[arg(long)]
        basename: Option<String>,
    },
}

#[derive(Parser, Clone)]
struct RunArgs {
    #[arg(short, long)]
    username: Option<String>,
    #[arg(short, long)]
    password: Option<String>,
    #[arg(short, long = "individuals", num_args = 1..)]
    individuals: Vec<String>,
    #[arg(long, default_value_t = 4)]
    hopcount: u32,
    #[arg(short, long)]
    outdir: PathBuf,
    #[arg(short, long)]
    basename: Option<String>,
    #[arg(short, long, default_value_t = 60)]
    timeout: u64,
    #[arg(short, long)]
    verbose: bool,
    #[arg(long)]
    requests_per_second: Option<f64>,
    #[arg(long)]
    person_batch_size: Option<usize>,
    #[arg(long)]
    max_concurrent_person_requests: Option<usize>,
    #[arg(long)]
    max_concurrent_relationship_requests: Option<usize>,
    #[arg(long)]
    delay_between_person_batches: Option<f64>,
    #[arg(long)]
    delay_between_relationship_batches: Option<f64>,
    #[arg(long)]
    max_retries: Option<u32>,
    #[arg(long)]
    backoff_base: Option<f64>,
    #[arg(long)]
    backoff_multiplier: Option<f64>,
    #[arg(long)]
    backoff_max: Option<f64>,
    #[arg(long)]
    pause_file: Option<PathBuf>,
    #[arg(long)]
    gen_sql: bool,
    #[arg(long)]
    show_password: bool,
}

fn default_basename() -> String {
    std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_else(|_| "fstree".to_string())
}

fn throttle_from_args(args: &RunArgs) -> ThrottleConfig {
    let default = ThrottleConfig::default();
    ThrottleConfig {
        person_batch_size: args.person_batch_size.unwrap_or(default.person_batch_size),
        max_concurrent_person_requests: args.max_concurrent_person_requests.unwrap_or(default.max_concurrent_person_requests),
        max_concurrent_relationship_requests: args
            .max_concurrent_relationship_requests
            .unwrap_or(default.max_concurrent_relationship_requests),
        delay_between_person_batches: args.delay_between_person_batches.unwrap_or(default.delay_between_person_batches),
        delay_between_relationship_batches: args
            .delay_between_relationship_batches
            .unwrap_or(default.delay_between_relationship_batches),
        requests_per_second: args.requests_per_second.unwrap_or(default.requests_per_second),
        max_retries: args.max_retries.unwrap_or(default.max_retries),
        backoff_base_seconds: args.backoff_base.unwrap_or(default.backoff_base_seconds),
        backoff_multiplier: args.backoff_multiplier.unwrap_or(default.backoff_multiplier),
        backoff_max_seconds: args.backoff_max.unwrap_or(default.backoff_max_seconds),
    }
}

fn parse_individuals(raw: &[String]) -> Result<Vec<FsId>, String> {
    raw.iter().map(|id| FsId::new(id.clone()).map_err(|_| format!("Invalid FamilySearch ID: {id}"))).collect()
}

fn write_settings_file(args: &RunArgs, basename: &str) {
    let path = args.outdir.join(format!("{basename}.settings"));
    let password_display = if args.show_password { args.password.as_deref().unwrap_or("") } else { "******" };
    let contents = format!(
        "time stamp: \t{}\n\
         username: \t{}\n\
         password: \t{}\n\
         individuals: \t{}\n\
         hopcount: \t{}\n\
         outdir: \t{}\n\
         basename: \t{}\n\
         timeout: \t{}\n",
        chrono::Utc::now().to_rfc3339(),
        args.username.as_deref().unwrap_or(""),
        password_display,
        args.individuals.join(","),
        args.hopcount,
        args.outdir.display(),
        basename,
        args.timeout,
    );
    if let Err(err) = std::fs::create_dir_all(&args.outdir).and_then(|()| std::fs::write(&path, contents)) {
        warn!(path = %path.display(), error = %err, "unable to write settings file");
    }
}

async fn execute_crawl(args: RunArgs) -> Result<ExitCode, Error> {
    let individuals = match parse_individuals(&args.individuals) {
        Ok(ids) => ids,
        Err(message) => {
            eprintln!("{message}");
            return Ok(ExitCode::from(2));
        }
    };

    let username = args.username.clone().unwrap_or_else(|| {
        let mut input = String::new();
        print!("Enter FamilySearch username: ");
        let _ = std::io::Write::flush(&mut std::io::stdout());
        let _ = std::io::stdin().read_line(&mut input);
        input.trim().to_string()
    });
    let password = match args.password.clone() {
        Some(password) => password,
        None => fstree_http::resolve_password(&username)?,
    };

    let basename = args.basename.clone().unwrap_or_else(default_basename);
    write_settings_file(&args, &basename);

    let db_path = args.outdir.join(format!("{basename}.db"));
    let telemetry_path = args.outdir.join(format!("{basename}.telemetry.jsonl"));

    let config = fstree::RunConfig {
        username,
        password,
        timeout: Duration::from_secs(args.timeout),
        throttle: throttle_from_args(&args),
        individuals,
        hop_count: args.hopcount,
        db_path,
        telemetry_path: Some(telemetry_path),
        install_os_signal_handlers: true,
        base_url: None,
    };

    let orchestrator = match fstree::Orchestrator::connect(config).await {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            error!(error = %err, "login or store setup failed");
            return Ok(ExitCode::from(2));
        }
    };

    if let Some(pause_file) = args.pause_file.clone() {
        let control = orchestrator.control_plane();
        tokio::spawn(async move { ControlFileWatcher::new(pause_file).run(control).await });
    }

    let summary = orchestrator.run().await?;
    if let Some(reason) = &summary.stopped_early {
        info!(reason, "crawl stopped early");
    }
    info!(
        iterations = summary.iterations_completed,
        requests = summary.total_requests,
        "crawl finished"
    );

    let store = orchestrator.store().clone();
    orchestrator.close(args.gen_sql)?;
    let stats = store.get_graph_stats()?;
    info!(stats = %stats, "final graph stats");

    Ok(ExitCode::SUCCESS)
}

fn run_checkpoint(status: bool, outdir: PathBuf, basename: Option<String>) -> Result<ExitCode, Error> {
    let basename = basename.unwrap_or_else(default_basename);
    let db_path = outdir.join(format!("{basename}.db"));
    if !db_path.exists() {
        eprintln!("no database found at {}", db_path.display());
        return Ok(ExitCode::from(2));
    }
    let store = Store::open(&db_path)?;
    if status {
        let checkpoint_status = store.get_checkpoint_status()?;
        println!("{}", serde_json::to_string_pretty(&checkpoint_status)?);
    }
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Run(args) | Command::Resume(args) => args.verbose,
        Command::Checkpoint { .. } => false,
    };
    init_tracing(verbose);

    let result = match cli.command {
        Command::Run(args) | Command::Resume(args) => execute_crawl(args).await,
        Command::Checkpoint { status, outdir, basename } => run_checkpoint(status, outdir, basename),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "fstree failed");
            if matches!(err, Error::Auth(_)) { ExitCode::from(2) } else { ExitCode::FAILURE }
        }
    }
}

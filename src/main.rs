use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use miette::{Context, IntoDiagnostic, Result};

use churnscope_core::{short_hash, ChurnConfig, EntityMode, RepoSpec};
use churnscope_evolve::pipeline;
use churnscope_mine::checkpoint::CsvCheckpoint;
use churnscope_mine::coordinator::{mine_all, RepoEventSink, RepoReport};
use churnscope_mine::traversal::TraversalEvent;

#[derive(Parser)]
#[command(
    name = "churnscope",
    version,
    about = "Design-metric change mining over git histories",
    long_about = "Churnscope mines a repository's full commit history, runs an external\n\
                   design-metrics analyzer against every commit, and tracks how each class\n\
                   or method's metrics evolved — ranking entities by how often they changed.\n\n\
                   Mining is resumable: interrupt it at commit 4,000 of 7,000 and the next\n\
                   run picks up where it left off.\n\n\
                   Examples:\n  \
                     churnscope init                  Create a .churnscope.toml config file\n  \
                     churnscope mine                  Mine every configured repository\n  \
                     churnscope mine --repo lang      Mine one repository\n  \
                     churnscope status                Show per-repository mining progress\n  \
                     churnscope evolve                Build per-entity change timelines\n  \
                     churnscope stats --min-changes 5 Rank entities by change count\n  \
                     churnscope run                   Mine, evolve, and rank end to end"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .churnscope.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory all relative paths resolve against
    #[arg(long, global = true, default_value = ".")]
    workdir: PathBuf,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Mine commit histories and per-commit metrics
    #[command(long_about = "Mine commit histories and per-commit metrics.\n\n\
        Clones each configured repository if needed, walks its history oldest-first,\n\
        writes per-commit diff artifacts, checks out every commit, and runs the\n\
        configured analyzer against the tree. Progress is checkpointed per commit,\n\
        so an interrupted run resumes instead of restarting.\n\n\
        Examples:\n  churnscope mine\n  churnscope mine --repo commons-lang --workers 2")]
    Mine {
        /// Mine only these configured repositories (default: all)
        #[arg(long)]
        repo: Vec<String>,

        /// Override the concurrent-repository bound from the config
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Build per-entity change timelines from mined metrics
    #[command(long_about = "Build per-entity change timelines from mined metrics.\n\n\
        Walks each commit's analyzer output in history order, deduplicates\n\
        consecutive identical metric vectors, and writes one timeline CSV per\n\
        entity under results/{repo}/evolutions/. Refuses to run on a repository\n\
        whose mining is incomplete.\n\n\
        Examples:\n  churnscope evolve\n  churnscope evolve --repo commons-lang --mode method")]
    Evolve {
        /// Process only these configured repositories (default: all)
        #[arg(long)]
        repo: Vec<String>,

        /// Track classes or methods (overrides the config)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
    /// Aggregate timelines into a ranked statistics table
    #[command(long_about = "Aggregate timelines into a ranked statistics table.\n\n\
        Computes min/max/mean/Q3 per metric over each entity's distinct vectors\n\
        and writes results/{repo}/statistics-sorted.csv, ranked by change count.\n\n\
        Examples:\n  churnscope stats\n  churnscope stats --repo commons-lang --min-changes 5")]
    Stats {
        /// Process only these configured repositories (default: all)
        #[arg(long)]
        repo: Vec<String>,

        /// Minimum change count for an entity to appear (overrides the config)
        #[arg(long)]
        min_changes: Option<usize>,

        /// Track classes or methods (overrides the config)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
    /// Mine, evolve, and rank in one pass
    #[command(long_about = "Mine, evolve, and rank in one pass.\n\n\
        Equivalent to `churnscope mine` followed by `churnscope evolve` and\n\
        `churnscope stats` for every repository that mined successfully.\n\n\
        Example:\n  churnscope run --repo commons-lang")]
    Run {
        /// Process only these configured repositories (default: all)
        #[arg(long)]
        repo: Vec<String>,
    },
    /// Show per-repository mining progress
    #[command(long_about = "Show per-repository mining progress.\n\n\
        Reads each repository's checkpoint file without modifying it and reports\n\
        the last completed commit. Repositories without a checkpoint are either\n\
        fully mined (commit list present) or not yet started.")]
    Status,
    /// Create a default .churnscope.toml configuration file
    #[command(long_about = "Create a default .churnscope.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if .churnscope.toml already exists.")]
    Init,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Track class-level metrics
    Class,
    /// Track method-level metrics
    Method,
}

impl From<ModeArg> for EntityMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Class => EntityMode::Class,
            ModeArg::Method => EntityMode::Method,
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# Churnscope configuration

# Repositories to mine. Each needs a short name (used in output paths)
# and a clone URL.
# [[repos]]
# name = "commons-lang"
# url = "https://github.com/apache/commons-lang.git"
# path = "repos/commons-lang"   # optional working-copy override
# commits = 7200                # optional, for the up-front time estimate

[paths]
# repos_dir = "repos"
# diffs_dir = "diffs"
# metrics_dir = "metrics"
# checkpoints_dir = "checkpoints"
# results_dir = "results"

[analyzer]
# Invoked as: <binary> <worktree> <flags...> <output-dir>
# binary = "ck"
# flags = ["false", "0", "false"]
# class_file = "class.csv"
# method_file = "method.csv"

[mining]
# max_workers = 4
# seconds_per_commit = 14.0

[evolution]
# mode = "class"          # or "method"
# min_changes = 2
# source_root_marker = "src/"
"#;

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!("churnscope v{version} — design-metric change mining over git histories\n");

    println!("Quick start:");
    println!("  churnscope init       Create a .churnscope.toml config file");
    println!("  churnscope mine       Mine every configured repository");
    println!("  churnscope run        Mine, evolve, and rank end to end\n");

    println!("All commands:");
    println!("  mine      Resumable per-commit metrics mining");
    println!("  evolve    Per-entity change timelines");
    println!("  stats     Ranked change-count statistics");
    println!("  run       Mine + evolve + stats");
    println!("  status    Per-repository mining progress");
    println!("  init      Create default configuration\n");

    println!("Run 'churnscope <command> --help' for details.");
}

/// Join every relative path in the config onto `workdir`; absolute
/// paths are left alone. `workdir` must already be absolute so the
/// anchored paths mean the same thing in every stage, and the process
/// CWD is never consulted after this.
fn anchor_config(config: &mut ChurnConfig, workdir: &Path) {
    for dir in [
        &mut config.paths.repos_dir,
        &mut config.paths.diffs_dir,
        &mut config.paths.metrics_dir,
        &mut config.paths.checkpoints_dir,
        &mut config.paths.results_dir,
    ] {
        if dir.is_relative() {
            *dir = workdir.join(&dir);
        }
    }
    for repo in &mut config.repos {
        if let Some(path) = &mut repo.path {
            if path.is_relative() {
                *path = workdir.join(&path);
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<ChurnConfig> {
    let mut config = match &cli.config {
        Some(path) => ChurnConfig::from_file(path)
            .into_diagnostic()
            .wrap_err(format!("loading {}", path.display()))?,
        None => {
            let default_path = cli.workdir.join(".churnscope.toml");
            if default_path.exists() {
                ChurnConfig::from_file(&default_path)
                    .into_diagnostic()
                    .wrap_err(format!("loading {}", default_path.display()))?
            } else {
                ChurnConfig::default()
            }
        }
    };
    anchor_config(&mut config, &cli.workdir);
    Ok(config)
}

fn select_repos(config: &ChurnConfig, names: &[String]) -> Result<Vec<RepoSpec>> {
    if names.is_empty() {
        if config.repos.is_empty() {
            miette::bail!(miette::miette!(
                help = "Add a [[repos]] entry to .churnscope.toml, or run 'churnscope init'",
                "No repositories configured"
            ));
        }
        return Ok(config.repos.clone());
    }
    names
        .iter()
        .map(|name| {
            config.repo(name).cloned().ok_or_else(|| {
                miette::miette!(
                    help = "Repository names come from [[repos]] entries in the config",
                    "Unknown repository '{name}'"
                )
            })
        })
        .collect()
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m {:02}s", total % 60)
    }
}

/// Event sink rendering per-repository progress bars on a terminal, or
/// plain log lines otherwise.
fn progress_sink(verbose: bool) -> Arc<RepoEventSink> {
    if !std::io::stderr().is_terminal() {
        return Arc::new(move |repo: &str, event: TraversalEvent| match event {
            TraversalEvent::Resumed {
                resume_index,
                total_commits,
                percent_complete,
                eta_seconds,
            } => {
                if resume_index > 0 {
                    eprintln!(
                        "{repo}: resuming at commit {}/{total_commits} \
                         ({percent_complete:.1}% done, ~{} left)",
                        resume_index + 1,
                        format_duration(eta_seconds),
                    );
                } else {
                    eprintln!("{repo}: mining {total_commits} commits");
                }
            }
            TraversalEvent::DurationProjected { total_seconds } => {
                eprintln!(
                    "{repo}: estimated {} remaining",
                    format_duration(total_seconds)
                );
            }
            TraversalEvent::CommitMined { index, hash } => {
                if verbose {
                    eprintln!("{repo}: mined {index} ({})", short_hash(&hash));
                }
            }
            TraversalEvent::CommitFailed { index, reason, .. } => {
                eprintln!("{repo}: commit {index} failed: {reason}");
            }
            TraversalEvent::Warning(message) => eprintln!("{repo}: warning: {message}"),
            TraversalEvent::Completed { processed, failed } => {
                eprintln!("{repo}: done ({processed} mined, {failed} failed)");
            }
        });
    }

    let multi = MultiProgress::new();
    let bars: Mutex<HashMap<String, ProgressBar>> = Mutex::new(HashMap::new());
    let style = ProgressStyle::with_template(
        "{prefix:>16} [{bar:30}] {pos}/{len} ({percent}%) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    Arc::new(move |repo: &str, event: TraversalEvent| {
        let mut bars = match bars.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match event {
            TraversalEvent::Resumed {
                resume_index,
                total_commits,
                ..
            } => {
                let bar = multi.add(ProgressBar::new(total_commits as u64));
                bar.set_style(style.clone());
                bar.set_prefix(repo.to_string());
                bar.set_position(resume_index as u64);
                bars.insert(repo.to_string(), bar);
            }
            TraversalEvent::DurationProjected { total_seconds } => {
                if let Some(bar) = bars.get(repo) {
                    bar.set_message(format!("~{} left", format_duration(total_seconds)));
                }
            }
            TraversalEvent::CommitMined { .. } => {
                if let Some(bar) = bars.get(repo) {
                    bar.inc(1);
                }
            }
            TraversalEvent::CommitFailed { index, reason, .. } => {
                if let Some(bar) = bars.get(repo) {
                    bar.inc(1);
                }
                let _ = multi.println(format!("{repo}: commit {index} failed: {reason}"));
            }
            TraversalEvent::Warning(message) => {
                let _ = multi.println(format!("{repo}: warning: {message}"));
            }
            TraversalEvent::Completed { processed, failed } => {
                if let Some(bar) = bars.remove(repo) {
                    bar.finish_with_message(format!("{processed} mined, {failed} failed"));
                }
            }
        }
    })
}

/// Run the mining coordinator and report per-repository outcomes.
/// Returns the names of repositories that mined to completion.
async fn run_mine(config: &ChurnConfig, specs: Vec<RepoSpec>, verbose: bool) -> Vec<String> {
    let on_event = progress_sink(verbose);
    let reports = mine_all(Arc::new(config.clone()), specs, on_event).await;

    let mut completed = Vec::new();
    for RepoReport { name, outcome } in reports {
        match outcome {
            Ok(outcome) => {
                eprintln!(
                    "{name}: {} commits, {} mined this run, {} analyzer failures",
                    outcome.total_commits,
                    outcome.processed,
                    outcome.failed_commits.len(),
                );
                completed.push(name);
            }
            Err(e) => {
                eprintln!("{name}: aborted: {e}");
            }
        }
    }
    completed
}

fn run_evolve(config: &ChurnConfig, names: &[String]) -> Result<()> {
    for name in names {
        let report = pipeline::run_evolution(config, name)
            .into_diagnostic()
            .wrap_err(format!("building timelines for {name}"))?;
        println!(
            "{name}: {} entities over {} commits, {} written \
             ({} skipped rows, {} unusable commits)",
            report.entities,
            report.total_commits,
            report.reported,
            report.skipped_rows,
            report.failed_commits.len(),
        );
    }
    Ok(())
}

fn run_stats(config: &ChurnConfig, names: &[String], min_changes: usize) -> Result<()> {
    for name in names {
        let report = pipeline::run_stats(config, name, min_changes)
            .into_diagnostic()
            .wrap_err(format!("aggregating statistics for {name}"))?;
        let path = report
            .statistics_path
            .as_deref()
            .map(Path::display)
            .map(|d| d.to_string())
            .unwrap_or_default();
        println!(
            "{name}: {} of {} entities ranked (min {min_changes} changes) -> {path}",
            report.reported, report.entities,
        );
    }
    Ok(())
}

fn run_status(config: &ChurnConfig) -> Result<()> {
    if config.repos.is_empty() {
        println!("No repositories configured.");
        return Ok(());
    }
    for spec in &config.repos {
        let checkpoint = CsvCheckpoint::new(&config.paths.checkpoints_dir, &spec.name);
        let last = CsvCheckpoint::peek(checkpoint.path()).into_diagnostic()?;
        match last {
            Some(index) => {
                let progress = match spec.commits {
                    Some(total) if total > 0 => {
                        let percent = index as f64 / total as f64 * 100.0;
                        let eta = (total - index.min(total)) as f64
                            * config.mining.seconds_per_commit;
                        format!(
                            "{index}/{total} commits ({percent:.1}%), ~{} left",
                            format_duration(eta)
                        )
                    }
                    _ => format!("{index} commits"),
                };
                println!("{:<24} in progress: {progress}", spec.name);
            }
            None => {
                let commit_list = config
                    .paths
                    .metrics_dir
                    .join(&spec.name)
                    .join(churnscope_core::COMMIT_LIST_FILE);
                if commit_list.exists() {
                    println!("{:<24} mined", spec.name);
                } else {
                    println!("{:<24} not started", spec.name);
                }
            }
        }
    }
    Ok(())
}

fn run_init(workdir: &Path) -> Result<()> {
    let path = workdir.join(".churnscope.toml");
    if path.exists() {
        miette::bail!("{} already exists", path.display());
    }
    std::fs::write(&path, DEFAULT_CONFIG).into_diagnostic()?;
    println!("Created {} with default configuration", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let mut cli = Cli::parse();
    let Some(command) = cli.command.take() else {
        print_welcome();
        return Ok(());
    };

    // Resolve the workdir exactly once; every relative path in the
    // config is anchored onto this absolute root.
    cli.workdir = std::path::absolute(&cli.workdir)
        .into_diagnostic()
        .wrap_err("resolving --workdir")?;

    let mut config = load_config(&cli)?;

    if cli.verbose {
        eprintln!("workdir: {}", cli.workdir.display());
        eprintln!(
            "{} repositories configured, {} workers, mode: {}",
            config.repos.len(),
            config.mining.max_workers,
            config.evolution.mode,
        );
    }

    match command {
        Command::Mine { repo, workers } => {
            if let Some(workers) = workers {
                config.mining.max_workers = workers;
            }
            let specs = select_repos(&config, &repo)?;
            run_mine(&config, specs, cli.verbose).await;
        }
        Command::Evolve { repo, mode } => {
            if let Some(mode) = mode {
                config.evolution.mode = mode.into();
            }
            let specs = select_repos(&config, &repo)?;
            let names: Vec<String> = specs.into_iter().map(|s| s.name).collect();
            run_evolve(&config, &names)?;
        }
        Command::Stats {
            repo,
            min_changes,
            mode,
        } => {
            if let Some(mode) = mode {
                config.evolution.mode = mode.into();
            }
            let specs = select_repos(&config, &repo)?;
            let names: Vec<String> = specs.into_iter().map(|s| s.name).collect();
            let threshold = min_changes.unwrap_or(config.evolution.min_changes);
            run_stats(&config, &names, threshold)?;
        }
        Command::Run { repo } => {
            let specs = select_repos(&config, &repo)?;
            let completed = run_mine(&config, specs, cli.verbose).await;
            run_evolve(&config, &completed)?;
            run_stats(&config, &completed, config.evolution.min_changes)?;
        }
        Command::Status => run_status(&config)?,
        Command::Init => run_init(&cli.workdir)?,
    }

    Ok(())
}

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use repobench::backend::{ConnectParams, ConnectionFactory, FsFactory, MemoryFactory};
use repobench::config::RunnerFile;
use repobench::report::{render_text, ReportFormat};
use repobench::runner::{default_run_id, persist, publish_report, Runner};
use repobench::suite::SuiteRegistry;
use repobench::TimeUnit;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Memory,
    Fs,
}

impl BackendArg {
    fn factory(self) -> Box<dyn ConnectionFactory> {
        match self {
            BackendArg::Memory => Box::new(MemoryFactory::default()),
            BackendArg::Fs => Box::new(FsFactory::default()),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered suites and whether the current filter selects them.
    List,

    /// Run the suites against the selected backends and persist the timings.
    Run {
        /// Backends to benchmark, in order. Can be provided multiple times.
        #[arg(short, long, value_enum, num_args = 1.., default_values_t = [BackendArg::Memory, BackendArg::Fs])]
        backend: Vec<BackendArg>,

        /// Measured iterations per suite (overrides `repeat.count`).
        #[arg(long)]
        repeat: Option<u32>,

        /// Warmup iterations per suite (overrides `warmup.count`).
        #[arg(long)]
        warmup: Option<u32>,

        /// Directory name for this run's artifacts. Defaults to a timestamp.
        #[arg(long)]
        run_id: Option<String>,

        /// Storage root for the `fs` backend. A temporary directory otherwise.
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Aggregate the data directory and write a report afterwards.
        #[arg(long, default_value_t = false)]
        report: bool,

        #[arg(long, value_enum, default_value_t = TimeUnit::Milliseconds)]
        unit: TimeUnit,
    },

    /// Aggregate every stored run and write the comparison report.
    Report {
        #[arg(long, value_enum, default_value_t = TimeUnit::Milliseconds)]
        unit: TimeUnit,

        /// What to print on stdout.
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,

        /// Report directory (overrides `output.report_dir`).
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Print a starter `repobench.toml`.
    Init,
}

#[derive(Parser, Debug)]
#[command(name = "repobench")]
#[command(about = "Compare node-store backends with repeatable workload suites")]
struct Args {
    /// Runner file. Defaults to the nearest `repobench.toml`.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Include pattern (whole-name regex). Can be provided multiple times.
    #[arg(long, global = true, action = clap::ArgAction::Append)]
    include: Vec<String>,

    /// Exclude pattern (whole-name regex). Can be provided multiple times.
    #[arg(long, global = true, action = clap::ArgAction::Append)]
    exclude: Vec<String>,

    /// Data directory (overrides `output.data_dir`).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "repobench=debug"
    } else {
        "repobench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_runner_file(explicit: Option<&PathBuf>) -> anyhow::Result<RunnerFile> {
    match explicit.cloned().or_else(RunnerFile::discover) {
        Some(path) => {
            info!(path = %path.display(), "using runner file");
            Ok(RunnerFile::load(&path)?)
        }
        None => Ok(RunnerFile::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Command::Init = args.cmd {
        print!("{}", RunnerFile::default_toml());
        return Ok(());
    }

    let file = load_runner_file(args.config.as_ref())?;
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| file.output.data_dir.clone());

    match args.cmd {
        // Printed before any runner file is read.
        Command::Init => {}
        Command::List => {
            let config = file
                .to_builder()
                .include(args.include)
                .exclude(args.exclude)
                .build()?;
            for descriptor in SuiteRegistry::builtin().iter() {
                let selected = config
                    .filter()
                    .is_included(descriptor.name, &descriptor.qualified_name());
                println!(
                    "{} {}",
                    if selected { "+" } else { "-" },
                    descriptor.qualified_name()
                );
            }
        }
        Command::Run {
            backend,
            repeat,
            warmup,
            run_id,
            root,
            report,
            unit,
        } => {
            let mut builder = file.to_builder().include(args.include).exclude(args.exclude);
            if let Some(n) = repeat {
                builder = builder.repeat_count(n);
            }
            if let Some(n) = warmup {
                builder = builder.warmup_count(n);
            }
            let config = builder.build()?;

            let mut params = ConnectParams::new();
            if let Some(root) = root {
                params.insert("root".to_string(), root.display().to_string());
            }
            let factories: Vec<_> = backend.into_iter().map(BackendArg::factory).collect();

            let runner = Runner::new(config, SuiteRegistry::builtin());
            let runs = runner.run(&factories, &params);

            let run_id = run_id.unwrap_or_else(default_run_id);
            let written = persist(&runs, &data_dir, &run_id)
                .with_context(|| format!("writing results to {}", data_dir.display()))?;
            eprintln!("Wrote {} result file(s) for run {run_id}", written.len());

            if report {
                let report = publish_report(
                    &data_dir,
                    &file.output.report_dir,
                    unit,
                    file.tests.description.clone(),
                )?;
                print!("{}", render_text(&report));
            }
        }
        Command::Report { unit, format, out } => {
            let report_dir = out.unwrap_or_else(|| file.output.report_dir.clone());
            let report = publish_report(&data_dir, &report_dir, unit, file.tests.description.clone())?;
            match format {
                ReportFormat::Text => print!("{}", render_text(&report)),
                ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
    }

    Ok(())
}

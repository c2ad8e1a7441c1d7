use anyhow::Result;
use clap::Parser;
use sidefx::cli::{AnalyzeArgs, Cli, Command, OutputFormat};
use sidefx::profiler::CaseProfiles;
use sidefx::recorder::BUNDLE_SOURCE;
use sidefx::session::{analyze_profiles, discover_cases};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `--debug` raises everything to trace
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sidefx=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn analyze(args: &AnalyzeArgs) -> Result<()> {
    let config = args.session_config()?;
    let without_script = CaseProfiles::load(&args.without)?;
    let with_script = CaseProfiles::load(&args.with)?;

    if without_script.is_empty() && with_script.is_empty() {
        anyhow::bail!(
            "No profiled cases in {} or {}",
            args.without.display(),
            args.with.display()
        );
    }

    let report = analyze_profiles(&config, &without_script, &with_script)?;

    match args.format {
        OutputFormat::Text => print!("{}", report.to_report_string()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.results)?),
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.debug);

    match &cli.command {
        Command::Analyze(args) => analyze(args)?,
        Command::Cases { dir } => {
            for case in discover_cases(dir)? {
                println!("{}", case.display());
            }
        }
        Command::Bundle => print!("{}", BUNDLE_SOURCE),
    }

    Ok(())
}

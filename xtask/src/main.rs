use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for gridphase")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Run the broad-phase benchmarks in release mode
    Bench,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
    /// Run the CLI pairs command with brute-force validation for every strategy
    Validate {
        /// Bodies per scene
        #[arg(short, long, default_value = "2000")]
        bodies: usize,
    },
}

const STRATEGIES: [&str; 8] = [
    "immediate",
    "run",
    "single",
    "parallel",
    "tracked",
    "cached",
    "unsafe",
    "scheduled",
];

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            run_fmt()?;
            run_clippy()?;
            run_tests()?;
            run_doc()?;
        }
        Commands::Fmt => run_fmt()?,
        Commands::Clippy => run_clippy()?,
        Commands::Test => run_tests()?,
        Commands::Bench => cargo("bench", &["bench", "-p", "gridphase-pairs"])?,
        Commands::Doc => run_doc()?,
        Commands::Build => cargo("build", &["build", "--workspace"])?,
        Commands::Validate { bodies } => run_validate(bodies)?,
    }

    Ok(())
}

fn cargo(label: &str, args: &[&str]) -> Result<()> {
    println!("==> Running cargo {}", args.join(" "));
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {label} failed");
    }
    Ok(())
}

fn run_fmt() -> Result<()> {
    cargo("fmt check", &["fmt", "--all", "--", "--check"])
}

fn run_clippy() -> Result<()> {
    cargo(
        "clippy",
        &[
            "clippy",
            "--workspace",
            "--all-targets",
            "--",
            "-D",
            "warnings",
        ],
    )
}

fn run_tests() -> Result<()> {
    cargo("test", &["test", "--workspace"])
}

fn run_doc() -> Result<()> {
    cargo("doc", &["doc", "--workspace", "--no-deps"])
}

fn run_validate(bodies: usize) -> Result<()> {
    let bodies = bodies.to_string();
    for strategy in STRATEGIES {
        cargo(
            "run",
            &[
                "run",
                "--release",
                "-p",
                "gridphase-cli",
                "--",
                "pairs",
                "--bodies",
                &bodies,
                "--strategy",
                strategy,
                "--validate",
            ],
        )?;
    }
    Ok(())
}

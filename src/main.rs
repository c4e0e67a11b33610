use anyhow::{Context, Result, anyhow};
use clap::Parser;
use deployctl::deploy::{DeployTarget, ProviderKind, create_provider};
use deployctl::install::{InstallDispatcher, InstallError, InstallerConfig, InstallerRegistry};
use deployctl::platform;
use deployctl::runtime::{RealRuntime, Runtime};
use std::path::PathBuf;
use std::process::ExitCode;

/// deployctl - deploy git refs or archives, and run platform installers
///
/// Examples:
///   deployctl install                    # Run the installer for the detected platform
///   deployctl install rhel               # Run scripts/install.sh with bash
///   deployctl deploy git https://example.com/app.git main /srv/app
#[derive(Parser, Debug)]
#[command(author, version = env!("DEPLOYCTL_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the installer registered for a platform
    Install(InstallArgs),

    /// Deploy a source reference to a directory
    Deploy(DeployArgs),
}

#[derive(clap::Args, Debug)]
struct InstallArgs {
    /// Platform identifier (rhel, debian, macos, ...); detected when omitted
    #[arg(value_name = "PLATFORM")]
    platform: Option<String>,

    /// Installer configuration file (JSON)
    #[arg(long, env = "DEPLOYCTL_INSTALLERS", value_name = "FILE")]
    installers: Option<PathBuf>,

    /// Directory installers run from (defaults to the current directory)
    #[arg(long = "base-dir", env = "DEPLOYCTL_BASE_DIR", value_name = "DIR")]
    base_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct DeployArgs {
    /// Backend: git or archive
    #[arg(value_name = "PROVIDER")]
    provider: ProviderKind,

    /// Git remote URL, or archive URL/path
    #[arg(value_name = "REMOTE")]
    remote: String,

    /// Git ref to check out, or archive version label
    #[arg(value_name = "REFERENCE")]
    reference: String,

    /// Target directory
    #[arg(value_name = "DESTINATION")]
    destination: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    let runtime = RealRuntime;
    match command {
        Commands::Install(args) => install(runtime, args).await,
        Commands::Deploy(args) => deploy(args).await,
    }
}

async fn install<R: Runtime>(runtime: R, args: InstallArgs) -> Result<()> {
    let config = InstallerConfig::resolve(&runtime, args.installers.as_deref())?;
    let base_dir = match args.base_dir {
        Some(dir) => dir,
        None => runtime.current_dir()?,
    };
    let registry = InstallerRegistry::from_config(base_dir, &config)?;

    let platform = match args.platform {
        Some(platform) => platform,
        None => platform::detect(&runtime)
            .map(|target| target.to_string())
            .ok_or_else(|| anyhow!("Could not detect the platform; pass it explicitly"))?,
    };

    let dispatcher = InstallDispatcher::new(runtime, registry);
    dispatcher.install(&platform).await?;
    Ok(())
}

async fn deploy(args: DeployArgs) -> Result<()> {
    let provider = create_provider(args.provider)?;
    let target = DeployTarget::new(args.remote, args.reference, args.destination);
    let result = provider
        .deploy(&target)
        .await
        .with_context(|| format!("Failed to deploy {}", target))?;
    println!(
        "deployed {} to {}",
        result.revision,
        result.destination.display()
    );
    Ok(())
}

/// A failed installer's own exit code is propagated; everything else exits with 1.
fn exit_code_for(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<InstallError>()
        .and_then(InstallError::exit_code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

//! suitegrid - launch platform-specific test agents and render results
//!
//! ## Usage
//!
//! ```bash
//! # Write an example configuration
//! suitegrid config init
//!
//! # Show which launchers serve which platforms
//! suitegrid platforms
//!
//! # Start an x86 worker for a package and wait up to 10s for it
//! suitegrid request tests.dll --platform x86 --timeout 10
//!
//! # Render a result tree returned by a worker
//! suitegrid results result.json --format summary
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use suitegrid::agents::{spawn_acceptor, AgentService, CallbackServer, Service, WaitTimeout};
use suitegrid::cli::{self, Args};
use suitegrid::config::{print_env_help, AppConfig, ConfigFile, EnvConfig};
use suitegrid::models::{settings, Platform, TestPackage, TestResult};
use suitegrid::output::{write_result_to_file, OutputFormat, ResultFormatter};
use suitegrid::utils::{init_logger, LogLevel, Timer};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let config_path = args
        .config
        .clone()
        .or_else(|| env.config_file.clone().map(Into::into));
    let mut file = match &config_path {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::load_default()?,
    };
    env.apply(&mut file.app);

    let level = LogLevel::from_str(&file.app.log_level)
        .unwrap_or(LogLevel::Info)
        .with_verbosity(args.verbose);
    init_logger(level);

    match args.command {
        cli::Command::Platforms => list_platforms(&file.app),
        cli::Command::Request(request_args) => request(&file, request_args).await?,
        cli::Command::Results(results_args) => show_results(results_args, &env)?,
        cli::Command::Config(config_args) => manage_config(config_args, &file, config_path)?,
    }

    Ok(())
}

fn list_platforms(config: &AppConfig) {
    println!("\nHost platform: {}\n", Platform::host());

    if config.agents.launchers.is_empty() {
        println!("No launchers configured.");
        return;
    }

    println!("{:24} {:10} {:8} Program", "Launcher", "Platform", "Found");
    println!("──────────────────────────────────────────────────────────────────────");
    for launcher in &config.agents.launchers {
        let built = launcher.build();
        let found = if launcher.program.exists() || launcher.program.components().count() == 1 {
            "✓"
        } else {
            "✗"
        };
        println!(
            "{:24} {:10} {:8} {}",
            built.name(),
            launcher.platform.to_string(),
            found,
            launcher.program.display()
        );
    }
    println!();
}

fn build_package(file: &ConfigFile, args: &cli::RequestArgs) -> Result<TestPackage> {
    let mut package = match &args.profile {
        Some(name) => file
            .profile(name)
            .with_context(|| format!("Unknown profile: {name}"))?
            .to_package(&args.package),
        None => TestPackage::new(&args.package),
    };

    if let Some(platform) = &args.platform {
        package = package.with_setting(settings::TARGET_PLATFORM, platform.as_str());
    }
    if let Some(runtime) = &args.runtime {
        package = package.with_setting(settings::RUNTIME_FRAMEWORK, runtime.as_str());
    }
    for (key, value) in &args.settings {
        package = package.with_setting(key.as_str(), value.as_str());
    }

    Ok(package)
}

fn wait_timeout(config: &AppConfig, package: &TestPackage, args: &cli::RequestArgs) -> WaitTimeout {
    match args.timeout.or_else(|| package.agent_launch_timeout()) {
        Some(0) => WaitTimeout::Infinite,
        Some(secs) => WaitTimeout::Finite(Duration::from_secs(secs)),
        None => config.agents.wait_timeout(),
    }
}

async fn request(file: &ConfigFile, args: cli::RequestArgs) -> Result<()> {
    let package = build_package(file, &args)?;
    let wait = wait_timeout(&file.app, &package, &args);

    let server = CallbackServer::bind(&file.app.agents.callback_addr)
        .await
        .with_context(|| format!("binding {}", file.app.agents.callback_addr))?;
    let callback = server.local_addr().to_string();

    let (runtime, orchestrator) = file.app.agents.build_orchestrator(Some(&callback));
    let orchestrator = Arc::new(orchestrator);
    let service = AgentService::new(orchestrator.clone());

    runtime.start()?;
    if let Err(e) = service.start() {
        runtime.stop()?;
        return Err(e);
    }

    let (inbox, acceptor) = spawn_acceptor(orchestrator.clone());
    let shutdown = CancellationToken::new();
    let listener = server.serve(inbox, shutdown.clone());
    info!("Workers call back to {}", callback);

    let timer = Timer::start(format!("request {}", package.name));
    let outcome = orchestrator.request_worker(&package, wait).await;
    let elapsed = timer.stop();

    let result = match outcome {
        Ok(Some(agent)) => {
            println!(
                "✓ Agent {} registered for {} in {}ms",
                agent,
                package.name,
                elapsed.as_millis()
            );
            if args.hold {
                println!("Holding agent service; press Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
            }
            orchestrator.release_agent(&agent);
            Ok(())
        }
        Ok(None) => {
            println!("✗ No agent registered for {} within {}", package.name, wait);
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("requesting worker for {}", package.name))),
    };

    shutdown.cancel();
    if let Err(e) = listener.await {
        warn!("Callback listener ended abnormally: {}", e);
    }
    if let Err(e) = acceptor.await {
        warn!("Agent acceptor ended abnormally: {}", e);
    }

    service.stop()?;
    runtime.stop()?;
    result
}

fn show_results(args: cli::ResultsArgs, env: &EnvConfig) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read result file: {}", args.file.display()))?;
    let result: TestResult = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse result file: {}", args.file.display()))?;

    let format_name = if args.format == "table" {
        env.format_or("table")
    } else {
        args.format.clone()
    };
    let format = OutputFormat::from_str(&format_name).with_context(|| {
        format!(
            "Unknown format '{}', expected one of: {}",
            format_name,
            OutputFormat::all().join(", ")
        )
    })?;

    let mut formatter = ResultFormatter::new(format);
    if args.no_color {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format_result(&result)?);

    if let Some(path) = &args.output {
        write_result_to_file(path, &result, format)?;
        info!("Results written to {}", path);
    }

    Ok(())
}

fn manage_config(
    args: cli::ConfigArgs,
    file: &ConfigFile,
    config_path: Option<std::path::PathBuf>,
) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists; use --force to overwrite",
                    path.display()
                );
            }
            ConfigFile::example().save(&path)?;
            println!("✓ Wrote example configuration to {}", path.display());
        }
        cli::ConfigAction::Show { json } => {
            let source = config_path.or_else(ConfigFile::find);
            match &source {
                Some(path) => println!("# Source: {}", path.display()),
                None => println!("# Source: built-in defaults"),
            }
            let rendered = if json {
                serde_json::to_string_pretty(file)?
            } else {
                serde_yaml::to_string(file)?
            };
            println!("{rendered}");
        }
        cli::ConfigAction::Validate { path } => {
            let path = path
                .or(config_path)
                .or_else(ConfigFile::find)
                .context("No configuration file found")?;
            validate_file(&path)?;
        }
        cli::ConfigAction::Env => {
            print_env_help();
            println!();
            EnvConfig::load().print_summary();
        }
    }

    Ok(())
}

fn validate_file(path: &Path) -> Result<()> {
    match ConfigFile::load(path) {
        Ok(_) => {
            println!("✓ {} is valid", path.display());
            Ok(())
        }
        Err(e) => {
            println!("✗ {} is invalid", path.display());
            Err(e)
        }
    }
}

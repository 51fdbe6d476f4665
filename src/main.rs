use anyhow::{Context, Result};
use indexmap::IndexMap;
use ragline::cli::commands::{RunCommand, ToolsCommand, ValidateCommand};
use ragline::cli::output::*;
use ragline::cli::{Cli, Command};
use ragline::core::config::PipelineConfig;
use ragline::execution::PipelineExecutor;
use ragline::provider::ProviderRegistry;
use serde_json::Value;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Tools(cmd) => list_tools(cmd).await?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    // Load pipeline config
    let config =
        PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let definition = config.to_pipeline()?;

    println!(
        "{} Loaded pipeline: {}",
        INFO,
        style(&definition.name).bold()
    );

    // Seed variables from --set overrides
    let mut seed = IndexMap::new();
    for (key, raw) in &cmd.set {
        let value: Value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
        println!(
            "{} Seed variable: {} = {}",
            INFO,
            style(key).cyan(),
            style(raw).dim()
        );
        seed.insert(key.clone(), value);
    }

    let mut executor = PipelineExecutor::new(definition);

    // Set up event handler for console output
    if !cmd.quiet {
        executor.add_event_handler(move |event| {
            println!("{}", format_run_event(&event));
        });
    }

    // Ctrl-C cancels at the next node boundary
    let cancel = executor.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} Cancelling after the current step...", WARN);
            cancel.cancel();
        }
    });

    // Execute pipeline
    println!();
    match executor.run_with_seed(seed).await {
        Ok(outcome) => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&outcome.report.pipeline_name).bold(),
                style("successfully").green()
            );
            println!("  {}", format_report(&outcome.report));

            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&outcome.state)?);
            } else if !outcome.state.is_empty() {
                println!("\n{} Final state:", INFO);
                for (key, value) in &outcome.state {
                    println!("  {} = {}", style(key).cyan(), format_value(value));
                }
            }
            Ok(())
        }
        Err(run_error) => {
            println!(
                "\n{} pipeline {} at {}",
                CROSS,
                style("failed").red(),
                style(run_error.path.to_string()).bold()
            );
            error!("{}", run_error);
            eprintln!("  {}", style(&run_error.kind).red());
            std::process::exit(1);
        }
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let result = PipelineConfig::from_file(&cmd.file);

    match result {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!(
                "  Name: {}",
                style(config.name.as_deref().unwrap_or("pipeline")).bold()
            );
            println!("  Providers: {}", style(config.provider_count()).cyan());
            println!("  Nodes: {}", style(config.node_count()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

async fn list_tools(cmd: &ToolsCommand) -> Result<()> {
    let config =
        PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let definition = config.to_pipeline()?;

    let mut registry = ProviderRegistry::new(definition.providers.clone());
    let names: Vec<String> = match &cmd.provider {
        Some(name) => vec![name.clone()],
        None => registry.declared_names(),
    };

    for name in &names {
        let spinner = create_spinner(&format!("Connecting provider '{}'...", name));
        let result = registry.ensure(name).await;
        spinner.finish_and_clear();

        match result {
            Ok(provider) => {
                println!("{} {}", PLUG, style(name).bold());
                for tool in provider.catalog().iter() {
                    let inputs: Vec<String> = tool
                        .input
                        .iter()
                        .map(|f| format!("{}: {}", f.name, f.ty.name()))
                        .collect();
                    let outputs: Vec<String> = tool
                        .output
                        .iter()
                        .map(|f| format!("{}: {}", f.name, f.ty.name()))
                        .collect();
                    println!(
                        "  {} ({}) -> ({})",
                        style(&tool.name).cyan(),
                        inputs.join(", "),
                        outputs.join(", ")
                    );
                    if let Some(description) = &tool.description {
                        println!("    {}", style(description).dim());
                    }
                }
            }
            Err(e) => {
                println!("{} {}: {}", CROSS, style(name).bold(), style(e).red());
            }
        }
    }

    registry.shutdown_all().await;
    Ok(())
}

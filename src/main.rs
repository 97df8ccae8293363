use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agent_core::{CATALOG, Credential};
use beastmode::{
    Config,
    cli::{AgentCommands, Cli, Commands, ConfigCommands, OutputFormat, SettingsCommands},
    core::{
        Agent, RunEvent, StateStore, TaskRunner, TaskStatus, agent::format_as_markdown, keychain,
        storage::{BlobStore, Storage},
    },
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn open_storage() -> anyhow::Result<Arc<dyn BlobStore>> {
    Ok(Arc::new(Storage::new()?))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Agent { command } => {
            let config = Config::load()?;
            let state = Arc::new(StateStore::load(open_storage()?));
            handle_agent_command(&config, state, command).await?;
        }

        Commands::Models => {
            let config = Config::load()?;
            let state = StateStore::load(open_storage()?);
            let selected = state.settings().model_or(config.runner.default_model);
            println!("{:<2}{:<16} {:<22} {:<12} Pricing", "", "ID", "Name", "Provider");
            println!("{}", "-".repeat(64));
            for model in CATALOG {
                let marker = if model.id == selected { "*" } else { "" };
                let pricing = if model.free { "free" } else { "paid" };
                println!(
                    "{marker:<2}{:<16} {:<22} {:<12} {pricing}",
                    model.id, model.name, model.provider
                );
            }
        }

        Commands::Settings { command } => {
            let config = Config::load()?;
            let state = StateStore::load(open_storage()?);
            handle_settings_command(&config, &state, command)?;
        }

        Commands::Theme { theme } => {
            let state = StateStore::load(open_storage()?);
            if let Some(theme) = theme {
                state.set_theme(theme)?;
            }
            println!("{}", state.theme());
        }

        Commands::Serve { host, port, origin } => {
            let mut config = Config::load()?;
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            if let Some(origin) = origin {
                config.cache.origin = origin;
            }
            beastmode::api::serve(&config, open_storage()?).await?;
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = Config::load()?;
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Path => {
                let path = Config::config_path()?;
                println!("{}", path.display());
            }
            ConfigCommands::GenerateToken => {
                let token = beastmode::config::ApiConfig::generate_token();
                println!("Generated API token:\n");
                println!("  {token}\n");
                println!("Add to your config.toml:");
                println!("  [api]");
                println!("  token = \"{token}\"\n");
                println!("Or set environment variable:");
                println!("  export BEASTMODE_API_TOKEN=\"{token}\"");
            }
        },
    }

    Ok(())
}

async fn handle_agent_command(
    config: &Config,
    state: Arc<StateStore>,
    command: AgentCommands,
) -> anyhow::Result<()> {
    match command {
        AgentCommands::New { goal, model, run } => {
            let model = model.unwrap_or_else(|| state.settings().model_or(config.runner.default_model));
            let agent = Agent::new(&goal, model)?;
            let id = agent.id.clone();
            println!("Created agent {id}");
            for (index, task) in agent.tasks.iter().enumerate() {
                println!("  {}. {}", index + 1, task.title);
            }
            state.insert_agent(agent)?;

            if run {
                run_agent(config, state, &id).await?;
            }
        }

        AgentCommands::List { format } => {
            let agents = state.agents();
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&agents)?);
            } else {
                println!("{:<30} {:<10} {:<6} {:<16} Goal", "ID", "Status", "Done", "Model");
                println!("{}", "-".repeat(96));
                for agent in agents {
                    let done = format!("{}/{}", agent.count(TaskStatus::Completed), agent.tasks.len());
                    let goal: String = agent.goal.chars().take(30).collect();
                    println!(
                        "{:<30} {:<10} {:<6} {:<16} {goal}",
                        agent.id, agent.status, done, agent.model
                    );
                }
            }
        }

        AgentCommands::Show { id, format } => {
            let agent = state.require_agent(&id)?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&agent)?);
            } else {
                println!("{}  [{}]", agent.goal, agent.status);
                println!("model {}  created {}", agent.model, agent.created_at.format("%Y-%m-%d %H:%M"));
                for (index, task) in agent.tasks.iter().enumerate() {
                    println!("\n{}. {} ({})", index + 1, task.title, task.status);
                    if let Some(result) = &task.result {
                        println!("{result}");
                    }
                }
            }
        }

        AgentCommands::Run { id } => run_agent(config, state, &id).await?,

        AgentCommands::Stop { id } => {
            let runner = TaskRunner::new(state, config.runner.create_executor()?);
            runner.stop(&id)?;
            println!("Agent {id} paused");
        }

        AgentCommands::Delete { id } => {
            if !state.remove_agent(&id)? {
                anyhow::bail!("agent not found: {id}");
            }
            println!("Deleted agent {id}");
        }

        AgentCommands::Export { id, output } => {
            let agent = state.require_agent(&id)?;
            let content = format_as_markdown(&agent);
            if let Some(path) = output {
                std::fs::write(&path, &content)?;
                println!("Exported agent to {}", path.display());
            } else {
                print!("{content}");
            }
        }
    }

    Ok(())
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::TaskStarted { index, title } => println!("\n[{}] {title} ...", index + 1),
        RunEvent::TaskCompleted { result, .. } => println!("{result}"),
        RunEvent::TaskFailed { message, .. } => eprintln!("Task failed: {message}"),
        RunEvent::Offline { message } => eprintln!("You're offline. {message}"),
        RunEvent::Finished { status } => println!("\nAgent {status}"),
    }
}

async fn run_agent(config: &Config, state: Arc<StateStore>, id: &str) -> anyhow::Result<()> {
    let credential = config.runner.resolve_credential(&state.settings());
    let runner = TaskRunner::new(state, config.runner.create_executor()?);

    let run = runner.run(id, credential, print_event);
    tokio::pin!(run);

    let report = tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            runner.stop(id)?;
            eprintln!("Stopping, the current task's result will be discarded...");
            run.await?
        }
    };

    if let Some(failure) = report.failure {
        tracing::debug!(task_id = %failure.task_id, kind = ?failure.kind, "run ended on failure");
    }
    println!("{} task(s) completed this run", report.completed);
    Ok(())
}

/// Shortened form of a key for display.
fn describe_key(key: &Credential) -> String {
    let secret = key.expose();
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn handle_settings_command(
    config: &Config,
    state: &StateStore,
    command: SettingsCommands,
) -> anyhow::Result<()> {
    let mut settings = state.settings();

    match command {
        SettingsCommands::Show => {
            let env_name = &config.runner.api_key_env;
            let source = if let Some(key) = std::env::var(env_name).ok().and_then(Credential::new) {
                format!("{} (from ${env_name})", describe_key(&key))
            } else if let Some(key) = keychain::load_credential() {
                format!("{} (from keychain)", describe_key(&key))
            } else if let Some(key) = settings.credential() {
                format!("{} (from settings)", describe_key(&key))
            } else {
                "not set".to_string()
            };
            println!("API key:        {source}");
            println!(
                "Default model:  {}",
                settings.model_or(config.runner.default_model)
            );
            println!("Theme:          {}", state.theme());
        }

        SettingsCommands::SetKey { key, keychain: use_keychain } => {
            let credential =
                Credential::new(key).ok_or_else(|| anyhow::anyhow!("API key must not be empty"))?;
            if use_keychain {
                keychain::store_api_key(credential.expose())?;
                println!("API key saved to the keychain");
            } else {
                settings.api_key = Some(credential.expose().to_string());
                state.set_settings(settings)?;
                println!("API key saved to settings");
            }
        }

        SettingsCommands::ClearKey => {
            settings.api_key = None;
            state.set_settings(settings)?;
            if let Err(e) = keychain::delete_api_key() {
                tracing::warn!(error = %e, "could not clear keychain entry");
            }
            println!("API key removed");
        }

        SettingsCommands::SetModel { model } => {
            settings.default_model = Some(model);
            state.set_settings(settings)?;
            println!("Default model set to {model}");
        }
    }

    Ok(())
}

//! CLI command parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use agent_core::ModelId;

use crate::build_info;
use crate::core::Theme;

/// beastmode - goal-driven task automation with an offline cache.
#[derive(Parser)]
#[command(name = "beastmode")]
#[command(about = "Goal-driven task automation with an offline cache")]
#[command(version, long_version = build_info::LONG_VERSION)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, run and inspect agents.
    #[command(visible_alias = "a")]
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },

    /// List the selectable models.
    Models,

    /// Show or change user settings.
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Show or set the display theme.
    Theme {
        /// New theme (`dark` or `light`).
        theme: Option<Theme>,
    },

    /// Start the offline proxy in front of the application.
    Serve {
        /// Host to bind to (overrides config).
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config).
        #[arg(short, long)]
        port: Option<u16>,

        /// Application origin to front (overrides config).
        #[arg(long)]
        origin: Option<String>,
    },

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Create an agent from a goal.
    New {
        /// What the agent should accomplish.
        goal: String,

        /// Model to run tasks on (defaults to the settings model).
        #[arg(short, long)]
        model: Option<ModelId>,

        /// Start running immediately.
        #[arg(short, long)]
        run: bool,
    },

    /// List agents, newest first.
    List {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show an agent and its tasks.
    Show {
        /// Agent ID.
        id: String,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Run an agent's pending tasks. Ctrl-C stops after the current task.
    Run {
        /// Agent ID.
        id: String,
    },

    /// Mark an agent paused and recover an interrupted task.
    Stop {
        /// Agent ID.
        id: String,
    },

    /// Delete an agent.
    Delete {
        /// Agent ID.
        id: String,
    },

    /// Export an agent report as Markdown.
    Export {
        /// Agent ID.
        id: String,

        /// Output file path (stdout if not specified).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show the current settings.
    Show,

    /// Save the `OpenRouter` API key.
    SetKey {
        /// The API key.
        key: String,

        /// Store in the OS keychain instead of the settings file.
        #[arg(long)]
        keychain: bool,
    },

    /// Remove the saved API key from settings and the keychain.
    ClearKey,

    /// Set the model preselected for new agents.
    SetModel {
        /// Model ID (see `beastmode models`).
        model: ModelId,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration.
    Show,

    /// Show the configuration file path.
    Path,

    /// Generate a new API token for the proxy control routes.
    GenerateToken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["beastmode"]).is_err());
    }

    #[test]
    fn cli_parses_verbose_flag() {
        let cli = Cli::parse_from(["beastmode", "-vv", "models"]);
        assert_eq!(cli.verbose, 2);

        let cli = Cli::parse_from(["beastmode", "models", "-v"]);
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn cli_parses_agent_new() {
        let cli = Cli::parse_from(["beastmode", "agent", "new", "Plan a launch", "-m", "mistral-7b"]);
        match cli.command {
            Commands::Agent {
                command: AgentCommands::New { goal, model, run },
            } => {
                assert_eq!(goal, "Plan a launch");
                assert_eq!(model, Some(ModelId::Mistral7b));
                assert!(!run);
            }
            _ => panic!("expected agent new"),
        }
    }

    #[test]
    fn cli_rejects_unknown_model() {
        assert!(Cli::try_parse_from(["beastmode", "agent", "new", "x", "-m", "gpt-9"]).is_err());
    }

    #[test]
    fn cli_parses_agent_alias() {
        let cli = Cli::parse_from(["beastmode", "a", "run", "agt_1"]);
        assert!(matches!(
            cli.command,
            Commands::Agent {
                command: AgentCommands::Run { ref id }
            } if id == "agt_1"
        ));
    }

    #[test]
    fn cli_parses_list_format() {
        let cli = Cli::parse_from(["beastmode", "agent", "list", "--format", "json"]);
        assert!(matches!(
            cli.command,
            Commands::Agent {
                command: AgentCommands::List {
                    format: OutputFormat::Json
                }
            }
        ));

        let cli = Cli::parse_from(["beastmode", "agent", "list"]);
        assert!(matches!(
            cli.command,
            Commands::Agent {
                command: AgentCommands::List {
                    format: OutputFormat::Table
                }
            }
        ));
    }

    #[test]
    fn cli_parses_export_output() {
        let cli = Cli::parse_from(["beastmode", "agent", "export", "agt_1", "-o", "report.md"]);
        match cli.command {
            Commands::Agent {
                command: AgentCommands::Export { id, output },
            } => {
                assert_eq!(id, "agt_1");
                assert_eq!(output, Some(PathBuf::from("report.md")));
            }
            _ => panic!("expected agent export"),
        }
    }

    #[test]
    fn cli_parses_theme() {
        let cli = Cli::parse_from(["beastmode", "theme", "light"]);
        assert!(matches!(
            cli.command,
            Commands::Theme {
                theme: Some(Theme::Light)
            }
        ));
        assert!(Cli::try_parse_from(["beastmode", "theme", "sepia"]).is_err());
    }

    #[test]
    fn cli_parses_settings_set_key() {
        let cli = Cli::parse_from(["beastmode", "settings", "set-key", "sk-or-v1-abc", "--keychain"]);
        match cli.command {
            Commands::Settings {
                command: SettingsCommands::SetKey { key, keychain },
            } => {
                assert_eq!(key, "sk-or-v1-abc");
                assert!(keychain);
            }
            _ => panic!("expected settings set-key"),
        }
    }

    #[test]
    fn cli_parses_serve_overrides() {
        let cli = Cli::parse_from([
            "beastmode",
            "serve",
            "-H",
            "0.0.0.0",
            "-p",
            "8080",
            "--origin",
            "http://localhost:3000",
        ]);
        match cli.command {
            Commands::Serve { host, port, origin } => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(8080));
                assert_eq!(origin.as_deref(), Some("http://localhost:3000"));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn cli_parses_config_generate_token() {
        let cli = Cli::parse_from(["beastmode", "config", "generate-token"]);
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::GenerateToken
            }
        ));
    }

    #[test]
    fn cli_verify_app() {
        Cli::command().debug_assert();
    }
}

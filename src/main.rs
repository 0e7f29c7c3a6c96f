// NodeConsole - command line entry point
//
// Operator tooling around the gateway:
// - classify commands and validate node definitions offline
// - generate keys and encrypt/decrypt credentials
// - run, plan and test commands against a TOML node inventory
//
// Logs go to stderr; command results and JSON go to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nodeconsole_gateway::approval::{ApprovalHandler, ConsolePrompt, DenyAll};
use nodeconsole_gateway::config::Config;
use nodeconsole_gateway::connector::{Connector, ConnectorFactory, K8sConnector, SshConnector};
use nodeconsole_gateway::crypto::{CredentialCipher, EncryptedCredential};
use nodeconsole_gateway::exec::ExecOptions;
use nodeconsole_gateway::health::{self, HealthStatus};
use nodeconsole_gateway::inventory::Inventory;
use nodeconsole_gateway::node::{InMemoryNodeStore, NodeParams, NodeRegistry, NodeStore, NodeValidator};
use nodeconsole_gateway::safety::{PolicyMode, RemoteCommandClassifier};
use nodeconsole_gateway::{metrics, NodeConsole};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

/// NodeConsole: secure remote command execution gateway
#[derive(Parser, Debug)]
#[command(name = "nodeconsole")]
#[command(author = "NodeConsole Contributors")]
#[command(version)]
#[command(about = "Secure remote command execution over SSH and Kubernetes", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ~/.config/nodeconsole/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a command and show the policy decision
    Classify {
        /// Command text
        command: String,

        /// Policy mode (strict, standard, relaxed)
        #[arg(long, default_value = "strict")]
        policy: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Generate a new 256-bit encryption key
    Keygen,
    /// Validate node registration parameters
    ValidateNode {
        #[arg(long)]
        connector_type: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u32>,
        #[arg(long)]
        username: Option<String>,
    },
    /// Encrypt a credential read from stdin and print it as JSON
    Encrypt,
    /// Decrypt a JSON credential read from stdin
    Decrypt,
    /// Check the cipher and registered connectors
    Health,
    /// List inventory nodes without credentials
    Nodes {
        #[arg(long)]
        inventory: PathBuf,
    },
    /// Classify a command against a node's policy without running it
    Plan {
        #[arg(long)]
        inventory: PathBuf,
        alias: String,
        command: String,
    },
    /// Run a command on an inventory node
    Exec {
        #[arg(long)]
        inventory: PathBuf,

        /// Execution timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Output capture budget in bytes
        #[arg(long)]
        max_output: Option<usize>,

        /// Remote working directory (ssh only)
        #[arg(long)]
        workdir: Option<String>,

        /// Remote environment variable NAME=VALUE (ssh only)
        #[arg(long = "env", value_parser = parse_env)]
        env: Vec<(String, String)>,

        /// Classify and resolve policy without running
        #[arg(long)]
        dry_run: bool,

        /// Deny approval requests instead of prompting
        #[arg(long)]
        no_prompt: bool,

        alias: String,
        command: String,
    },
    /// Test connectivity and credentials of an inventory node
    TestNode {
        #[arg(long)]
        inventory: PathBuf,
        alias: String,
    },
}

fn parse_env(value: &str) -> std::result::Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", value))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    init_tracing(&config, args.verbose)?;
    metrics::init().context("Failed to register metrics")?;

    match args.command {
        Commands::Classify { command, policy, json } => classify(&command, &policy, json),
        Commands::Keygen => {
            println!("{}", CredentialCipher::generate_hex_key());
            Ok(ExitCode::SUCCESS)
        }
        Commands::ValidateNode {
            connector_type,
            host,
            port,
            username,
        } => validate_node(NodeParams {
            connector_type: connector_type.as_deref(),
            host: host.as_deref(),
            port,
            username: username.as_deref(),
        }),
        Commands::Encrypt => encrypt(&config),
        Commands::Decrypt => decrypt(&config),
        Commands::Health => health_check(&config),
        Commands::Nodes { inventory } => list_nodes(&config, inventory).await,
        Commands::Plan {
            inventory,
            alias,
            command,
        } => {
            let (console, id) = open(&config, inventory, &alias, Arc::new(DenyAll)).await?;
            let plan = console.plan(&id, &command).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Exec {
            inventory,
            timeout,
            max_output,
            workdir,
            env,
            dry_run,
            no_prompt,
            alias,
            command,
        } => {
            let approver: Arc<dyn ApprovalHandler> = if no_prompt {
                Arc::new(DenyAll)
            } else {
                Arc::new(ConsolePrompt::new())
            };
            let (console, id) = open(&config, inventory, &alias, approver).await?;

            let limits = config.node_console.exec_limits();
            let mut options = ExecOptions::default()
                .with_timeout(timeout.unwrap_or(limits.default_timeout_secs))
                .with_max_output(max_output.unwrap_or(limits.default_max_output_bytes));
            if let Some(dir) = workdir {
                options = options.with_working_dir(dir);
            }
            for (name, value) in env {
                options = options.with_env(name, value);
            }
            if dry_run {
                options = options.dry_run();
            }

            let result = console.execute(&id, &command, options).await?;
            println!("{}", result.format_output());
            Ok(if result.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::TestNode { inventory, alias } => {
            let (console, id) = open(&config, inventory, &alias, Arc::new(DenyAll)).await?;
            let ok = console.test_connection(&id).await?;
            println!("{}: {}", alias, if ok { "reachable" } else { "unreachable" });
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { config.log_level()? };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
    Ok(())
}

fn classify(command: &str, policy: &str, json: bool) -> Result<ExitCode> {
    let policy = PolicyMode::parse_lenient(Some(policy));
    let result = RemoteCommandClassifier::classify(command, policy);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("level:    {}", result.level);
        println!("policy:   {}", policy);
        println!("decision: {}", result.decision);
        println!("reason:   {}", result.reason);
    }
    Ok(ExitCode::SUCCESS)
}

fn validate_node(params: NodeParams<'_>) -> Result<ExitCode> {
    match NodeValidator::validate(params) {
        Ok(()) => {
            println!("Node configuration is valid");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn read_stdin() -> Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;
    Ok(input)
}

fn encrypt(config: &Config) -> Result<ExitCode> {
    let cipher = config.node_console.cipher()?;
    let plaintext = zeroize::Zeroizing::new(read_stdin()?);
    let encrypted = cipher.encrypt(plaintext.trim_end_matches(['\r', '\n']))?;
    println!("{}", serde_json::to_string(&encrypted)?);
    Ok(ExitCode::SUCCESS)
}

fn decrypt(config: &Config) -> Result<ExitCode> {
    let cipher = config.node_console.cipher()?;
    let encrypted: EncryptedCredential =
        serde_json::from_str(&read_stdin()?).context("Expected {\"ciphertext\": ..., \"iv\": ...}")?;
    let plaintext = cipher.decrypt(&encrypted)?;
    println!("{}", plaintext.as_str());
    Ok(ExitCode::SUCCESS)
}

fn connectors(config: &Config) -> Result<ConnectorFactory> {
    let settings = &config.node_console;
    let connectors: Vec<Arc<dyn Connector>> = vec![
        Arc::new(SshConnector::new(settings.connect_timeout())),
        Arc::new(K8sConnector::new(&settings.kubectl_path, settings.connect_timeout())),
    ];
    Ok(ConnectorFactory::new(connectors)?)
}

fn health_check(config: &Config) -> Result<ExitCode> {
    let cipher = config.node_console.cipher()?;
    let report = health::check(&cipher, &connectors(config)?, &["ssh", "k8s"]);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(match report.status {
        HealthStatus::Up => ExitCode::SUCCESS,
        HealthStatus::Down => ExitCode::FAILURE,
    })
}

async fn load_registry(config: &Config, inventory: PathBuf) -> Result<(NodeRegistry, Arc<CredentialCipher>)> {
    let cipher = Arc::new(config.node_console.cipher()?);
    let registry = NodeRegistry::new(
        Arc::new(InMemoryNodeStore::new()),
        Arc::clone(&cipher),
        config.node_console.default_safety_policy,
    );
    let registered = Inventory::load(&inventory)?.register_all(&registry).await?;
    debug!(nodes = registered.len(), "Loaded inventory");
    Ok((registry, cipher))
}

async fn list_nodes(config: &Config, inventory: PathBuf) -> Result<ExitCode> {
    let (registry, _) = load_registry(config, inventory).await?;
    let nodes = registry.list_for_agent(None, None).await?;
    println!("{}", serde_json::to_string_pretty(&nodes)?);
    Ok(ExitCode::SUCCESS)
}

/// Build a gateway over the inventory and resolve `alias` to a node id
async fn open(
    config: &Config,
    inventory: PathBuf,
    alias: &str,
    approver: Arc<dyn ApprovalHandler>,
) -> Result<(NodeConsole, String)> {
    let (registry, cipher) = load_registry(config, inventory).await?;
    let store = registry.store();
    let node = store
        .find_by_alias(alias)
        .await?
        .with_context(|| format!("No node with alias '{}' in inventory", alias))?;

    let console = NodeConsole::new(store, cipher, Arc::new(connectors(config)?))
        .with_approver(approver)
        .with_limits(config.node_console.exec_limits());
    Ok((console, node.id))
}

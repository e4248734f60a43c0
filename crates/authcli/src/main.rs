use anyhow::{Context, Result};
use authcore::{IdentitySpec, LoginIdKeyType, Purpose, RawInput, TenantConfig};
use authruntime::memory::MemoryBackend;
use authruntime::{
    FlowInstance, FlowOutput, FlowService, FlowStore, InMemoryFlowStore, KindRecord, Registry,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "authflow")]
#[command(about = "Authentication flow CLI", long_about = None)]
struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered intent and node kinds
    Flows,

    /// Run a scripted session against the in-memory backend
    Run {
        /// Path to script JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Write the persisted flow here afterwards
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Rebuild a persisted flow and print its tree
    Replay {
        /// Path to a flow instance written by `run --dump`
        file: PathBuf,
    },

    /// Create an example script
    Init {
        /// Output file path
        #[arg(short, long, default_value = "session.json")]
        output: PathBuf,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Account {
    email: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    totp_secret: Option<String>,
    /// Adds a phone login ID, usable with SMS codes.
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Verify {
    target: String,
    purpose: Purpose,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Step {
    /// Simulates the user opening a link or entering a code out of band.
    Verify { verify: Verify },
    Input(RawInput),
}

#[derive(Debug, Serialize, Deserialize)]
struct Script {
    #[serde(default)]
    tenant: TenantConfig,
    #[serde(default)]
    accounts: Vec<Account>,
    intent: KindRecord,
    steps: Vec<Step>,
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    authnodes::register_all(&mut registry);
    registry
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Flows => list_flows(),
        Commands::Run { file, dump } => run_script(file, dump).await?,
        Commands::Replay { file } => replay_instance(file)?,
        Commands::Init { output } => create_example_script(output)?,
    }

    Ok(())
}

fn list_flows() {
    let registry = registry();
    println!("Intents:");
    for kind in registry.intent_kinds() {
        println!("  {}", kind);
    }
    println!();
    println!("Nodes:");
    for kind in registry.node_kinds() {
        println!("  {}", kind);
    }
}

fn print_output(output: &FlowOutput) {
    if output.is_complete {
        println!("   complete");
    }
    for descriptor in &output.legal_next_inputs {
        println!("   next: {} at '{}'", descriptor.name, descriptor.pointer);
    }
    for entry in &output.data {
        println!("   data: {} at '{}': {}", entry.kind, entry.pointer, entry.data);
    }
}

async fn run_script(file: PathBuf, dump: Option<PathBuf>) -> Result<()> {
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("reading script {}", file.display()))?;
    let script: Script = serde_json::from_str(&text)?;
    tracing::debug!(
        tenant_id = %script.tenant.tenant_id,
        steps = script.steps.len(),
        "Loaded script"
    );

    let backend = MemoryBackend::new();
    for account in &script.accounts {
        let user = backend.seed_user().await;
        backend
            .seed_identity(
                user.id,
                IdentitySpec::login_id(LoginIdKeyType::Email, account.email.to_lowercase()),
            )
            .await;
        if let Some(password) = &account.password {
            backend.seed_password(user.id, password).await;
        }
        if let Some(secret) = &account.totp_secret {
            backend.seed_totp(user.id, secret).await;
        }
        if let Some(phone) = &account.phone {
            backend
                .seed_identity(user.id, IdentitySpec::login_id(LoginIdKeyType::Phone, phone.clone()))
                .await;
        }
        println!("Seeded {} as user {}", account.email, user.id);
    }

    let deps = backend.dependencies(script.tenant);
    let registry = Arc::new(registry());
    let store = Arc::new(InMemoryFlowStore::new());
    let service = FlowService::new(registry.clone(), store.clone());

    let intent = registry.reconstruct_intent(&script.intent.kind, &script.intent.data)?;
    let mut output = service.create(&deps, intent).await?;
    println!("Started {} flow {}", script.intent.kind, output.flow_id);
    print_output(&output);

    for (index, step) in script.steps.iter().enumerate() {
        match step {
            Step::Verify { verify } => {
                let code = backend
                    .last_code(&verify.target, verify.purpose)
                    .await
                    .with_context(|| format!("no code was sent to {}", verify.target))?;
                deps.verification
                    .verify_code(&verify.target, verify.purpose, &code)
                    .await?;
                println!("[{}] verified {} for {}", index, verify.target, verify.purpose.as_str());
            }
            Step::Input(raw) => {
                println!("[{}] input {}", index, raw.input);
                match service.accept(&deps, output.flow_id, raw).await {
                    Ok(next) => {
                        output = next;
                        print_output(&output);
                    }
                    Err(e) => println!("   rejected ({:?}): {}", e.class(), e),
                }
            }
        }
    }

    println!();
    println!("Events:");
    for envelope in backend.events().await {
        let marker = if envelope.event.audit { " [audit]" } else { "" };
        println!("  {}{} {}", envelope.event.kind, marker, envelope.event.payload);
    }

    if let Some(path) = dump {
        let instance = store.load(output.flow_id).await?;
        std::fs::write(&path, serde_json::to_string_pretty(&instance)?)?;
        println!();
        println!("Wrote flow to {}", path.display());
    }

    Ok(())
}

fn replay_instance(file: PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("reading flow {}", file.display()))?;
    let instance: FlowInstance = serde_json::from_str(&text)?;

    let graph = authruntime::replay(&registry(), &instance.root, &instance.nodes)?;

    println!("Flow {} (tenant {})", instance.id, instance.tenant_id);
    println!("   records: {}", instance.nodes.len());
    println!("   nodes:   {}", graph.node_count());
    println!("{:#?}", graph);
    Ok(())
}

fn create_example_script(output: PathBuf) -> Result<()> {
    let script = Script {
        tenant: TenantConfig::for_tenant("example"),
        accounts: vec![Account {
            email: "alice@example.com".to_string(),
            password: Some("correct-horse".to_string()),
            totp_secret: None,
            phone: None,
        }],
        intent: KindRecord {
            kind: "IntentAuthenticate".to_string(),
            data: serde_json::json!({}),
        },
        steps: vec![
            Step::Input(RawInput::new(serde_json::json!({"login_id": "alice@example.com"}))),
            Step::Input(RawInput::new(serde_json::json!({"authentication": "password"}))),
            Step::Input(RawInput::new(serde_json::json!({"password": "correct-horse"}))),
        ],
    };

    std::fs::write(&output, serde_json::to_string_pretty(&script)?)?;

    println!("Created example script: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  authflow run --file {}", output.display());

    Ok(())
}

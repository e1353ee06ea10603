use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use genmedia_relay::credentials::ConfigCredentialResolver;
use genmedia_relay::gemini::OutputShape;
use genmedia_relay::pipeline::SyncOptions;
use genmedia_relay::store::{GraphStore, Metadata, NodeDraft, NodeKind, Position};
use genmedia_relay::utils::params::{apply_set_pairs, params_from_sets, parse_set_pairs};
use genmedia_relay::{Config, GenerationService, LocalProjectStorage, RedbGraphStore};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relayctl", about = "CLI for the generative job pipeline", version)]
struct Cli {
    /// Override DATA_DIR
    #[arg(global = true, long)]
    data_dir: Option<String>,

    /// Override RELAY_BASE_URL
    #[arg(global = true, long)]
    relay_url: Option<String>,

    /// Project the command operates on
    #[arg(global = true, long, default_value = "default")]
    project: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prompt-related commands
    Prompt {
        #[command(subcommand)]
        cmd: PromptCmd,
    },
    /// Graph node operations
    Node {
        #[command(subcommand)]
        cmd: NodeCmd,
    },
    /// Relay job operations
    Job {
        #[command(subcommand)]
        cmd: JobCmd,
    },
    /// Synchronous multimodal generation
    Gemini {
        #[command(subcommand)]
        cmd: GeminiCmd,
    },
}

#[derive(Subcommand, Debug)]
enum PromptCmd {
    /// Print the prompt a node would submit, without sending it
    Compile {
        node: String,
        /// Parameter overrides as key=value (repeatable), e.g. `stylization=250`
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,
        /// Generation mode recorded on the prompt
        #[arg(long, default_value = "photo")]
        mode: String,
    },
}

#[derive(Subcommand, Debug)]
enum NodeCmd {
    /// Create a node and print it
    Add {
        /// text, generator, image, video or file
        #[arg(long, default_value = "generator")]
        kind: NodeKind,
        /// Node content: prompt text, or a URL for image nodes
        content: String,
        #[arg(long, default_value_t = 0.0)]
        x: f64,
        #[arg(long, default_value_t = 0.0)]
        y: f64,
        /// Metadata as key.path=value (repeatable), e.g. `generation.model=mj-v6`
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,
    },
    /// Add a directed edge between two nodes
    Link { from: String, to: String },
    /// Print one node as JSON
    Show { node: String },
    /// List the nodes of the project
    List {
        /// Output raw JSON instead of one line per node
        #[arg(long)]
        json: bool,
    },
    /// Update metadata keys of a node
    Meta {
        node: String,
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        sets: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum JobCmd {
    /// Compile and submit the node's prompt
    Submit {
        node: String,
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,
        /// Verbose: print the compiled prompt before the result
        #[arg(short, long)]
        verbose: bool,
    },
    /// Check the node's job once and store any artifacts
    Poll {
        node: String,
        /// Poll this job instead of the node's current one
        #[arg(long)]
        job_id: Option<String>,
    },
    /// Upscale one image of a finished grid
    Upscale {
        node: String,
        /// Image index in the grid, 1-4
        #[arg(long)]
        index: u8,
        /// Grid task to upscale (defaults to the node's current job)
        #[arg(long)]
        task_id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum GeminiCmd {
    /// Run one generateContent call for a node
    Generate {
        node: String,
        #[arg(long)]
        system: Option<String>,
        /// free, text or plan
        #[arg(long, default_value = "free")]
        shape: OutputShape,
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Config::dotenv_load();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut conf = Config::new()?;
    if let Some(dir) = cli.data_dir {
        conf.data_dir = dir;
    }
    if let Some(url) = cli.relay_url {
        conf.relay_base_url = Some(url);
    }
    conf.log_summary();

    let data_dir = PathBuf::from(&conf.data_dir);
    tokio::fs::create_dir_all(&data_dir).await?;
    let store = Arc::new(RedbGraphStore::open(data_dir.join("graph.redb"))?);
    let storage = Arc::new(LocalProjectStorage::new(&data_dir, conf.timeouts.download));
    let timeouts = conf.timeouts;
    let service = GenerationService::new(
        store.clone(),
        storage,
        Arc::new(ConfigCredentialResolver::new(conf)),
        timeouts,
    );

    if let Err(e) = run(cli.command, &cli.project, store, service).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(
    command: Commands,
    project: &str,
    store: Arc<RedbGraphStore>,
    service: GenerationService,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Prompt { cmd } => match cmd {
            PromptCmd::Compile { node, sets, mode } => {
                let overrides = params_from_sets(&sets)?;
                let compiled = service.compile_for_node(project, &node, overrides, &mode)?;
                for flag in &compiled.omitted_flags {
                    eprintln!("Warning: omitted {} (unsupported by the selected model)", flag);
                }
                println!("{}", compiled.prompt_text);
                Ok(())
            }
        },
        Commands::Node { cmd } => match cmd {
            NodeCmd::Add { kind, content, x, y, sets } => {
                let mut metadata = Metadata::new();
                apply_set_pairs(&mut metadata, parse_set_pairs(&sets)?)?;
                let draft = NodeDraft::new(kind, content)
                    .at(Position { x, y })
                    .with_metadata(metadata);
                let node = store.create_node(project, draft)?;
                print_json(&node)
            }
            NodeCmd::Link { from, to } => {
                store.link_nodes(project, &from, &to)?;
                println!("{} -> {}", from, to);
                Ok(())
            }
            NodeCmd::Show { node } => match store.get_node(project, &node)? {
                Some(n) => print_json(&n),
                None => {
                    eprintln!("No node {} in project {}", node, project);
                    std::process::exit(1);
                }
            },
            NodeCmd::List { json } => {
                let nodes = store.project_nodes(project)?;
                if json {
                    println!("{}", serde_json::to_string(&nodes)?);
                } else {
                    for n in nodes {
                        let preview: String = n.content.chars().take(48).collect();
                        println!("{}\t{:?}\t{}", n.id, n.kind, preview);
                    }
                }
                Ok(())
            }
            NodeCmd::Meta { node, sets } => {
                let pairs = parse_set_pairs(&sets)?;
                let mut failed = None;
                let mut pairs = Some(pairs);
                let updated = store.modify_node_metadata(project, &node, &mut |m| {
                    if let Some(pairs) = pairs.take() {
                        failed = apply_set_pairs(m, pairs).err();
                    }
                })?;
                if let Some(e) = failed {
                    return Err(e.into());
                }
                print_json(&updated)
            }
        },
        Commands::Job { cmd } => match cmd {
            JobCmd::Submit { node, sets, verbose } => {
                let overrides = params_from_sets(&sets)?;
                let outcome = service.submit(project, &node, overrides).await?;
                if verbose {
                    if let Some(prompt) = &outcome.prompt {
                        eprintln!("[verbose] Prompt sent to relay:\n{}", prompt.prompt_text);
                    }
                }
                print_json(&outcome)
            }
            JobCmd::Poll { node, job_id } => {
                let outcome = service.poll(project, &node, job_id.as_deref()).await?;
                print_json(&outcome)
            }
            JobCmd::Upscale { node, index, task_id } => {
                let outcome = service.upscale(project, &node, task_id.as_deref(), index).await?;
                print_json(&outcome)
            }
        },
        Commands::Gemini { cmd } => match cmd {
            GeminiCmd::Generate { node, system, shape, model } => {
                let options = SyncOptions {
                    system_instruction: system,
                    shape,
                    model,
                };
                let outcome = service.generate_sync(project, &node, options).await?;
                print_json(&outcome)
            }
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

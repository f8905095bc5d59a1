mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use taleweave::config::TaleConfig;
use taleweave::story::types::{LengthMode, WorldSettings};

#[derive(Parser)]
#[command(name = "taleweave", version, about = "Interactive stories with causal long-term memory")]
struct Cli {
    /// Config file (defaults to ~/.taleweave/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport unless --http)
    Serve {
        /// Serve Streamable HTTP on [server] host:port instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Start a new story and play its opening scene
    New(NewArgs),
    /// Continue a story
    Play {
        session_id: String,
        /// The player's instruction
        prompt: Option<String>,
        /// Pick one of the currently offered options (1-based) instead of a prompt
        #[arg(long, short = 'o', conflicts_with = "prompt")]
        option: Option<usize>,
        #[arg(long, short = 'l', default_value = "medium")]
        length: LengthMode,
    },
    /// Discard history from an index onward and play a new instruction there
    Regenerate {
        session_id: String,
        from_index: u32,
        prompt: String,
        #[arg(long, short = 'l', default_value = "medium")]
        length: LengthMode,
    },
    /// Replay the last instruction for a different reply
    Retry {
        session_id: String,
        #[arg(long, short = 'l', default_value = "medium")]
        length: LengthMode,
    },
    /// Remove the last exchange
    Undo { session_id: String },
    /// List stories, newest first
    Sessions,
    /// Print a story's transcript and current state
    Show {
        session_id: String,
        /// Only the last N turns
        #[arg(long)]
        last: Option<usize>,
    },
    /// Delete a story and all of its turns
    Delete {
        session_id: String,
        #[arg(long)]
        confirm: bool,
    },
    /// Export a story as JSON
    Export {
        session_id: String,
        /// Output file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a story exported with `export` as a new session
    Import { file: PathBuf },
    /// Show which earlier passages a query would recall
    Recall {
        session_id: String,
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Compute missing narrative embeddings (or all of them with --all)
    ReEmbed {
        /// Limit to one story
        session_id: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Check database health
    Doctor,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.taleweave/models/
    Download,
}

#[derive(Args)]
struct NewArgs {
    /// Protagonist's name
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "unspecified")]
    gender: String,
    #[arg(long, default_value = "fantasy")]
    genre: String,
    /// World setting
    #[arg(long, default_value = "")]
    world: String,
    #[arg(long, default_value = "")]
    plot: String,
    #[arg(long, default_value = "")]
    factions: String,
    #[arg(long, default_value = "")]
    npcs: String,
    /// Protagonist's origin (bloodline, class, background)
    #[arg(long)]
    origin: Option<String>,
    /// A talent; repeat for several
    #[arg(long = "talent")]
    talents: Vec<String>,
    #[arg(long)]
    avatar: Option<String>,
    /// Draft any world settings left empty from this short idea
    #[arg(long, value_name = "INTENT")]
    assist: Option<String>,
    /// Create the session without generating the opening scene
    #[arg(long)]
    no_begin: bool,
    #[arg(long, short = 'l', default_value = "medium")]
    length: LengthMode,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TaleConfig::load_from(path)?,
        None => TaleConfig::load()?,
    };

    // stderr keeps stdout clean for MCP JSON-RPC and JSON exports
    let filter = EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http: false } => server::serve_stdio(config).await?,
        Command::Serve { http: true } => server::serve_http(config).await?,
        Command::Model {
            action: ModelAction::Download,
        } => cli::model_download(&config.embedding).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        command => {
            let engine = server::build_engine(&config)?;
            run_story_command(&config, &engine, command).await?;
        }
    }

    Ok(())
}

async fn run_story_command(
    config: &TaleConfig,
    engine: &taleweave::story::lifecycle::StoryEngine,
    command: Command,
) -> Result<()> {
    match command {
        Command::New(args) => {
            let story = cli::play::NewStory {
                hero_name: args.name,
                gender: args.gender,
                genre: args.genre,
                world: WorldSettings {
                    world_context: args.world,
                    plot_direction: args.plot,
                    major_factions: args.factions,
                    key_npcs: args.npcs,
                },
                origin: args.origin,
                talents: args.talents,
                avatar: args.avatar,
                assist: args.assist,
                begin: !args.no_begin,
            };
            cli::play::new_story(engine, story, args.length).await
        }
        Command::Play {
            session_id,
            prompt,
            option,
            length,
        } => cli::play::play(engine, &session_id, prompt, option, length).await,
        Command::Regenerate {
            session_id,
            from_index,
            prompt,
            length,
        } => cli::play::regenerate(engine, &session_id, from_index, &prompt, length).await,
        Command::Retry { session_id, length } => cli::play::retry(engine, &session_id, length).await,
        Command::Undo { session_id } => cli::play::undo(engine, &session_id).await,
        Command::Sessions => cli::sessions::list(engine).await,
        Command::Show { session_id, last } => cli::sessions::show(engine, &session_id, last).await,
        Command::Delete { session_id, confirm } => {
            cli::sessions::delete(engine, &session_id, confirm).await
        }
        Command::Export { session_id, out } => {
            cli::export::export(engine, &session_id, out.as_deref()).await
        }
        Command::Import { file } => cli::import::import(engine, &file).await,
        Command::Recall {
            session_id,
            query,
            top_k,
        } => cli::recall::recall(engine, &session_id, &query, top_k).await,
        Command::ReEmbed { session_id, all } => {
            cli::re_embed::re_embed(config, engine, session_id.as_deref(), all).await
        }
        Command::Serve { .. } | Command::Model { .. } | Command::Doctor => {
            anyhow::bail!("command does not run against a story engine")
        }
    }
}

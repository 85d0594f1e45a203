use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reelbot")]
#[command(about = "Slack movie bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: REELBOT_CONFIG_PATH or ~/.reelbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bot: webhook server for Slack events and slash commands.
    /// Requires SLACK_BOT_TOKEN and TMDB_API_KEY (env or config).
    Run {
        /// Config file path (default: REELBOT_CONFIG_PATH or ~/.reelbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Webhook port (default from config or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// One-off TMDB lookup printed to stdout (movies, people, and shows).
    Lookup {
        /// Free-text query, e.g. "blade runner"
        query: String,

        /// Config file path (default: REELBOT_CONFIG_PATH or ~/.reelbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("reelbot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, port }) => {
            if let Err(e) = run_server(config, port).await {
                log::error!("run failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Lookup { query, config }) => {
            if let Err(e) = run_lookup(query, config).await {
                log::error!("lookup failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_server(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!(
        "starting reelbot on {}:{}",
        config.server.bind,
        config.server.port
    );
    lib::server::run_server(config, path).await
}

async fn run_lookup(query: String, config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, _path) = lib::config::load_config(config_path)?;
    let api_key = lib::config::resolve_tmdb_key(&config)
        .ok_or_else(|| anyhow::anyhow!("TMDB api key missing (set TMDB_API_KEY or tmdb.apiKey)"))?;
    let tmdb = lib::tmdb::TmdbClient::new(api_key, None);
    let images = tmdb.configuration().await?.images;

    match lib::movies::lookup_any(&tmdb, &images, &query).await? {
        None => println!("No results found for “{}”.", query),
        Some(reply) => {
            if let Some(text) = reply.text {
                println!("{}", text);
            }
            for att in reply.attachments {
                if let Some(title) = att.title {
                    println!("\n{}", title);
                }
                if let Some(link) = att.title_link {
                    println!("{}", link);
                }
                if let Some(text) = att.text {
                    println!("{}", text);
                }
                for field in att.fields {
                    println!("{}: {}", field.title, field.value);
                }
            }
        }
    }
    Ok(())
}

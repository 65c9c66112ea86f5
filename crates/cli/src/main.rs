mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Developer harness for the trawler indexer engine.
///
/// Loads site definitions, runs live searches against them and resolves
/// release links, printing machine-readable output on stdout. Logs go to
/// stderr so the output stays pipeable.
#[derive(Parser, Debug)]
#[command(name = "trawler")]
#[command(author, version, about)]
struct Cli {
    /// Config file (TRAWLER_CONFIG overrides the default)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Definitions directory, overriding the config
    #[arg(long, global = true)]
    definitions: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate definition files and report every problem found
    Check {
        /// Files or directories to check (default: the definitions dir)
        paths: Vec<PathBuf>,
    },
    /// Print what the loaded sites support, as JSON
    Caps {
        /// Restrict to one definition id
        #[arg(long)]
        indexer: Option<String>,
    },
    /// Run a live search and print one JSON release per line
    Search {
        /// Search term
        query: String,

        /// Definition ids to query (default: every enabled site)
        #[arg(short, long)]
        indexer: Vec<String>,

        /// Category filter, by id or name (e.g. 2040 or "Movies/HD")
        #[arg(short, long)]
        category: Vec<String>,

        /// Cap on returned releases per site
        #[arg(short, long)]
        limit: Option<u32>,

        /// Treat the term as a TV title with this season
        #[arg(long)]
        season: Option<u32>,

        /// Episode within --season
        #[arg(long, requires = "season")]
        episode: Option<u32>,

        /// Treat the term as a movie title with this year
        #[arg(long, conflicts_with = "season")]
        year: Option<i32>,

        /// IMDb id for the movie or show (e.g. tt0133093)
        #[arg(long)]
        imdb: Option<String>,
    },
    /// Resolve one release link into a magnet or a .torrent file
    Resolve {
        /// Definition id of the site the link belongs to
        indexer: String,

        /// Release link from a prior search (download or details URL)
        link: String,

        /// Where to write a .torrent payload (default: <indexer>.torrent)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = commands::Context::prepare(cli.config, cli.definitions)?;
    match cli.command {
        Commands::Check { paths } => commands::check(&ctx, &paths),
        Commands::Caps { indexer } => commands::caps(&ctx, indexer.as_deref()),
        Commands::Search {
            query,
            indexer,
            category,
            limit,
            season,
            episode,
            year,
            imdb,
        } => {
            let query = commands::build_query(query, category, limit, season, episode, year, imdb)?;
            commands::search(&ctx, &query, &indexer).await
        }
        Commands::Resolve {
            indexer,
            link,
            output,
        } => commands::resolve(&ctx, &indexer, &link, output).await,
    }
}

fn init_logging(quiet: bool, verbose: u8) {
    let default_filter = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

//! seatable-image-sync - keeps SeaTable product images current
//!
//! Fetches main product images from Amazon into a table, and relays images
//! stored in SeaTable to an external image host.

use anyhow::Result;
use clap::{Parser, Subcommand};
use seatable_image_sync::amazon::Site;
use seatable_image_sync::commands::{ExtractCommand, FetchCommand, RelayCommand, TablesCommand};
use seatable_image_sync::config::{parse_table_selections, Config, OutputFormat, SinkKind};
use seatable_image_sync::logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "seatable-image-sync",
    version,
    about = "Keep SeaTable product images in sync with Amazon and an image host",
    long_about = "Fills image columns from the Amazon product page linked in each row, and moves images stored in SeaTable to an external image host."
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,

    /// Proxy URL for Amazon requests (e.g., socks5://host:port)
    #[arg(long, global = true, env = "AMZ_PROXY")]
    proxy: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill the image column from each row's Amazon link
    #[command(alias = "f")]
    Fetch {
        /// Table to process
        #[arg(short, long)]
        table: Option<String>,

        /// Process only this row
        #[arg(long)]
        row_id: Option<String>,

        /// Where found images are stored: direct, host, asset
        #[arg(long)]
        sink: Option<SinkKind>,

        /// Column holding the product link
        #[arg(long)]
        link_column: Option<String>,

        /// Column receiving the image
        #[arg(long)]
        image_column: Option<String>,

        /// Skip image verification requests
        #[arg(long)]
        no_verify: bool,

        /// Requested image edge length
        #[arg(long)]
        size: Option<u32>,
    },

    /// Move images stored in SeaTable to the image host
    #[command(alias = "r")]
    Relay {
        /// Tables to process: `table1:col1,col2;table2`
        #[arg(long)]
        tables: Option<String>,

        /// Also relay images embedded in long-text columns
        #[arg(long)]
        rich_text: bool,
    },

    /// Show which image a product link resolves to
    #[command(alias = "x")]
    Extract {
        /// Amazon product link
        url: String,

        /// Skip image verification requests
        #[arg(long)]
        no_verify: bool,
    },

    /// List tables and image columns of the configured bases
    Tables,

    /// List supported Amazon storefronts
    Sites,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    if let Some(format) = cli.format {
        config.format = format;
    }
    if let Some(proxy) = cli.proxy {
        config.scrape.proxy = Some(proxy);
    }
    if let Some(path) = cli.log_file {
        config.log_file = Some(path);
    }

    logging::init(cli.verbose, config.log_file.as_deref())?;

    match cli.command {
        Commands::Fetch { table, row_id, sink, link_column, image_column, no_verify, size } => {
            if let Some(table) = table {
                config.fetch.table = table;
            }
            if let Some(sink) = sink {
                config.fetch.sink = sink;
            }
            if let Some(column) = link_column {
                config.fetch.link_column = column;
            }
            if let Some(column) = image_column {
                config.fetch.image_column = column;
            }
            if let Some(size) = size {
                config.scrape.target_size = size;
            }
            if no_verify {
                config.scrape.verify_images = false;
            }

            let output = FetchCommand::new(config).row_id(row_id).execute().await?;
            println!("{}", output);
        }

        Commands::Relay { tables, rich_text } => {
            if let Some(tables) = tables {
                config.relay.tables = parse_table_selections(&tables);
            }
            if rich_text {
                config.relay.process_rich_text = true;
            }

            let output = RelayCommand::new(config).execute().await?;
            println!("{}", output);
        }

        Commands::Extract { url, no_verify } => {
            if no_verify {
                config.scrape.verify_images = false;
            }

            let output = ExtractCommand::new(config).execute(&url).await?;
            println!("{}", output);
        }

        Commands::Tables => {
            let output = TablesCommand::new(config).execute().await?;
            println!("{}", output);
        }

        Commands::Sites => {
            println!("Supported Amazon storefronts:\n");
            println!("{:<6} {:<16} {:<24}", "Code", "Domain", "Accept-Language");
            println!("{:-<6} {:-<16} {:-<24}", "", "", "");

            for site in Site::all() {
                println!("{:<6} {:<16} {:<24}", site.to_string(), site.domain(), site.accept_language());
            }
        }
    }

    Ok(())
}

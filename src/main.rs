//! Bucketstore CLI
//!
//! Command-line interface over the catalog and query planner:
//! - List bucket keys and categories
//! - Create buckets and add year files
//! - Remove buckets
//! - Resolve queries into year files

use anyhow::{bail, Context};
use bucketstore::bucket::{data_shapes_from_input_string, RecordType, TimeBucketInfo, TimeBucketKey};
use bucketstore::catalog::Directory;
use bucketstore::config::{generate_default_config, Config, LoggingConfig};
use bucketstore::planner::{Direction, ParseResult, Query};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bucketstore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Catalog and query planner for year-partitioned time-series files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Catalog root, overriding the config
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List bucket keys
    Ls,

    /// List categories and their items
    Categories,

    /// Create a bucket with its first year file
    Create {
        /// Bucket key, e.g. AAPL/1Min/OHLCV or items:categories
        key: String,
        /// Year of the first file
        #[arg(short, long)]
        year: i16,
        /// Columns as name:type pairs, e.g. Open:float32,Volume:int32
        #[arg(long)]
        columns: String,
        /// Record type (fixed, variable)
        #[arg(long, default_value = "fixed")]
        record_type: String,
        /// Free-form description stored in the header
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Add a year file to an existing bucket
    AddYear {
        /// Bucket key
        key: String,
        /// Year to add
        year: i16,
    },

    /// Remove a bucket and prune empty directories
    Remove {
        /// Bucket key
        key: String,
    },

    /// Resolve a query into year files
    Query {
        /// Target key; comma-separated items select several
        key: Option<String>,
        /// Restrictions in category=item format
        #[arg(short = 'R', long)]
        restrict: Vec<String>,
        /// Range start (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Range end (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<i32>,
        /// Count the limit from the end of the range
        #[arg(long)]
        last: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(root) = &cli.root {
        config.catalog.root_dir = root.clone();
    }

    init_tracing(&config.logging)?;

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing config to {:?}", path))?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let root = config.catalog.root_dir.clone();
    let timezone = config.catalog.timezone()?;
    tracing::debug!("Opening catalog at {:?}", root);
    let catalog = Directory::open(&root).with_context(|| format!("opening catalog at {:?}", root))?;

    match cli.command {
        Commands::Ls => {
            let names = catalog.list_time_bucket_key_names();
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&names)?),
                OutputFormat::Table => {
                    for name in &names {
                        println!("{}", name);
                    }
                    println!("\n{} buckets", names.len());
                }
            }
        }

        Commands::Categories => {
            let categories = catalog.gather_categories_and_items();
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&categories)?),
                OutputFormat::Table => {
                    println!("{:<20} ITEMS", "CATEGORY");
                    println!("{}", "-".repeat(60));
                    for (category, items) in &categories {
                        let items: Vec<&str> = items.iter().map(String::as_str).collect();
                        println!("{:<20} {}", category, items.join(", "));
                    }
                }
            }
        }

        Commands::Create {
            key,
            year,
            columns,
            record_type,
            description,
        } => {
            let key: TimeBucketKey = key.parse()?;
            let shapes = data_shapes_from_input_string(&columns)?;
            let record_type = match RecordType::from_name(&record_type) {
                RecordType::NoType => bail!("unknown record type: {}", record_type),
                rt => rt,
            };
            let info = TimeBucketInfo::new(
                &key.timeframe()?,
                &key.path_to_year_files(&root),
                &description,
                year,
                &shapes,
                record_type,
            );

            catalog.add_time_bucket(&key, &info)?;
            println!("Created {} ({})", key, info.path.display());
        }

        Commands::AddYear { key, year } => {
            let key: TimeBucketKey = key.parse()?;
            let latest = catalog.get_latest_time_bucket_info_from_key(&key)?;
            let info = catalog.get_sub_directory_and_add_file(&latest.path, year)?;
            println!("Added {}", info.path.display());
        }

        Commands::Remove { key } => {
            let key: TimeBucketKey = key.parse()?;
            catalog.remove_time_bucket(&key)?;
            println!("Removed {}", key);
        }

        Commands::Query {
            key,
            restrict,
            start,
            end,
            limit,
            last,
        } => {
            let mut query = Query::new(Arc::clone(&catalog)).with_timezone(timezone);

            if let Some(key) = key {
                let key: TimeBucketKey = key.parse()?;
                query.add_target_key(&key);
            }
            for restriction in &restrict {
                let Some((category, item)) = restriction.split_once('=') else {
                    bail!("invalid restriction {:?}, expected category=item", restriction);
                };
                query.add_restriction(category.trim(), item.trim());
            }
            if let Some(start) = start {
                query.set_start(parse_time(&start, &timezone)?);
            }
            if let Some(end) = end {
                query.set_end(parse_time(&end, &timezone)?);
            }
            if limit.is_some() || last {
                let direction = if last { Direction::Last } else { Direction::First };
                query.set_row_limit(direction, limit.unwrap_or(i32::MAX));
            }

            let result = query.parse()?;
            print_parse_result(&result, cli.format)?;
        }

        // Handled before the catalog is opened
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bucketstore={}", logging.level)));

    let writer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {:?}", path))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .init(),
    }
    Ok(())
}

/// Parse RFC 3339, or a bare date taken as midnight in `tz`
fn parse_time(s: &str, tz: &Tz) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid time {:?}, expected RFC 3339 or YYYY-MM-DD", s))?;
    let midnight = date.and_hms_opt(0, 0, 0).context("invalid midnight")?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("{} does not exist in {}", s, tz))
}

fn print_parse_result(result: &ParseResult, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let files: Vec<serde_json::Value> = result
                .qualified_files
                .iter()
                .map(|qf| {
                    serde_json::json!({
                        "key": qf.key,
                        "year": qf.file.year,
                        "path": qf.file.path,
                    })
                })
                .collect();
            let body = serde_json::json!({
                "root_dir": result.root_dir,
                "intervals_per_day": result.intervals_per_day,
                "range": result.range,
                "limit": result.limit,
                "files": files,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Table => {
            println!("{:<40} {:<6} PATH", "KEY", "YEAR");
            println!("{}", "-".repeat(100));
            for qf in &result.qualified_files {
                println!(
                    "{:<40} {:<6} {}",
                    qf.key.item_key(),
                    qf.file.year,
                    qf.file.path.display()
                );
            }
            println!();
            println!("Files:             {}", result.qualified_files.len());
            println!("Intervals per day: {}", result.intervals_per_day);
            println!("Range:             {} to {}", result.range.start, result.range.end);
            println!(
                "Limit:             {} ({})",
                result.limit.number, result.limit.direction
            );
        }
    }
    Ok(())
}

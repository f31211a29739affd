mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use tsuzuki_core::config::AppConfig;
use tsuzuki_core::identity::content_key;
use tsuzuki_core::models::StoredProgressRecord;
use tsuzuki_runtime::{Runtime, StoreHandle};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tsuzuki=debug,tsuzuki_core=debug,tsuzuki_detect=debug,tsuzuki_runtime=debug".to_string()
        } else {
            "tsuzuki=info,tsuzuki_core=warn,tsuzuki_runtime=warn".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let db = cli.db.as_deref();

    match cli.command {
        Commands::Key {
            platform,
            content_type,
            title,
        } => {
            println!("{}", content_key(&platform, content_type, &title));
        }
        Commands::Config { defaults } => {
            show_config(if defaults { AppConfig::default() } else { config })?;
        }
        Commands::Sources => {
            for name in tsuzuki_runtime::source_database().names() {
                println!("{name}");
            }
        }
        Commands::Lookup { url, json } => {
            let runtime = open_runtime(config, db)?;
            match runtime.lookup(&url).await? {
                Some(record) if json => println!("{}", serde_json::to_string_pretty(&record)?),
                Some(record) => print_record(&record),
                None => anyhow::bail!("no saved progress for {url}"),
            }
        }
        Commands::List { json } => {
            let records = open_runtime(config, db)?.records().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    print_record(record);
                }
            }
        }
        Commands::Keys => {
            for key in open_runtime(config, db)?.tracked_keys().await? {
                println!("{key}");
            }
        }
        Commands::Prune => {
            let removed = open_runtime(config, db)?.prune_finished().await?;
            tracing::info!(count = removed.len(), "Pruned finished records");
            for key in removed {
                println!("{key}");
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => AppConfig::load().context("loading config"),
    }
}

/// Open the progress store at `db`, or in the data directory when unset.
fn open_runtime(config: AppConfig, db: Option<&Path>) -> Result<Runtime> {
    let db_path = match db {
        Some(path) => path.to_path_buf(),
        None => AppConfig::ensure_db_path()?,
    };
    tracing::debug!(path = %db_path.display(), "Opening progress store");
    let store = StoreHandle::open(&db_path, config.retention.clone())
        .with_context(|| format!("opening {}", db_path.display()))?;
    Ok(Runtime::with_store(store, config))
}

fn show_config(config: AppConfig) -> Result<()> {
    println!("# {}", AppConfig::config_path().display());
    print!("{}", config.to_toml()?);
    Ok(())
}

fn print_record(record: &StoredProgressRecord) {
    let episode = match (record.season_number, record.episode_number) {
        (Some(s), Some(e)) => format!(" S{s:02}E{e:02}"),
        (None, Some(e)) => format!(" E{e:02}"),
        _ => String::new(),
    };
    println!(
        "{}  {}{}  [{}]  {} / {} ({:.0}%)  {}",
        record.content_key,
        record.title,
        episode,
        record.platform,
        format_time(record.current_time),
        format_time(record.duration),
        record.percent_complete,
        record.url,
    );
}

fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0) as u64 } else { 0 };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(65.4), "1:05");
        assert_eq!(format_time(3725.0), "1:02:05");
        assert_eq!(format_time(f64::NAN), "0:00");
    }
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tsuzuki_core::models::ContentType;

#[derive(Parser)]
#[command(name = "tsuzuki")]
#[command(author, version, about = "Inspect and maintain saved playback progress")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the progress database
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the content key progress would be stored under
    Key {
        #[arg(long)]
        platform: String,

        /// movie or episode
        #[arg(long = "type", default_value = "movie", value_parser = parse_content_type)]
        content_type: ContentType,

        /// Title, or series title for episodes
        #[arg(long)]
        title: String,
    },

    /// Find saved progress for a page URL
    Lookup {
        #[arg(required = true)]
        url: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List every saved record
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List tracked content keys
    Keys,

    /// Remove old records that were watched to the end
    Prune,

    /// Show the effective configuration
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        defaults: bool,
    },

    /// List known content sources
    Sources,
}

fn parse_content_type(s: &str) -> Result<ContentType, String> {
    match s.to_ascii_lowercase().as_str() {
        "movie" => Ok(ContentType::Movie),
        "episode" | "series" => Ok(ContentType::Episode),
        other => Err(format!("unknown content type '{other}', expected movie or episode")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_command() {
        let cli = Cli::try_parse_from([
            "tsuzuki", "key", "--platform", "Netflix", "--type", "episode", "--title", "Show",
        ])
        .unwrap();
        match cli.command {
            Commands::Key {
                platform,
                content_type,
                title,
            } => {
                assert_eq!(platform, "Netflix");
                assert_eq!(content_type, ContentType::Episode);
                assert_eq!(title, "Show");
            }
            _ => panic!("expected key command"),
        }
    }

    #[test]
    fn test_rejects_unknown_content_type() {
        let result = Cli::try_parse_from([
            "tsuzuki", "key", "--platform", "Netflix", "--type", "short", "--title", "Show",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tsuzuki", "keys", "--verbose", "--db", "/tmp/p.db"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/p.db")));
    }
}

//! TileStash CLI - Command-line interface
//!
//! This binary runs the TileStash HTTP service and offers foreground
//! imports and record listing against the same data directory.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::import::ImportArgs;
use commands::list::ListArgs;
use commands::serve::ServeArgs;

#[derive(Parser)]
#[command(name = "tilestash")]
#[command(version = tilestash::VERSION)]
#[command(about = "Upload, import and serve map tilesets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),

    /// Import a file into a tileset and wait for it to finish
    Import(ImportArgs),

    /// List an owner's tilesets
    List(ListArgs),

    /// Manage config.ini
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Import(args) => commands::import::run(args).await,
        Commands::List(args) => commands::list::run(args).await,
        Commands::Config(command) => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["tilestash", "serve", "--bind", "0.0.0.0:8080", "--debug"])
            .unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind.unwrap().port(), 8080);
                assert!(args.debug);
            }
            _ => panic!("Expected serve"),
        }
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from([
            "tilestash",
            "import",
            "--owner",
            "acme",
            "--tileset",
            "roads",
            "roads.mbtiles",
        ])
        .unwrap();
        match cli.command {
            Commands::Import(args) => {
                assert_eq!(args.owner, "acme");
                assert_eq!(args.tileset.as_deref(), Some("roads"));
                assert_eq!(args.file, std::path::PathBuf::from("roads.mbtiles"));
            }
            _ => panic!("Expected import"),
        }
    }

    #[test]
    fn test_import_requires_owner() {
        assert!(Cli::try_parse_from(["tilestash", "import", "roads.mbtiles"]).is_err());
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::try_parse_from(["tilestash", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommands::Init { force: true })
        ));
    }
}

use std::path::PathBuf;

use clap::Parser;

use crate::config::{
    parse_table_list, ImportConfig, RunMode, DEFAULT_BATCH_SIZE, DEFAULT_COMMIT_EVERY,
    DEFAULT_PROGRESS_EVERY, DEFAULT_STATEMENT_TIMEOUT_SECS,
};
use crate::pipeline::fulladdress::RefreshScope;

#[derive(Parser, Debug)]
#[command(name = "fias-import")]
#[command(about = "Load a FIAS XML dump into SQLite and build the address search index")]
#[command(version)]
pub struct Cli {
    /// Archive with the XML dump: .tar, .tar.gz, a directory or a single .XML file
    pub archive: PathBuf,

    /// SQLite database file or `:memory:` (a `sqlite://` prefix is accepted)
    pub database: String,

    /// Comma-separated tables to import, e.g. "ADDROBJ, HOUSE"
    pub tables: String,

    /// Stages to run
    #[arg(value_enum, default_value_t = RunMode::Full)]
    pub mode: RunMode,

    /// Rows per lexeme indexing batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u32,

    /// Upper bound for a single database statement, in seconds
    #[arg(long, default_value_t = DEFAULT_STATEMENT_TIMEOUT_SECS)]
    pub statement_timeout: u64,

    /// Accepted records per import transaction
    #[arg(long, default_value_t = DEFAULT_COMMIT_EVERY)]
    pub commit_every: u32,

    /// Recompute full addresses for every row, not only active ones
    #[arg(long)]
    pub refresh_all: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub summary_json: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn into_config(self) -> ImportConfig {
        ImportConfig {
            archive_path: self.archive,
            database: self.database,
            tables: parse_table_list(&self.tables),
            mode: self.mode,
            batch_size: self.batch_size,
            statement_timeout_secs: self.statement_timeout,
            commit_every: self.commit_every,
            progress_every: DEFAULT_PROGRESS_EVERY,
            refresh_scope: if self.refresh_all {
                RefreshScope::All
            } else {
                RefreshScope::ActiveOnly
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fias-import").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn positional_arguments_with_defaults() {
        let cli = parse(&["fias.tar.gz", "sqlite://fias.db", "ADDROBJ, house"]);
        assert_eq!(cli.mode, RunMode::Full);
        assert!(!cli.summary_json);

        let config = cli.into_config();
        assert_eq!(config.archive_path, PathBuf::from("fias.tar.gz"));
        assert_eq!(config.database_path(), "fias.db");
        assert_eq!(config.tables, vec!["ADDROBJ", "HOUSE"]);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.refresh_scope, RefreshScope::ActiveOnly);
    }

    #[test]
    fn mode_and_aliases() {
        assert_eq!(parse(&["a", "db", "ADDROBJ", "address"]).mode, RunMode::Address);
        assert_eq!(parse(&["a", "db", "ADDROBJ", "addresses"]).mode, RunMode::Address);
        assert_eq!(parse(&["a", "db", "ADDROBJ", "lexeme"]).mode, RunMode::Lexeme);
        assert_eq!(parse(&["a", "db", "ADDROBJ", "lexemes"]).mode, RunMode::Lexeme);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let result = Cli::try_parse_from(["fias-import", "a", "db", "ADDROBJ", "houses"]);
        assert!(result.is_err());
    }

    #[test]
    fn flags_reach_the_config() {
        let cli = parse(&[
            "a",
            ":memory:",
            "ADDROBJ",
            "--batch-size",
            "50",
            "--statement-timeout",
            "5",
            "--commit-every",
            "10",
            "--refresh-all",
            "--summary-json",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.summary_json);

        let config = cli.into_config();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.statement_timeout_secs, 5);
        assert_eq!(config.commit_every, 10);
        assert_eq!(config.refresh_scope, RefreshScope::All);
    }

    #[test]
    fn missing_positionals_fail() {
        assert!(Cli::try_parse_from(["fias-import", "a", "db"]).is_err());
    }
}

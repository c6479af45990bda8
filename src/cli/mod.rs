//! Command-line interface for the `mongoclient` binary
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and flag overrides
//! - Running one client operation and writing its result as JSON

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::Value;

use crate::client::{DocumentStream, MongoClient, MongoClientImpl};
use crate::codec::{JsonObject, parse_object};
use crate::config::Config;
use crate::error::Result;
use crate::options::{FindOptions, UpdateOptions, WriteOption};

/// Run single MongoDB operations with JSON in and JSON out
#[derive(Parser, Debug)]
#[command(
    name = "mongoclient",
    version,
    about = "Run MongoDB operations from the command line",
    long_about = "Runs one MongoDB operation against the configured database and prints the
result as JSON. Documents, queries and updates are given as JSON objects; extended JSON
such as {\"$oid\": \"...\"} is accepted."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(long, value_name = "URI")]
    pub uri: Option<String>,

    /// Database name to use
    #[arg(long, value_name = "NAME")]
    pub db: Option<String>,

    /// Attach to the shared pool with this name instead of a private one
    #[arg(long, value_name = "NAME")]
    pub shared: Option<String>,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Operations the binary can run
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Insert a document
    Insert {
        collection: String,
        #[arg(value_name = "DOCUMENT")]
        document: String,
        #[arg(long, value_name = "OPTION")]
        write_option: Option<WriteOption>,
    },

    /// Insert a document, or replace it when it has an _id
    Save {
        collection: String,
        #[arg(value_name = "DOCUMENT")]
        document: String,
        #[arg(long, value_name = "OPTION")]
        write_option: Option<WriteOption>,
    },

    /// Find documents
    Find {
        collection: String,
        #[arg(value_name = "QUERY", default_value = "{}")]
        query: String,
        /// Print documents one per line as they arrive
        #[arg(long)]
        batch: bool,
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        skip: i64,
        /// Sort specification as a JSON object
        #[arg(long, value_name = "JSON")]
        sort: Option<String>,
        /// Projection as a JSON object
        #[arg(long, value_name = "JSON")]
        fields: Option<String>,
        #[arg(long, value_name = "N")]
        batch_size: Option<u32>,
    },

    /// Find the first matching document
    FindOne {
        collection: String,
        #[arg(value_name = "QUERY", default_value = "{}")]
        query: String,
        #[arg(long, value_name = "JSON")]
        fields: Option<String>,
    },

    /// Count matching documents
    Count {
        collection: String,
        #[arg(value_name = "QUERY", default_value = "{}")]
        query: String,
    },

    /// Update matching documents
    Update {
        collection: String,
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(value_name = "UPDATE")]
        update: String,
        #[arg(long)]
        upsert: bool,
        /// Update every match instead of the first
        #[arg(long)]
        multi: bool,
        #[arg(long, value_name = "OPTION")]
        write_option: Option<WriteOption>,
    },

    /// Replace the first matching document
    Replace {
        collection: String,
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(value_name = "REPLACEMENT")]
        replacement: String,
        #[arg(long)]
        upsert: bool,
        #[arg(long, value_name = "OPTION")]
        write_option: Option<WriteOption>,
    },

    /// Delete matching documents
    Remove {
        collection: String,
        #[arg(value_name = "QUERY", default_value = "{}")]
        query: String,
        /// Delete only the first match
        #[arg(long)]
        one: bool,
        #[arg(long, value_name = "OPTION")]
        write_option: Option<WriteOption>,
    },

    /// List collection names
    Collections,

    /// Create a collection
    CreateCollection { name: String },

    /// Drop a collection
    DropCollection { name: String },

    /// Run a database command
    Command {
        /// Command name, which must be a key of the command document
        name: String,
        #[arg(value_name = "COMMAND")]
        command: String,
    },

    /// Distinct values of a field
    Distinct {
        collection: String,
        field: String,
        /// Print {field: value} objects one per line
        #[arg(long)]
        batch: bool,
    },

    /// Show the effective configuration
    Config,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Parse process arguments and load configuration.
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build from already parsed arguments.
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, &args);
        config.validate()?;
        Ok(Self { args, config })
    }

    /// Command-line flags take precedence over file and environment.
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        if let Some(uri) = &args.uri {
            config.client.connection_string = Some(uri.clone());
        }
        if let Some(db) = &args.db {
            config.client.db_name = Some(db.clone());
        }
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Log level from `-v`/`--vv`, falling back to the configured level.
    pub fn log_level(&self) -> tracing::Level {
        if self.args.very_verbose {
            tracing::Level::TRACE
        } else if self.args.verbose {
            tracing::Level::DEBUG
        } else {
            self.config.logging.level.to_tracing_level()
        }
    }

    /// Handle commands that need no database connection.
    ///
    /// # Returns
    /// * `Result<bool>` - True if the command was handled
    pub fn handle_local_command(&self, out: &mut impl Write) -> Result<bool> {
        match self.args.command {
            Commands::Config => {
                writeln!(out, "{}", self.config.to_toml_redacted()?)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Create a client on the shared pool named by `--shared`, or on a
    /// private pool.
    pub async fn connect(&self) -> Result<MongoClientImpl> {
        let pool_name = match &self.args.shared {
            Some(name) => name.clone(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        MongoClientImpl::with_config(&self.config.client, &pool_name).await
    }

    /// Run the selected operation and write its result to `out`.
    pub async fn execute(&self, client: &dyn MongoClient, out: &mut impl Write) -> Result<()> {
        match &self.args.command {
            Commands::Insert {
                collection,
                document,
                write_option,
            } => {
                let document = parse_object(document)?;
                let id = match write_option {
                    Some(opt) => client.insert_with_options(collection, document, *opt).await?,
                    None => client.insert(collection, document).await?,
                };
                print_json(out, &serde_json::json!({ "insertedId": id }))
            }
            Commands::Save {
                collection,
                document,
                write_option,
            } => {
                let document = parse_object(document)?;
                let id = match write_option {
                    Some(opt) => client.save_with_options(collection, document, *opt).await?,
                    None => client.save(collection, document).await?,
                };
                print_json(out, &serde_json::json!({ "savedId": id }))
            }
            Commands::Find {
                collection,
                query,
                batch,
                limit,
                skip,
                sort,
                fields,
                batch_size,
            } => {
                let query = parse_object(query)?;
                let mut options = FindOptions::new()
                    .fields(parse_optional(fields.as_deref())?)
                    .sort(parse_optional(sort.as_deref())?)
                    .limit(*limit)
                    .skip(*skip);
                options.batch_size = *batch_size;

                if *batch {
                    let stream = client.find_batch_with_options(collection, query, options).await?;
                    print_stream(out, stream).await
                } else {
                    let docs = client.find_with_options(collection, query, options).await?;
                    print_json(out, &docs)
                }
            }
            Commands::FindOne {
                collection,
                query,
                fields,
            } => {
                let fields = parse_optional(fields.as_deref())?;
                let found = client
                    .find_one(collection, parse_object(query)?, Some(fields))
                    .await?;
                print_json(out, &found)
            }
            Commands::Count { collection, query } => {
                let count = client.count(collection, parse_object(query)?).await?;
                print_json(out, &serde_json::json!({ "count": count }))
            }
            Commands::Update {
                collection,
                query,
                update,
                upsert,
                multi,
                write_option,
            } => {
                let options = update_options(*write_option, *upsert, *multi);
                let result = client
                    .update_with_options(collection, parse_object(query)?, parse_object(update)?, options)
                    .await?;
                print_json(out, &result.to_json())
            }
            Commands::Replace {
                collection,
                query,
                replacement,
                upsert,
                write_option,
            } => {
                let options = update_options(*write_option, *upsert, false);
                let result = client
                    .replace_with_options(
                        collection,
                        parse_object(query)?,
                        parse_object(replacement)?,
                        options,
                    )
                    .await?;
                print_json(out, &result.to_json())
            }
            Commands::Remove {
                collection,
                query,
                one,
                write_option,
            } => {
                let query = parse_object(query)?;
                let result = match (one, write_option) {
                    (true, Some(opt)) => client.remove_one_with_options(collection, query, *opt).await?,
                    (true, None) => client.remove_one(collection, query).await?,
                    (false, Some(opt)) => client.remove_with_options(collection, query, *opt).await?,
                    (false, None) => client.remove(collection, query).await?,
                };
                print_json(out, &result.to_json())
            }
            Commands::Collections => print_json(out, &client.get_collections().await?),
            Commands::CreateCollection { name } => {
                client.create_collection(name).await?;
                print_json(out, &serde_json::json!({ "ok": 1 }))
            }
            Commands::DropCollection { name } => {
                client.drop_collection(name).await?;
                print_json(out, &serde_json::json!({ "ok": 1 }))
            }
            Commands::Command { name, command } => {
                let reply = client.run_command(name, parse_object(command)?).await?;
                print_json(out, &reply)
            }
            Commands::Distinct {
                collection,
                field,
                batch,
            } => {
                if *batch {
                    let stream = client.distinct_batch(collection, field).await?;
                    print_stream(out, stream).await
                } else {
                    let values: Vec<Value> = client.distinct(collection, field).await?;
                    print_json(out, &values)
                }
            }
            Commands::Config => self.handle_local_command(out).map(|_| ()),
        }
    }
}

fn update_options(write_option: Option<WriteOption>, upsert: bool, multi: bool) -> UpdateOptions {
    let mut options = UpdateOptions::new().upsert(upsert).multi(multi);
    options.write_option = write_option;
    options
}

/// Parse an optional JSON object flag; absent means empty.
fn parse_optional(text: Option<&str>) -> Result<JsonObject> {
    match text {
        Some(text) => parse_object(text),
        None => Ok(JsonObject::new()),
    }
}

fn print_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Write one compact JSON object per line as items arrive.
async fn print_stream(out: &mut impl Write, mut stream: DocumentStream) -> Result<()> {
    while let Some(doc) = stream.try_next().await? {
        writeln!(out, "{}", serde_json::to_string(&doc)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use futures::stream;
    use serde_json::json;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_find_flags() {
        let args = parse(&[
            "mongoclient",
            "find",
            "people",
            r#"{"age":{"$gt":30}}"#,
            "--batch",
            "--limit",
            "10",
            "--sort",
            r#"{"age":-1}"#,
        ]);

        match args.command {
            Commands::Find {
                collection,
                batch,
                limit,
                skip,
                sort,
                ..
            } => {
                assert_eq!(collection, "people");
                assert!(batch);
                assert_eq!(limit, 10);
                assert_eq!(skip, 0);
                assert_eq!(sort.as_deref(), Some(r#"{"age":-1}"#));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_write_option_flag() {
        let args = parse(&[
            "mongoclient",
            "remove",
            "people",
            "--one",
            "--write-option",
            "majority",
        ]);
        match args.command {
            Commands::Remove {
                query,
                one,
                write_option,
                ..
            } => {
                assert_eq!(query, "{}");
                assert!(one);
                assert_eq!(write_option, Some(WriteOption::Majority));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(CliArgs::try_parse_from(["mongoclient", "insert", "c", "{}", "--write-option", "nope"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "mongoclient",
            "--uri",
            "mongodb://flag-host:27017",
            "--db",
            "flagdb",
            "collections",
        ]);
        let mut config = Config::default();
        config.client.db_name = Some("filedb".to_string());

        CliInterface::apply_args_to_config(&mut config, &args);
        assert_eq!(
            config.client.connection_string.as_deref(),
            Some("mongodb://flag-host:27017")
        );
        assert_eq!(config.client.db_name.as_deref(), Some("flagdb"));
    }

    #[test]
    fn test_log_level_from_flags() {
        let cli = CliInterface {
            args: parse(&["mongoclient", "--vv", "config"]),
            config: Config::default(),
        };
        assert_eq!(cli.log_level(), tracing::Level::TRACE);

        let mut config = Config::default();
        config.logging.level = LogLevel::Info;
        let cli = CliInterface {
            args: parse(&["mongoclient", "config"]),
            config,
        };
        assert_eq!(cli.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_config_command_prints_toml() {
        let mut config = Config::default();
        config.client.password = Some("secret".to_string());
        let cli = CliInterface {
            args: parse(&["mongoclient", "config"]),
            config,
        };

        let mut out = Vec::new();
        assert!(cli.handle_local_command(&mut out).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[client]"));
        assert!(text.contains("[logging]"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_update_options_from_flags() {
        let options = update_options(Some(WriteOption::Journaled), true, false);
        assert!(options.upsert);
        assert!(!options.multi);
        assert_eq!(options.write_option, Some(WriteOption::Journaled));
    }

    #[tokio::test]
    async fn test_print_stream_writes_lines() {
        let docs: Vec<Result<JsonObject>> = vec![
            Ok(parse_object(r#"{"a":1}"#).unwrap()),
            Ok(parse_object(r#"{"a":2}"#).unwrap()),
        ];
        let mut out = Vec::new();
        print_stream(&mut out, Box::pin(stream::iter(docs))).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, vec![json!({ "a": 1 }), json!({ "a": 2 })]);
    }

    #[test]
    fn test_parse_optional() {
        assert!(parse_optional(None).unwrap().is_empty());
        assert_eq!(parse_optional(Some(r#"{"x":1}"#)).unwrap()["x"], json!(1));
        assert!(parse_optional(Some("[]")).is_err());
    }
}

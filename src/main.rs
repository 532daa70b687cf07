use pregel_computer::{
    search_location, Error, FileSystemStorage, GraphFormat, Location, MemoryFormat, Records, Result, Storage,
    StorageConfig,
};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

/// Inspects graphs and memory published by graph computer jobs.
#[derive(Debug, Parser)]
#[command(name = "pregel-inspect", version)]
struct Args {
    /// Encoding of graph artifacts.
    #[arg(long, value_enum, default_value_t = GraphEncoding::Json)]
    graph_format: GraphEncoding,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prints whether anything is stored at a location.
    Exists { location: String },

    /// Prints the first records of an artifact, one JSON document per line.
    Head {
        location: String,

        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Resolve the location as a job output root first.
        #[arg(long)]
        search: bool,
    },

    /// Prints a persisted memory entry of a job output.
    Memory {
        root: String,
        key: String,

        #[arg(long, value_enum, default_value_t = MemoryEncoding::Sequence)]
        format: MemoryEncoding,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GraphEncoding {
    Json,
    Binary,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MemoryEncoding {
    Sequence,
    Object,
}

impl From<GraphEncoding> for GraphFormat {
    fn from(encoding: GraphEncoding) -> Self {
        match encoding {
            GraphEncoding::Json => GraphFormat::Json,
            GraphEncoding::Binary => GraphFormat::Binary,
        }
    }
}

impl From<MemoryEncoding> for MemoryFormat {
    fn from(encoding: MemoryEncoding) -> Self {
        match encoding {
            MemoryEncoding::Sequence => MemoryFormat::Sequence,
            MemoryEncoding::Object => MemoryFormat::Object,
        }
    }
}

fn print_records(records: Records) -> Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for record in records {
        let line = serde_json::to_string(&record?).map_err(|e| Error::Encode(e.to_string()))?;
        writeln!(out, "{}", line).map_err(|e| Error::Encode(e.to_string()))?;
    }
    out.flush().map_err(|e| Error::Encode(e.to_string()))
}

fn run(args: Args) -> Result<()> {
    let storage = FileSystemStorage::open(StorageConfig {
        graph_format: args.graph_format.into(),
        ..StorageConfig::default()
    });

    match args.command {
        Command::Exists { location } => {
            println!("{}", storage.exists(&Location::new(location)));
            Ok(())
        }
        Command::Head { location, limit, search } => {
            let mut location = Location::new(location);
            if search {
                location = search_location(&location, &storage)?;
            }
            let records = match limit {
                Some(limit) => storage.head_limit(&location, limit)?,
                None => storage.head(&location)?,
            };
            print_records(records)
        }
        Command::Memory { root, key, format } => {
            print_records(storage.head_memory(&Location::new(root), &key, format.into())?)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

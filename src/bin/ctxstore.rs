//! ctxstore CLI: feed context events into a store and inspect it.
//!
//! Usage:
//!   ctxstore store --events events.jsonl [--db path] [--config ctx.yaml]
//!   ctxstore dump [--subject iri] [--graph iri]
//!   ctxstore clear [--graph iri]...
//!   ctxstore threshold

use clap::{Parser, Subcommand};
use ctxstore::{
    ConnectorConfig, ContextEvent, ContextStore, LogSink, SqliteStore, StatementPattern, Term,
};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "ctxstore",
    version,
    about = "Confidence-gated context event store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// YAML connector configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Confidence threshold (overrides the config file)
    #[arg(long, global = true)]
    threshold: Option<i64>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store events read as JSON lines
    Store {
        /// File with one JSON event per line; `-` reads stdin
        #[arg(long, default_value = "-")]
        events: PathBuf,
    },
    /// Print stored statements as N-Quads
    Dump {
        /// Only statements about this subject IRI
        #[arg(long)]
        subject: Option<String>,
        /// Only statements in this graph
        #[arg(long)]
        graph: Option<String>,
    },
    /// Remove statements from the given graphs, or everything
    Clear {
        #[arg(long)]
        graph: Vec<String>,
    },
    /// Show the effective confidence threshold
    Threshold,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<ConnectorConfig, String> {
    let mut config = match &cli.config {
        Some(path) => ConnectorConfig::load(path).map_err(|e| e.to_string())?,
        None => ConnectorConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.database = Some(db.clone());
    }
    if let Some(threshold) = cli.threshold {
        config.confidence = Some(threshold.to_string());
    }
    Ok(config)
}

fn open_store(config: &ConnectorConfig) -> Result<ContextStore<SqliteStore>, String> {
    let store = ContextStore::open(config).map_err(|e| e.to_string())?;
    store.subscribe(Arc::new(LogSink));
    Ok(store)
}

fn cmd_store(store: &ContextStore<SqliteStore>, events: &PathBuf) -> i32 {
    let reader: Box<dyn BufRead> = if events.as_os_str() == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        match std::fs::File::open(events) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => {
                eprintln!("Error: cannot open '{}': {}", events.display(), e);
                return 1;
            }
        }
    };

    let mut stored = 0usize;
    let mut failed = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Error: read failed at line {}: {}", line_no, e);
                return 1;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let event: ContextEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                eprintln!("Error: line {}: invalid event: {}", line_no, e);
                failed += 1;
                continue;
            }
        };
        match store.store_event(&event) {
            Ok(outcome) => {
                println!(
                    "{}\t{}\t{} statements",
                    event.uri, outcome.admission, outcome.statements_stored
                );
                stored += 1;
            }
            Err(e) => {
                eprintln!("Error: line {}: {}: {}", line_no, event.uri, e);
                failed += 1;
            }
        }
    }

    println!("Stored {} events, {} failed", stored, failed);
    if failed > 0 {
        1
    } else {
        0
    }
}

fn cmd_dump(store: &ContextStore<SqliteStore>, subject: Option<String>, graph: Option<String>) -> i32 {
    let mut pattern = StatementPattern::any();
    if let Some(subject) = subject {
        match Term::parse_iri(subject) {
            Ok(subject) => pattern = pattern.with_subject(subject),
            Err(e) => {
                eprintln!("Error: --subject: {}", e);
                return 1;
            }
        }
    }
    if let Some(graph) = graph {
        match Term::parse_iri(graph) {
            Ok(graph) => pattern = pattern.in_contexts(&[graph]),
            Err(e) => {
                eprintln!("Error: --graph: {}", e);
                return 1;
            }
        }
    }
    match store.statements(&pattern) {
        Ok(statements) => {
            for statement in statements {
                println!("{}", statement.to_nquad());
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_clear(store: &ContextStore<SqliteStore>, graphs: Vec<String>) -> i32 {
    let graphs: Vec<Term> = match graphs.into_iter().map(Term::parse_iri).collect() {
        Ok(graphs) => graphs,
        Err(e) => {
            eprintln!("Error: --graph: {}", e);
            return 1;
        }
    };
    match store.clear(&graphs) {
        Ok(_) => {
            if graphs.is_empty() {
                println!("Cleared store");
            } else {
                println!("Cleared {} graph(s)", graphs.len());
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_threshold(config: &ConnectorConfig) -> i32 {
    println!("{}", config.threshold());
    0
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Commands::Threshold = cli.command {
        std::process::exit(cmd_threshold(&config));
    }

    let store = match open_store(&config) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Store { events } => cmd_store(&store, &events),
        Commands::Dump { subject, graph } => cmd_dump(&store, subject, graph),
        Commands::Clear { graph } => cmd_clear(&store, graph),
        Commands::Threshold => cmd_threshold(&config),
    };
    std::process::exit(code);
}

use anyhow::{Context as _, Result};
use clap::Parser;
use std::io::{self, Read};
use teql::session::Session;
use teql::shell::{print_result, Shell};

#[derive(Parser, Debug)]
#[command(
    name = "teql",
    about = "Text Editing Query Language - the functionality of grep and sed, with the syntax of SQL"
)]
struct Args {
    /// TEQL script file to execute, or `-` for stdin; opens the
    /// interactive shell when omitted
    script: Option<String>,

    /// Render UPDATE queries as unified patches instead of writing files
    #[arg(long)]
    dry_run: bool,

    /// Source file encoding label (e.g. utf-8, windows-1252)
    #[arg(long)]
    encoding: Option<String>,

    /// Line separator: lf, crlf, cr or lfcr
    #[arg(long)]
    linesep: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut session = Session::new();
    session.set_dry_run(args.dry_run);
    if let Some(label) = &args.encoding {
        session
            .configure("encoding", label)
            .with_context(|| format!("invalid --encoding {label}"))?;
    }
    if let Some(name) = &args.linesep {
        session
            .configure("linesep", name)
            .with_context(|| format!("invalid --linesep {name}"))?;
    }

    match args.script.as_deref() {
        None => Shell::new(session).run().context("shell failed"),
        Some("-") => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("reading script from stdin")?;
            run_script(&mut session, &source)
        }
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading script {path}"))?;
            run_script(&mut session, &source)
        }
    }
}

/// Run a batch script: parse everything up front, then execute in order,
/// printing each result as it completes. The first failing query stops the
/// batch.
fn run_script(session: &mut Session, source: &str) -> Result<()> {
    let queries = teql::parse(source).map_err(|e| anyhow::anyhow!("{e}"))?;
    for query in &queries {
        match session.execute_query(query) {
            Ok(result) => print_result(&result),
            Err(e) => {
                eprintln!("teql: {e}");
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use condexpr::{diagnostics, loader::ExprSpec, ConditionCompiler, ExprArena, Value};
use slog::{debug, info, o, Drain, Level, Logger};

/// Filter newline-delimited JSON events through a compiled pipeline condition
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// expression tree, as JSON
    #[clap(short, long)]
    expr: PathBuf,

    /// events to filter, one JSON object per line (defaults to stdin)
    #[clap(long)]
    events: Option<PathBuf>,

    /// source id reported for nodes without one (defaults to the expr path)
    #[clap(long)]
    source_id: Option<String>,

    /// log compilation details to stderr
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { Level::Debug } else { Level::Warning };
    let decorator = slog_term::PlainSyncDecorator::new(io::stderr());
    let drain = slog_term::FullFormat::new(decorator)
        .build()
        .filter_level(level)
        .fuse();
    let logger = Logger::root(drain, o!());

    match run(&logger, &args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(logger: &Logger, args: &Args) -> anyhow::Result<ExitCode> {
    let text = fs::read_to_string(&args.expr)
        .with_context(|| format!("reading expression from {}", args.expr.display()))?;
    let spec = ExprSpec::from_json(&text)
        .with_context(|| format!("decoding expression tree in {}", args.expr.display()))?;

    let default_id = args
        .source_id
        .clone()
        .unwrap_or_else(|| args.expr.display().to_string());

    let mut arena = ExprArena::new();
    let root = match spec.build(&mut arena, &default_id) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("{}", diagnostics::render_fancy(&e));
            return Ok(ExitCode::from(2));
        }
    };

    let condition = match ConditionCompiler::new(logger).compile_condition(&arena, root) {
        Ok(condition) => condition,
        Err(e) => {
            eprintln!("{}", diagnostics::render_fancy(&e));
            return Ok(ExitCode::from(2));
        }
    };

    let input: Box<dyn BufRead> = match &args.events {
        Some(path) => Box::new(BufReader::new(
            fs::File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let (mut seen, mut matched) = (0usize, 0usize);

    for (n, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: serde_json::Value = serde_json::from_str(&line)
            .with_context(|| format!("decoding event on line {}", n + 1))?;
        seen += 1;

        if condition.evaluate(&Value::from(event)) {
            matched += 1;
            if let Err(e) = writeln!(out, "{}", line) {
                // downstream closed the pipe
                if e.kind() == io::ErrorKind::BrokenPipe {
                    debug!(logger, "stdout closed"; "after" => seen);
                    break;
                }
                return Err(e.into());
            }
        }
    }

    info!(logger, "filtered events"; "seen" => seen, "matched" => matched);
    Ok(if matched > 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

//! Command-line front end for the encoder/decoder core.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "binjs", about = "TreeRePair-based binary AST encoder/decoder")]
struct Cli {
    /// Enable verbose logging (repeat for more detail); overridden by RUST_LOG.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a JSON-encoded program and write its `.binjs` encoding.
    Encode {
        /// Path to a JSON file in the `{"type": ..., ...}` parse-tree convention.
        input: PathBuf,

        /// Where to write the encoded file. Defaults to `<input>.binjs`.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Caps the rank of digrams the grammar inference will consider.
        #[arg(long)]
        max_rank: Option<usize>,

        /// Number of MRU-cell-selector bits the delta codec uses (1-5).
        #[arg(long, default_value_t = 2)]
        mru_cell_bits: u32,

        /// Print the parsed JSON program to stderr before encoding it.
        #[arg(long)]
        dump_ast: bool,
    },
    /// Decode a `.binjs` file back into its original JSON program.
    Decode {
        /// Path to a file produced by `encode`.
        input: PathBuf,

        /// Where to write the decoded JSON. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of MRU-cell-selector bits the delta codec uses (1-5);
        /// must match the value passed to `encode`.
        #[arg(long, default_value_t = 2)]
        mru_cell_bits: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Encode {
            input,
            output,
            max_rank,
            mru_cell_bits,
            dump_ast,
        } => encode(&input, output.as_deref(), max_rank, mru_cell_bits, dump_ast),
        Command::Decode {
            input,
            output,
            mru_cell_bits,
        } => decode(&input, output.as_deref(), mru_cell_bits),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default_directive = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn encode(
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    max_rank: Option<usize>,
    mru_cell_bits: u32,
    dump_ast: bool,
) -> Result<()> {
    let source = fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let program: serde_json::Value = serde_json::from_str(&source)
        .with_context(|| format!("parsing {} as JSON", input.display()))?;

    if dump_ast {
        eprintln!("{}", serde_json::to_string_pretty(&program)?);
    }

    let bytes = binjs_treerepair::format::encode_program(&program, max_rank, mru_cell_bits)
        .with_context(|| format!("encoding {}", input.display()))?;

    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("binjs"));
    fs::write(&output, &bytes).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(bytes = bytes.len(), path = %output.display(), "wrote encoded program");
    Ok(())
}

fn decode(input: &std::path::Path, output: Option<&std::path::Path>, mru_cell_bits: u32) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let program = binjs_treerepair::format::decode_program(&bytes, mru_cell_bits)
        .with_context(|| format!("decoding {}", input.display()))?;
    let rendered = serde_json::to_string_pretty(&program)?;

    match output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("writing {}", path.display()))?;
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

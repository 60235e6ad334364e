use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use avrokit::codec::CodecId;
use avrokit::container::{self, Reader, Writer, WriterOptions, DEFAULT_BLOCK_SIZE, DEFAULT_COMPRESSION_LEVEL};
use avrokit::schema::json::{value_from_json, value_to_json, UnionStyle};
use avrokit::Schema;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "avrokit", about = "Avro object container file tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the writer schema of a container file
    Getschema {
        input: PathBuf,
    },
    /// Print the metadata entries of a container file
    Getmeta {
        input: PathBuf,
    },
    /// Dump every value as one JSON document per line
    Tojson {
        input: PathBuf,
        /// Read values as this schema instead of the writer schema
        #[arg(long)]
        reader_schema: Option<PathBuf>,
        /// Write union values without their {"member": ...} wrapper
        #[arg(long)]
        untagged: bool,
    },
    /// Build a container file from JSON lines
    Fromjson {
        /// JSON lines input, one value per line
        input: PathBuf,
        #[arg(short, long)]
        schema: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Codec: null (default), deflate, zstandard, xz
        #[arg(short, long, default_value = "null")]
        codec: String,
        /// Compression level (deflate 0-9; zstandard 1-22; ignored otherwise)
        #[arg(short, long, default_value_t = DEFAULT_COMPRESSION_LEVEL)]
        level: i32,
        /// Pending bytes that trigger a block flush
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
    /// Check block framing and sync markers without decoding values
    Scan {
        input: PathBuf,
        /// Emit the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {

        // ── Getschema ────────────────────────────────────────────────────────
        Commands::Getschema { input } => {
            let reader = open(&input)?;
            let json = reader.writer_schema().to_json();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }

        // ── Getmeta ──────────────────────────────────────────────────────────
        Commands::Getmeta { input } => {
            let reader = open(&input)?;
            for (key, value) in &reader.header().metadata {
                match std::str::from_utf8(value) {
                    Ok(text) => println!("{key}\t{text}"),
                    Err(_)   => println!("{key}\t0x{}", hex::encode(value)),
                }
            }
        }

        // ── Tojson ───────────────────────────────────────────────────────────
        Commands::Tojson { input, reader_schema, untagged } => {
            let file = BufReader::new(File::open(&input)?);
            let reader = match reader_schema {
                Some(path) => Reader::with_schema(file, Arc::new(load_schema(&path)?))?,
                None       => Reader::new(file)?,
            };
            let schema = Arc::clone(reader.reader_schema());
            let style = union_style(untagged);
            let mut out = BufWriter::new(io::stdout().lock());
            for value in reader {
                let json = value_to_json(&schema, schema.root(), &value?, style)?;
                writeln!(out, "{}", serde_json::to_string(&json)?)?;
            }
            out.flush()?;
        }

        // ── Fromjson ─────────────────────────────────────────────────────────
        Commands::Fromjson { input, schema, output, codec, level, block_size } => {
            let schema = Arc::new(load_schema(&schema)?);
            let codec_id = CodecId::from_name(&codec)
                .ok_or_else(|| format!("unknown codec '{codec}'"))?;
            let opts = WriterOptions { level, block_size, ..Default::default() }.with_codec(codec_id);
            let mut writer = Writer::with_options(
                Arc::clone(&schema),
                BufWriter::new(File::create(&output)?),
                opts,
            );
            for (lineno, line) in BufReader::new(File::open(&input)?).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let json: serde_json::Value = serde_json::from_str(&line)
                    .map_err(|e| format!("{}:{}: {e}", input.display(), lineno + 1))?;
                let value = value_from_json(&schema, schema.root(), &json, UnionStyle::Tagged)
                    .map_err(|e| format!("{}:{}: {e}", input.display(), lineno + 1))?;
                writer.append(&value)?;
            }
            let count = writer.items_written();
            writer.close()?.flush()?;
            eprintln!("Wrote {count} value(s) to {} ({})", output.display(), codec_id);
        }

        // ── Scan ─────────────────────────────────────────────────────────────
        Commands::Scan { input, json } => {
            let data = std::fs::read(&input)?;
            let report = container::scan(&data)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
                for b in &report.blocks {
                    println!(
                        "  offset={:<10} items={:<8} payload={:<10} {:?}",
                        b.offset, b.count, b.payload_len, b.health
                    );
                }
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open(path: &PathBuf) -> Result<Reader<BufReader<File>>, Box<dyn std::error::Error>> {
    Ok(Reader::new(BufReader::new(File::open(path)?))?)
}

fn load_schema(path: &PathBuf) -> Result<Schema, Box<dyn std::error::Error>> {
    Ok(Schema::parse_str(&std::fs::read_to_string(path)?)?)
}

fn union_style(untagged: bool) -> UnionStyle {
    if untagged { UnionStyle::Default } else { UnionStyle::Tagged }
}

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use segment_core::{SegmentHeader, HEADER_SIZE};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE: u64 = 0x1000_0000;

#[derive(Debug, Clone, Parser)]
#[command(name = "segment-tool", about = "Pack and inspect image segment files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Wrap a raw payload into a loadable segment.
    Pack(PackArgs),
    /// Print the header of an existing segment.
    Inspect {
        #[arg(value_name = "SEGMENT")]
        segment: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
pub struct PackArgs {
    /// Raw segment contents placed right after the header.
    #[arg(short, long, value_name = "FILE")]
    pub payload: PathBuf,
    /// Output segment path.
    #[arg(short, long, value_name = "SEGMENT")]
    pub output: PathBuf,
    /// Address the segment expects to be mapped at.
    #[arg(long, value_name = "ADDR", value_parser = parse_number, default_value_t = DEFAULT_BASE)]
    pub base: u64,
    /// Bytes to reserve when mapping (defaults to the segment size).
    #[arg(long, value_name = "BYTES", value_parser = parse_number)]
    pub reserve: Option<u64>,
    /// Offset of the module object from the segment start.
    #[arg(long, value_name = "OFFSET", value_parser = parse_number)]
    pub module_offset: Option<u64>,
}

pub fn run_from<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    run_with_cli(cli)
}

pub fn run_with_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Pack(args) => {
            let header = write_segment(&args)?;
            println!(
                "wrote {} ({} bytes at {:#x})",
                args.output.display(),
                header.size,
                header.base_address
            );
        }
        Command::Inspect { segment } => {
            let header = read_header(&segment)?;
            println!("segment   {}", segment.display());
            print!("{}", describe(&header));
        }
    }
    Ok(())
}

pub fn write_segment(args: &PackArgs) -> Result<SegmentHeader> {
    let payload = fs::read(&args.payload)
        .with_context(|| format!("read {}", args.payload.display()))?;
    let image = build_segment(&payload, args.base, args.reserve, args.module_offset)?;

    let mut raw = [0_u8; HEADER_SIZE];
    raw.copy_from_slice(&image[..HEADER_SIZE]);
    let header = SegmentHeader::decode(&raw)?;

    fs::write(&args.output, image).with_context(|| format!("write {}", args.output.display()))?;
    Ok(header)
}

pub fn build_segment(
    payload: &[u8],
    base: u64,
    reserve: Option<u64>,
    module_offset: Option<u64>,
) -> Result<Vec<u8>> {
    ensure!(!payload.is_empty(), "payload is empty; a segment needs a module object");

    let size = (HEADER_SIZE + payload.len()) as u64;
    let reserved_size = reserve.unwrap_or(size);
    let header = SegmentHeader::new(
        base,
        size,
        reserved_size,
        module_offset.unwrap_or(HEADER_SIZE as u64),
    );
    header
        .validate()
        .with_context(|| format!("invalid segment layout (size {size}, reserve {reserved_size})"))?;

    let mut image = vec![0_u8; size as usize];
    let mut raw = [0_u8; HEADER_SIZE];
    header.encode(&mut raw);
    image[..HEADER_SIZE].copy_from_slice(&raw);
    image[HEADER_SIZE..].copy_from_slice(payload);
    Ok(image)
}

pub fn read_header(path: &Path) -> Result<SegmentHeader> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut raw = [0_u8; HEADER_SIZE];
    file.read_exact(&mut raw)
        .with_context(|| format!("read header of {}", path.display()))?;
    let header = SegmentHeader::decode(&raw).with_context(|| format!("decode {}", path.display()))?;

    let actual = file
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    if actual < header.size {
        bail!(
            "{} is truncated: header declares {} bytes, file has {}",
            path.display(),
            header.size,
            actual
        );
    }
    Ok(header)
}

pub fn describe(header: &SegmentHeader) -> String {
    format!(
        "version   {}\nbase      {:#x}\nsize      {} bytes\nreserved  {} bytes ({} mapped)\nmodule    {:#x} (+{:#x})\n",
        header.version,
        header.base_address,
        header.size,
        header.reserved_size,
        header.reservation(),
        header.module,
        header.module_offset(),
    )
}

/// Accepts decimal or `0x`-prefixed hexadecimal, with optional `_` separators.
pub fn parse_number(input: &str) -> Result<u64, String> {
    let cleaned = input.replace('_', "");
    let parsed = match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|e| format!("invalid number {input:?}: {e}"))
}

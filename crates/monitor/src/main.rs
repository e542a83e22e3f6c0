//! CLI entry point for the `retromon` debug-link tool.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossterm as _;
use env_logger::Env;
use futures as _;
use link_core::{Link, LinkConfig, Register};
use log::info;
use monitor::{
    key_stream, load_image, open_link, open_port, run_raw, run_watch, upload, ConsoleSession,
    ImageFormat, MonitorError, RawModeGuard, TerminalConfig, WatchView, DEFAULT_BREAK_WINDOW,
    DEFAULT_LINK_BAUD, DEFAULT_PORT_PATH, DEFAULT_RAW_BAUD,
};
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;
use thiserror as _;
use tokio_serial as _;

/// Talk to a Retroputer board over its serial debug link
#[derive(Debug, Parser)]
#[command(name = "retromon", version)]
struct Cli {
    /// Serial device path
    #[arg(long, global = true, default_value = DEFAULT_PORT_PATH)]
    path: String,

    /// Baud rate (default 1000000, or 812500 for `term`)
    #[arg(long, global = true, value_parser = parse_u32)]
    baud: Option<u32>,

    /// Per-transaction timeout in milliseconds
    #[arg(long, global = true, value_parser = parse_u64)]
    timeout_ms: Option<u64>,

    /// Words per wire transaction for bulk transfers (1-64)
    #[arg(long, global = true, value_parser = parse_usize)]
    batch_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload an optional image, then run the console terminal
    Console {
        /// Memory image to upload first
        #[arg(long)]
        image: Option<PathBuf>,
        /// Load address for the image
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        load_addr: u32,
        /// Image encoding (defaults from the file extension)
        #[arg(long, value_enum)]
        format: Option<ImageFormat>,
        /// Echo typed characters locally
        #[arg(long)]
        echo: bool,
    },
    /// Raw byte-pipe terminal; press Ctrl-C twice to quit
    Term,
    /// Print the CPU registers once
    Regs {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Continuously display registers or I/O ports; `q` quits
    Watch {
        /// Start on the I/O port view
        #[arg(long)]
        io: bool,
        /// Sampling period in milliseconds
        #[arg(long, value_parser = parse_u64, default_value = "50")]
        interval_ms: u64,
    },
    /// Read memory words
    Peek {
        /// Start address
        #[arg(value_parser = parse_u32)]
        address: u32,
        /// Number of words
        #[arg(value_parser = parse_usize)]
        length: usize,
    },
    /// Write memory words
    Poke {
        /// Start address
        #[arg(value_parser = parse_u32)]
        address: u32,
        /// Words to write
        #[arg(value_parser = parse_u16, required = true)]
        words: Vec<u16>,
    },
    /// Read I/O ports
    IoRead {
        /// First port
        #[arg(value_parser = parse_u16)]
        port: u16,
        /// Number of ports
        #[arg(value_parser = parse_usize, default_value = "1")]
        length: usize,
    },
    /// Write I/O ports
    IoWrite {
        /// First port
        #[arg(value_parser = parse_u16)]
        port: u16,
        /// Words to write
        #[arg(value_parser = parse_u16, required = true)]
        words: Vec<u16>,
    },
    /// Overwrite one CPU register
    SetReg {
        /// Register name (a, b, c, d, x, y, bp, sp, flags, pc, mp, mm)
        register: Register,
        /// New value
        #[arg(value_parser = parse_u16)]
        value: u16,
    },
    /// Trigger a non-maskable interrupt
    Nmi {
        /// Zero words written to the NMI mailbox
        #[arg(long, value_parser = parse_usize, default_value = "1")]
        count: usize,
    },
    /// Single-step the CPU
    Step {
        /// Burst single step
        #[arg(long)]
        burst: bool,
    },
    /// Upload a memory image
    Load {
        /// Image file
        file: PathBuf,
        /// Load address
        #[arg(long, value_parser = parse_u32)]
        load_addr: u32,
        /// Image encoding (defaults from the file extension)
        #[arg(long, value_enum)]
        format: Option<ImageFormat>,
    },
}

fn parse_number(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|err| format!("`{text}` is not a number: {err}"))
}

fn parse_u64(text: &str) -> Result<u64, String> {
    parse_number(text)
}

fn parse_u32(text: &str) -> Result<u32, String> {
    u32::try_from(parse_number(text)?).map_err(|_| format!("`{text}` does not fit in 32 bits"))
}

fn parse_u16(text: &str) -> Result<u16, String> {
    u16::try_from(parse_number(text)?).map_err(|_| format!("`{text}` does not fit in 16 bits"))
}

fn parse_usize(text: &str) -> Result<usize, String> {
    usize::try_from(parse_number(text)?).map_err(|_| format!("`{text}` is too large"))
}

impl Cli {
    fn link_config(&self) -> LinkConfig {
        let mut config = LinkConfig::default();
        if let Some(ms) = self.timeout_ms {
            config.ready_timeout = Duration::from_millis(ms);
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        config
    }

    async fn open(&self) -> Result<Link, MonitorError> {
        let baud = self.baud.unwrap_or(DEFAULT_LINK_BAUD);
        open_link(&self.path, baud, self.link_config()).await
    }
}

fn print_words(base: u32, words: &[u16]) {
    for (row, chunk) in (0_u32..).zip(words.chunks(8)) {
        let line: Vec<String> = chunk.iter().map(|word| format!("{word:04X}")).collect();
        println!("{:08X}: {}", base.wrapping_add(row * 8), line.join(" "));
    }
}

async fn run_link_command(
    cli: &Cli,
    link: &Link,
    image: Option<&[u16]>,
) -> Result<(), MonitorError> {
    match &cli.command {
        Command::Console {
            load_addr, echo, ..
        } => {
            if let Some(words) = image {
                upload(link, *load_addr, words).await?;
            }
            let config = TerminalConfig {
                local_echo: *echo,
                ..TerminalConfig::default()
            };
            let _raw = RawModeGuard::enable()?;
            let mut session = ConsoleSession::new(link.clone(), io::stdout(), config);
            session.run(key_stream()).await?;
        }
        Command::Regs { json } => {
            let snapshot = link.cpu_snapshot().await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("{snapshot}");
            }
        }
        Command::Watch {
            io: io_view,
            interval_ms,
        } => {
            let view = if *io_view {
                WatchView::Io
            } else {
                WatchView::Registers
            };
            let _raw = RawModeGuard::enable()?;
            let mut stdout = io::stdout();
            run_watch(
                link,
                view,
                Duration::from_millis(*interval_ms),
                key_stream(),
                &mut stdout,
            )
            .await?;
        }
        Command::Peek { address, length } => {
            let words = link.read_memory(*address, *length).await?;
            print_words(*address, &words);
        }
        Command::Poke { address, words } => link.write_memory(*address, words).await?,
        Command::IoRead { port, length } => {
            let words = link.read_io(*port, *length).await?;
            print_words(u32::from(*port), &words);
        }
        Command::IoWrite { port, words } => link.write_io(*port, words).await?,
        Command::SetReg { register, value } => link.set_cpu_register(*register, *value).await?,
        Command::Nmi { count } => link.send_nmi(*count).await?,
        Command::Step { burst: false } => link.single_step().await?,
        Command::Step { burst: true } => link.burst_step().await?,
        Command::Load { load_addr, .. } => {
            let words = image.unwrap_or_default();
            upload(link, *load_addr, words).await?;
            println!("Loaded {} word(s) at {load_addr:#07X}", words.len());
        }
        // Runs on the bare port, see `run_term`.
        Command::Term => {}
    }
    Ok(())
}

async fn run_term(cli: &Cli) -> Result<(), MonitorError> {
    let baud = cli.baud.unwrap_or(DEFAULT_RAW_BAUD);
    let port = open_port(&cli.path, baud)?;
    let _raw = RawModeGuard::enable()?;
    let mut stdout = io::stdout();
    run_raw(port, key_stream(), &mut stdout, DEFAULT_BREAK_WINDOW).await
}

async fn run(cli: Cli) -> Result<(), MonitorError> {
    let image = match &cli.command {
        Command::Term => return run_term(&cli).await,
        Command::Load {
            file,
            load_addr,
            format,
        }
        | Command::Console {
            image: Some(file),
            load_addr,
            format,
            ..
        } => Some(load_image(file, *format, *load_addr)?),
        _ => None,
    };

    let link = cli.open().await?;
    let result = run_link_command(&cli, &link, image.as_deref()).await;
    link.close().await;
    info!("done");
    io::stdout().flush()?;
    result
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

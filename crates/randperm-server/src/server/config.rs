use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use randperm::{Limits, MAX_COUNT, MAX_WORKERS};

/// Runtime configuration for the `randperm-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first), with defaults matching the public service.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "randperm-server",
    version,
    about = "An HTTP/WebSocket service for random permutations of [0, N)"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Largest `countNumbers` a client may request.
    ///
    /// Requests above this are rejected before any worker is spawned. Cannot
    /// exceed 2^31 - 1.
    ///
    /// Environment variable: `MAX_COUNT`
    #[arg(long, env = "MAX_COUNT", default_value_t = MAX_COUNT)]
    pub max_count: u32,

    /// Largest `countThreads` a client may request.
    ///
    /// Each thread is a producer task sampling candidates concurrently. Cannot
    /// exceed 32.
    ///
    /// Environment variable: `MAX_WORKERS`
    #[arg(long, env = "MAX_WORKERS", default_value_t = MAX_WORKERS)]
    pub max_workers: usize,

    /// Capacity of the channel between a generation's collector and the
    /// connection writing values out.
    ///
    /// Lower values make a slow client throttle generation sooner.
    ///
    /// Environment variable: `OUTPUT_BUFFER_SIZE`
    #[arg(long, env = "OUTPUT_BUFFER_SIZE", default_value_t = randperm::DEFAULT_OUTPUT_BUFFER)]
    pub output_buffer_size: usize,

    /// Seconds to wait for in-flight generations to finish on shutdown before
    /// aborting them.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub limits: Limits,
    pub output_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.output_buffer_size == 0 {
            bail!("OUTPUT_BUFFER_SIZE must be greater than 0");
        }

        let limits = match Limits::new(args.max_count, args.max_workers) {
            Ok(limits) => limits,
            Err(e) => bail!("MAX_COUNT/MAX_WORKERS rejected: {e}"),
        };

        Ok(Self {
            server_addr: args.server_addr,
            limits,
            output_buffer_size: args.output_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:8080"),
            limits: Limits::default(),
            output_buffer_size: randperm::DEFAULT_OUTPUT_BUFFER,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

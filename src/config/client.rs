use std::path::PathBuf;

/// Client side load generation configuration.
/// This models how request batches are produced over time.
///
/// Every value can also be supplied via the process environment,
/// which is how containerized deployments are expected to set them.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// URL of the endpoint to drive traffic against
    #[arg(value_name = "URL", env = "DYNBENCH_TARGET_URL")]
    pub target: String,

    /// Number of concurrent requests launched per dispatch tick.
    #[arg(
        long,
        value_name = "N",
        env = "DYNBENCH_BATCH_SIZE",
        default_value_t = 5
    )]
    pub batch_size: u32,

    /// Seconds to sleep between two dispatch ticks.
    #[arg(
        long,
        value_name = "SECONDS",
        env = "DYNBENCH_TICK",
        default_value_t = 10.
    )]
    pub tick: f64,

    /// Presence of a file at this path requests a graceful stop.
    #[arg(
        long,
        value_name = "PATH",
        env = "DYNBENCH_STOP_FILE",
        default_value = "/tmp/stop"
    )]
    pub stop_file: PathBuf,
}

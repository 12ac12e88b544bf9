use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Quiet by default so log lines stay out of the prompt.
const DEFAULT_LOG_LEVEL: &str = "warn";

/// Terminal chat and project workspace for OpenAI-compatible endpoints.
#[derive(Debug, Parser)]
#[command(name = "agent-studio", version, about)]
struct Args {
    /// Directory for persisted chats, projects and settings.
    #[arg(long, default_value = ".agent-studio")]
    data_dir: PathBuf,

    /// Model id to use (saved to settings).
    #[arg(long)]
    model: Option<String>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Logs go to stderr so they never interleave with streamed replies.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    let options = studio_lib::RunOptions {
        data_dir: args.data_dir,
        model: args.model,
    };
    if let Err(err) = studio_lib::run(options) {
        eprintln!("agent-studio: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["agent-studio"]);
        assert_eq!(args.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(args.data_dir, PathBuf::from(".agent-studio"));
        assert_eq!(args.model, None);
    }

    #[test]
    fn test_log_level_override() {
        let args = Args::parse_from(["agent-studio", "--log-level", "debug", "--model", "m/x"]);
        assert_eq!(args.log_level, "debug");
        assert_eq!(args.model.as_deref(), Some("m/x"));
    }
}

//! Command-line and environment configuration. Every flag falls back to a
//! `LEAF_DOCTOR_*` variable, which may also come from a `.env` file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::contract::AdviceVariant;
use crate::error::PredictError;
use crate::predictor::HttpPredictor;
use crate::session::SessionSettings;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Seconds a session may sit unused before it is dropped.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

#[derive(Debug, Parser)]
#[command(name = "leaf-doctor", version, about = "Plant leaf diagnosis client")]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Base URL of the inference service; requests go to `<url>/predict`.
    #[arg(long, env = "LEAF_DOCTOR_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Response field that carries the advisory text.
    #[arg(
        long,
        env = "LEAF_DOCTOR_ADVICE_FIELD",
        value_enum,
        default_value_t = AdviceVariant::FullAdvice,
        global = true
    )]
    pub advice_field: AdviceVariant,

    /// Delay between decorative progress steps.
    #[arg(
        long,
        env = "LEAF_DOCTOR_PROGRESS_INTERVAL_MS",
        default_value_t = 1500,
        global = true
    )]
    pub progress_interval_ms: u64,

    /// Abort the prediction request after this many seconds. Unset means no
    /// timeout.
    #[arg(long, env = "LEAF_DOCTOR_REQUEST_TIMEOUT_SECS", global = true)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the web interface.
    Serve {
        #[arg(long, env = "LEAF_DOCTOR_BIND", default_value = "0.0.0.0:3000")]
        bind: SocketAddr,
        /// Drop sessions nobody touched for this many seconds.
        #[arg(
            long,
            env = "LEAF_DOCTOR_SESSION_IDLE_SECS",
            default_value_t = DEFAULT_SESSION_IDLE_SECS
        )]
        session_idle_secs: u64,
    },
    /// Diagnose one local image and print the report.
    Diagnose {
        path: PathBuf,
        /// Print the view as JSON instead of the text report.
        #[arg(long)]
        json: bool,
    },
}

impl Settings {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            advice_variant: self.advice_field,
            progress_interval: Duration::from_millis(self.progress_interval_ms.max(1)),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn predictor(&self) -> Result<HttpPredictor, PredictError> {
        HttpPredictor::new(&self.api_url, self.request_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "leaf-doctor",
            "--api-url",
            "http://inference:9000",
            "--advice-field",
            "explanation",
            "diagnose",
            "leaf.jpg",
            "--json",
            "--request-timeout-secs",
            "30",
        ])
        .unwrap();

        assert_eq!(cli.settings.api_url, "http://inference:9000");
        assert_eq!(cli.settings.advice_field, AdviceVariant::Explanation);
        assert_eq!(cli.settings.request_timeout(), Some(Duration::from_secs(30)));
        assert!(matches!(
            cli.command,
            Command::Diagnose { ref path, json: true } if path == &PathBuf::from("leaf.jpg")
        ));
    }

    #[test]
    fn serve_defaults_session_expiry() {
        let cli = Cli::try_parse_from(["leaf-doctor", "serve"]).unwrap();
        assert_eq!(cli.settings.advice_field, AdviceVariant::FullAdvice);
        assert!(matches!(
            cli.command,
            Command::Serve {
                session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
                ..
            }
        ));
    }

    #[test]
    fn serve_rejects_bad_bind_address() {
        assert!(Cli::try_parse_from(["leaf-doctor", "serve", "--bind", "nowhere"]).is_err());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cli = Cli::try_parse_from(["leaf-doctor", "--progress-interval-ms", "0", "serve"])
            .unwrap();
        assert_eq!(
            cli.settings.session_settings().progress_interval,
            Duration::from_millis(1)
        );
    }
}

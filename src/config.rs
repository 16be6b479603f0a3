use clap::Parser;
use std::time::Duration;

use crate::controller::Timing;

#[derive(Parser, Debug, Clone)]
#[command(name = "atm-session")]
#[command(about = "ATM session controller for the in-game banking NUI bridge")]
#[command(version)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3030")]
    pub port: u16,

    /// Name of the host resource the NUI callbacks are posted to
    #[arg(long, env = "RESOURCE_NAME", default_value = "muhaddil-banking")]
    pub resource_name: String,

    /// Base URL of the host callback endpoint; without it an in-memory mock authority is used
    #[arg(long, env = "HOST_BASE_URL")]
    pub host_base_url: Option<String>,

    /// Minimum time the loading screen is shown, in milliseconds
    #[arg(long, env = "LOADING_DWELL_MS", default_value = "1200")]
    pub loading_dwell_ms: u64,

    /// Delay before closing the ATM after a blocked-card rejection, in milliseconds
    #[arg(long, env = "BLOCKED_CLOSE_DELAY_MS", default_value = "2000")]
    pub blocked_close_delay_ms: u64,

    /// PIN accepted by the mock authority's demo cards
    #[arg(long, env = "MOCK_PIN", default_value = "1234")]
    pub mock_pin: String,
}

impl Config {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timing(&self) -> Timing {
        Timing {
            loading_dwell: Duration::from_millis(self.loading_dwell_ms),
            blocked_close_delay: Duration::from_millis(self.blocked_close_delay_ms),
        }
    }
}

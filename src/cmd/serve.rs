//! HTTP server command: `supportdesk serve`.

use anyhow::{Result, bail};

use supportdesk::config::SupportConfig;
use supportdesk::support::server::{self, ServerConfig};

/// Flags that override the `[server]` section.
pub struct ServeArgs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cors: bool,
    pub delay_min: Option<u64>,
    pub delay_max: Option<u64>,
}

pub async fn cmd_serve(mut config: SupportConfig, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.cors {
        config.server.cors = true;
    }
    if let Some(min) = args.delay_min {
        config.server.processing_delay_min_secs = min;
        if args.delay_max.is_none() {
            config.server.processing_delay_max_secs =
                config.server.processing_delay_max_secs.max(min);
        }
    }
    if let Some(max) = args.delay_max {
        config.server.processing_delay_max_secs = max;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        bail!("Invalid configuration:\n  {}", errors.join("\n  "));
    }

    server::start_server(ServerConfig::from_config(&config), &config).await
}

use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use posture_link::{AlertRoute, ControlHandle, DaemonConfig, LinkBus, ServerConfig, start_server};
use posture_vision::core_modules::alert::BadPosturePolicy;
use posture_vision::{Engine, FrameSource, JsonlFrameSource};
use tracing::info;

/// Posture engine device daemon.
#[derive(Debug, Parser)]
#[command(name = "posture_linkd", about = "Runs the posture engine and serves its updates")]
struct Args {
    /// TOML config file with optional [engine] and [link] tables
    #[arg(long, env = "POSTURE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// JSON-lines frame stream; `-` reads from stdin
    #[arg(long, env = "POSTURE_FRAMES", value_name = "PATH", default_value = "-")]
    frames: String,

    /// Address for the WebSocket/HTTP server
    #[arg(long, env = "POSTURE_BIND")]
    bind: Option<String>,

    /// Endpoint that receives alert POSTs
    #[arg(long, env = "POSTURE_ALERT_URL")]
    alert_url: Option<String>,

    #[arg(long, env = "POSTURE_DEVICE_ID")]
    device_id: Option<String>,

    /// Pipeline cycle length in seconds
    #[arg(long, env = "POSTURE_CYCLE_SECS")]
    cycle_secs: Option<f64>,

    /// Curvature smoothing factor in (0, 1]
    #[arg(long, env = "POSTURE_SMOOTHING_ALPHA")]
    smoothing_alpha: Option<f64>,

    /// Which verdicts heat the alert accumulator: meh, warning or non_good
    #[arg(long, env = "POSTURE_ALERT_POLICY", value_parser = parse_policy)]
    alert_policy: Option<BadPosturePolicy>,

    #[arg(long, env = "POSTURE_ALERT_INCREASE_RATE")]
    alert_increase_rate: Option<f64>,

    #[arg(long, env = "POSTURE_ALERT_DECREASE_RATE")]
    alert_decrease_rate: Option<f64>,

    #[arg(long, env = "POSTURE_ALERT_THRESHOLD")]
    alert_threshold: Option<f64>,
}

fn parse_policy(value: &str) -> Result<BadPosturePolicy, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("unknown policy `{value}`, expected meh, warning or non_good"))
}

impl Args {
    fn resolve(&self) -> anyhow::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
            None => DaemonConfig::default(),
        };

        let engine = &mut config.engine;
        if let Some(v) = self.cycle_secs {
            engine.cycle_secs = v;
        }
        if let Some(v) = self.smoothing_alpha {
            engine.smoothing_alpha = v;
        }
        if let Some(v) = self.alert_policy {
            engine.alert.policy = v;
        }
        if let Some(v) = self.alert_increase_rate {
            engine.alert.increase_rate = v;
        }
        if let Some(v) = self.alert_decrease_rate {
            engine.alert.decrease_rate = v;
        }
        if let Some(v) = self.alert_threshold {
            engine.alert.threshold = v;
        }
        if let Some(id) = &self.device_id {
            engine.device_id = Some(id.clone());
        }
        engine.validate().context("invalid engine settings")?;

        if let Some(bind) = &self.bind {
            config.link.bind_addr = bind.clone();
        }
        if let Some(url) = &self.alert_url {
            config.link.alert_url = Some(url.clone());
        }
        Ok(config)
    }

    fn frame_source(&self) -> anyhow::Result<Box<dyn FrameSource + Send>> {
        if self.frames == "-" {
            let cwd = std::env::current_dir()?;
            return Ok(Box::new(JsonlFrameSource::new(BufReader::new(std::io::stdin()), cwd)));
        }
        let source = JsonlFrameSource::open(&self.frames).with_context(|| format!("opening {}", self.frames))?;
        Ok(Box::new(source))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.resolve()?;
    let source = args.frame_source()?;

    let engine = Engine::new(config.engine.clone());
    let shutdown = engine.shutdown_handle();
    let bus = LinkBus::new(config.link.broadcast_capacity);
    let control = ControlHandle {
        context: engine.context(),
        calibration: engine.calibration_trigger(),
    };
    let alerts = AlertRoute::from_url(config.link.alert_url.as_deref())?;
    let inbound = bus
        .take_inbound()
        .context("inbound queue already taken")?;

    let server = start_server(
        bus.clone(),
        ServerConfig {
            bind_addr: config.link.bind_addr.clone(),
        },
        control,
        shutdown.clone(),
    )
    .await?;

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, shutting down");
                shutdown.trigger();
            }
        }
    });

    engine.run(source, bus.update_sink(), alerts, inbound).await;
    shutdown.trigger();
    server.await.ok();
    Ok(())
}

use anyhow::Context;
use clap::{Parser, Subcommand};
use roundtrip_core::{
    discover_agent, CancelSignal, HarnessConfig, HttpGenerationBackend, LoadHarness, Outcome,
    PrometheusLatencyRecorder, ReportFormat, RoundTripClient, RunReport, Target,
    TracingSpanRecorder,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

mod metrics_server;
mod telemetry;

use metrics_server::spawn_metrics_server;
use telemetry::{init_logging_only, init_telemetry, TelemetryConfig, TelemetryGuard};

#[derive(Parser, Debug)]
#[command(name = "roundtrip-worker")]
#[command(about = "Round-trip latency checks for generation services", long_about = None)]
#[command(version)]
struct Cli {
    /// Listen address for the Prometheus /metrics endpoint
    #[arg(long, global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Perform a single round trip and print the generated output
    Once {
        /// Prompt to send (defaults to $PROMPT, then the built-in prompt)
        #[arg(long)]
        prompt: Option<String>,

        /// Agent listing endpoint to discover the target from
        #[arg(long)]
        agents_url: Option<String>,
    },

    /// Fire N concurrent round trips and evaluate them against the SLA bound
    Load {
        /// Number of concurrent units
        #[arg(long)]
        concurrency: Option<usize>,

        /// Maximum acceptable round trip in milliseconds
        #[arg(long)]
        sla_bound_ms: Option<u64>,

        /// Per-call timeout in milliseconds
        #[arg(long)]
        call_timeout_ms: Option<u64>,

        /// Cap on units in a call at once
        #[arg(long)]
        max_in_flight: Option<usize>,

        /// Agent listing endpoint to discover the target from
        #[arg(long)]
        agents_url: Option<String>,

        /// Agent name to target on the listing endpoint
        #[arg(long)]
        agent_role: Option<String>,

        /// Prompt sent by every unit
        #[arg(long)]
        prompt: Option<String>,

        /// Report format (text or json)
        #[arg(long, default_value = "text")]
        format: ReportFormat,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _telemetry = match init_telemetry(&TelemetryConfig::from_env()) {
        Ok(guard) => guard,
        Err(e) => {
            init_logging_only();
            warn!(error = %e, "OpenTelemetry unavailable, logging only");
            TelemetryGuard::disabled()
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = HarnessConfig::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    config.validate().context("Invalid configuration")?;

    let recorder = Arc::new(
        PrometheusLatencyRecorder::new().context("Failed to create latency recorder")?,
    );
    let _metrics = spawn_metrics_server(config.metrics_addr.clone(), Arc::clone(&recorder));

    let backend = Arc::new(HttpGenerationBackend::new(config.call_timeout())?);
    let client = RoundTripClient::new(backend)
        .with_latency_recorder(recorder)
        .with_span_recorder(Arc::new(TracingSpanRecorder));

    let target = resolve_target(&config).await?;

    match cli.command {
        Commands::Once { .. } => {
            let observation = client.call(&target, &config.prompt, 0).await;
            match observation.outcome {
                Outcome::Success(payload) => {
                    info!(duration = ?observation.duration, "Round trip complete");
                    println!("{}", payload);
                    Ok(ExitCode::SUCCESS)
                }
                Outcome::Failure(e) => {
                    error!(duration = ?observation.duration, "Round trip failed: {}", e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Load { format, .. } => {
            let harness = LoadHarness::new(Arc::new(client))
                .with_prompt(config.prompt.clone())
                .with_max_in_flight(config.max_in_flight);

            let (cancel, signal) = CancelSignal::channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling load run");
                    cancel.cancel();
                }
            });

            let result = harness
                .run_with_cancel(&target, config.concurrency, config.sla_bound(), signal)
                .await?;

            println!("{}", RunReport::new(&result).render(format));

            Ok(if result.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

/// Command-line flags win over file and environment configuration.
fn apply_overrides(config: &mut HarnessConfig, cli: &Cli) {
    if let Some(addr) = &cli.metrics_addr {
        config.metrics_addr = addr.clone();
    }

    match &cli.command {
        Commands::Once { prompt, agents_url } => {
            if let Some(prompt) = prompt.as_ref().filter(|p| !p.is_empty()) {
                config.prompt = prompt.clone();
            }
            if agents_url.is_some() {
                config.agents_url = agents_url.clone();
            }
        }
        Commands::Load {
            concurrency,
            sla_bound_ms,
            call_timeout_ms,
            max_in_flight,
            agents_url,
            agent_role,
            prompt,
            ..
        } => {
            if let Some(concurrency) = concurrency {
                config.concurrency = *concurrency;
            }
            if let Some(sla_bound_ms) = sla_bound_ms {
                config.sla_bound_ms = *sla_bound_ms;
            }
            if let Some(call_timeout_ms) = call_timeout_ms {
                config.call_timeout_ms = *call_timeout_ms;
            }
            if max_in_flight.is_some() {
                config.max_in_flight = *max_in_flight;
            }
            if agents_url.is_some() {
                config.agents_url = agents_url.clone();
            }
            if let Some(role) = agent_role {
                config.agent_role = role.clone();
            }
            if let Some(prompt) = prompt.as_ref().filter(|p| !p.is_empty()) {
                config.prompt = prompt.clone();
            }
        }
    }
}

/// Discover the agent when a listing endpoint is configured, otherwise
/// target the generation endpoint directly.
async fn resolve_target(config: &HarnessConfig) -> anyhow::Result<Target> {
    let Some(agents_url) = &config.agents_url else {
        return Ok(config.generate_target());
    };

    let http = reqwest::Client::builder()
        .timeout(config.call_timeout())
        .build()
        .context("Failed to create discovery client")?;

    discover_agent(&http, agents_url, &config.agent_role)
        .await
        .with_context(|| format!("Failed to discover agent '{}'", config.agent_role))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_load() {
        let cli = Cli::try_parse_from([
            "roundtrip-worker",
            "load",
            "--concurrency",
            "25",
            "--sla-bound-ms",
            "2000",
            "--max-in-flight",
            "5",
            "--format",
            "json",
            "--metrics-addr",
            "127.0.0.1:9200",
        ])
        .unwrap();

        let mut config = HarnessConfig::default();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.concurrency, 25);
        assert_eq!(config.sla_bound_ms, 2000);
        assert_eq!(config.max_in_flight, Some(5));
        assert_eq!(config.metrics_addr, "127.0.0.1:9200");
        assert!(matches!(
            cli.command,
            Commands::Load {
                format: ReportFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_once_keeps_configured_prompt_when_flag_empty() {
        let cli = Cli::try_parse_from(["roundtrip-worker", "once", "--prompt", ""]).unwrap();

        let mut config = HarnessConfig::default();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.prompt, roundtrip_core::DEFAULT_PROMPT);
        assert_eq!(config.agents_url, None);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let parsed = Cli::try_parse_from(["roundtrip-worker", "load", "--format", "xml"]);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_resolve_direct_target() {
        let config = HarnessConfig::default();
        let target = resolve_target(&config).await.unwrap();
        assert_eq!(target, Target::default());
    }
}

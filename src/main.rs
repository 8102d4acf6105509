//! # Runner - motor de execução de testes de caos
//!
//! ## Para todos entenderem:
//!
//! Este binário tem um único trabalho: ler dois arquivos JSON (as instâncias
//! do cluster e as ações do plano), montar o DAG correspondente e rodá-lo até
//! o fim. O código de saída do processo reflete se o *plano* carregou e
//! executou -- não se o *teste* passou. Se você quer saber se o cluster
//! sobreviveu ao caos, leia o relatório (stdout ou o e-mail), não o exit
//! code.

mod action;
mod actions;
mod client;
mod expr;
mod loader;
mod plan;
mod remote;
mod report;
mod telemetry;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use action::control_flow::SendEmailAction;
use action::{ActionBehavior, ActionContext};
use telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "run-plan")]
#[command(about = "Chaos plan runner for a Nebula Graph cluster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Loads an instance conf file and an action conf file, builds the DAG
    /// and runs it to completion.
    RunPlan {
        /// JSON file describing the cluster's storaged/metad/graphd instances.
        #[arg(long)]
        instance_conf_file: PathBuf,

        /// JSON file describing the plan's name, concurrency, email and actions.
        #[arg(long)]
        action_conf_file: PathBuf,

        /// Optional Python script invoked with the action conf file path to
        /// render a flow-chart image, attached to the notification e-mail.
        #[arg(long)]
        flow_chart_script: Option<PathBuf>,

        /// Enables OpenTelemetry OTLP trace export.
        #[arg(long, default_value = "false")]
        otel: bool,

        /// OTLP collector endpoint (defaults to the telemetry module's own default).
        #[arg(long)]
        otel_endpoint: Option<String>,

        /// Verbose (DEBUG-level) logging.
        #[arg(long, short = 'v', default_value = "false")]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::RunPlan {
            instance_conf_file,
            action_conf_file,
            flow_chart_script,
            otel,
            otel_endpoint,
            verbose,
        } => {
            let mut telemetry_config = TelemetryConfig::from_env();
            telemetry_config.log_level = if *verbose { Level::DEBUG } else { Level::INFO };

            if *otel {
                if let Some(endpoint) = otel_endpoint {
                    telemetry_config.otlp_endpoint = Some(endpoint.clone());
                } else if telemetry_config.otlp_endpoint.is_none() {
                    telemetry_config.otlp_endpoint = Some("http://localhost:4317".to_string());
                }
            }

            if let Err(e) = init_telemetry(telemetry_config) {
                eprintln!("Warning: failed to initialize telemetry: {e}");
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                    .try_init();
            }

            let exit_code = run_plan(instance_conf_file, action_conf_file, flow_chart_script.as_deref()).await;

            shutdown_telemetry();
            std::process::exit(exit_code);
        }
    }
}

/// Renders the flow chart via the configured Python script, if any. Best
/// effort: a failure here never blocks the run, it only means the
/// notification e-mail ships without an attachment.
async fn render_flow_chart(flow_chart_script: Option<&std::path::Path>, action_conf_file: &std::path::Path) -> Option<String> {
    let script = flow_chart_script?;
    let out = tokio::process::Command::new("/bin/python3")
        .arg(script)
        .arg(action_conf_file)
        .output()
        .await
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Loads the plan, runs it to completion, prints the textual report, and
/// e-mails it when the plan document configured a recipient. Returns the
/// process exit code: 0 whenever the plan loaded and ran (its own pass/fail
/// status lives inside the report), 1 on load/validation failure.
async fn run_plan(instance_conf_file: &PathBuf, action_conf_file: &PathBuf, flow_chart_script: Option<&std::path::Path>) -> i32 {
    let run_id = uuid::Uuid::new_v4();
    info!(
        run_id = %run_id,
        instance_conf_file = %instance_conf_file.display(),
        action_conf_file = %action_conf_file.display(),
        "loading plan"
    );

    let plan = match loader::load_plan_from_files(instance_conf_file, action_conf_file) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to load plan");
            return 1;
        }
    };
    info!(plan_name = %plan.name, "plan loaded");

    let attachment = render_flow_chart(flow_chart_script, action_conf_file).await;

    info!("============= running the plan =============");
    let report = plan.run().await;
    let text = report.render_text();
    println!("\n{text}");
    info!(status = %report.status, "plan finished");

    if let Some(to) = &plan.email {
        let email = SendEmailAction::new(
            format!("Chaos plan '{}' finished: {}", plan.name, report.status),
            text,
            to.clone(),
            attachment,
        );
        let ctx = std::sync::Arc::new(ActionContext::new());
        if email.do_run(ctx).await != action::ResultCode::Ok {
            error!("failed to send the notification e-mail");
        }
    }

    0
}

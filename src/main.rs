//! reel 命令行
//!
//! 用法：`reel [--offline] [--config <path>] <project-id> [scene-id...]`
//! 为指定场景（未给出时为项目全部场景）运行素材生成流水线，结果以 JSON 输出。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use reel::clock::{Clock, TokioClock};
use reel::config::load_config;
use reel::pipeline::{AssetOptions, PipelineOrchestrator};
use reel::session::{Session, SessionConfig};
use reel::tools::{InvokerConfig, StreamConfig, ToolInvoker};
use reel::transport::{HttpTransport, ScriptedTransport, ToolTransport};
use reel::{ProjectClient, RecoveryEngine, ReelError};

#[derive(Debug, Parser)]
#[command(name = "reel", about = "Generate scene assets for a video project")]
struct Cli {
    /// Use the scripted in-process backend instead of HTTP
    #[arg(long)]
    offline: bool,
    /// Extra config file layered over config/default.toml
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(value_name = "PROJECT_ID")]
    project_id: String,
    /// Scenes to process; all scenes of the project when omitted
    #[arg(value_name = "SCENE_ID")]
    scene_ids: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    reel::observability::init();

    let config = load_config(args.config.clone()).context("Failed to load config")?;

    let transport: Arc<dyn ToolTransport> = if args.offline {
        tracing::info!("Running against scripted offline backend");
        Arc::new(ScriptedTransport::new())
    } else {
        Arc::new(
            HttpTransport::new(
                &config.backend.endpoint,
                config.backend.api_key.clone(),
                config.backend.request_timeout_secs,
            )
            .context("Failed to build HTTP transport")?,
        )
    };
    let clock: Arc<dyn Clock> = Arc::new(TokioClock);

    let session = Session::new(
        &args.project_id,
        transport,
        clock,
        SessionConfig::from(&config.session),
    );
    let invoker = ToolInvoker::new(Arc::clone(&session), InvokerConfig::from(&config.invoker));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        invoker,
        StreamConfig::from(&config.stream),
    ));
    let client = ProjectClient::new(orchestrator, AssetOptions::from(&config.pipeline));

    let outcome = run(&client, &args.scene_ids).await;
    session.cleanup().await;

    if let Err(e) = outcome {
        let action = RecoveryEngine::new().handle(&e);
        eprintln!("{}", e.user_message());
        tracing::error!(error = %e, ?action, "reel failed");
        return Err(e.into());
    }
    Ok(())
}

async fn run(client: &ProjectClient, scene_ids: &[String]) -> Result<(), ReelError> {
    if scene_ids.is_empty() {
        let report = client.generate_all_assets().await?;
        print_json(&report);
        return Ok(());
    }

    for scene_id in scene_ids {
        let result = client.generate_scene_assets(scene_id).await?;
        print_json(&result);
        if let Some(failure) = result.failure {
            return Err(failure.into());
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize result"),
    }
}

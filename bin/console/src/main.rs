//! Headless operator console.
//!
//! Wires the orchestration layer together and exposes a small command
//! surface: list workflows, show one, check channel health, tail logs.

mod config;

use std::sync::Arc;
use std::time::Duration;

use amber_relay_api::{ActorIdentity, ApiClient};
use amber_relay_channel::{ChannelPolicyController, HttpChannelGateway};
use amber_relay_core::{WorkflowId, WorkspaceTab};
use amber_relay_logs::{HttpEventSource, LogStreamController};
use amber_relay_workflow::{
    AlwaysConfirm, DraftLifecycle, HttpWorkflowGateway, MetaLoader, WorkflowGateway,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ConsoleConfig;

fn usage() -> ! {
    eprintln!("usage: amber-relay <list | show <id> | health <id> | tail <id>>");
    std::process::exit(2);
}

fn workflow_id(arg: Option<String>) -> WorkflowId {
    arg.and_then(WorkflowId::new)
        .unwrap_or_else(|| usage())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConsoleConfig::from_env().expect("failed to load configuration");
    tracing::info!(base_url = %config.api.base_url, "Loaded configuration");

    let client = ApiClient::new(
        config.api.base_url.clone(),
        ActorIdentity {
            actor_id: config.api.actor_id.clone(),
            roles: config.api.actor_roles.clone(),
            tenant: config.api.tenant_id.clone(),
        },
    );

    let workflow_gateway: Arc<dyn WorkflowGateway> =
        Arc::new(HttpWorkflowGateway::new(client.clone()));
    let lifecycle = DraftLifecycle::new(Arc::clone(&workflow_gateway), Arc::new(AlwaysConfirm));

    let channels = ChannelPolicyController::new(
        Arc::new(HttpChannelGateway::new(client.clone())),
        Arc::clone(&lifecycle),
        config.health.to_health_config(),
        config.include_metrics,
    );
    let channel_watch = channels.watch(lifecycle.subscribe_selection());

    let logs = LogStreamController::new(
        Arc::new(HttpEventSource::new(client)),
        config.log_stream_enabled,
    );
    let log_watch = logs.watch(lifecycle.subscribe_selection());

    let meta = MetaLoader::spawn(
        workflow_gateway,
        Arc::clone(&lifecycle),
        lifecycle.subscribe_selection(),
        config.catalog_enabled,
    );

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| usage());
    match command.as_str() {
        "list" => {
            lifecycle.refresh_list().await.expect("workflow list failed");
            for workflow in lifecycle.snapshot().workflows {
                println!(
                    "{}\tv{}\t{:?}\t{}",
                    workflow.id, workflow.version, workflow.status, workflow.name
                );
            }
        }
        "show" => {
            let id = workflow_id(args.next());
            lifecycle.select(&id).await.expect("workflow load failed");
            let draft = lifecycle.snapshot().current;
            println!("{draft:#?}");
        }
        "health" => {
            let id = workflow_id(args.next());
            lifecycle.select(&id).await.expect("workflow load failed");
            lifecycle.set_active_tab(WorkspaceTab::Channel);
            // let the selection watcher bind the policy and start polling
            tokio::time::sleep(Duration::from_millis(300)).await;
            channels.refresh_health().await;
            tokio::time::sleep(Duration::from_millis(300)).await;
            match channels.health_state().await {
                Some(state) => println!("{state:#?}"),
                None => println!("no channel bound for {id}"),
            }
        }
        "tail" => {
            let id = workflow_id(args.next());
            lifecycle.select(&id).await.expect("workflow load failed");
            lifecycle.set_active_tab(WorkspaceTab::Logs);
            tracing::info!(workflow = %id, "tailing logs, ctrl-c to stop");
            let mut printed = 0usize;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = tokio::time::sleep(Duration::from_millis(1_000)) => {
                        let entries = logs.entries();
                        for entry in entries.iter().skip(printed) {
                            println!(
                                "{} [{}] {}",
                                entry.timestamp.to_rfc3339(),
                                entry.level,
                                entry.message
                            );
                        }
                        printed = entries.len();
                    }
                }
            }
        }
        _ => usage(),
    }

    channel_watch.shutdown().await;
    log_watch.shutdown().await;
    meta.shutdown().await;
    channels.stop_health().await;
    logs.stop().await;
}

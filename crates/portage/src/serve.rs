// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The long-running serve loop: one engine, one timer, ctrl-c to stop.

use std::sync::Arc;
use std::time::Duration;

use portage_config::PortageConfig;
use portage_core::{PortageError, TargetInfo};
use portage_sync::{CycleOutcome, SyncEngine};
use tracing::{error, info};

use crate::webhook::WebhookTarget;

pub async fn run(config: PortageConfig) -> Result<(), PortageError> {
    let target = Arc::new(WebhookTarget::new()?);
    let engine = SyncEngine::open(&config, target).await?;

    // A configured webhook binds on startup unless something else already is.
    if let Some(url) = &config.target.webhook_url {
        let state = engine.state().await?;
        if state.bound_target_id.is_none() {
            engine
                .bind_target(Some(TargetInfo {
                    id: url.clone(),
                    title: "webhook".to_string(),
                    url: url.clone(),
                }))
                .await?;
            info!(%url, "bound webhook delivery target");
        }
    }

    let poll_secs = engine.state().await?.settings.poll_secs.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(poll_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(poll_secs, "poll loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.poll_once().await {
                    Ok(CycleOutcome::Completed(summary)) => {
                        if let Some(err) = summary.error {
                            info!(error = %err, "cycle failed, will retry next tick");
                        } else if summary.fetched > 0 || summary.delivered > 0 {
                            info!(
                                fetched = summary.fetched,
                                delivered = summary.delivered,
                                pending = summary.pending,
                                "cycle complete"
                            );
                        }
                    }
                    Ok(CycleOutcome::AlreadyRunning) => {}
                    Err(err) => error!(error = %err, "cycle aborted on storage failure"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

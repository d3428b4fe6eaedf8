use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use stagewatch::api::{load_events, resolve_run_id};
use stagewatch::prelude::*;
use tokio::select;
use tokio::signal::ctrl_c;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::render::ReplayBar;

/// Options of a replay session
#[derive(Debug)]
pub struct ReplayOptions {
    pub file: PathBuf,
    pub run_id: Option<String>,
    pub step: Duration,
    pub config: ObserverConfig,
    pub drop_every: Option<usize>,
}

/// Publish recorded events one step apart while observing the run
pub async fn run_replay(options: ReplayOptions) -> Result<(), anyhow::Error> {
    let replay_id = Uuid::new_v4();
    let span = info_span!("replay", replay_id = %replay_id);

    async move {
        let events = load_events(&options.file).context("failed to load recorded events")?;
        let run_id = resolve_run_id(&events, options.run_id.as_deref())?
            .ok_or_else(|| anyhow!("{} holds no events to replay", options.file.display()))?;
        let events: Vec<StageEvent> = events
            .into_iter()
            .filter(|event| event.run_id == run_id)
            .collect();

        info!(run_id = %run_id, count = events.len(), "Replaying recorded events");

        let store = InMemoryEventStore::new();
        let bar = Arc::new(ReplayBar::new());
        let grace = options.config.poll_interval() * 2;
        let ctx = ObserverContext::builder()
            .source(Arc::new(store.clone()))
            .subscriber(Arc::new(store.clone()))
            .callbacks(bar.clone())
            .config(options.config)
            .build();

        let handle = observe(Some(run_id), &ctx);
        let render = tokio::spawn(render_snapshots(handle.subscribe(), bar.clone()));
        let publisher = tokio::spawn(publish(store, events, options.step, options.drop_every));

        // the recording may end before the run does, give polling a chance to catch up
        let drained = async {
            if let Err(e) = publisher.await {
                warn!("Event publisher did not finish: {}", e);
            }
            tokio::time::sleep(grace).await;
        };

        select! {
            biased;
            _ = ctrl_c() => {
                info!("Received Ctrl+C, stopping replay...");
                bar.abandon("Replay interrupted");
                handle.stop().await;
                bail!("Replay interrupted");
            }
            _ = handle.wait_terminal() => {}
            _ = drained => {}
        }

        let snapshot = handle.snapshot();
        handle.stop().await;
        if let Err(e) = render.await {
            warn!("Progress renderer did not finish: {}", e);
        }
        bar.finish(&snapshot);

        match snapshot.status {
            PipelineStatus::Completed => Ok(()),
            PipelineStatus::Failed => Err(anyhow!(
                "Pipeline run failed: {}",
                bar.failure().unwrap_or(snapshot.label)
            )),
            PipelineStatus::Cancelled => Err(anyhow!("Pipeline run was cancelled")),
            PipelineStatus::Connecting | PipelineStatus::Processing => Err(anyhow!(
                "Recorded events end before the run finished ({}% {})",
                snapshot.progress,
                snapshot.label
            )),
        }
    }
    .instrument(span)
    .await
}

async fn render_snapshots(mut snapshots: watch::Receiver<RunSnapshot>, bar: Arc<ReplayBar>) {
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        bar.update(&snapshot);

        if snapshots.changed().await.is_err() {
            break;
        }
    }
    debug!("Progress renderer finished");
}

/// Feed the store one event per step, skipping the push of every n-th event
async fn publish(
    store: InMemoryEventStore,
    events: Vec<StageEvent>,
    step: Duration,
    drop_every: Option<usize>,
) {
    for (index, event) in events.into_iter().enumerate() {
        tokio::time::sleep(step).await;

        match drop_every {
            Some(n) if n > 0 && (index + 1) % n == 0 => {
                debug!(event_id = %event.id, "Recording event without push");
                store.record(event).await;
            }
            _ => store.publish(event).await,
        }
    }
    debug!("All recorded events replayed");
}

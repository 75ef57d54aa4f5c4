use parqueo_core::{SyncCoordinator, SyncState};

use crate::commands::common::{Context, Session};
use crate::error::CliError;

pub async fn run_sync(watch: bool, context: &Context) -> Result<(), CliError> {
    let session = Session::open(context)?;
    let drain_interval = session.config.drain_interval();
    let coordinator = SyncCoordinator::new(session.remote, session.queue, session.connectivity)
        .with_drain_interval(drain_interval);

    if watch {
        println!("Watching sync queue; press Ctrl-C to stop");
        coordinator
            .run_until(async {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Failed to listen for Ctrl-C: {error}");
                }
            })
            .await;
        println!("{} operation(s) still queued", coordinator.queue().len()?);
        return Ok(());
    }

    let Some(report) = coordinator.drain_now().await? else {
        report_skipped(coordinator.state());
        return Ok(());
    };

    println!(
        "Synced {} operation(s); {} remaining",
        report.replayed, report.remaining
    );
    report.into_result()?;
    Ok(())
}

fn report_skipped(state: SyncState) {
    match state {
        SyncState::Offline => println!("Offline; queued operations were not synced"),
        _ => println!("Another session is syncing the queue; try again shortly"),
    }
}

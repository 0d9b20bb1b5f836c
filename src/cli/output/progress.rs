//! Progress display fed by the pipeline event stream.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::table::exit_summary;
use crate::domain::models::PipelineEvent;

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Progress bar over `total` waypoints; hidden when `visible` is false
pub fn create_progress_bar(total: u64, visible: bool) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(
        Some(total),
        if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        },
    );
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .map(|s| s.progress_chars(PROGRESS_CHARS))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Drive `pb` from pipeline events until the run completes.
///
/// Returns the number of finalized units it observed.
pub fn track_run(
    mut events: broadcast::Receiver<PipelineEvent>,
    pb: ProgressBar,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut finalized = 0;
        loop {
            match events.recv().await {
                Ok(PipelineEvent::UnitFinalized { decision }) => {
                    finalized += 1;
                    pb.inc(1);
                    pb.set_message(format!(
                        "{} -> {} ({})",
                        decision.unit_id,
                        decision.selected_label(),
                        decision.method
                    ));
                }
                Ok(PipelineEvent::ShutdownInitiated { reason }) => {
                    pb.set_message(format!("shutting down workers: {reason}"));
                }
                Ok(PipelineEvent::WorkerExited { kind, exit }) if !exit.is_clean() => {
                    pb.println(format!("worker {kind}: {}", exit_summary(&exit)));
                }
                Ok(PipelineEvent::RunCompleted { degradation, .. }) => {
                    pb.finish_with_message(format!("done ({degradation})"));
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    pb.abandon();
                    break;
                }
            }
        }
        finalized
    })
}

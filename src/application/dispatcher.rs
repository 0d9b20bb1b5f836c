//! Work dispatcher: turns the route into work units and feeds every worker.
//!
//! Each worker kind owns its intake channel. One feeder per kind runs
//! concurrently so a slow worker only backs up its own intake.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::application::channel::{ChannelError, ChannelSender};
use crate::domain::models::{PipelineEvent, Waypoint, WorkUnit, WorkUnitId, WorkerKind};

/// How many units reached each worker's intake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: BTreeMap<WorkerKind, usize>,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.delivered.values().sum()
    }
}

/// Publishes work units to per-kind intake channels
pub struct Dispatcher {
    intakes: Vec<(WorkerKind, ChannelSender<WorkUnit>)>,
    send_timeout: Duration,
    events: broadcast::Sender<PipelineEvent>,
}

impl Dispatcher {
    pub fn new(
        intakes: Vec<(WorkerKind, ChannelSender<WorkUnit>)>,
        send_timeout: Duration,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            intakes,
            send_timeout,
            events,
        }
    }

    /// One work unit per waypoint, identified by input position
    pub fn create_units(waypoints: &[Waypoint]) -> Vec<WorkUnit> {
        waypoints
            .iter()
            .zip(0u32..)
            .map(|(waypoint, index)| WorkUnit::new(WorkUnitId(index), waypoint.clone()))
            .collect()
    }

    /// Send every unit to every intake, then an end-of-stream marker per intake.
    ///
    /// An intake closed underneath a feeder (worker gone, shutdown) stops that
    /// feeder without error; units it never delivered are filled in by the
    /// aggregator. A capacity timeout is returned as an error.
    pub async fn dispatch(self, units: &[WorkUnit]) -> Result<DispatchSummary, ChannelError> {
        if units.is_empty() {
            info!("No work units, closing intake channels");
            for (_, intake) in &self.intakes {
                intake.closer().close_for_sending();
            }
            return Ok(DispatchSummary::default());
        }

        let feeders = self
            .intakes
            .iter()
            .map(|(kind, intake)| self.feed(*kind, intake, units));
        let outcomes = join_all(feeders).await;

        let mut summary = DispatchSummary::default();
        let mut first_error = None;
        for ((kind, _), outcome) in self.intakes.iter().zip(outcomes) {
            match outcome {
                Ok(delivered) => {
                    summary.delivered.insert(*kind, delivered);
                }
                Err(err) => {
                    warn!(kind = %kind, error = %err, "Dispatch to worker intake failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        info!(
            units = units.len(),
            deliveries = summary.total(),
            "Dispatch complete"
        );
        Ok(summary)
    }

    async fn feed(
        &self,
        kind: WorkerKind,
        intake: &ChannelSender<WorkUnit>,
        units: &[WorkUnit],
    ) -> Result<usize, ChannelError> {
        let mut delivered = 0;

        for unit in units {
            match intake.send(unit.clone(), self.send_timeout).await {
                Ok(()) => {
                    delivered += 1;
                    debug!(unit_id = %unit.id, kind = %kind, "Unit dispatched");
                    let _ = self.events.send(PipelineEvent::UnitDispatched {
                        unit_id: unit.id,
                        kind,
                    });
                }
                Err(ChannelError::Closed(channel)) => {
                    warn!(
                        kind = %kind,
                        channel = %channel,
                        delivered,
                        remaining = units.len() - delivered,
                        "Intake closed before dispatch finished"
                    );
                    return Ok(delivered);
                }
                Err(err) => return Err(err),
            }
        }

        intake.send_end_of_stream(self.send_timeout).await?;
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::channel::{bounded, Received};
    use crate::domain::models::{Coordinates, WaypointCategory};

    fn waypoints(n: usize) -> Vec<Waypoint> {
        (0..n)
            .map(|i| {
                Waypoint::new(
                    format!("Stop {i}"),
                    Coordinates::new(31.0, 35.0),
                    WaypointCategory::Natural,
                    "",
                )
            })
            .collect()
    }

    #[test]
    fn test_units_are_numbered_by_position() {
        let units = Dispatcher::create_units(&waypoints(3));
        let ids: Vec<_> = units.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![WorkUnitId(0), WorkUnitId(1), WorkUnitId(2)]);
        assert_eq!(units[2].name(), "Stop 2");
    }

    #[tokio::test]
    async fn test_every_kind_receives_every_unit() {
        let (events, _) = broadcast::channel(64);
        let (video_tx, mut video_rx) = bounded("intake-video", 10).unwrap();
        let (music_tx, mut music_rx) = bounded("intake-music", 10).unwrap();
        let dispatcher = Dispatcher::new(
            vec![(WorkerKind::Video, video_tx), (WorkerKind::Music, music_tx)],
            Duration::from_secs(1),
            events,
        );

        let units = Dispatcher::create_units(&waypoints(3));
        let summary = dispatcher.dispatch(&units).await.unwrap();
        assert_eq!(summary.total(), 6);

        for rx in [&mut video_rx, &mut music_rx] {
            for expected in 0..3 {
                match rx.recv(Duration::from_secs(1)).await.unwrap() {
                    Received::Item(unit) => assert_eq!(unit.id, WorkUnitId(expected)),
                    Received::EndOfStream => panic!("premature end of stream"),
                }
            }
            assert_eq!(
                rx.recv(Duration::from_secs(1)).await.unwrap(),
                Received::EndOfStream
            );
        }
    }

    #[tokio::test]
    async fn test_empty_route_closes_intakes() {
        let (events, _) = broadcast::channel(8);
        let (tx, mut rx) = bounded::<WorkUnit>("intake-history", 2).unwrap();
        let dispatcher = Dispatcher::new(
            vec![(WorkerKind::History, tx)],
            Duration::from_secs(1),
            events,
        );

        let summary = dispatcher.dispatch(&[]).await.unwrap();
        assert_eq!(summary.total(), 0);
        assert_eq!(
            rx.recv(Duration::from_secs(1)).await.unwrap(),
            Received::EndOfStream
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_intake_is_capacity_error() {
        let (events, _) = broadcast::channel(8);
        let (tx, _rx) = bounded::<WorkUnit>("intake-video", 1).unwrap();
        let dispatcher = Dispatcher::new(
            vec![(WorkerKind::Video, tx)],
            Duration::from_secs(2),
            events,
        );

        let units = Dispatcher::create_units(&waypoints(2));
        let err = dispatcher.dispatch(&units).await.unwrap_err();
        assert!(matches!(err, ChannelError::CapacityExceeded { capacity: 1, .. }));
    }

    #[tokio::test]
    async fn test_closed_intake_is_not_fatal() {
        let (events, _) = broadcast::channel(8);
        let (tx, rx) = bounded::<WorkUnit>("intake-music", 4).unwrap();
        rx.closer().shutdown();
        let dispatcher = Dispatcher::new(
            vec![(WorkerKind::Music, tx)],
            Duration::from_secs(1),
            events,
        );

        let units = Dispatcher::create_units(&waypoints(2));
        let summary = dispatcher.dispatch(&units).await.unwrap();
        assert_eq!(summary.delivered[&WorkerKind::Music], 0);
    }
}

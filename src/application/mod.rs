//! Application layer: the concurrent curation pipeline.
//!
//! A [`Supervisor`] run wires one [`Dispatcher`], one [`GenerationWorker`]
//! per configured kind and one [`Aggregator`] together through bounded
//! channels, and turns their output into a `RunReport`.

pub mod aggregator;
pub mod channel;
pub mod dispatcher;
pub mod selection;
pub mod supervisor;
pub mod worker;

pub use aggregator::{Aggregator, AggregatorOutput, AggregatorSettings};
pub use channel::{
    bounded, ChannelCloser, ChannelError, ChannelReceiver, ChannelSender, Received, RecvError,
};
pub use dispatcher::{DispatchSummary, Dispatcher};
pub use selection::{SelectionPolicy, UnitResults};
pub use supervisor::{monitor_worker, MonitorOutcome, Supervisor};
pub use worker::{GenerationWorker, WorkerSettings, WorkerState, WorkerStatus};

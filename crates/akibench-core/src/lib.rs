//! Core domain types and seams for the akibench load harness.
//!
//! The engine crate drives a [`Transport`] with operations produced by a [`Workload`];
//! both are defined here so transport and dataset crates only depend on this crate.

pub mod cancel;
pub mod config;
pub mod error;
pub mod mock;
pub mod operation;
pub mod transport;
pub mod workload;

pub use cancel::CancellationSignal;
pub use config::{
    BenchConfig, GeneratorConfig, GeneratorMode, KneeConfig, LoggingConfig, MeasurementConfig,
    RecorderConfig, WarmupConfig,
};
pub use error::{BenchError, BenchResult};
pub use mock::{MockStall, MockTransport, MockTransportConfig};
pub use operation::{Operation, OperationKind};
pub use transport::{Transport, TransportOutcome};
pub use workload::{MixedWorkload, MixedWorkloadConfig, Workload, WorkloadMix};

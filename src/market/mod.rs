pub mod aggregator;
pub mod decimate;
pub mod envelope;
pub mod fields;
pub mod gateway;
pub mod history;
pub mod pipeline;
pub mod telemetry;
pub mod types;

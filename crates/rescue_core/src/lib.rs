pub mod aggregation;
pub mod cluster;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod eta;
pub mod geo;
pub mod matching;
pub mod model;
pub mod notify;
pub mod routing;
pub mod spatial;
pub mod store;
pub mod urgency;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

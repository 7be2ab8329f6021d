//! Calibration & trust store: rolling per-(model, task-type,
//! difficulty) priors and per-(model, role) trust values.

pub mod observation;
pub mod prior_store;
pub mod trust_store;

pub use observation::Observation;
pub use prior_store::{PriorStore, RecomputedPrior};
pub use trust_store::{QaTrustInput, TrustStore, WorkerTrustInput};

//! Promotion core: candidate selection, threshold gating, idempotent
//! registration, the promote-to-live transition, and the controller that
//! sequences them.

mod controller;
mod gate;
mod registrar;
mod selector;

pub use controller::{PromotionController, PromotionOutcome};
pub use gate::{
    bounds_from_specs, evaluate_gate, BoundKind, GateCheck, GateReport, MetricBound,
};
pub use registrar::ModelRegistrar;
pub use selector::select_candidate;

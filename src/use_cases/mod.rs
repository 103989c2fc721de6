pub mod reconcile_callback;

pub use reconcile_callback::{ReconcileCallback, ReconcileOutput, ReconcileSettings};

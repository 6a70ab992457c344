//! Time-based one-time codes: derivation, drift-window verification, and
//! provisioning.

pub mod code;
pub mod service;
pub mod uri;

pub use service::TotpService;

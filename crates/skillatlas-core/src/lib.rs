//! IRT ability estimation, adaptive question selection and
//! weak-spot diagnosis.
//!
//! The estimators (`irt`, `selector`, `theta`, `weakspot`, `retrieval`) are
//! pure and synchronous. `engine` wires them to the async storage
//! collaborators defined in `traits`.

pub mod config;
pub mod engagement;
pub mod engine;
pub mod error;
pub mod irt;
pub mod model;
pub mod parser;
pub mod report;
pub mod retrieval;
pub mod selector;
pub mod statistics;
pub mod store;
pub mod theta;
pub mod traits;
pub mod weakspot;

//! Client-side grading engine: feedback tree indexing, exclusive-group
//! validity, filters, the edit state machine and the session that ties them
//! to a [`GradingBackend`](crate::services::backend::GradingBackend).

pub mod edit;
pub mod errors;
pub mod filter;
pub mod indexer;
pub mod model;
pub mod navigator;
pub mod session;
pub mod store;
pub mod tree;
pub mod validity;

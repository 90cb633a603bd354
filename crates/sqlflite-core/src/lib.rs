//! sqlflite-core - Types and query plans for the sqlflite client
//!
//! This crate holds everything the client needs that does not touch the
//! network: the error taxonomy, connection configuration, the value and
//! result-set model, table schemas, the typed expression IR, and the
//! immutable query plan builder. Column references and operator typing are
//! checked here, at plan construction time, so a bad query never costs a
//! network round-trip.

mod config;
mod error;
mod expr;
mod plan;
mod schema;
mod types;

pub use config::*;
pub use error::*;
pub use expr::*;
pub use plan::*;
pub use schema::*;
pub use types::*;

//! Feature writes.
//!
//! A decoder stages one feature in a [`ValueContainer`]; the
//! [`MutationCompiler`] turns it into ordered statements and the
//! [`MutationRunner`] executes them against a [`SqlClient`](crate::provider::SqlClient).

pub mod compiler;
pub mod runner;
pub mod values;

pub use compiler::{id_literal, IdMap, MutationCompiler, RowRef, Statement, StatementKind};
pub use runner::MutationRunner;
pub use values::{StagedRow, ValueContainer};

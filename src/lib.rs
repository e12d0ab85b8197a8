//! Declarative image datasets: describe a schema, plan splits over local or remote
//! resources, and stream labeled records out of folders and sequential archives.

pub mod config;
pub mod core;
pub mod error;
pub mod fetch;
pub mod infrastructure;
pub mod publish;

pub use error::{DatasetError, Result};

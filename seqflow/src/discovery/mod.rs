//! Work unit discovery from file naming conventions.
//!
//! A [`WorkUnitResolver`] lists a directory, keeps the files a
//! [`NamingConvention`] recognizes and groups them into single-end and
//! paired-end [`Sample`](crate::core::Sample)s.

mod naming;
mod resolver;

pub use naming::NamingConvention;
pub use resolver::{OrphanPolicy, WorkUnitResolver, WorkUnits};

//! Converts workload names to actual application code.
//!
//! # Example
//!
//! To get the per-category top keywords application:
//! ```
//! # use anyhow::Result;
//! // This is the correct import to use if you are outside the crate:
//! use topklite::workload;
//! // Since you will be working within the `topklite` crate,
//! // you should write `use crate::workload;` instead.
//! # fn main() -> Result<()> {
//! let keywords = workload::named("top-keywords")?;
//! # Ok(())
//! # }
//! ```

use crate::Workload;
use anyhow::{bail, Result};

pub mod keywords;

/// Gets the [`Workload`] named `name`.
///
/// Returns [`None`] if no application with the given name was found.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        "top-keywords" => Some(keywords::workload()),
        _ => None,
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns an [`anyhow::Error`] if no application with the given name was found.
pub fn named(name: &str) -> Result<Workload> {
    match try_named(name) {
        Some(app) => Ok(app),
        None => bail!("No app named `{}` found.", name),
    }
}

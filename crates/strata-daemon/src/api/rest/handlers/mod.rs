//! API request handlers

mod clusters;
mod deployments;
mod health;

pub use clusters::*;
pub use deployments::*;
pub use health::*;

use serde::Deserialize;

/// `?start=&count=` paging
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub start: usize,
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    20
}

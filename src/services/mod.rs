//! Service layer: the per-creator context, download passes and the scrape
//! operation that ties them together. Separated from UI concerns; progress
//! leaves through download events.

pub mod context;
pub mod download;
pub mod scrape;

pub use context::{PipelineOptions, ScraperContext, Transport};
pub use scrape::{scrape_creator, scrape_with_target, CreatorReport};

//! Service layer for the batch pipeline.
//!
//! This module contains the remote collaborators:
//! - AtCoder scraping (`AtCoderClient`, `PageScraper`)
//! - AtCoder Problems datasets (`AtCoderProblemsClient`)
//! - Search index cores (`IndexCore`, `SolrCore`)

mod atcoder;
mod problems;
mod scrape;
mod solr;

pub use atcoder::AtCoderClient;
pub use problems::AtCoderProblemsClient;
pub use scrape::PageScraper;
pub use solr::{IndexCore, SolrCore};

//! Image enrichment for pagekit content trees.
//!
//! This crate ties together stock search, the asset cache, and generative
//! fallback into one pipeline ([`Enricher::enrich`]) that fills every missing
//! image slot of a page and never fails the run.

pub mod downloader;
pub mod generative;
mod mime;
pub mod pipeline;
pub mod placeholder;
mod plan;
pub mod report;

pub use downloader::Downloader;
pub use generative::{GeneratedImage, GenerativeFallback, ImageGenerator, OpenAiImageGenerator};
pub use pipeline::{EnrichmentContext, EnrichmentProgress, Enricher, SilentEnrichmentProgress};
pub use placeholder::{PlaceholderStyle, placeholder_url};
pub use report::{EnrichmentReport, ReportEntry, SlotSource};

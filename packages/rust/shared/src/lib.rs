//! Shared types, error model, and configuration for pagekit.
//!
//! This crate is the foundation depended on by all other pagekit crates.
//! It provides:
//! - [`PagekitError`]: the unified error type
//! - Content tree types ([`ContentTree`], [`Section`], [`ContentNode`])
//! - [`CallBudget`]: the run-wide external-call cap
//! - Image candidates and the single image-reference check ([`is_valid_image_ref`])
//! - Configuration ([`AppConfig`], [`CacheSettings`], [`RunLimits`], config loading)

pub mod budget;
pub mod config;
pub mod error;
pub mod image;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use budget::CallBudget;
pub use config::{
    AppConfig, CacheConfig, CacheSettings, EnrichmentDefaults, GenerationConfig, ProviderConfig,
    ProvidersConfig, RunLimits, apply_env_overrides, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_api_key, validate_credentials,
};
pub use error::{PagekitError, Result};
pub use image::{ImageCandidate, Orientation, ProviderName, is_valid_image_ref};
pub use types::{
    ContentNode, ContentTree, FeatureItem, FeaturesSection, GalleryItem, GallerySection,
    MissingSlot, OpaqueSection, Section, SectionKind, SingleImageSection, TeamMember, TeamSection,
    Testimonial, TestimonialsSection,
};

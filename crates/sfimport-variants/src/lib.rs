//! Variant family detection for imported product records.
//!
//! [`VariantDetector`] strips colour, size and model tokens from product
//! names, buckets records by what remains and scores each bucket by how many
//! of its members carried a recognisable variant token.

pub mod detector;
pub mod error;
pub mod patterns;

pub use detector::{
    DetectorConfig, ProductVariant, VariantAttributes, VariantDetector, VariantGroup,
};
pub use error::VariantError;
pub use patterns::{PatternSet, PatternTable, PatternTables, VariantClass};

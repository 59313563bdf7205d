//! Engine configuration
//!
//! Every field has a default, so an empty TOML document is a valid config.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::coords::PageSize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Uploads ingested concurrently per batch (default: 5)
    #[serde(default = "default_ingest_batch_size")]
    pub ingest_batch_size: usize,
    /// Linear scale of page rasters in repair's raster fallback (default: 2.0)
    #[serde(default = "default_raster_scale")]
    pub raster_scale: f32,
    /// Size of blank pages inserted by organize (default: A4)
    #[serde(default = "default_blank_page_size")]
    pub blank_page_size: PageSize,
    /// Distance in points between a named-position signature and the page edge (default: 50)
    #[serde(default = "default_signature_margin")]
    pub signature_margin: f64,
    /// Widest a text watermark may be, as a fraction of page width (default: 0.9)
    #[serde(default = "default_watermark_max_width_ratio")]
    pub watermark_max_width_ratio: f64,
    /// Font size used when a request leaves it out (default: 12)
    #[serde(default = "default_font_size")]
    pub default_font_size: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ingest_batch_size: default_ingest_batch_size(),
            raster_scale: default_raster_scale(),
            blank_page_size: default_blank_page_size(),
            signature_margin: default_signature_margin(),
            watermark_max_width_ratio: default_watermark_max_width_ratio(),
            default_font_size: default_font_size(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("Failed to parse TOML configuration")?;
        anyhow::ensure!(config.raster_scale > 0.0, "raster_scale must be positive");
        anyhow::ensure!(
            config.blank_page_size.width > 0.0 && config.blank_page_size.height > 0.0,
            "blank_page_size must be positive"
        );
        anyhow::ensure!(
            config.default_font_size.is_finite() && config.default_font_size > 0.0,
            "default_font_size must be a positive number"
        );
        Ok(config)
    }
}

fn default_ingest_batch_size() -> usize {
    5
}

fn default_raster_scale() -> f32 {
    2.0
}

fn default_blank_page_size() -> PageSize {
    PageSize::new(595.28, 841.89)
}

fn default_signature_margin() -> f64 {
    50.0
}

fn default_watermark_max_width_ratio() -> f64 {
    0.9
}

fn default_font_size() -> f64 {
    12.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_toml_uses_defaults() {
        assert_eq!(EngineConfig::from_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_str(
            r#"
            ingest_batch_size = 2
            raster_scale = 3.0

            [blank_page_size]
            width = 612.0
            height = 792.0
            "#,
        )
        .unwrap();
        assert_eq!(config.ingest_batch_size, 2);
        assert_eq!(config.raster_scale, 3.0);
        assert_eq!(config.blank_page_size, PageSize::LETTER);
        assert_eq!(config.signature_margin, 50.0);
    }

    #[test]
    fn test_rejects_non_positive_scale() {
        assert!(EngineConfig::from_str("raster_scale = 0.0").is_err());
    }

    #[test]
    fn test_rejects_unusable_default_font_size() {
        assert!(EngineConfig::from_str("default_font_size = nan").is_err());
        assert!(EngineConfig::from_str("default_font_size = inf").is_err());
        assert!(EngineConfig::from_str("default_font_size = -1.0").is_err());
        assert_eq!(
            EngineConfig::from_str("default_font_size = 9.5")
                .unwrap()
                .default_font_size,
            9.5
        );
    }
}

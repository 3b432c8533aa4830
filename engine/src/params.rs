use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::model::Model;

#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    EnumString,
    EnumIter,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    Default,
)]
pub enum AspectRatio {
    #[default]
    #[strum(serialize = "1:1")]
    #[serde(rename = "1:1")]
    #[value(name = "1:1")]
    Square,
    #[strum(serialize = "16:9")]
    #[serde(rename = "16:9")]
    #[value(name = "16:9")]
    Landscape,
    #[strum(serialize = "9:16")]
    #[serde(rename = "9:16")]
    #[value(name = "9:16")]
    Portrait,
    #[strum(serialize = "4:3")]
    #[serde(rename = "4:3")]
    #[value(name = "4:3")]
    Standard,
    #[strum(serialize = "3:4")]
    #[serde(rename = "3:4")]
    #[value(name = "3:4")]
    StandardPortrait,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    EnumString,
    EnumIter,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    Default,
)]
pub enum Resolution {
    #[default]
    #[strum(serialize = "1K")]
    #[serde(rename = "1K")]
    #[value(name = "1K")]
    OneK,
    #[strum(serialize = "2K")]
    #[serde(rename = "2K")]
    #[value(name = "2K")]
    TwoK,
    #[strum(serialize = "4K")]
    #[serde(rename = "4K")]
    #[value(name = "4K")]
    FourK,
}

/// Everything the user picks before pressing generate, minus the reference
/// images which are encoded separately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationParams {
    pub prompt: String,
    pub model: Model,
    pub aspect_ratio: AspectRatio,
    /// Only sent for models with a configurable resolution.
    pub resolution: Resolution,
    /// Only honoured for models that support search grounding.
    pub search_enabled: bool,
}

impl GenerationParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_search(mut self, enabled: bool) -> Self {
        self.search_enabled = enabled;
        self
    }

    /// The image size that goes on the wire, `None` when the model has a fixed
    /// output size.
    pub fn effective_resolution(&self) -> Option<Resolution> {
        self.model
            .profile()
            .configurable_resolution
            .then_some(self.resolution)
    }

    pub fn effective_search(&self) -> bool {
        self.search_enabled && self.model.profile().search_available
    }
}

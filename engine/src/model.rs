use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    Default,
)]
pub enum Model {
    /// gemini-3-pro-image-preview
    #[default]
    Pro,
    /// gemini-2.5-flash-image
    Flash,
}

/// Everything that differs between the two model tiers.
///
/// Upload admission, the model switch and the add-image affordance all read
/// `max_images` from here, so they can't disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelProfile {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub max_images: usize,
    pub configurable_resolution: bool,
    pub search_available: bool,
}

const PRO: ModelProfile = ModelProfile {
    id: "gemini-3-pro-image-preview",
    label: "Gemini 3 Pro Image Preview",
    description: "High quality, 1K/2K/4K output, up to 14 reference images",
    max_images: 14,
    configurable_resolution: true,
    search_available: true,
};

const FLASH: ModelProfile = ModelProfile {
    id: "gemini-2.5-flash-image",
    label: "Gemini 2.5 Flash Image",
    description: "Fast, fixed 1024px output, 1 reference image",
    max_images: 1,
    configurable_resolution: false,
    search_available: false,
};

impl Model {
    pub fn profile(&self) -> &'static ModelProfile {
        match self {
            Model::Pro => &PRO,
            Model::Flash => &FLASH,
        }
    }

    /// The identifier used in the request path.
    pub fn id(&self) -> &'static str {
        self.profile().id
    }

    pub fn max_images(&self) -> usize {
        max_images(*self)
    }

    pub fn from_id(id: &str) -> Option<Model> {
        Model::iter().find(|m| m.id() == id)
    }
}

pub fn max_images(model: Model) -> usize {
    model.profile().max_images
}

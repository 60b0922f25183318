/// Inbound batch message
///
/// One message names a booth and the originals uploaded for it. Article
/// and product entries may be a single URL or a list.

use serde::{Deserialize, Serialize};

use crate::error::MessageError;
use crate::state::data::{ImageCategory, SourceImageRef};

/// A single value or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn as_slice(&self) -> &[String] {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value),
            OneOrMany::Many(values) => values,
        }
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(values: Vec<String>) -> Self {
        OneOrMany::Many(values)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchImages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<OneOrMany>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMessage {
    pub booth_id: i64,
    #[serde(default)]
    pub images: BatchImages,
}

impl BatchMessage {
    pub fn from_json(body: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Worklist in processing order: thumbnail, articles, products
    pub fn refs(&self) -> Vec<SourceImageRef> {
        let thumbnail = self
            .images
            .thumbnail
            .iter()
            .map(|url| SourceImageRef::new(ImageCategory::Thumbnail, url.as_str()));

        let listed = |category: ImageCategory, entries: &Option<OneOrMany>| {
            entries
                .as_ref()
                .map(OneOrMany::as_slice)
                .unwrap_or_default()
                .iter()
                .map(move |url| SourceImageRef::new(category, url.as_str()))
                .collect::<Vec<_>>()
        };

        thumbnail
            .chain(listed(ImageCategory::Article, &self.images.article))
            .chain(listed(ImageCategory::Product, &self.images.product))
            .collect()
    }
}

//! Named animation presets.
//!
//! The clock only ever asks a catalog for the template behind a name. Where
//! the templates come from (built-ins, a show file, an editor) is up to the
//! caller.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::command::{AnimationParams, AnimationType};
use crate::error::Result;

/// Default parameters for one named animation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationTemplate {
    #[serde(flatten)]
    pub params: AnimationParams,
}

impl AnimationTemplate {
    pub fn new(params: AnimationParams) -> Self {
        Self { params }
    }

    pub fn kind(&self) -> AnimationType {
        self.params.kind()
    }
}

/// Source of animation templates.
pub trait AnimationCatalog: Send + Sync {
    /// Template registered under `animation`, if any.
    fn template(&self, animation: &str) -> Option<AnimationTemplate>;
}

/// Default chunk size for the built-in FuseWave preset.
pub const DEFAULT_CHUNK_SIZE: u32 = 10;

/// In-memory catalog keyed by preset name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticCatalog {
    templates: HashMap<String, AnimationTemplate>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// One preset per animation type, named after the type.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.templates.insert(
            AnimationType::Blink.to_string(),
            AnimationTemplate::new(AnimationParams::Blink),
        );
        catalog.templates.insert(
            AnimationType::FuseWave.to_string(),
            AnimationTemplate::new(AnimationParams::FuseWave {
                chunk_size: DEFAULT_CHUNK_SIZE,
            }),
        );
        catalog
    }

    /// Register or replace a preset.
    pub fn insert(&mut self, name: impl Into<String>, template: AnimationTemplate) -> Result<()> {
        template.params.validate()?;
        self.templates.insert(name.into(), template);
        Ok(())
    }

    /// Add every preset from `other`, replacing same-named ones.
    pub fn merge(&mut self, other: StaticCatalog) -> Result<()> {
        for (name, template) in other.templates {
            self.insert(name, template)?;
        }
        Ok(())
    }

    /// Check every preset. Needed after deserializing.
    pub fn validate(&self) -> Result<()> {
        self.templates
            .values()
            .try_for_each(|template| template.params.validate())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl AnimationCatalog for StaticCatalog {
    fn template(&self, animation: &str) -> Option<AnimationTemplate> {
        self.templates.get(animation).cloned()
    }
}

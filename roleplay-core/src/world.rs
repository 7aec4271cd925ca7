//! World document types.
//!
//! The world is a single document: one scene plus the characters in it.
//! Every struct keeps a flattened catch-all map so fields this crate does
//! not model still survive a load → commit round trip unchanged.

use crate::patch::{merge, Patch};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Minimum number of characters a world must contain.
pub const MIN_CHARACTERS: usize = 2;

/// The document (or a merge result) does not have the required shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid world document: {0}")]
pub struct SchemaError(pub String);

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// The canonical simulation document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub scene: Scene,
    pub characters: BTreeMap<String, Character>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorldState {
    /// Build a validated world from an untyped JSON tree.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let state: Self = serde_json::from_value(value)?;
        state.validate()?;
        Ok(state)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let state: Self = serde_json::from_str(text)?;
        state.validate()?;
        Ok(state)
    }

    /// Convert to an untyped JSON tree (the shape patches are applied to).
    pub fn to_value(&self) -> Result<Value, SchemaError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Pretty JSON, as handed to collaborators and written to disk.
    pub fn to_pretty_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check structural invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.characters.len() < MIN_CHARACTERS {
            return Err(SchemaError::new(format!(
                "expected at least {MIN_CHARACTERS} characters, found {}",
                self.characters.len()
            )));
        }
        if self.characters.keys().any(|name| name.trim().is_empty()) {
            return Err(SchemaError::new("character names must not be empty"));
        }
        Ok(())
    }

    /// Apply a patch and re-validate the result.
    ///
    /// `self` is never modified; the merged world is returned as a new value.
    pub fn apply(&self, patch: &Patch) -> Result<WorldState, SchemaError> {
        if patch.is_empty() {
            return Ok(self.clone());
        }
        let merged = merge(patch.as_value(), &self.to_value()?);
        Self::from_value(merged)
    }

    /// Look up a character by exact name.
    pub fn character(&self, name: &str) -> Option<&Character> {
        self.characters.get(name)
    }

    /// Names of all characters, in document order.
    pub fn character_names(&self) -> impl Iterator<Item = &str> {
        self.characters.keys().map(String::as_str)
    }

    /// One-line description of the scene and its objects.
    pub fn scene_context(&self) -> String {
        let scene = &self.scene;
        let objects = if scene.interactive_objects.is_empty() {
            "none".to_string()
        } else {
            scene
                .interactive_objects
                .iter()
                .map(|o| format!("{} ({})", o.name, o.location))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "Location: {} ({}). {}. Interactive objects: {objects}.",
            scene.location, scene.time, scene.description
        )
    }

    /// One line per character: what they are doing, feeling and holding.
    pub fn characters_snapshot(&self) -> String {
        self.characters
            .iter()
            .map(|(name, c)| {
                let holding = if c.holding.is_empty() {
                    "nothing".to_string()
                } else {
                    c.holding.join(", ")
                };
                let emotion = if c.current_emotion.is_empty() {
                    "neutral".to_string()
                } else {
                    c.current_emotion.join(", ")
                };
                format!(
                    "Character {name} is currently: {}; emotion: {emotion}; holding: {holding}.",
                    c.current_action
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Where the story takes place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub location: String,
    pub time: String,
    pub description: String,
    #[serde(default)]
    pub interactive_objects: Vec<InteractiveObject>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Something in the scene a character can interact with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveObject {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub state: String,
}

/// A participant in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub age: u32,
    pub description: String,
    pub personality: String,
    pub current_action: String,
    #[serde(default)]
    pub current_emotion: Vec<String>,
    pub goal: String,
    #[serde(default)]
    pub knowledge: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    pub location_in_scene: String,
    #[serde(default)]
    pub clothing: Clothing,
    #[serde(default)]
    pub inventory: Vec<String>,
    #[serde(default)]
    pub holding: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How one character relates to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Worn items, by body slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clothing {
    #[serde(default)]
    pub head: Vec<String>,
    #[serde(default)]
    pub face: Vec<String>,
    #[serde(default)]
    pub underwear: Vec<String>,
    #[serde(default)]
    pub torso: Vec<String>,
    #[serde(default)]
    pub body: Vec<String>,
    #[serde(default)]
    pub overwear: Vec<String>,
    #[serde(default)]
    pub legs: Vec<String>,
    #[serde(default)]
    pub feet: Vec<String>,
    #[serde(default)]
    pub hands: Vec<String>,
}

impl Clothing {
    /// Every worn item, head to toe.
    pub fn all_items(&self) -> impl Iterator<Item = &str> {
        [
            &self.head,
            &self.face,
            &self.underwear,
            &self.torso,
            &self.body,
            &self.overwear,
            &self.legs,
            &self.feet,
            &self.hands,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
    }
}

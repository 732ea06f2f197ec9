//! Writer personas loaded from `personas.yaml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use postmill_common::PostmillError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub voice_traits: Vec<String>,
    #[serde(default)]
    pub relationship_to_reader: String,
    #[serde(default)]
    pub anti_patterns: Vec<String>,
    #[serde(default)]
    pub example_openers: Vec<String>,
}

impl PersonaProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            voice_traits: Vec::new(),
            relationship_to_reader: String::new(),
            anti_patterns: Vec::new(),
            example_openers: Vec::new(),
        }
    }

    /// Persona section of the generation prompt.
    pub fn render(&self) -> String {
        let mut out = format!("PERSONA: {}\n", self.name);
        if !self.voice_traits.is_empty() {
            out.push_str("Voice:\n");
            for trait_ in &self.voice_traits {
                out.push_str(&format!("- {trait_}\n"));
            }
        }
        if !self.relationship_to_reader.is_empty() {
            out.push_str(&format!("Relationship to reader: {}\n", self.relationship_to_reader));
        }
        if !self.anti_patterns.is_empty() {
            out.push_str("This persona never:\n");
            for pattern in &self.anti_patterns {
                out.push_str(&format!("- {pattern}\n"));
            }
        }
        if !self.example_openers.is_empty() {
            out.push_str("Openers in this voice:\n");
            for opener in &self.example_openers {
                out.push_str(&format!("- \"{opener}\"\n"));
            }
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct PersonaFile {
    personas: Vec<PersonaProfile>,
}

/// Ordered persona list. Order is the round-robin order used for
/// assignment, so it is kept exactly as written in the file.
#[derive(Debug, Clone)]
pub struct PersonaSet {
    personas: Vec<PersonaProfile>,
}

impl PersonaSet {
    pub fn new(personas: Vec<PersonaProfile>) -> Result<Self, PostmillError> {
        if personas.is_empty() {
            return Err(PostmillError::Config("at least one persona is required".into()));
        }
        for (i, p) in personas.iter().enumerate() {
            if p.id.trim().is_empty() {
                return Err(PostmillError::Config(format!("persona #{i} has an empty id")));
            }
            if personas[..i].iter().any(|q| q.id == p.id) {
                return Err(PostmillError::Config(format!("duplicate persona id '{}'", p.id)));
            }
        }
        Ok(Self { personas })
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let file: PersonaFile = serde_yaml::from_str(raw).context("Failed to parse personas")?;
        Ok(Self::new(file.personas)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read personas {}", path.display()))?;
        let set = Self::from_yaml(&raw)?;
        info!(path = %path.display(), count = set.len(), "Loaded personas");
        Ok(set)
    }

    pub fn get(&self, id: &str) -> Option<&PersonaProfile> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Look up a persona, treating an unknown id as a configuration error.
    pub fn require(&self, id: &str) -> Result<&PersonaProfile, PostmillError> {
        self.get(id)
            .ok_or_else(|| PostmillError::UnknownPersona(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.personas.iter().map(|p| p.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PersonaProfile> {
        self.personas.iter()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn at(&self, index: usize) -> &PersonaProfile {
        &self.personas[index % self.personas.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERSONAS: &str = r#"
personas:
  - id: professional
    name: The Operator
    voice_traits: ["direct", "numbers first"]
    relationship_to_reader: peer who has shipped the thing
    anti_patterns: ["motivational fluff"]
    example_openers: ["We cut deploy time by 40%."]
  - id: witty
    name: The Wit
"#;

    #[test]
    fn loads_in_file_order_with_defaults() {
        let set = PersonaSet::from_yaml(PERSONAS).unwrap();
        assert_eq!(set.ids().collect::<Vec<_>>(), vec!["professional", "witty"]);
        assert!(set.get("witty").unwrap().voice_traits.is_empty());
        assert_eq!(set.at(3).id, "witty");
    }

    #[test]
    fn unknown_persona_is_config_error() {
        let set = PersonaSet::from_yaml(PERSONAS).unwrap();
        assert!(matches!(
            set.require("pirate"),
            Err(PostmillError::UnknownPersona(id)) if id == "pirate"
        ));
    }

    #[test]
    fn duplicate_or_empty_sets_are_rejected() {
        assert!(PersonaSet::new(vec![]).is_err());
        let dup = vec![PersonaProfile::new("a", "A"), PersonaProfile::new("a", "B")];
        assert!(PersonaSet::new(dup).is_err());
    }

    #[test]
    fn render_includes_voice_and_openers() {
        let set = PersonaSet::from_yaml(PERSONAS).unwrap();
        let text = set.get("professional").unwrap().render();
        assert!(text.starts_with("PERSONA: The Operator"));
        assert!(text.contains("- numbers first"));
        assert!(text.contains("\"We cut deploy time by 40%.\""));
    }
}

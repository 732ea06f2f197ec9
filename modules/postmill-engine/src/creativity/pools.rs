//! Option pools the context mixer draws from, deserialized from
//! `creativity.yaml`. Every table is a `BTreeMap` or `Vec` so that iteration
//! order, and therefore seeded draws, never depend on hashing.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use postmill_common::PostmillError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookPattern {
    pub weight: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureTemplate {
    pub id: String,
    pub weight: f64,
    pub description: String,
    #[serde(default)]
    pub guidance: Option<String>,
    #[serde(default)]
    pub anti_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentAngle {
    pub weight: f64,
    pub key_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleReference {
    pub id: String,
    pub name: String,
    /// Compact description of the style, used when no sample is registered.
    pub essence: String,
    /// Verbatim writing sample; preferred over `essence` when present.
    #[serde(default)]
    pub sample: Option<String>,
    /// Personas this style suits. Empty means every persona.
    #[serde(default)]
    pub use_for: Vec<String>,
}

impl StyleReference {
    pub fn suits(&self, persona_id: &str) -> bool {
        self.use_for.is_empty() || self.use_for.iter().any(|p| p == persona_id)
    }

    /// Text handed to the generator when this style is drawn.
    pub fn render(&self) -> String {
        match self.sample {
            Some(ref sample) => format!(
                "Write with influence from {}. A sample of their writing:\n{}",
                self.name,
                sample.trim()
            ),
            None => format!("Write with influence from {}: {}", self.name, self.essence),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleReferences {
    #[serde(default = "default_style_probability")]
    pub probability: f64,
    #[serde(default)]
    pub styles: Vec<StyleReference>,
}

impl Default for StyleReferences {
    fn default() -> Self {
        Self {
            probability: default_style_probability(),
            styles: Vec::new(),
        }
    }
}

/// A pool of free-text perturbations included with a fixed probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionalPool {
    pub probability: f64,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FewShotSettings {
    #[serde(default = "default_num_examples")]
    pub num_examples: usize,
    /// Persona id -> example posts.
    #[serde(default)]
    pub pools: BTreeMap<String, Vec<String>>,
}

impl Default for FewShotSettings {
    fn default() -> Self {
        Self {
            num_examples: default_num_examples(),
            pools: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativityConfig {
    pub hook_patterns: BTreeMap<String, HookPattern>,
    pub structures: Vec<StructureTemplate>,
    pub content_angles: BTreeMap<String, ContentAngle>,
    #[serde(default)]
    pub few_shot: FewShotSettings,
    #[serde(default)]
    pub style_references: StyleReferences,
    #[serde(default = "default_tone_pool")]
    pub tone_perturbations: OptionalPool,
    #[serde(default = "default_break_pool")]
    pub structural_breaks: OptionalPool,
}

fn default_style_probability() -> f64 {
    0.5
}

fn default_num_examples() -> usize {
    2
}

fn default_tone_pool() -> OptionalPool {
    OptionalPool {
        probability: 0.4,
        options: Vec::new(),
    }
}

fn default_break_pool() -> OptionalPool {
    OptionalPool {
        probability: 0.3,
        options: Vec::new(),
    }
}

impl CreativityConfig {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("Failed to parse creativity config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read creativity config {}", path.display()))?;
        let config = Self::from_yaml(&raw)?;
        info!(
            path = %path.display(),
            hooks = config.hook_patterns.len(),
            structures = config.structures.len(),
            angles = config.content_angles.len(),
            styles = config.style_references.styles.len(),
            "Loaded creativity pools"
        );
        Ok(config)
    }

    /// Merge few-shot examples found on disk into the configured pools.
    pub fn with_examples(mut self, examples: BTreeMap<String, Vec<String>>) -> Self {
        for (persona, posts) in examples {
            self.few_shot.pools.entry(persona).or_default().extend(posts);
        }
        self
    }

    pub fn validate(&self) -> Result<(), PostmillError> {
        check_weights("hook_patterns", self.hook_patterns.values().map(|h| h.weight))?;
        check_weights("structures", self.structures.iter().map(|s| s.weight))?;
        check_weights("content_angles", self.content_angles.values().map(|a| a.weight))?;
        check_probability("style_references", self.style_references.probability)?;
        check_probability("tone_perturbations", self.tone_perturbations.probability)?;
        check_probability("structural_breaks", self.structural_breaks.probability)?;
        Ok(())
    }
}

fn check_weights(pool: &str, weights: impl Iterator<Item = f64>) -> Result<(), PostmillError> {
    let mut total = 0.0;
    let mut count = 0;
    for w in weights {
        if !w.is_finite() || w < 0.0 {
            return Err(PostmillError::Config(format!(
                "{pool}: weights must be finite and non-negative, got {w}"
            )));
        }
        total += w;
        count += 1;
    }
    if count == 0 || total <= 0.0 {
        return Err(PostmillError::Config(format!(
            "{pool}: needs at least one option with positive weight"
        )));
    }
    Ok(())
}

fn check_probability(pool: &str, p: f64) -> Result<(), PostmillError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(PostmillError::Config(format!(
            "{pool}: probability must be within [0, 1], got {p}"
        )));
    }
    Ok(())
}

/// Load few-shot examples from `<dir>/<persona>/good/*.md`, sorted by file
/// name. A missing directory yields no examples.
pub fn load_example_dir(dir: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let mut pools = BTreeMap::new();
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "No examples directory");
        return Ok(pools);
    }

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let persona_dir = entry?.path();
        let good_dir = persona_dir.join("good");
        if !good_dir.is_dir() {
            continue;
        }
        let Some(persona) = persona_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let mut files: Vec<_> = fs::read_dir(&good_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        files.sort();

        let mut examples = Vec::with_capacity(files.len());
        for file in files {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read example {}", file.display()))?;
            let text = text.trim();
            if !text.is_empty() {
                examples.push(text.to_string());
            }
        }
        if !examples.is_empty() {
            pools.insert(persona.to_string(), examples);
        }
    }
    Ok(pools)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
hook_patterns:
  contrarian: { weight: 2, description: "Open against the grain" }
structures:
  - id: story
    weight: 1
    description: "Short story, then the lesson"
content_angles:
  speed: { weight: 1, key_message: "Faster feedback loops" }
"#;

    #[test]
    fn minimal_config_gets_documented_defaults() {
        let config = CreativityConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.style_references.probability, 0.5);
        assert_eq!(config.tone_perturbations.probability, 0.4);
        assert_eq!(config.structural_breaks.probability, 0.3);
        assert_eq!(config.few_shot.num_examples, 2);
        assert!(config.structures[0].guidance.is_none());
    }

    #[test]
    fn all_zero_weights_are_rejected() {
        let raw = MINIMAL.replace("weight: 2", "weight: 0");
        assert!(CreativityConfig::from_yaml(&raw).is_err());
    }

    #[test]
    fn probability_above_one_is_rejected() {
        let raw = format!("{MINIMAL}\nstructural_breaks:\n  probability: 1.5\n  options: [x]\n");
        assert!(CreativityConfig::from_yaml(&raw).is_err());
    }

    #[test]
    fn style_prefers_sample_over_essence() {
        let mut style = StyleReference {
            id: "pg".into(),
            name: "Paul Graham".into(),
            essence: "plain words, short sentences".into(),
            sample: None,
            use_for: vec!["professional".into()],
        };
        assert!(style.render().contains("plain words"));
        assert!(style.suits("professional"));
        assert!(!style.suits("witty"));

        style.sample = Some("  The way to get startup ideas is not to try to think of startup ideas. ".into());
        let rendered = style.render();
        assert!(rendered.contains("The way to get startup ideas"));
        assert!(!rendered.contains("plain words"));
    }

    #[test]
    fn example_dir_loads_sorted_markdown_per_persona() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("witty").join("good");
        fs::create_dir_all(&good).unwrap();
        fs::write(good.join("b.md"), "second").unwrap();
        fs::write(good.join("a.md"), "first\n").unwrap();
        fs::write(good.join("notes.txt"), "ignored").unwrap();
        fs::create_dir_all(dir.path().join("empty").join("good")).unwrap();

        let pools = load_example_dir(dir.path()).unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools["witty"], vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn missing_example_dir_is_empty() {
        let pools = load_example_dir(Path::new("/definitely/not/here")).unwrap();
        assert!(pools.is_empty());
    }
}

//! Deterministic rule engine that flags machine-prose tells.
//!
//! Three rule families produce violations: banned words (whole-word,
//! case-insensitive), banned phrases (case-insensitive substring) and
//! structural regex patterns. A smaller pattern set and a few rhythm
//! heuristics produce warnings. A candidate is valid iff it has no
//! violations.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};

use postmill_common::ValidationOutcome;

const VIOLATION_PENALTY: f64 = 1.5;
const WARNING_PENALTY: f64 = 0.3;
const MAX_SCORE: f64 = 10.0;

/// Minimum population variance of words-per-sentence before the rhythm
/// counts as monotonous.
const MIN_SENTENCE_VARIANCE: f64 = 5.0;
const NUMBERLESS_TEXT_CHARS: usize = 200;
const LONG_PARAGRAPH_WORDS: usize = 100;

pub const DEFAULT_BANNED_WORDS: &[&str] = &[
    // Highest overrepresentation
    "delve",
    "tapestry",
    "testament",
    "realm",
    "underscore",
    "intricate",
    // Common filler
    "leverage",
    "harness",
    "unlock",
    "embark",
    "robust",
    "seamless",
    "pivotal",
    "comprehensive",
    "furthermore",
    "moreover",
    "elevate",
    "foster",
    "landscape",
    "paradigm",
    "synergy",
    "navigate",
    "multifaceted",
    "nuanced",
    "dynamic",
    "holistic",
    "streamline",
    "optimize",
    "empower",
    "innovative",
    "cutting-edge",
    "game-changer",
    "revolutionary",
    "transformative",
    "impactful",
    "actionable",
    "proactive",
    "scalable",
    "ecosystem",
    "stakeholder",
    "bandwidth",
    "synergize",
    "incentivize",
    "operationalize",
];

pub const DEFAULT_BANNED_PHRASES: &[&str] = &[
    // Openers
    "In today's fast-paced world",
    "In today's digital age",
    "In today's competitive landscape",
    "It's worth noting that",
    "It's important to note",
    "Let's dive in",
    "Let's explore",
    "Without further ado",
    "First and foremost",
    "Last but not least",
    "At the end of the day",
    // Closers
    "In conclusion",
    "To sum up",
    "In summary",
    "Moving forward",
    // Engagement bait
    "What do you think?",
    "Drop a comment below",
    "Let me know in the comments",
    "Share your thoughts",
    "Agree or disagree?",
    // Empty intensifiers
    "Game-changer",
    "Take it to the next level",
    "Unlock your potential",
    "Level up",
    "Supercharge",
    // Corporate speak
    "Circle back",
    "Touch base",
    "Move the needle",
    "Low-hanging fruit",
    "Think outside the box",
    "Hit the ground running",
    "Best practices",
    "Value proposition",
    "Core competencies",
];

static VIOLATION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"^\s*[\x{1F300}-\x{1F9FF}]", "Emoji opener"),
        (r"[\x{1F300}-\x{1F9FF}]{3,}", "Emoji spam"),
        (r"(?s)—[^—]+—.*—[^—]+—", "Em-dash overuse"),
        (r"(?i)^(so,?\s|here'?s the thing|let me tell you)", "Weak opener"),
        (r"(?i)what do you think\s*\??$", "Engagement bait ending"),
        (r"(?m)^[1-9]\.\s.*\n[1-9]\.\s.*\n[1-9]\.\s", "Listicle format"),
        (r"!{2,}", "Multiple exclamation marks"),
        (r"(?i)\?\s+(The answer|It's simple|Here's why)", "Rhetorical question pattern"),
        (
            r"(?i)(clear,?\s+concise,?\s+and\s+compelling|fast,?\s+easy,?\s+and\s+effective)",
            "Snappy triad",
        ),
    ]
    .into_iter()
    .map(|(p, desc)| (Regex::new(p).unwrap(), desc))
    .collect()
});

static WARNING_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)here'?s (what|why|how)", "Generic intro pattern"),
        (r"(?i)the (truth|reality|fact) is", "Dramatic reveal pattern"),
        (r"(?i)imagine (if|this|a world)", "Imagine opener"),
    ]
    .into_iter()
    .map(|(p, desc)| (Regex::new(p).unwrap(), desc))
    .collect()
});

static SENTENCE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").unwrap());
static SPECIFIC_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{2,}\b").unwrap());
static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\d+").unwrap());
static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+%").unwrap());
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*(hours?|days?|weeks?)").unwrap());

/// Cheap screen: the worst offenders only.
const QUICK_CHECK_WORDS: &[&str] = &["delve", "leverage", "unlock", "seamless", "robust"];
const QUICK_CHECK_PHRASES: &[&str] = &["in today's", "let's dive in", "what do you think?"];

#[derive(Debug, Clone)]
pub struct CandidateValidator {
    /// Lower-cased; sorted so violations come out in a stable order.
    banned_words: BTreeSet<String>,
    banned_phrases: Vec<String>,
}

impl Default for CandidateValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateValidator {
    pub fn new() -> Self {
        Self {
            banned_words: DEFAULT_BANNED_WORDS.iter().map(|w| w.to_string()).collect(),
            banned_phrases: DEFAULT_BANNED_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn with_extra_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for word in words {
            let word = word.as_ref().trim().to_lowercase();
            if !word.is_empty() {
                self.banned_words.insert(word);
            }
        }
        self
    }

    /// Append banned words from a text file, one per line, `#` starting a
    /// comment line. A missing file leaves the rule set unchanged.
    pub fn load_extra_words(self, path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No custom banned-word file");
            return Ok(self);
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read banned words {}", path.display()))?;
        let words: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        info!(path = %path.display(), count = words.len(), "Loaded custom banned words");
        Ok(self.with_extra_words(words))
    }

    pub fn banned_words(&self) -> impl Iterator<Item = &str> {
        self.banned_words.iter().map(String::as_str)
    }

    pub fn validate(&self, text: &str) -> ValidationOutcome {
        let lower = text.to_lowercase();
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        for word in &self.banned_words {
            if contains_word(&lower, word) {
                violations.push(format!("Banned word: '{word}'"));
            }
        }

        for phrase in &self.banned_phrases {
            if lower.contains(&phrase.to_lowercase()) {
                violations.push(format!("Banned phrase: '{phrase}'"));
            }
        }

        for (re, desc) in VIOLATION_PATTERNS.iter() {
            if re.is_match(text) {
                violations.push(format!("Banned pattern: {desc}"));
            }
        }

        for (re, desc) in WARNING_PATTERNS.iter() {
            if re.is_match(text) {
                warnings.push(format!("Warning: {desc}"));
            }
        }

        warnings.extend(rhythm_warnings(text));

        let score = score(violations.len(), warnings.len(), text);
        ValidationOutcome {
            is_valid: violations.is_empty(),
            score,
            violations,
            warnings,
        }
    }

    /// Fast pre-screen over the worst words and phrases. `false` means the
    /// text would certainly fail [`validate`](Self::validate).
    pub fn quick_check(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        !QUICK_CHECK_WORDS.iter().any(|w| contains_word(&lower, w))
            && !QUICK_CHECK_PHRASES.iter().any(|p| lower.contains(p))
    }

    /// The rule set rendered as guidance for generation and judging prompts.
    pub fn rules_for_prompt(&self) -> String {
        let words: Vec<&str> = self.banned_words().take(20).collect();
        let phrases: String = self
            .banned_phrases
            .iter()
            .take(10)
            .map(|p| format!("- \"{p}\"\n"))
            .collect();

        format!(
            "WRITING RULES (any violation disqualifies the post):

Never use these words:
{words}

Never use these phrases:
{phrases}
Avoid these patterns:
- Opening with an emoji
- More than one em-dash aside per post
- Ending on \"What do you think?\" or similar engagement bait
- Numbered lists (1. 2. 3.)
- Multiple exclamation marks!!
- Snappy triads (\"clear, concise, and compelling\")

Include instead:
- Specific numbers ($47K, 73%, 2 hours)
- Varied sentence length: short punches next to longer explanations
- Concrete examples over abstract claims
- Something surprising or contrarian
",
            words = words.join(", "),
        )
    }
}

/// Whole-word containment over already lower-cased text. Word characters
/// follow the regex `\w` class, so hyphenated entries match as a unit.
fn contains_word(haystack: &str, word: &str) -> bool {
    fn is_word_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }
    haystack.match_indices(word).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

fn rhythm_warnings(text: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    let lengths: Vec<f64> = SENTENCE_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.split_whitespace().count() as f64)
        .collect();
    if lengths.len() >= 3 {
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        let variance =
            lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
        if variance < MIN_SENTENCE_VARIANCE {
            warnings.push("Low sentence length variation (monotonous rhythm)".to_string());
        }
    }

    if text.chars().count() > NUMBERLESS_TEXT_CHARS && !SPECIFIC_NUMBER_RE.is_match(text) {
        warnings.push("No specific numbers found (vagueness indicator)".to_string());
    }

    if text
        .split("\n\n")
        .any(|para| para.split_whitespace().count() > LONG_PARAGRAPH_WORDS)
    {
        warnings.push("Overly long paragraph (wall of text)".to_string());
    }

    warnings
}

fn score(violations: usize, warnings: usize, text: &str) -> f64 {
    let mut score = MAX_SCORE;
    score -= violations as f64 * VIOLATION_PENALTY;
    score -= warnings as f64 * WARNING_PENALTY;

    if CURRENCY_RE.is_match(text) {
        score += 0.5;
    }
    if PERCENT_RE.is_match(text) {
        score += 0.3;
    }
    if DURATION_RE.is_match(text) {
        score += 0.3;
    }

    score.clamp(0.0, MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Varied rhythm, has numbers, no tells.
    const CLEAN: &str = "We shipped the migration in 3 days. Nobody noticed. \
        The old queue had been dropping 12 jobs an hour for a year and the fix was one index on a table nobody owned.";

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn banned_word_invalidates_regardless_of_case() {
        let v = CandidateValidator::new();
        for word in DEFAULT_BANNED_WORDS {
            let upper = format!("We had to {} it before launch.", word.to_uppercase());
            let outcome = v.validate(&upper);
            assert!(!outcome.is_valid, "{word} should invalidate");
            assert!(outcome.violations.contains(&format!("Banned word: '{word}'")));
        }
    }

    #[test]
    fn banned_word_matches_whole_words_only() {
        let v = CandidateValidator::new();
        // "realm" inside "realms" and "foster" inside "fostered" are not whole words.
        let outcome = v.validate("Realms apart, she fostered 14 kittens in 2 weeks.");
        assert!(outcome.violations.is_empty(), "{:?}", outcome.violations);
        assert!(contains_word("a cutting-edge tool", "cutting-edge"));
        assert!(!contains_word("undelved", "delve"));
    }

    #[test]
    fn clean_text_scores_ten_plus_bonus_clamped() {
        let v = CandidateValidator::new();
        let outcome = v.validate(CLEAN);
        assert!(outcome.is_valid);
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        // Duration bonus would exceed 10, clamped.
        assert!(approx(outcome.score, 10.0));
    }

    #[test]
    fn warnings_never_invalidate_and_cost_point_three() {
        let v = CandidateValidator::new();
        let text = "The truth is we waited. Then the call came through at noon after lunch ended and everyone had already left the office.";
        let outcome = v.validate(text);
        assert!(outcome.is_valid);
        assert_eq!(outcome.warnings, vec!["Warning: Dramatic reveal pattern".to_string()]);
        assert!(approx(outcome.score, 9.7));
    }

    #[test]
    fn phrases_and_patterns_each_count_once() {
        let v = CandidateValidator::new();
        let outcome = v.validate("Let's dive in!! This changes things.");
        assert!(!outcome.is_valid);
        assert!(outcome.violations.contains(&"Banned phrase: 'Let's dive in'".to_string()));
        assert!(outcome
            .violations
            .contains(&"Banned pattern: Multiple exclamation marks".to_string()));
        assert_eq!(outcome.violations.len(), 2);
        assert!(approx(outcome.score, 7.0));
    }

    #[test]
    fn structural_patterns_fire() {
        let v = CandidateValidator::new();
        let cases = [
            ("🚀 Big news from the team.", "Emoji opener"),
            ("Launch day 🎉🎉🎉 is here.", "Emoji spam"),
            ("One — aside — then another — aside — again.", "Em-dash overuse"),
            ("So, here is the plan for Q3.", "Weak opener"),
            ("1. First\n2. Second\n3. Third", "Listicle format"),
            ("Is it hard? The answer surprised us.", "Rhetorical question pattern"),
            ("Make it clear, concise, and compelling.", "Snappy triad"),
            ("We changed pricing. what do you think", "Engagement bait ending"),
        ];
        for (text, desc) in cases {
            let outcome = v.validate(text);
            assert!(
                outcome.violations.contains(&format!("Banned pattern: {desc}")),
                "{desc} not flagged in {text:?}: {:?}",
                outcome.violations
            );
        }
    }

    #[test]
    fn rhythm_heuristics_warn() {
        let v = CandidateValidator::new();
        let monotone = "We met the team today. We talked about the plan. We agreed on the date.";
        assert!(v
            .validate(monotone)
            .warnings
            .iter()
            .any(|w| w.contains("monotonous")));

        let vague = "word ".repeat(60);
        let outcome = v.validate(&vague);
        assert!(outcome.warnings.iter().any(|w| w.contains("No specific numbers")));
        assert!(outcome.warnings.iter().all(|w| !w.contains("wall of text")));

        let wall = format!("{}\n\nshort", "word ".repeat(101));
        assert!(v.validate(&wall).warnings.iter().any(|w| w.contains("wall of text")));
    }

    #[test]
    fn score_never_leaves_range() {
        let v = CandidateValidator::new();
        let awful = DEFAULT_BANNED_WORDS.join(" ");
        assert_eq!(v.validate(&awful).score, 0.0);
        let bonus = "Saved $400 and 30% in 2 hours. Small team. Big year for everyone who stayed late.";
        let outcome = v.validate(bonus);
        assert!(outcome.score <= 10.0 && outcome.score >= 0.0);
    }

    #[test]
    fn extra_words_extend_the_rule_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banned_words.txt");
        fs::write(&path, "# house style\nSynergistic\n\n  blockbuster \n").unwrap();

        let v = CandidateValidator::new().load_extra_words(&path).unwrap();
        assert!(!v.validate("A blockbuster quarter for 12 teams.").is_valid);
        assert!(v.banned_words().any(|w| w == "synergistic"));
        assert!(!v.banned_words().any(|w| w.starts_with('#')));

        let unchanged = CandidateValidator::new()
            .load_extra_words(&dir.path().join("missing.txt"))
            .unwrap();
        assert_eq!(unchanged.banned_words().count(), DEFAULT_BANNED_WORDS.len());
    }

    #[test]
    fn quick_check_catches_worst_offenders() {
        let v = CandidateValidator::new();
        assert!(!v.quick_check("We LEVERAGE data."));
        assert!(!v.quick_check("In today's market, speed wins."));
        assert!(v.quick_check(CLEAN));
    }

    #[test]
    fn prompt_rules_list_sorted_words_and_phrases() {
        let rules = CandidateValidator::new().rules_for_prompt();
        assert!(rules.contains("actionable, bandwidth"));
        assert!(rules.contains("- \"In today's fast-paced world\""));
        assert!(!rules.contains("Core competencies"));
    }
}

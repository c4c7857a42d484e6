//! Query analysis and strategy selection.
//!
//! Turns a raw question into a [`QueryProfile`] using regex signals and a
//! lexicon of known ingredient / recipe names, then picks a retrieval
//! [`Strategy`](crate::types::Strategy). Both steps are pure and deterministic:
//! no I/O, no model calls.

mod signals;
mod strategy;

pub use signals::{SignalHit, complexity_signals, relationship_signals};
pub use strategy::StrategySelector;

use crate::types::QueryProfile;

/// Contribution of each distinct entity beyond the first to complexity.
const EXTRA_ENTITY_WEIGHT: f32 = 0.1;
const EXTRA_ENTITY_CAP: f32 = 0.3;
/// Contribution of each co-mentioned entity pair to relationship intensity.
const ENTITY_PAIR_WEIGHT: f32 = 0.15;
const ENTITY_PAIR_CAP: f32 = 0.45;
/// Queries longer than this many words get a small complexity bump.
const LONG_QUERY_WORDS: usize = 12;
const LONG_QUERY_WEIGHT: f32 = 0.1;

/// Common ingredients known before the graph lexicon is loaded.
const BUILTIN_LEXICON: &[&str] = &[
    "apple", "bacon", "basil", "bean sprouts", "beef", "bell pepper", "broccoli", "butter",
    "cabbage", "carrot", "cheese", "chicken", "chicken breast", "chili", "cilantro", "coconut milk",
    "corn", "cream", "cucumber", "curry", "duck", "egg", "eggplant", "fish", "flour", "garlic",
    "ginger", "green onion", "ham", "honey", "lamb", "lemon", "lettuce", "lime", "milk", "mushroom",
    "noodle", "oyster sauce", "pasta", "peanut", "pork", "pork belly", "potato", "rice", "salmon",
    "scallion", "sesame oil", "shrimp", "soy sauce", "spinach", "sugar", "sweet potato", "tofu",
    "tomato", "vinegar", "yogurt",
];

const STOPWORDS: &[&str] = &[
    "about", "and", "are", "but", "can", "could", "does", "for", "from", "give", "has", "have",
    "how", "into", "is", "make", "many", "me", "most", "some", "tell", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "those", "use", "what", "when", "where",
    "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Extracts a [`QueryProfile`] from raw query text.
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    /// Lowercased names, longest first so multi-word names win over their parts
    lexicon: Vec<String>,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::with_lexicon(BUILTIN_LEXICON.iter().copied())
    }
}

impl QueryAnalyzer {
    /// Create an analyzer that recognizes exactly the given names.
    pub fn with_lexicon<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut analyzer = Self {
            lexicon: Vec::new(),
        };
        analyzer.extend_lexicon(names);
        analyzer
    }

    /// Add names (typically loaded from the graph store) to the lexicon.
    pub fn extend_lexicon<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().trim().to_lowercase();
            if name.chars().count() >= 2 {
                self.lexicon.push(name);
            }
        }
        self.lexicon
            .sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        self.lexicon.dedup();
    }

    pub fn lexicon_size(&self) -> usize {
        self.lexicon.len()
    }

    /// Analyze a query. Never fails: unrecognized text yields near-zero scores.
    pub fn analyze(&self, query: &str) -> QueryProfile {
        let lower = query.to_lowercase();
        let entities = self.detect_entities(&lower);
        let mut reasoning = Vec::new();

        let mut complexity = 0.0_f32;
        for hit in complexity_signals(&lower) {
            complexity += hit.weight;
            reasoning.push(format!("{} (+{:.2} complexity)", hit.name, hit.weight));
        }
        if entities.len() > 1 {
            let bump = (EXTRA_ENTITY_WEIGHT * (entities.len() - 1) as f32).min(EXTRA_ENTITY_CAP);
            complexity += bump;
            reasoning.push(format!(
                "{} distinct entities (+{bump:.2} complexity)",
                entities.len()
            ));
        }
        if lower.split_whitespace().count() > LONG_QUERY_WORDS {
            complexity += LONG_QUERY_WEIGHT;
            reasoning.push(format!("long query (+{LONG_QUERY_WEIGHT:.2} complexity)"));
        }

        let mut relationship = 0.0_f32;
        for hit in relationship_signals(&lower) {
            relationship += hit.weight;
            reasoning.push(format!("{} (+{:.2} relationship)", hit.name, hit.weight));
        }
        let pairs = entities.len() * entities.len().saturating_sub(1) / 2;
        if pairs > 0 {
            let bump = (ENTITY_PAIR_WEIGHT * pairs as f32).min(ENTITY_PAIR_CAP);
            relationship += bump;
            reasoning.push(format!(
                "{pairs} co-mentioned entity pair(s) (+{bump:.2} relationship)"
            ));
        }

        if reasoning.is_empty() {
            reasoning.push("no complexity or relationship signals".to_string());
        }

        QueryProfile {
            query: query.to_string(),
            complexity: complexity.clamp(0.0, 1.0),
            relationship_intensity: relationship.clamp(0.0, 1.0),
            entities,
            reasoning,
        }
    }

    /// Find lexicon names in the (lowercased) query, in order of appearance.
    ///
    /// Longer names claim their span first, so "soy sauce" is reported once
    /// rather than also as "sauce". A trailing plural "s"/"es" is accepted.
    fn detect_entities(&self, lower: &str) -> Vec<String> {
        let mut claimed: Vec<(usize, usize, &str)> = Vec::new();

        for name in &self.lexicon {
            for (start, _) in lower.match_indices(name.as_str()) {
                let Some(end) = word_end(lower, start, name.len()) else {
                    continue;
                };
                if claimed.iter().any(|&(s, e, _)| start < e && s < end) {
                    continue;
                }
                claimed.push((start, end, name.as_str()));
            }
        }

        claimed.sort_by_key(|&(start, _, _)| start);
        let mut entities: Vec<String> = Vec::new();
        for (_, _, name) in claimed {
            if !entities.iter().any(|e| e == name) {
                entities.push(name.to_string());
            }
        }
        entities
    }
}

/// If the match at `start..start+len` sits on word boundaries (allowing a
/// plural suffix), return the end of the matched word.
fn word_end(text: &str, start: usize, len: usize) -> Option<usize> {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .map(|c| !c.is_alphanumeric())
        .unwrap_or(true);
    if !before_ok {
        return None;
    }

    let mut end = start + len;
    let rest = &text[end..];
    if rest.starts_with("es") && boundary_at(rest, 2) {
        end += 2;
    } else if rest.starts_with('s') && boundary_at(rest, 1) {
        end += 1;
    } else if !boundary_at(rest, 0) {
        return None;
    }
    Some(end)
}

fn boundary_at(text: &str, offset: usize) -> bool {
    text[offset..]
        .chars()
        .next()
        .map(|c| !c.is_alphanumeric())
        .unwrap_or(true)
}

/// Content words of a query, used for keyword fallback and overlap scoring.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let clean = word
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
            .to_lowercase();
        if clean.chars().count() < 3 || STOPWORDS.contains(&clean.as_str()) {
            continue;
        }
        if !keywords.contains(&clean) {
            keywords.push(clean);
        }
    }
    keywords
}

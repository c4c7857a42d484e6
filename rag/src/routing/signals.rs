//! Regex-based query signals.
//!
//! Each signal contributes a fixed amount to either the complexity or the
//! relationship score of a query. Scores are accumulated by the analyzer and
//! clamped there, so the weights below may sum past 1.0.

use regex::Regex;
use std::sync::LazyLock;

/// A lexical signal that fired on a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalHit {
    pub name: &'static str,
    pub weight: f32,
}

struct Signal {
    name: &'static str,
    weight: f32,
    pattern: &'static LazyLock<Regex>,
}

// --- Complexity patterns ---

static COMPARISON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(compare|comparing|comparison|versus|vs\.?|difference\s+between|differences|better\s+than|pros\s+and\s+cons|which\s+is\s+(better|healthier|faster))\b").unwrap()
});

static MULTI_STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(step\s+by\s+step|\bfirst\b.+\bthen\b|\bprocess\b|\bprocedure\b|\bplan\b|\bmeal\s+plan|\bsequence\b|\bin\s+what\s+order\b)").unwrap()
});

static EXPLANATORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^\s*why\b|\bwhy\s+(do|does|is|are|should)\b|\bhow\s+(do|does|can|should|to|would)\b|\bexplain\b|\breason\b)").unwrap()
});

static ANALYTICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(nutrition(al)?|calories|calorie|protein|healthy|healthier|analy[sz]e|evaluate|trade-?offs?|optimi[sz]e|balance[d]?|impact)\b").unwrap()
});

static QUANTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(two|three|four|five|several|multiple|various|different|\d+)\s+[a-z-]+").unwrap()
});

// --- Relationship patterns ---

static STRONG_RELATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(pairs?\s+(well\s+)?with|goes?\s+(well\s+)?with|go\s+together|substitutes?\s+for|substitute|replacement\s+for|replace|instead\s+of|similar\s+to|alternative\s+to|complements?|matches?\s+with)\b").unwrap()
});

static MEMBERSHIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\bmade\s+with\b|\bcooked\s+with\b|\bcontains?\b|\bcontaining\b|\bingredients?\s+(of|in|for)\b|\bcan\s+i\s+(make|cook)\s+with\b|\brecipes?\s+(with|using|that\s+use)\b|\bdishes\s+(with|using)\b|\bbelongs?\s+to\b|\bwhat\s+category\b|\buses?\b|\busing\b)").unwrap()
});

static CONNECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(and|with|together|both|combination|combine)\b").unwrap()
});

static COMPLEXITY_SIGNALS: [Signal; 5] = [
    Signal {
        name: "comparison language",
        weight: 0.35,
        pattern: &COMPARISON_RE,
    },
    Signal {
        name: "multi-step construct",
        weight: 0.2,
        pattern: &MULTI_STEP_RE,
    },
    Signal {
        name: "how/why construct",
        weight: 0.2,
        pattern: &EXPLANATORY_RE,
    },
    Signal {
        name: "analytical vocabulary",
        weight: 0.15,
        pattern: &ANALYTICAL_RE,
    },
    Signal {
        name: "plural quantifier",
        weight: 0.1,
        pattern: &QUANTIFIER_RE,
    },
];

static RELATIONSHIP_SIGNALS: [Signal; 3] = [
    Signal {
        name: "relational phrase",
        weight: 0.6,
        pattern: &STRONG_RELATION_RE,
    },
    Signal {
        name: "membership phrase",
        weight: 0.35,
        pattern: &MEMBERSHIP_RE,
    },
    Signal {
        name: "connective",
        weight: 0.1,
        pattern: &CONNECTIVE_RE,
    },
];

fn fired(signals: &[Signal], query: &str) -> Vec<SignalHit> {
    signals
        .iter()
        .filter(|s| s.pattern.is_match(query))
        .map(|s| SignalHit {
            name: s.name,
            weight: s.weight,
        })
        .collect()
}

/// Complexity signals present in the query.
pub fn complexity_signals(query: &str) -> Vec<SignalHit> {
    fired(&COMPLEXITY_SIGNALS, query)
}

/// Relationship signals present in the query.
pub fn relationship_signals(query: &str) -> Vec<SignalHit> {
    fired(&RELATIONSHIP_SIGNALS, query)
}

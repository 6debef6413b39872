//! Keyword extraction (spec §4.4): strips stopwords, normalizes spelling
//! variants and plurals, and keeps a short list of domain compound terms
//! intact instead of splitting them.

use std::collections::HashSet;
use std::sync::OnceLock;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "do", "does", "did",
    "have", "has", "had", "i", "you", "he", "she", "it", "we", "they", "this", "that", "these",
    "those", "what", "which", "who", "whom", "of", "in", "on", "at", "to", "for", "with", "about",
    "as", "by", "from", "and", "or", "but", "if", "so", "than", "then", "there", "here", "can",
    "could", "would", "should", "will", "shall", "my", "your", "its", "their", "me", "us", "them",
];

const COMPOUND_TERMS: &[&str] = &[
    "android auto",
    "apple carplay",
    "fuel efficiency",
    "fuel economy",
    "towing capacity",
    "cargo space",
    "ground clearance",
    "blind spot",
    "lane keep",
    "adaptive cruise",
];

const BRITISH_TO_AMERICAN: &[(&str, &str)] = &[
    ("colour", "color"),
    ("tyre", "tire"),
    ("litre", "liter"),
    ("metre", "meter"),
    ("kerb", "curb"),
    ("aluminium", "aluminum"),
    ("centre", "center"),
    ("defence", "defense"),
    ("licence", "license"),
];

fn stopword_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

fn normalize_spelling(word: &str) -> String {
    for (british, american) in BRITISH_TO_AMERICAN {
        if word == *british {
            return american.to_string();
        }
    }
    word.to_string()
}

/// Naive English singularization: strips a trailing "es" or "s" unless
/// doing so would leave fewer than 3 characters. Good enough for spec
/// terms ("seats" -> "seat", "inches" -> "inch"); not a real stemmer.
fn singularize(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.len() > 4 && (word.ends_with("ches") || word.ends_with("shes") || word.ends_with("xes")) {
        return word[..word.len() - 2].to_string();
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Extracts a deduplicated, order-preserving keyword list from `question`:
/// lowercases, strips punctuation, drops stopwords, normalizes spelling
/// and plurals, and re-merges recognized compound terms the word
/// splitting above would otherwise have broken apart.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let lower = question.to_lowercase();
    let cleaned: String = lower
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut compounds_found = Vec::new();
    let mut remainder = cleaned.clone();
    for term in COMPOUND_TERMS {
        if remainder.contains(term) {
            compounds_found.push(term.to_string());
            remainder = remainder.replace(term, " ");
        }
    }

    let stopwords = stopword_set();
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for term in compounds_found {
        if seen.insert(term.clone()) {
            keywords.push(term);
        }
    }

    for word in remainder.split_whitespace() {
        if word.len() < 2 || stopwords.contains(word) {
            continue;
        }
        let normalized = singularize(&normalize_spelling(word));
        if seen.insert(normalized.clone()) {
            keywords.push(normalized);
        }
    }

    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_stopwords_and_punctuation() {
        let kws = extract_keywords("What is the towing capacity?");
        assert!(!kws.contains(&"the".to_string()));
        assert!(kws.contains(&"towing".to_string()));
        assert!(kws.contains(&"capacity".to_string()));
    }

    #[test]
    fn keeps_compound_terms_intact() {
        let kws = extract_keywords("Does it support Android Auto and have good fuel efficiency?");
        assert!(kws.contains(&"android auto".to_string()));
        assert!(kws.contains(&"fuel efficiency".to_string()));
        assert!(!kws.contains(&"android".to_string()));
    }

    #[test]
    fn normalizes_british_spelling() {
        let kws = extract_keywords("What colour options does the tyre have?");
        assert!(kws.contains(&"color".to_string()));
        assert!(kws.contains(&"tire".to_string()));
        assert!(!kws.contains(&"tyre".to_string()));
    }

    #[test]
    fn singularizes_plurals() {
        let kws = extract_keywords("How many seats and cupholders?");
        assert!(kws.contains(&"seat".to_string()));
    }

    #[test]
    fn deduplicates_repeated_terms() {
        let kws = extract_keywords("mileage mileage mileage");
        assert_eq!(kws.iter().filter(|k| *k == "mileage").count(), 1);
    }
}

//! Text helpers shared by the chunker and the lexical scorer.

/// Split text into lowercase alphanumeric terms, dropping single-character tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(String::from)
        .collect()
}

/// Rough token estimate: `ceil(chars / 4)`.
///
/// A heuristic, not a tokenizer count; do not treat it as exact.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// English and Italian stop words.
pub const STOP_WORDS: &[&str] = &[
    // English
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "him", "his", "how", "its", "may", "new", "now", "old",
    "see", "two", "way", "who", "did", "get", "let", "put", "say", "she", "too", "use", "that",
    "with", "this", "from", "they", "will", "would", "there", "their", "what", "about", "which",
    "when", "make", "like", "time", "just", "know", "take", "into", "year", "your", "some",
    "could", "them", "than", "then", "look", "only", "come", "over", "also", "back", "after",
    "first", "well", "even", "want", "because", "these", "give", "most", "been", "were",
    "being", "more", "such", "each", "other", "should", "must", "where", "while", "here",
    "those", "very", "does", "done", "upon", "within", "without", "between", "under", "through",
    // Italian
    "il", "lo", "la", "gli", "le", "un", "uno", "una", "di", "da", "in", "con", "su", "per",
    "tra", "fra", "che", "non", "del", "della", "dei", "delle", "degli", "dello", "al", "alla",
    "ai", "alle", "agli", "allo", "dal", "dalla", "dai", "dalle", "nel", "nella", "nei", "nelle",
    "sul", "sulla", "sui", "sulle", "come", "anche", "questo", "questa", "questi", "queste",
    "quello", "quella", "sono", "essere", "stato", "stata", "hanno", "abbiamo", "loro", "suo",
    "sua", "suoi", "sue", "più", "però", "quando", "dove", "mentre", "ogni", "tutto", "tutti",
    "ancora", "solo", "molto", "cui", "perché", "quindi", "oppure", "sia", "era",
];

/// Whether a lowercase term is a stop word.
pub fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(&term)
}

//! Shared vocabulary: tokenisation, genre synonyms, mood/occasion tables and author names.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "as", "at", "be", "but", "by", "can", "could", "do",
    "does", "for", "from", "get", "give", "have", "how", "i", "if", "in", "is", "it", "its",
    "me", "my", "of", "on", "or", "please", "some", "something", "tell", "than", "that", "the",
    "there", "this", "to", "want", "was", "what", "whats", "when", "where", "which", "who",
    "why", "will", "with", "would", "you", "your",
];

/// Canonical genres as (lower-case key, display name).
pub const GENRES: &[(&str, &str)] = &[
    ("science fiction", "Science Fiction"),
    ("self-help", "Self-Help"),
    ("horror", "Horror"),
    ("romance", "Romance"),
    ("thriller", "Thriller"),
    ("fantasy", "Fantasy"),
    ("history", "History"),
    ("philosophy", "Philosophy"),
    ("biography", "Biography"),
    ("mystery", "Mystery"),
    ("classics", "Classics"),
];

/// Synonym -> canonical genre key. Longer phrases first so they win over their parts.
const GENRE_SYNONYMS: &[(&str, &str)] = &[
    ("personal development", "self-help"),
    ("life story", "biography"),
    ("self help", "self-help"),
    ("sci-fi", "science fiction"),
    ("scifi", "science fiction"),
    ("futuristic", "science fiction"),
    ("dystopian", "science fiction"),
    ("dystopia", "science fiction"),
    ("cyberpunk", "science fiction"),
    ("space opera", "science fiction"),
    ("scary", "horror"),
    ("spooky", "horror"),
    ("creepy", "horror"),
    ("terror", "horror"),
    ("gothic", "horror"),
    ("macabre", "horror"),
    ("love story", "romance"),
    ("romantic", "romance"),
    ("love stories", "romance"),
    ("suspense", "thriller"),
    ("adrenaline", "thriller"),
    ("action", "thriller"),
    ("magic", "fantasy"),
    ("magical", "fantasy"),
    ("dragons", "fantasy"),
    ("epic fantasy", "fantasy"),
    ("mythology", "fantasy"),
    ("motivation", "self-help"),
    ("motivational", "self-help"),
    ("productivity", "self-help"),
    ("habits", "self-help"),
    ("historical", "history"),
    ("philosophical", "philosophy"),
    ("existential", "philosophy"),
    ("stoicism", "philosophy"),
    ("memoirs", "biography"),
    ("memoir", "biography"),
    ("autobiography", "biography"),
    ("biographies", "biography"),
    ("detective", "mystery"),
    ("whodunit", "mystery"),
    ("crime", "mystery"),
    ("noir", "mystery"),
    ("mysteries", "mystery"),
    ("classic", "classics"),
];

/// Mood word -> genre that suits it.
pub const MOOD_GENRES: &[(&str, &str)] = &[
    ("sad", "Romance"),
    ("down", "Self-Help"),
    ("depressed", "Self-Help"),
    ("lonely", "Romance"),
    ("tired", "Romance"),
    ("nostalgic", "Classics"),
    ("stressed", "Romance"),
    ("anxious", "Self-Help"),
    ("lost", "Philosophy"),
    ("happy", "Fantasy"),
    ("excited", "Thriller"),
    ("bored", "Thriller"),
    ("motivated", "Biography"),
    ("reflective", "Philosophy"),
    ("hopeful", "Romance"),
    ("uplifting", "Romance"),
    ("heartwarming", "Romance"),
    ("relaxing", "Romance"),
    ("exciting", "Thriller"),
    ("funny", "Fantasy"),
    ("inspiring", "Biography"),
    ("light", "Romance"),
    ("dark", "Horror"),
    ("deep", "Philosophy"),
    ("cozy", "Mystery"),
    ("cry", "Romance"),
    ("laugh", "Fantasy"),
    ("relax", "Romance"),
    ("think", "Philosophy"),
    ("smile", "Romance"),
];

/// Moods that call for only well-rated books.
pub const NEGATIVE_MOODS: &[&str] = &[
    "sad", "down", "depressed", "lonely", "stressed", "anxious", "lost", "tired",
];

/// Occasion word -> genre that suits it.
pub const OCCASION_GENRES: &[(&str, &str)] = &[
    ("beach", "Romance"),
    ("vacation", "Fantasy"),
    ("holiday", "Fantasy"),
    ("weekend", "Fantasy"),
    ("trip", "Mystery"),
    ("travel", "Mystery"),
    ("flight", "Mystery"),
    ("plane", "Mystery"),
    ("train", "Mystery"),
    ("commute", "Thriller"),
    ("subway", "Thriller"),
    ("bus", "Romance"),
    ("bedtime", "Romance"),
    ("bed", "Romance"),
    ("sleep", "Romance"),
    ("work", "Self-Help"),
    ("study", "History"),
    ("school", "History"),
];

/// Occasions that call for lighter, reliably pleasant books.
pub const RELAXING_OCCASIONS: &[&str] = &["beach", "vacation", "holiday", "weekend", "trip", "travel"];

/// Full author name -> short forms people type.
const FAMOUS_AUTHORS: &[(&str, &[&str])] = &[
    ("stephen king", &["king", "steve king"]),
    ("dan brown", &["brown"]),
    ("j.k. rowling", &["rowling", "jk rowling", "j k rowling"]),
    ("j.r.r. tolkien", &["tolkien", "jrr tolkien"]),
    ("agatha christie", &["christie", "agatha"]),
    ("arthur conan doyle", &["conan doyle", "doyle"]),
    ("george orwell", &["orwell"]),
    ("isaac asimov", &["asimov"]),
    ("frank herbert", &["herbert"]),
    ("h.g. wells", &["wells", "hg wells"]),
    ("edgar allan poe", &["poe", "edgar poe"]),
    ("franz kafka", &["kafka"]),
    ("albert camus", &["camus"]),
    ("gabriel garcia marquez", &["marquez", "garcia marquez", "márquez"]),
    ("jane austen", &["austen"]),
    ("mary shelley", &["shelley"]),
    ("bram stoker", &["stoker"]),
    ("yuval noah harari", &["harari"]),
    ("paulo coelho", &["coelho"]),
];

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

static SYNONYM_RES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    GENRE_SYNONYMS
        .iter()
        .map(|(synonym, genre)| {
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(synonym))).unwrap();
            (re, *genre)
        })
        .collect()
});

static GENRE_RES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    GENRES
        .iter()
        .map(|(key, display)| {
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(key))).unwrap();
            (re, *display)
        })
        .collect()
});

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Naive singular form: `policies` -> `policy`, `books` -> `book`; `-ss` is kept.
pub fn singular(token: &str) -> String {
    if token.len() > 4 && token.ends_with("ies") {
        return format!("{}y", &token[..token.len() - 3]);
    }
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

/// Lower-cased content tokens with stop words and one-letter fragments removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() > 1 && !is_stop_word(t))
        .map(singular)
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Rewrites genre synonyms to their canonical genre key.
pub fn expand_synonyms(text: &str) -> String {
    let mut text = text.to_string();
    for (re, genre) in SYNONYM_RES.iter() {
        if re.is_match(&text) {
            text = re.replace_all(&text, *genre).into_owned();
        }
    }
    text
}

/// Display name of a canonical genre key, e.g. `science fiction` -> `Science Fiction`.
pub fn genre_display(key: &str) -> Option<&'static str> {
    let key = key.trim().to_lowercase();
    GENRES.iter().find(|(k, _)| *k == key).map(|(_, d)| *d)
}

/// First canonical genre mentioned in `text` (already synonym-expanded).
pub fn find_genre(text: &str) -> Option<&'static str> {
    GENRE_RES
        .iter()
        .filter_map(|(re, display)| re.find(text).map(|m| (m.start(), *display)))
        .min_by_key(|(start, _)| *start)
        .map(|(_, display)| display)
}

pub fn mood_genre(mood: &str) -> Option<&'static str> {
    lookup(MOOD_GENRES, mood)
}

pub fn occasion_genre(occasion: &str) -> Option<&'static str> {
    lookup(OCCASION_GENRES, occasion)
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    let key = key.trim().to_lowercase();
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Words that make a query recognisably about books.
pub fn is_book_term(token: &str) -> bool {
    const BOOK_WORDS: &[&str] = &[
        "book", "novel", "read", "reading", "story", "author", "series", "title", "genre",
        "recommend", "recommendation", "suggest", "fiction",
    ];
    BOOK_WORDS.contains(&token)
        || GENRES.iter().any(|(k, _)| k.split(|c| c == ' ' || c == '-').any(|w| w == token))
        || MOOD_GENRES.iter().any(|(k, _)| *k == token)
        || OCCASION_GENRES.iter().any(|(k, _)| *k == token)
}

/// Ratcliff/Obershelp similarity of two strings, in [0, 1].
pub fn similarity_ratio(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f32 / total as f32
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (mut best_len, mut best_a, mut best_b) = (0, 0, 0);
    for i in 0..a.len() {
        for j in 0..b.len() {
            let mut k = 0;
            while i + k < a.len() && j + k < b.len() && a[i + k] == b[j + k] {
                k += 1;
            }
            if k > best_len {
                best_len = k;
                best_a = i;
                best_b = j;
            }
        }
    }
    if best_len == 0 {
        return 0;
    }
    best_len
        + matching_chars(&a[..best_a], &b[..best_b])
        + matching_chars(&a[best_a + best_len..], &b[best_b + best_len..])
}

/// Normalises an author name: exact full name, a known short form, or a close spelling
/// (similarity above 0.7) of a famous author. `None` when nothing fits.
pub fn normalize_author(input: &str) -> Option<&'static str> {
    let name = input.trim().trim_end_matches(['?', '.', '!']).to_lowercase();
    if name.is_empty() {
        return None;
    }
    for (full, variants) in FAMOUS_AUTHORS {
        if *full == name || variants.contains(&name.as_str()) {
            return Some(full);
        }
    }
    FAMOUS_AUTHORS
        .iter()
        .map(|(full, _)| (*full, similarity_ratio(&name, full)))
        .filter(|(_, ratio)| *ratio > 0.7)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(full, _)| full)
}

/// First famous author (full name or short form) mentioned as a whole word in `text`.
pub fn find_author(text: &str) -> Option<&'static str> {
    let words: Vec<&str> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .filter(|w| !w.is_empty())
        .collect();
    let joined = format!(" {} ", words.join(" "));
    FAMOUS_AUTHORS.iter().find_map(|(full, variants)| {
        let hit = std::iter::once(full)
            .chain(variants.iter())
            .any(|name| joined.contains(&format!(" {} ", name)));
        hit.then_some(*full)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_stop_words_and_plurals() {
        assert_eq!(tokenize("What's the return policy?"), vec!["return", "policy"]);
        assert_eq!(tokenize("Any books about policies"), vec!["book", "policy"]);
        assert_eq!(tokenize("a glass"), vec!["glass"]);
    }

    #[test]
    fn synonyms_expand_to_canonical_genres() {
        assert_eq!(expand_synonyms("some sci-fi please"), "some science fiction please");
        assert_eq!(expand_synonyms("a scary story"), "a horror story");
        assert_eq!(find_genre("i love science fiction and horror"), Some("Science Fiction"));
        assert_eq!(genre_display("self-help"), Some("Self-Help"));
    }

    #[test]
    fn every_genre_is_found_on_word_boundaries() {
        assert_eq!(GENRE_RES.len(), GENRES.len());
        for (key, display) in GENRES {
            assert_eq!(find_genre(&format!("some {} please", key)), Some(*display));
        }
        assert_eq!(find_genre("horror, then some romance"), Some("Horror"));
        assert_eq!(find_genre("romanceless historyish"), None);
    }

    #[test]
    fn similarity_matches_sequence_ratio() {
        assert!((similarity_ratio("abcd", "abcd") - 1.0).abs() < f32::EPSILON);
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
        // 2 * 3 matching / 8 chars
        assert!((similarity_ratio("abcd", "bcde") - 0.75).abs() < 1e-6);
    }

    #[test]
    fn authors_normalise_from_short_forms_and_typos() {
        assert_eq!(normalize_author("King"), Some("stephen king"));
        assert_eq!(normalize_author("stephen kng"), Some("stephen king"));
        assert_eq!(normalize_author("someone unknown"), None);
        assert_eq!(find_author("anything by tolkien?"), Some("j.r.r. tolkien"));
    }

    #[test]
    fn book_terms_are_recognised() {
        assert!(is_book_term("novel"));
        assert!(is_book_term("fiction"));
        assert!(is_book_term("beach"));
        assert!(!is_book_term("asdfgh"));
    }
}

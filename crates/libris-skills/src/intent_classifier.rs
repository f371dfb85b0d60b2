//! Regex-based intent classifier.
//!
//! Families are tried in order and the first rule that matches wins. Text is lower-cased and
//! genre synonyms are rewritten to canonical genres before matching.

use crate::lexicon::{
    expand_synonyms, find_author, find_genre, genre_display, mood_genre, normalize_author,
    occasion_genre,
};
use libris_core::{
    ConversationContext, Intent, IntentClassifier, IntentLabel, Query, ENTITY_AUTHOR,
    ENTITY_BESTSELLER, ENTITY_GENRE, ENTITY_MOOD, ENTITY_OCCASION, ENTITY_ORDER, ENTITY_TITLE,
    ENTITY_YEAR,
};
use regex::Regex;
use std::sync::LazyLock;

/// Confidence multiplier when a query only makes sense together with a pending clarification.
const CLARIFIED_CONFIDENCE_FACTOR: f32 = 0.8;

/// What the first capture group of a rule holds.
#[derive(Debug, Clone, Copy)]
enum Capture {
    Nothing,
    Title,
    Author,
    Year,
    Century,
    Mood,
    Occasion,
    Genre,
    Order,
    Bestseller(bool),
}

struct Rule {
    re: Regex,
    capture: Capture,
}

struct Family {
    label: IntentLabel,
    rules: Vec<Rule>,
}

fn family(label: IntentLabel, rules: &[(&str, Capture)]) -> Family {
    Family {
        label,
        rules: rules
            .iter()
            .map(|(pattern, capture)| Rule {
                re: Regex::new(pattern).unwrap(),
                capture: *capture,
            })
            .collect(),
    }
}

const MOODS: &str = "sad|down|depressed|lonely|tired|nostalgic|stressed|anxious|lost|happy|excited|bored|motivated|reflective";
const MOOD_ADJECTIVES: &str = "sad|hopeful|uplifting|heartwarming|relaxing|exciting|funny|inspiring|light|dark|deep|cozy";

static FAMILIES: LazyLock<Vec<Family>> = LazyLock::new(|| {
    use Capture::*;
    let feeling = format!(
        r"\bi(?:'m|\s+am)\s+(?:feeling\s+)?(?:so\s+|very\s+|really\s+|a\s+bit\s+)?({MOODS})\b"
    );
    let feeling_alone = format!(r"\bfeeling\s+(?:so\s+|very\s+|really\s+|a\s+bit\s+)?({MOODS})\b");
    let mood_book = format!(
        r"\b({MOOD_ADJECTIVES})\b(?:\s+(?:but|and)\s+\w+)?\s+(?:novel|book|story|read)s?\b"
    );
    let mood_something = format!(r"\bsomething\s+({MOOD_ADJECTIVES})\b");

    vec![
        family(
            IntentLabel::OrderStatus,
            &[
                (r"\border\s*(?:number|no\.?|#)?\s*#?\s*(\d{3,})", Order),
                (r"\b(?:where\s+is|track|tracking|status\s+of|check\s+on)\s+(?:my\s+|the\s+)?(?:order|package|parcel|delivery|shipment)\b", Nothing),
                (r"\bmy\s+(?:order|package|parcel|delivery|shipment)\b", Nothing),
                (r"\bhas\s+my\s+\w+\s+shipped\b", Nothing),
            ],
        ),
        family(
            IntentLabel::CatalogLookup,
            &[
                (r"\b(?:return|refund|exchange|shipping|delivery|payment|privacy)\s+polic(?:y|ies)\b", Nothing),
                (r"\bdo\s+you\s+(?:have|sell|carry|stock)\s+(.+?)(?:\s+in\s+stock)?[?.!]*$", Title),
                (r"\bis\s+(.+?)\s+(?:in\s+stock|available)\b", Title),
                (r"\bwho\s+wrote\s+(.+?)[?.!]*$", Title),
                (r"\btell\s+me\s+about\s+(.+?)[?.!]*$", Title),
                (r"\b(?:how\s+much\s+(?:is|does|are)|price\s+of)\s+(.+?)(?:\s+cost)?[?.!]*$", Title),
                (r"\b(?:returns?|refunds?|shipping|payments?|pay\s+with|gift\s+cards?|opening\s+hours|support\s+hours|customer\s+service)\b", Nothing),
            ],
        ),
        family(
            IntentLabel::Recommendation,
            &[
                (r"\b(?:similar\s+to|something\s+like|books?\s+like|novels?\s+like|in\s+the\s+style\s+of)\s+(.+?)[?.!]*$", Title),
                (r"\bi\s+(?:just\s+)?(?:read|loved|enjoyed|liked|finished)\s+(.+?)(?:\s+and\b.*|[?.!].*)?$", Title),
                (r"\b(?:from|published\s+in|released\s+in|written\s+in|in)\s+(1[5-9]\d{2}|20\d{2})\b", Year),
                (r"\b(1[5-9]\d{2}|20\d{2})s?\s+(?:books?|novels?)\b", Year),
                (r"\b(\d{1,2})(?:st|nd|rd|th)\s+century\b", Century),
                (r"\b(?:books?|novels?|anything|something)\s+(?:by|from)\s+(.+?)[?.!]*$", Author),
                (r"\bwritten\s+by\s+(.+?)[?.!]*$", Author),
                (r"\b(?:works|novels)\s+of\s+(.+?)[?.!]*$", Author),
                (r"\bnot\s+best\s*-?sellers?\b|\b(?:lesser[-\s]known|hidden\s+gems?|underrated|obscure|indie)\b", Bestseller(false)),
                (r"\bbest\s*-?sellers?\b|\bmost\s+popular\b|\bpopular\b|\bfamous\b|\bacclaimed\b|\baward[-\s]winning\b", Bestseller(true)),
                (feeling.as_str(), Mood),
                (feeling_alone.as_str(), Mood),
                (r"\b(?:make\s+me|want\s+to|help\s+me)\s+(cry|laugh|relax|think|smile)\b", Mood),
                (mood_book.as_str(), Mood),
                (mood_something.as_str(), Mood),
                (r"\b(?:for|on|during)\s+(?:a\s+|the\s+|my\s+)?(?:long\s+)?(beach|vacation|holiday|weekend|trip|travel|flight|plane|train|commute|subway|bus|bedtime|work|study)\b", Occasion),
                (r"\bbefore\s+(bed|sleep)\b", Occasion),
                (r"\bgoing\s+(?:on\s+(?:a\s+)?)?(trip|vacation|holiday)\b", Occasion),
                (r"\b(science fiction|self-help|horror|romance|thriller|fantasy|history|philosophy|biography|mystery|classics)\b", Genre),
                (r"\b(?:recommend|suggest|suggestion|what\s+should\s+i\s+read|good\s+(?:books?|reads?)|something\s+to\s+read)\b", Nothing),
            ],
        ),
        family(
            IntentLabel::Smalltalk,
            &[
                (r"^(?:hi|hello|hey|hiya|good\s+(?:morning|afternoon|evening))\b", Nothing),
                (r"\b(?:thanks|thank\s+you|cheers)\b", Nothing),
                (r"\bhow\s+are\s+you\b", Nothing),
                (r"^(?:bye|goodbye|see\s+you)\b", Nothing),
            ],
        ),
    ]
});

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[5-9]\d{2}|20\d{2})\b").unwrap());

/// `min(0.95, 2 * match / text)`, plus 0.1 when the match starts in the first 30% of the
/// text, capped at 0.95. Lengths are in characters.
fn pattern_confidence(text: &str, start: usize, end: usize) -> f32 {
    let text_len = text.chars().count();
    if text_len == 0 {
        return 0.0;
    }
    let match_len = text[start..end].chars().count() as f32;
    let start_chars = text[..start].chars().count() as f32;
    let mut confidence = (match_len / text_len as f32 * 2.0).min(0.95);
    if start_chars < text_len as f32 * 0.3 {
        confidence += 0.1;
    }
    confidence.min(0.95)
}

fn clean_title(raw: &str) -> String {
    let mut title = raw.trim();
    for prefix in ["the book ", "the novel ", "a book called ", "a book named "] {
        if let Some(rest) = title.strip_prefix(prefix) {
            title = rest;
        }
    }
    title
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”' || c.is_whitespace())
        .trim_end_matches(['?', '.', '!', ','])
        .to_string()
}

fn apply_capture(intent: Intent, capture: Capture, value: Option<&str>) -> Intent {
    if let Capture::Bestseller(flag) = capture {
        return intent.with_entity(ENTITY_BESTSELLER, flag.to_string());
    }
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return intent;
    };
    match capture {
        Capture::Title => {
            let title = clean_title(value);
            if title.is_empty() {
                intent
            } else {
                intent.with_entity(ENTITY_TITLE, title)
            }
        }
        Capture::Author => {
            let author = clean_title(value);
            let author = normalize_author(&author)
                .map(str::to_string)
                .unwrap_or(author);
            intent.with_entity(ENTITY_AUTHOR, author)
        }
        Capture::Year => intent.with_entity(ENTITY_YEAR, value),
        Capture::Century => match value.parse::<i32>() {
            Ok(century) if century > 0 => {
                intent.with_entity(ENTITY_YEAR, ((century - 1) * 100 + 50).to_string())
            }
            _ => intent,
        },
        Capture::Mood => intent.with_entity(ENTITY_MOOD, value),
        Capture::Occasion => intent.with_entity(ENTITY_OCCASION, value),
        Capture::Genre => match genre_display(value) {
            Some(genre) => intent.with_entity(ENTITY_GENRE, genre),
            None => intent,
        },
        Capture::Order => intent.with_entity(ENTITY_ORDER, value),
        Capture::Nothing | Capture::Bestseller(_) => intent,
    }
}

/// Adds criteria mentioned anywhere in the text: genre (explicit, else from mood or
/// occasion), a famous author and a year.
fn enrich(mut intent: Intent, text: &str) -> Intent {
    if !matches!(
        intent.label,
        IntentLabel::Recommendation | IntentLabel::CatalogLookup
    ) {
        return intent;
    }
    if intent.entity(ENTITY_GENRE).is_none() {
        let genre = find_genre(text)
            .or_else(|| intent.entity(ENTITY_MOOD).and_then(mood_genre))
            .or_else(|| intent.entity(ENTITY_OCCASION).and_then(occasion_genre));
        if let Some(genre) = genre {
            intent = intent.with_entity(ENTITY_GENRE, genre);
        }
    }
    if intent.entity(ENTITY_AUTHOR).is_none() && intent.entity(ENTITY_TITLE).is_none() {
        if let Some(author) = find_author(text) {
            intent = intent.with_entity(ENTITY_AUTHOR, author);
        }
    }
    if intent.entity(ENTITY_YEAR).is_none() {
        if let Some(year) = YEAR_RE.captures(text).and_then(|c| c.get(1)) {
            intent = intent.with_entity(ENTITY_YEAR, year.as_str());
        }
    }
    intent
}

/// Classifies free text with no conversational context.
pub fn classify_text(text: &str) -> Intent {
    let normalized = expand_synonyms(&text.trim().to_lowercase());
    if normalized.is_empty() {
        return Intent::unknown();
    }
    for family in FAMILIES.iter() {
        for rule in &family.rules {
            let Some(caps) = rule.re.captures(&normalized) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let confidence = pattern_confidence(&normalized, whole.start(), whole.end());
            let intent = Intent::new(family.label, confidence);
            let intent = apply_capture(intent, rule.capture, caps.get(1).map(|m| m.as_str()));
            return enrich(intent, &normalized);
        }
    }
    Intent::unknown()
}

/// Deterministic classifier over the pattern families above.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexIntentClassifier;

impl RegexIntentClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl IntentClassifier for RegexIntentClassifier {
    fn classify(&self, query: &Query, context: &ConversationContext) -> Intent {
        let intent = classify_text(query.text());
        if intent.label != IntentLabel::Unknown {
            return intent;
        }
        let Some(pending) = context.pending_clarification() else {
            return intent;
        };
        let combined = classify_text(&format!("{} {}", pending.text(), query.text()));
        if combined.label == IntentLabel::Unknown {
            return intent;
        }
        Intent {
            confidence: (combined.confidence * CLARIFIED_CONFIDENCE_FACTOR).clamp(0.0, 1.0),
            ..combined
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_core::{ContextManager, DispatchDecision, Source};
    use std::time::Duration;

    #[test]
    fn return_policy_is_a_catalog_lookup() {
        let intent = classify_text("What's the return policy?");
        assert_eq!(intent.label, IntentLabel::CatalogLookup);
        assert!((intent.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn sad_but_hopeful_novel_is_a_mood_recommendation() {
        let intent = classify_text("Recommend a sad but hopeful novel");
        assert_eq!(intent.label, IntentLabel::Recommendation);
        assert_eq!(intent.entity(ENTITY_MOOD), Some("sad"));
        assert_eq!(intent.entity(ENTITY_GENRE), Some("Romance"));
    }

    #[test]
    fn synonyms_and_authors_become_entities() {
        let intent = classify_text("I love sci-fi");
        assert_eq!(intent.label, IntentLabel::Recommendation);
        assert_eq!(intent.entity(ENTITY_GENRE), Some("Science Fiction"));

        let intent = classify_text("books by King");
        assert_eq!(intent.entity(ENTITY_AUTHOR), Some("stephen king"));
    }

    #[test]
    fn orders_titles_and_years_are_extracted() {
        let intent = classify_text("where is order #10423?");
        assert_eq!(intent.label, IntentLabel::OrderStatus);
        assert_eq!(intent.entity(ENTITY_ORDER), Some("10423"));

        let intent = classify_text("Do you have The Hobbit?");
        assert_eq!(intent.label, IntentLabel::CatalogLookup);
        assert_eq!(intent.entity(ENTITY_TITLE), Some("the hobbit"));

        let intent = classify_text("books published in 1965");
        assert_eq!(intent.entity(ENTITY_YEAR), Some("1965"));

        let intent = classify_text("something from the 19th century");
        assert_eq!(intent.entity(ENTITY_YEAR), Some("1850"));
    }

    #[test]
    fn occasions_map_to_a_genre() {
        let intent = classify_text("a book for the beach");
        assert_eq!(intent.label, IntentLabel::Recommendation);
        assert_eq!(intent.entity(ENTITY_OCCASION), Some("beach"));
        assert_eq!(intent.entity(ENTITY_GENRE), Some("Romance"));
    }

    #[test]
    fn greetings_are_smalltalk_and_noise_is_unknown() {
        assert_eq!(classify_text("hello there").label, IntentLabel::Smalltalk);
        let unknown = classify_text("qwerty zxcv");
        assert_eq!(unknown.label, IntentLabel::Unknown);
        assert_eq!(unknown.confidence, 0.0);
        assert_eq!(classify_text("   ").label, IntentLabel::Unknown);
    }

    #[test]
    fn confidence_rewards_long_early_matches() {
        let short = classify_text("honestly, after all this time, i am in the mood for horror");
        let full = classify_text("horror");
        assert!(full.confidence > short.confidence);
        assert!(full.confidence <= 0.95);
    }

    #[tokio::test]
    async fn pending_clarification_is_combined_with_the_follow_up() {
        let manager = ContextManager::new(5, Duration::from_secs(60));
        manager
            .append(
                "s",
                Query::new("I'm feeling", "s"),
                DispatchDecision::new(Source::Clarification, "Feeling how?", Intent::unknown()),
            )
            .await;
        let ctx = manager.get("s").await;
        let classifier = RegexIntentClassifier::new();

        assert_eq!(classify_text("sad").label, IntentLabel::Unknown);
        let combined = classifier.classify(&Query::new("sad", "s"), &ctx);
        assert_eq!(combined.label, IntentLabel::Recommendation);
        assert_eq!(combined.entity(ENTITY_MOOD), Some("sad"));
        assert!((combined.confidence - 0.95 * 0.8).abs() < 1e-5);

        let noise = classifier.classify(&Query::new("qwerty", "s"), &ctx);
        assert_eq!(noise.label, IntentLabel::Unknown);

        let fresh = ContextManager::new(5, Duration::from_secs(60)).get("other").await;
        assert_eq!(classifier.classify(&Query::new("sad", "other"), &fresh).label, IntentLabel::Unknown);
    }
}

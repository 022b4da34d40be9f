//! Keyword vocabularies behind processor predicates and resolver strategies.
//!
//! Matching is on whole words or phrases of the normalized text (lowercase, punctuation
//! folded to spaces), so "bar" matches "a bar nearby" but not "barbecue".

use vernon_core::VenueDirectory;

const BOOKING: &[&str] = &[
    "book", "booking", "reserve", "reservation", "reservations", "table for", "get a table",
    "ticket", "tickets", "rsvp",
];

const TIME: &[&str] = &[
    "tonight", "today", "tomorrow", "this weekend", "weekend", "this week", "later",
    "right now", "friday", "saturday", "sunday", "monday", "tuesday", "wednesday", "thursday",
];

const EVENT: &[&str] = &[
    "happening", "going on", "event", "events", "show", "shows", "concert", "concerts", "party",
    "festival", "gig", "gigs", "things to do", "what's on", "lineup", "playing", "performing",
];

const PLACE: &[&str] = &[
    "restaurant", "restaurants", "bar", "bars", "club", "clubs", "near", "nearby", "where",
    "place", "places", "spot", "spots", "venue", "venues", "food", "eat", "drink", "drinks",
    "dinner", "lunch", "brunch", "cafe", "coffee", "rooftop", "around town", "neighborhood",
];

/// Narrow topics that have a dedicated search strategy, with the directory category
/// each one maps to.
const TOPICS: &[(&str, &str, &[&str])] = &[
    ("comedy", "comedy", &["comedy", "stand up", "standup", "comedian", "comedians", "improv"]),
    (
        "live music",
        "music",
        &["live music", "jazz", "salsa", "band", "bands", "concert", "concerts", "gig", "dj"],
    ),
    ("karaoke", "nightlife", &["karaoke"]),
    ("trivia", "nightlife", &["trivia", "quiz night"]),
];

const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "dining",
        &["dining", "restaurant", "restaurants", "dinner", "lunch", "brunch", "eat", "food", "steak", "steakhouse"],
    ),
    (
        "nightlife",
        &["nightlife", "bar", "bars", "club", "clubs", "cocktail", "cocktails", "drinks", "rooftop", "dance"],
    ),
    ("music", &["music", "jazz", "concert", "band", "live"]),
    ("comedy", &["comedy", "stand up", "standup", "improv"]),
];

const CONJUNCTIONS: &[&str] = &["and", "with", "but", "also", "plus", "or", "near", "under", "that", "without"];

/// Words needed before a query counts as complex.
pub const COMPLEX_MIN_WORDS: usize = 12;
/// Conjunctions needed before a query counts as complex.
pub const COMPLEX_MIN_CONJUNCTIONS: usize = 2;

/// Lowercase, fold punctuation (except `'` and `&`) to spaces, pad with spaces.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' || c == '&' {
                c
            } else {
                ' '
            }
        })
        .collect();
    let mut out = String::with_capacity(folded.len() + 2);
    out.push(' ');
    for word in folded.split_whitespace() {
        out.push_str(word);
        out.push(' ');
    }
    out
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {} ", phrase))
}

fn has_any(text: &str, phrases: &[&str]) -> bool {
    let normalized = normalize(text);
    phrases.iter().any(|p| contains_phrase(&normalized, p))
}

pub fn is_booking(text: &str) -> bool {
    has_any(text, BOOKING)
}

/// Time words together with event/venue words.
pub fn is_event(text: &str) -> bool {
    has_any(text, TIME) && has_any(text, EVENT)
}

pub fn is_place(text: &str) -> bool {
    has_any(text, PLACE)
}

/// `(topic, category)` for narrow-topic queries.
pub fn topic(text: &str) -> Option<(&'static str, &'static str)> {
    let normalized = normalize(text);
    TOPICS
        .iter()
        .find(|(_, _, words)| words.iter().any(|w| contains_phrase(&normalized, w)))
        .map(|(topic, category, _)| (*topic, *category))
}

pub fn category(text: &str) -> Option<&'static str> {
    let normalized = normalize(text);
    CATEGORIES
        .iter()
        .find(|(_, words)| words.iter().any(|w| contains_phrase(&normalized, w)))
        .map(|(category, _)| *category)
}

/// Long queries joining several criteria ("rooftop bar with live music and no cover").
pub fn is_complex(text: &str) -> bool {
    let normalized = normalize(text);
    let words = normalized.split_whitespace().count();
    let conjunctions = normalized
        .split_whitespace()
        .filter(|w| CONJUNCTIONS.contains(w))
        .count();
    words >= COMPLEX_MIN_WORDS && conjunctions >= COMPLEX_MIN_CONJUNCTIONS
}

/// First directory city named in `text`, in the directory's display form.
pub fn city_in(text: &str, directory: &dyn VenueDirectory) -> Option<String> {
    let normalized = normalize(text);
    directory
        .cities()
        .into_iter()
        .find(|city| contains_phrase(&normalized, normalize(city).trim()))
}

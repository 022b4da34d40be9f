//! Booking parameters from free text: party size, time, date and venue.

use regex::Regex;
use vernon_core::{BookingKind, BookingRequest, VenueDirectory, VernonError, VernonResult};

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
];

/// Party size when the user gives none.
pub const DEFAULT_PARTY_SIZE: u32 = 2;

#[derive(Debug)]
pub struct BookingExtractor {
    party: Regex,
    time: Regex,
    date: Regex,
    venue: Regex,
}

impl BookingExtractor {
    pub fn new() -> VernonResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| VernonError::Config(format!("bad pattern: {}", e)))
        };
        Ok(Self {
            // "for 4", "party of six", "4 people"; a trailing am/pm means it was a time.
            party: compile(
                r"(?i)\b(?:for|party of|group of)\s+(\d{1,2}|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\b(\s*(?:am|pm|:\d{2}|o'clock))?|\b(\d{1,2})\s+(?:people|persons|guests|of us)\b",
            )?,
            time: compile(r"(?i)\b(\d{1,2}(?::\d{2})?\s*(?:am|pm))\b|\bat\s+(\d{1,2}:\d{2})\b")?,
            date: compile(
                r"(?i)\b(tonight|today|tomorrow|this weekend|(?:on\s+)?(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b",
            )?,
            // "at the steakhouse", "at Ball & Chain"; stops before another clause.
            venue: compile(
                r"(?i)\b(?:at|to|for)\s+(?:the\s+)?([a-z][a-z'&]*(?:\s+[a-z'&]+)*?)(?:\s+(?:at|for|on|tonight|tomorrow|today|this)\b|[.,!?]|$)",
            )?,
        })
    }

    pub fn party_size(&self, text: &str) -> Option<u32> {
        for caps in self.party.captures_iter(text) {
            if let Some(n) = caps.get(3) {
                return n.as_str().parse().ok();
            }
            if caps.get(2).is_some() {
                continue;
            }
            let raw = caps.get(1)?.as_str().to_lowercase();
            return raw.parse().ok().or_else(|| {
                NUMBER_WORDS
                    .iter()
                    .find(|(w, _)| *w == raw)
                    .map(|(_, n)| *n)
            });
        }
        None
    }

    pub fn time(&self, text: &str) -> Option<String> {
        let caps = self.time.captures(text)?;
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().replace(' ', "").to_lowercase())
    }

    pub fn date(&self, text: &str) -> Option<String> {
        self.date
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase().trim_start_matches("on ").to_string())
    }

    /// Venue phrase as typed, skipping phrases that are numbers or party words.
    pub fn venue_phrase(&self, text: &str) -> Option<String> {
        self.venue
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .find(|phrase| {
                let lower = phrase.to_lowercase();
                !NUMBER_WORDS.iter().any(|(w, _)| lower.starts_with(w))
                    && !["a table", "table", "tickets", "me", "us", "dinner", "lunch", "brunch"]
                        .contains(&lower.as_str())
            })
    }

    /// Build a request, resolving the venue phrase against the directory when possible.
    pub fn extract(&self, text: &str, directory: &dyn VenueDirectory) -> BookingRequest {
        let lower = text.to_lowercase();
        let kind = if lower.contains("ticket") {
            BookingKind::Tickets
        } else {
            BookingKind::Table
        };
        let venue = self
            .venue_phrase(text)
            .map(|phrase| resolve_venue(&phrase, directory).unwrap_or(phrase));
        BookingRequest {
            kind,
            venue,
            party_size: self.party_size(text).unwrap_or(DEFAULT_PARTY_SIZE),
            time: self.time(text),
            date: self.date(text),
        }
    }
}

/// Best directory match for a loose venue phrase ("the steakhouse"): a name that starts
/// with the phrase wins over one that merely contains it.
fn resolve_venue(phrase: &str, directory: &dyn VenueDirectory) -> Option<String> {
    let lower = phrase.trim().to_lowercase();
    let needle = lower.trim_start_matches("the ").to_string();
    if needle.len() < 3 {
        return None;
    }
    let names: Vec<String> = directory
        .cities()
        .iter()
        .flat_map(|city| directory.locations_by_city(city))
        .map(|v| v.name)
        .collect();
    let starts = |name: &String| {
        let name = name.to_lowercase();
        name.starts_with(&needle) || name.starts_with(&format!("the {}", needle))
    };
    names
        .iter()
        .find(|name| starts(name))
        .or_else(|| names.iter().find(|name| name.to_lowercase().contains(&needle)))
        .cloned()
}

//! Session pagination: `category -> page`, moved by "next page", "previous page",
//! "page 2 of dining". Pages never go below 1.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use vernon_core::{VernonError, VernonResult};

/// Category used when a directive names none and nothing was paged before.
pub const DEFAULT_CATEGORY: &str = "venues";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    Next,
    Previous,
    Goto(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDirective {
    pub action: PageAction,
    /// `None` means "whatever was paged last".
    pub category: Option<String>,
}

/// Recognizes pagination directives in free text.
#[derive(Debug)]
pub struct DirectiveParser {
    next: Regex,
    previous: Regex,
    goto: Regex,
}

impl DirectiveParser {
    pub fn new() -> VernonResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| VernonError::Config(format!("bad pattern: {}", e)))
        };
        Ok(Self {
            next: compile(r"(?i)\b(?:next|more)\s+page\b(?:\s+(?:of|for|in)\s+(?:the\s+)?([a-z]+))?")?,
            previous: compile(
                r"(?i)\b(?:previous|prev|last|back\s+a)\s+page\b(?:\s+(?:of|for|in)\s+(?:the\s+)?([a-z]+))?",
            )?,
            goto: compile(r"(?i)\bpage\s+(\d{1,3})\b(?:\s+(?:of|for|in)\s+(?:the\s+)?([a-z]+))?")?,
        })
    }

    pub fn parse(&self, text: &str) -> Option<PageDirective> {
        let category = |m: Option<regex::Match<'_>>| m.map(|m| m.as_str().to_lowercase());

        if let Some(caps) = self.next.captures(text) {
            return Some(PageDirective {
                action: PageAction::Next,
                category: category(caps.get(1)),
            });
        }
        if let Some(caps) = self.previous.captures(text) {
            return Some(PageDirective {
                action: PageAction::Previous,
                category: category(caps.get(1)),
            });
        }
        let caps = self.goto.captures(text)?;
        let page = caps.get(1)?.as_str().parse::<u32>().ok()?;
        Some(PageDirective {
            action: PageAction::Goto(page),
            category: category(caps.get(2)),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaginationState {
    pages: HashMap<String, u32>,
    last_category: Option<String>,
}

impl PaginationState {
    pub fn page(&self, category: &str) -> u32 {
        self.pages.get(category).copied().unwrap_or(1).max(1)
    }

    /// Apply a directive; returns the category it landed on and the new page.
    pub fn apply(&mut self, directive: &PageDirective) -> (String, u32) {
        let category = directive
            .category
            .clone()
            .or_else(|| self.last_category.clone())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        let current = self.page(&category);
        let page = match directive.action {
            PageAction::Next => current.saturating_add(1),
            PageAction::Previous => current.saturating_sub(1).max(1),
            PageAction::Goto(n) => n.max(1),
        };
        self.pages.insert(category.clone(), page);
        self.last_category = Some(category.clone());
        (category, page)
    }

    /// Record the page actually shown for `category` (after clamping to the results),
    /// so a bare "next page" follows it and "previous page" steps back from it.
    pub fn set(&mut self, category: &str, page: u32) {
        self.pages.insert(category.to_string(), page.max(1));
        self.last_category = Some(category.to_string());
    }

    pub fn last_category(&self) -> Option<&str> {
        self.last_category.as_deref()
    }

    pub fn snapshot(&self) -> HashMap<String, u32> {
        self.pages.clone()
    }
}

/// Session-lifetime pagination shared by every pipeline run.
#[derive(Debug, Clone, Default)]
pub struct SharedPagination(Arc<Mutex<PaginationState>>);

impl SharedPagination {
    fn lock(&self) -> MutexGuard<'_, PaginationState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn apply(&self, directive: &PageDirective) -> (String, u32) {
        let (category, page) = self.lock().apply(directive);
        debug!(%category, page, "pagination directive applied");
        (category, page)
    }

    pub fn page(&self, category: &str) -> u32 {
        self.lock().page(category)
    }

    pub fn set(&self, category: &str, page: u32) {
        self.lock().set(category, page);
    }

    pub fn last_category(&self) -> Option<String> {
        self.lock().last_category().map(str::to_string)
    }

    pub fn snapshot(&self) -> HashMap<String, u32> {
        self.lock().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> DirectiveParser {
        DirectiveParser::new().unwrap()
    }

    #[test]
    fn parses_directives() {
        let p = parser();
        assert_eq!(
            p.parse("next page please"),
            Some(PageDirective {
                action: PageAction::Next,
                category: None
            })
        );
        assert_eq!(
            p.parse("Show me page 2 of dining"),
            Some(PageDirective {
                action: PageAction::Goto(2),
                category: Some("dining".into())
            })
        );
        assert_eq!(
            p.parse("previous page for nightlife")
                .map(|d| (d.action, d.category)),
            Some((PageAction::Previous, Some("nightlife".into())))
        );
        assert_eq!(p.parse("book a table for 4 at 7pm"), None);
    }

    #[test]
    fn next_then_previous_is_identity() {
        let mut state = PaginationState::default();
        state.apply(&PageDirective {
            action: PageAction::Goto(3),
            category: Some("dining".into()),
        });
        let before = state.page("dining");

        let next = PageDirective {
            action: PageAction::Next,
            category: Some("dining".into()),
        };
        let prev = PageDirective {
            action: PageAction::Previous,
            category: Some("dining".into()),
        };
        assert_eq!(state.apply(&next).1, before + 1);
        assert_eq!(state.apply(&prev).1, before);
    }

    #[test]
    fn pages_clamp_at_one() {
        let mut state = PaginationState::default();
        let prev = PageDirective {
            action: PageAction::Previous,
            category: Some("music".into()),
        };
        assert_eq!(state.apply(&prev), ("music".to_string(), 1));
        assert_eq!(state.apply(&prev).1, 1);
        let zero = PageDirective {
            action: PageAction::Goto(0),
            category: Some("music".into()),
        };
        assert_eq!(state.apply(&zero).1, 1);
    }

    #[test]
    fn bare_directive_follows_last_category() {
        let mut state = PaginationState::default();
        state.set("nightlife", 1);
        let (category, page) = state.apply(&PageDirective {
            action: PageAction::Next,
            category: None,
        });
        assert_eq!(category, "nightlife");
        assert_eq!(page, 2);

        let mut fresh = PaginationState::default();
        let (category, _) = fresh.apply(&PageDirective {
            action: PageAction::Next,
            category: None,
        });
        assert_eq!(category, DEFAULT_CATEGORY);
    }
}

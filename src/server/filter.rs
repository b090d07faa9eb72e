use regex::Regex;

/// Outcome of the path filter for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Record,
    /// An allow pattern is configured and the path does not match it.
    NotWhitelisted,
    /// The path matches the deny pattern.
    Blacklisted,
}

/// Allow/deny path filter evaluated before any capture work happens.
///
/// The allow pattern is checked first, so a path that matches neither
/// pattern is reported as not whitelisted rather than blacklisted.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    only: Option<Regex>,
    except: Option<Regex>,
}

impl PathFilter {
    pub fn new(only: Option<Regex>, except: Option<Regex>) -> Self {
        Self { only, except }
    }

    pub fn only_pattern(&self) -> Option<&str> {
        self.only.as_ref().map(Regex::as_str)
    }

    pub fn except_pattern(&self) -> Option<&str> {
        self.except.as_ref().map(Regex::as_str)
    }

    pub fn evaluate(&self, path: &str) -> FilterDecision {
        if let Some(only) = &self.only {
            if !only.is_match(path) {
                return FilterDecision::NotWhitelisted;
            }
        }
        if let Some(except) = &self.except {
            if except.is_match(path) {
                return FilterDecision::Blacklisted;
            }
        }
        FilterDecision::Record
    }
}

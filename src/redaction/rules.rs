//! Pattern-based redaction applied to header lines, trailer lines and bodies
//! before anything reaches storage.
//!
//! A rule is written `pattern/replacement`, split on the last `/` so the
//! pattern itself may contain slashes. When the replacement is omitted the
//! fixed marker [`REDACTED_MARKER`] is substituted. Replacements may
//! reference capture groups (`$1`, `${name}`).

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error_handling::types::ConfigError;

/// Substituted for matches when a rule carries no explicit replacement.
pub const REDACTED_MARKER: &str = "**REDACTED**";

/// One compiled pattern plus its replacement template.
#[derive(Debug, Clone)]
pub struct RedactRule {
    regex: Regex,
    replace: String,
}

impl RedactRule {
    /// Replaces every match of the pattern in `text`.
    pub fn redact(&self, text: &str) -> String {
        self.regex
            .replace_all(text, self.replace.as_str())
            .into_owned()
    }
}

impl FromStr for RedactRule {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (pattern, replace) = match value.rsplit_once('/') {
            Some((pattern, replace)) => (pattern, replace.to_string()),
            None => (value, REDACTED_MARKER.to_string()),
        };
        let regex = Regex::new(pattern)
            .map_err(|e| ConfigError::BadRedactRule(format!("{}: {}", pattern, e)))?;
        Ok(Self { regex, replace })
    }
}

impl fmt::Display for RedactRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.regex.as_str(), self.replace)
    }
}

/// Ordered rule set. Rules apply in registration order, each one operating on
/// the output of the previous rule. Application is a pure function over the
/// input string; rule sets are read-only after startup.
#[derive(Debug, Clone, Default)]
pub struct RedactRules(Vec<RedactRule>);

impl RedactRules {
    pub fn new(rules: Vec<RedactRule>) -> Self {
        Self(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.0 {
            out = rule.redact(&out);
        }
        out
    }
}

impl fmt::Display for RedactRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.0.iter().map(|r| format!("`{}`", r)).collect();
        write!(f, "[ {} ]", items.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(s: &str) -> RedactRule {
        s.parse().expect("rule should parse")
    }

    #[test]
    fn parse_with_replacement() {
        let r = rule("secret-[0-9]+/hidden");
        assert_eq!(r.redact("token secret-42 end"), "token hidden end");
    }

    #[test]
    fn parse_without_replacement_uses_marker() {
        let r = rule("password=\\w+");
        assert_eq!(r.redact("password=hunter2"), REDACTED_MARKER);
    }

    #[test]
    fn pattern_may_contain_slashes() {
        // Only the last slash separates pattern from replacement.
        let r = rule("/api/v1/users/[0-9]+/USER");
        assert_eq!(r.redact("GET /api/v1/users/7"), "GET USER");
    }

    #[test]
    fn replacement_supports_capture_groups() {
        let r = rule("Bearer (\\w{4})\\w*/Bearer $1...");
        assert_eq!(r.redact("Bearer abcdef123"), "Bearer abcd...");
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = "([unclosed/never".parse::<RedactRule>();
        assert!(matches!(err, Err(ConfigError::BadRedactRule(_))));
    }

    #[test]
    fn rules_apply_in_registration_order() {
        // The second rule sees the output of the first.
        let rules = RedactRules::new(vec![rule("alpha/beta"), rule("beta/gamma")]);
        assert_eq!(rules.redact("alpha"), "gamma");

        let reversed = RedactRules::new(vec![rule("beta/gamma"), rule("alpha/beta")]);
        assert_eq!(reversed.redact("alpha"), "beta");
    }

    #[test]
    fn empty_rule_set_is_identity() {
        let rules = RedactRules::default();
        assert_eq!(rules.redact("left alone"), "left alone");
    }

    #[test]
    fn authorization_header_scenario() {
        let rules = RedactRules::new(vec![rule("Authorization:.*/Authorization: **REDACTED**")]);
        assert_eq!(
            rules.redact("Authorization: secret123"),
            "Authorization: **REDACTED**"
        );
    }
}

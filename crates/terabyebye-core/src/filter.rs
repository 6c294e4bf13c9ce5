//! Exclusion filters.
//!
//! Messages matching a filter are never marked for deletion, even inside
//! the deletion window. They are counted as retained.

use crate::header::MessageHeader;

/// Subject keywords and sender patterns that protect messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionFilter {
    subject_keywords: Vec<String>,
    sender_patterns: Vec<String>,
}

impl ExclusionFilter {
    /// Builds a filter. Keywords match case-insensitively anywhere in the
    /// subject; patterns are globs (`*`, `?`) matched against the sender
    /// address.
    #[must_use]
    pub fn new<K, P>(subject_keywords: K, sender_patterns: P) -> Self
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let normalize = |s: &str| {
            let s = s.trim().to_lowercase();
            (!s.is_empty()).then_some(s)
        };
        Self {
            subject_keywords: subject_keywords
                .into_iter()
                .filter_map(|k| normalize(k.as_ref()))
                .collect(),
            sender_patterns: sender_patterns
                .into_iter()
                .filter_map(|p| normalize(p.as_ref()))
                .collect(),
        }
    }

    /// Parses comma-separated lists, as found in config files.
    #[must_use]
    pub fn from_lists(subjects: &str, senders: &str) -> Self {
        Self::new(subjects.split(','), senders.split(','))
    }

    /// Returns true if no filter is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subject_keywords.is_empty() && self.sender_patterns.is_empty()
    }

    /// Returns the reason a message is protected, if any.
    #[must_use]
    pub fn excludes(&self, header: &MessageHeader) -> Option<String> {
        let subject = header.subject.to_lowercase();
        if let Some(keyword) = self
            .subject_keywords
            .iter()
            .find(|k| subject.contains(k.as_str()))
        {
            return Some(format!("subject contains '{keyword}'"));
        }

        let sender = header.sender_address();
        self.sender_patterns
            .iter()
            .find(|p| glob_match(p, &sender))
            .map(|p| format!("sender matches '{p}'"))
    }

    /// Human-readable summary for previews.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.subject_keywords.is_empty() {
            parts.push(format!("subjects: {}", self.subject_keywords.join(", ")));
        }
        if !self.sender_patterns.is_empty() {
            parts.push(format!("senders: {}", self.sender_patterns.join(", ")));
        }
        parts.join("; ")
    }
}

/// Glob match supporting `*` (any run) and `?` (one char).
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(subject: &str, from: &str) -> MessageHeader {
        MessageHeader {
            date: None,
            subject: subject.into(),
            from: from.into(),
        }
    }

    #[test]
    fn glob() {
        assert!(glob_match("*@bank.com", "alerts@bank.com"));
        assert!(glob_match("boss@*", "boss@work.example"));
        assert!(glob_match("a?c@x", "abc@x"));
        assert!(!glob_match("*@bank.com", "alerts@bank.com.evil"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("?", ""));
    }

    #[test]
    fn subject_keywords_are_case_insensitive() {
        let filter = ExclusionFilter::from_lists("Receipt, TAX", "");
        assert!(filter.excludes(&header("Your receipt #42", "x@y")).is_some());
        assert!(filter.excludes(&header("2014 tax forms", "x@y")).is_some());
        assert!(filter.excludes(&header("Newsletter", "x@y")).is_none());
    }

    #[test]
    fn sender_patterns_match_bare_address() {
        let filter = ExclusionFilter::from_lists("", "*@bank.com");
        assert!(
            filter
                .excludes(&header("Statement", "\"My Bank\" <Alerts@Bank.com>"))
                .is_some()
        );
        assert!(filter.excludes(&header("Statement", "spam@other.com")).is_none());
    }

    #[test]
    fn empty_lists() {
        let filter = ExclusionFilter::from_lists(" , ", "");
        assert!(filter.is_empty());
        assert!(filter.excludes(&header("anything", "a@b")).is_none());
    }
}

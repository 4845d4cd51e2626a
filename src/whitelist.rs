//! Whitelist matching for hosts that bypass interception entirely.

use regex::Regex;

/// Default bypass patterns: loopback literals.
pub const DEFAULT_WHITELIST: [&str; 3] = ["127.0.0.1", "127.0.0.0", "localhost"];

/// Glob-style host matcher. `*` matches any run of characters; everything
/// else matches literally and case-sensitively. No DNS resolution or
/// normalization is performed on the host string as given by the caller.
#[derive(Clone, Debug)]
pub struct Whitelist {
    patterns: Vec<String>,
    matchers: Vec<Regex>,
}

impl Whitelist {
    pub fn new<I>(patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut whitelist = Whitelist {
            patterns: Vec::new(),
            matchers: Vec::new(),
        };
        for pattern in patterns {
            whitelist.add(&pattern.into());
        }
        whitelist
    }

    /// Adds a pattern. Duplicates are ignored.
    pub(crate) fn add(&mut self, pattern: &str) {
        if self.patterns.iter().any(|p| p == pattern) {
            return;
        }
        self.matchers.push(compile(pattern));
        self.patterns.push(pattern.to_string());
    }

    pub fn is_whitelisted(&self, host: &str) -> bool {
        self.matchers.iter().any(|matcher| matcher.is_match(host))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Whitelist::new(DEFAULT_WHITELIST)
    }
}

// Translates a glob pattern into an anchored regex: `*` becomes `.*`, all
// other characters are literal.
fn compile(pattern: &str) -> Regex {
    let literals: Vec<String> = pattern.split('*').map(|part| regex::escape(part)).collect();
    let translated = format!("^{}$", literals.join(".*"));

    // The literal segments are escaped above, so compilation cannot fail.
    Regex::new(&translated).unwrap()
}

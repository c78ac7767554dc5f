//! Space-delimited OAuth2 scope sets (RFC 6749 3.3).

use std::collections::BTreeSet;
use std::fmt;

pub const SCOPE_OPENID: &str = "openid";
pub const SCOPE_PROFILE: &str = "profile";
pub const SCOPE_EMAIL: &str = "email";

/// An ordered, de-duplicated set of scope tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn parse(raw: &str) -> Self {
        Self(raw.split_whitespace().map(String::from).collect())
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_subset(&self, other: &ScopeSet) -> bool {
        self.0.is_subset(&other.0)
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_deduplicates_and_sorts() {
        let s = ScopeSet::parse("  profile openid profile  email");
        assert_eq!(s.to_string(), "email openid profile");
        assert!(s.contains("openid"));
    }

    #[test]
    fn subset_is_strict_about_every_scope() {
        let allowed = ScopeSet::parse("openid profile");
        assert!(ScopeSet::parse("openid").is_subset(&allowed));
        assert!(ScopeSet::parse("").is_subset(&allowed));
        assert!(!ScopeSet::parse("openid admin").is_subset(&allowed));
    }
}

//! URL include/exclude matching.
//!
//! Candidates are compared verbatim: no case folding, no trailing-slash
//! handling. Regular expressions use an unanchored search, so patterns that
//! must cover the whole path anchor themselves with `^` and `$`.

use crate::config::{ConfigError, PatternConfig};
use regex::Regex;

/// A compiled include/exclude pattern.
#[derive(Debug, Clone)]
pub enum UrlPattern {
    Literal(String),
    Regex(Regex),
}

impl UrlPattern {
    pub fn compile(config: &PatternConfig) -> Result<Self, ConfigError> {
        match config {
            PatternConfig::Literal(s) => Ok(UrlPattern::Literal(s.clone())),
            PatternConfig::Regex { regex } => Regex::new(regex)
                .map(UrlPattern::Regex)
                .map_err(|source| ConfigError::InvalidPattern {
                    pattern: regex.clone(),
                    source,
                }),
        }
    }

    #[inline]
    pub fn is_match(&self, candidate: &str) -> bool {
        match self {
            UrlPattern::Literal(s) => s == candidate,
            UrlPattern::Regex(re) => re.is_match(candidate),
        }
    }
}

/// True iff `candidate` matches any of `patterns`.
pub fn matches(patterns: &[UrlPattern], candidate: &str) -> bool {
    patterns.iter().any(|p| p.is_match(candidate))
}

/// Include/exclude filter deciding which paths may be mocked.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    include: Vec<UrlPattern>,
    exclude: Vec<UrlPattern>,
}

impl UrlFilter {
    pub fn new(include: Vec<UrlPattern>, exclude: Vec<UrlPattern>) -> Self {
        Self { include, exclude }
    }

    pub fn from_config(
        include: &[PatternConfig],
        exclude: &[PatternConfig],
    ) -> Result<Self, ConfigError> {
        let include = include
            .iter()
            .map(UrlPattern::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = exclude
            .iter()
            .map(UrlPattern::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(include, exclude))
    }

    /// An empty include list allows everything; exclude always wins.
    pub fn allows(&self, candidate: &str) -> bool {
        let included = self.include.is_empty() || matches(&self.include, candidate);
        included && !matches(&self.exclude, candidate)
    }
}

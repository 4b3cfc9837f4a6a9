//! Heuristic SQL-injection detection for write requests.
//!
//! Rules are named regexes evaluated against every string leaf of the
//! envelope after sanitization. Quote characters are therefore matched both
//! raw and in their escaped forms (`&#x27;`, `&quot;`), and `/` as `&#x2F;`.
//!
//! This is a heuristic, not a security boundary. Built-in rules require SQL
//! statement context (terminators, column lists, `VALUES`, `WHERE`) so that
//! ordinary event text such as "drop table tennis practice" or "select a room
//! from the list" passes. Values equal to an exempt term are never scanned.

use std::collections::HashSet;

use regex::Regex;

use crate::error::AdmissionError;
use crate::pipeline::envelope::RequestEnvelope;

/// Built-in rule set, in evaluation order.
pub const BUILTIN_RULES: &[(&str, &str)] = &[
    // A single bare column needs a terminator or WHERE after the table name.
    (
        "select_from",
        r"(?i)\bSELECT\s+(?:(?:\*|[\w.]+(?:\s*,\s*[\w.]+)+)\s+FROM\s+[\w.]+|[\w.]+\s+FROM\s+[\w.]+\s*(?:;|--|\bWHERE\b))",
    ),
    ("insert_into", r"(?i)\bINSERT\s+INTO\s+[\w.]+\s*(?:\(|\bVALUES\b|\bSELECT\b)"),
    ("update_set", r"(?i)\bUPDATE\s+[\w.]+\s+SET\s+[\w.]+\s*="),
    ("delete_from", r"(?i)\bDELETE\s+FROM\s+[\w.]+\s*(?:;|$|\bWHERE\b)"),
    ("drop_table", r"(?i)\bDROP\s+(?:TABLE|DATABASE)\s+(?:IF\s+EXISTS\s+)?[\w.]+\s*(?:;|--|$)"),
    ("union_select", r"(?i)\bUNION\s+(?:ALL\s+)?SELECT\b"),
    ("line_comment", r#"(?:'|"|&#x27;|&quot;)\s*--"#),
    ("block_comment", r"(?s)(?:/|&#x2F;)\*.*?\*(?:/|&#x2F;)"),
    (
        "boolean_tautology",
        r#"(?i)(?:'|"|&#x27;|&quot;)\s*(?:OR|AND)\b\s*(?:'|"|&#x27;|&quot;)?\w+(?:'|"|&#x27;|&quot;)?\s*=\s*(?:'|"|&#x27;|&quot;)?\w+"#,
    ),
    ("stored_procedure", r"(?i)\bEXEC(?:UTE)?\s+(?:master\.\.)?(?:sp|xp)_\w+|\bxp_cmdshell\b"),
];

/// Calendar vocabulary that is never scanned.
pub const DEFAULT_EXEMPT_TERMS: &[&str] = &[
    "test", "testing", "event", "calendar", "meeting", "appointment", "reminder", "description",
    "title", "location", "daily", "weekly", "monthly", "yearly", "morning", "afternoon", "evening",
    "night", "production", "development", "api", "functionality", "basic", "simple",
];

#[derive(Debug, Clone)]
pub struct InjectionRule {
    name: String,
    pattern: Regex,
}

impl InjectionRule {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }
}

/// Ordered rules plus exempt vocabulary.
#[derive(Debug, Clone)]
pub struct InjectionRules {
    rules: Vec<InjectionRule>,
    exempt: HashSet<String>,
    max_depth: usize,
}

impl InjectionRules {
    /// Built-in rules and the default exempt vocabulary.
    pub fn new(max_depth: usize) -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .map(|(name, pattern)| {
                InjectionRule::new(*name, pattern).expect("built-in injection rule is valid")
            })
            .collect();
        Self {
            rules,
            exempt: HashSet::new(),
            max_depth,
        }
        .with_exempt_terms(DEFAULT_EXEMPT_TERMS.iter().copied())
    }

    /// A rule set with no rules or exemptions.
    pub fn empty(max_depth: usize) -> Self {
        Self {
            rules: Vec::new(),
            exempt: HashSet::new(),
            max_depth,
        }
    }

    pub fn with_rule(mut self, name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        self.rules.push(InjectionRule::new(name, pattern)?);
        Ok(self)
    }

    pub fn without_rule(mut self, name: &str) -> Self {
        self.rules.retain(|rule| rule.name != name);
        self
    }

    pub fn with_exempt_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exempt
            .extend(terms.into_iter().map(|t| t.as_ref().trim().to_lowercase()));
        self
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(InjectionRule::name)
    }

    pub fn is_exempt(&self, value: &str) -> bool {
        self.exempt.contains(&value.trim().to_lowercase())
    }

    /// Name of the first rule matching `value`, if any.
    pub fn scan(&self, value: &str) -> Option<&str> {
        if self.is_exempt(value) {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.is_match(value))
            .map(InjectionRule::name)
    }

    /// Scan every string leaf in the envelope.
    pub fn detect(&self, envelope: &RequestEnvelope) -> Result<(), AdmissionError> {
        envelope.visit_strings(self.max_depth, |path, value| match self.scan(value) {
            Some(rule) => Err(AdmissionError::SuspiciousContent {
                rule: rule.to_string(),
                path: path.to_string(),
            }),
            None => Ok(()),
        })
    }
}

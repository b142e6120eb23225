//! Deny filtering of extracted strings
//!
//! Two independent mechanisms, both case-sensitive:
//! - built-in noise patterns, matched as regexes
//! - a custom list, matched as plain substrings (so an exact match counts)

use regex::RegexSet;

use crate::Result;

/// Common runtime noise found in almost every process image
const BUILTIN_PATTERNS: &[&str] = &[
    // Managed runtime class names and type descriptors
    r"^(?:java|javax|android|androidx|kotlin|kotlinx|dalvik|sun|libcore|com\.android|com\.google\.android)\.[\w.$]+$",
    r"^\[*L(?:java|javax|android|androidx|kotlin|dalvik|sun|libcore)/[\w/$]+;?$",
    // System library and runtime paths
    r"^/(?:system|apex|vendor|proc|dev|sys|usr/lib|lib|lib64|data/dalvik-cache)/",
    // XML namespace and schema boilerplate
    r"schemas\.android\.com|www\.w3\.org|xmlns",
    // Alphabet and digit tables
    r"ABCDEFGHIJKLMNOPQRSTUVWXYZ|abcdefghijklmnopqrstuvwxyz|0123456789",
    // Nothing alphanumeric at all
    r"^[^A-Za-z0-9]+$",
    // One character class repeated: padding, separators, fill patterns
    r"^(?:A+|a+|x+|X+|0+|f+|F+|\.+|-+|=+|_+|\*+|#+| +)$",
];

/// Decides which extracted strings are dropped before regex extraction
#[derive(Debug, Clone)]
pub struct DenyFilter {
    builtins: Option<RegexSet>,
    custom: Vec<String>,
}

impl DenyFilter {
    pub fn new(use_builtins: bool, custom: Vec<String>) -> Result<Self> {
        let builtins = if use_builtins {
            Some(RegexSet::new(BUILTIN_PATTERNS)?)
        } else {
            None
        };

        let custom = custom.into_iter().filter(|entry| !entry.is_empty()).collect();
        Ok(Self { builtins, custom })
    }

    /// A filter that lets everything through
    pub fn allow_all() -> Self {
        Self {
            builtins: None,
            custom: Vec::new(),
        }
    }

    /// True if neither mechanism is active
    pub fn is_disabled(&self) -> bool {
        self.builtins.is_none() && self.custom.is_empty()
    }

    pub fn custom_entries(&self) -> &[String] {
        &self.custom
    }

    /// True if `text` survives both the built-in and the custom deny set
    pub fn passes(&self, text: &str) -> bool {
        if let Some(builtins) = &self.builtins {
            if builtins.is_match(text) {
                return false;
            }
        }

        !self.custom.iter().any(|entry| text.contains(entry.as_str()))
    }
}

impl Default for DenyFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

/// Split a comma separated deny list, trimming entries and dropping empty ones
pub fn parse_deny_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

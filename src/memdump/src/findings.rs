//! Categorized regex extraction
//!
//! Each category owns one pattern and one deduplicated result set. A string
//! may land in several categories; what gets recorded is the matched text,
//! once per category no matter how many dump files contained it.

use regex::{Regex, RegexSet};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::Result;

/// Built-in category registry: `(name, pattern)`
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("urls", r#"\b(?:https?|ftp|wss?)://[^\s"'<>`]+"#),
    ("emails", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
    (
        "ipv4",
        r"\b(?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\b",
    ),
    ("jwt", r"\beyJ[A-Za-z0-9_-]{5,}\.eyJ[A-Za-z0-9_-]{5,}\.[A-Za-z0-9_-]+"),
    ("aws_keys", r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b"),
    ("google_api_keys", r"\bAIza[0-9A-Za-z_-]{35}"),
    ("github_tokens", r"\bgh[pousr]_[A-Za-z0-9]{36,}"),
    ("slack_tokens", r"\bxox[abposr]-[A-Za-z0-9-]{10,}"),
    (
        "private_keys",
        r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP |ENCRYPTED )?PRIVATE KEY(?: BLOCK)?-----",
    ),
    ("bearer_tokens", r"(?i)\bbearer\s+[A-Za-z0-9._~+/-]{8,}=*"),
    (
        "credentials",
        r#"(?i)\b(?:password|passwd|pwd|secret|api[_-]?key|access[_-]?token|auth[_-]?token|client[_-]?secret)\b\s*["']?\s*[:=]\s*["']?[^\s"',;]{3,}"#,
    ),
    ("firebase", r"\b[a-z0-9-]+\.(?:firebaseio\.com|firebaseapp\.com)\b"),
];

/// A named pattern whose matches are collected together
#[derive(Debug, Clone)]
pub struct RegexCategory {
    pub name: String,
    pub pattern: Regex,
}

impl RegexCategory {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
        })
    }
}

/// Compile the built-in category registry
pub fn default_categories() -> Result<Vec<RegexCategory>> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, pattern)| RegexCategory::new(*name, pattern))
        .collect()
}

/// Per-category result sets, safe to fill from several threads at once
#[derive(Debug)]
pub struct Findings {
    sets: BTreeMap<String, Mutex<BTreeSet<String>>>,
}

impl Findings {
    pub fn new(categories: &[RegexCategory]) -> Self {
        let sets = categories
            .iter()
            .map(|c| (c.name.clone(), Mutex::new(BTreeSet::new())))
            .collect();
        Self { sets }
    }

    /// Record `text` under `category`; unknown categories are ignored
    pub fn insert(&self, category: &str, text: &str) {
        if let Some(set) = self.sets.get(category) {
            let mut set = set.lock().unwrap_or_else(|e| e.into_inner());
            if !set.contains(text) {
                set.insert(text.to_string());
            }
        }
    }

    /// Move every match of `other` into these sets
    pub fn merge(&self, other: Findings) {
        for (name, matches) in other.sets {
            let matches = matches.into_inner().unwrap_or_else(|e| e.into_inner());
            if matches.is_empty() {
                continue;
            }
            if let Some(set) = self.sets.get(&name) {
                set.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend(matches);
            }
        }
    }

    /// Snapshot of every category and its sorted matches
    pub fn to_map(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.sets
            .iter()
            .map(|(name, set)| {
                let set = set.lock().unwrap_or_else(|e| e.into_inner());
                (name.clone(), set.clone())
            })
            .collect()
    }

    /// Number of unique matches per category
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.sets
            .iter()
            .map(|(name, set)| {
                let len = set.lock().unwrap_or_else(|e| e.into_inner()).len();
                (name.clone(), len)
            })
            .collect()
    }

    /// Write one `<category>.txt` per category into `dir`, empty ones included
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.sets.len());

        for (name, matches) in self.to_map() {
            let path = dir.join(format!("{}.txt", name));
            let mut contents = String::new();
            for m in &matches {
                contents.push_str(m);
                contents.push('\n');
            }
            fs::write(&path, contents)?;
            written.push(path);
        }

        Ok(written)
    }
}

/// Applies every category to each string it is given
#[derive(Debug, Clone)]
pub struct Extractor {
    categories: Vec<RegexCategory>,
    prefilter: RegexSet,
}

impl Extractor {
    pub fn new(categories: Vec<RegexCategory>) -> Result<Self> {
        let prefilter = RegexSet::new(categories.iter().map(|c| c.pattern.as_str()))?;
        Ok(Self {
            categories,
            prefilter,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(default_categories()?)
    }

    pub fn categories(&self) -> &[RegexCategory] {
        &self.categories
    }

    /// Empty result sets for this extractor's categories
    pub fn findings(&self) -> Findings {
        Findings::new(&self.categories)
    }

    /// Record every category match in `text`, returns how many were found
    pub fn extract_into(&self, text: &str, findings: &Findings) -> usize {
        let mut found = 0;
        for idx in self.prefilter.matches(text).iter() {
            let category = &self.categories[idx];
            for m in category.pattern.find_iter(text) {
                findings.insert(&category.name, m.as_str());
                found += 1;
            }
        }
        found
    }

    /// Run every string through every category
    pub fn extract<'a, I>(&self, texts: I) -> Findings
    where
        I: IntoIterator<Item = &'a str>,
    {
        let findings = self.findings();
        for text in texts {
            self.extract_into(text, &findings);
        }
        findings
    }
}

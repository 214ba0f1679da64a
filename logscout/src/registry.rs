use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{ScanError, ScanResult};

/// A named, compiled pattern
#[derive(Clone)]
pub struct RegexSpec {
    name: String,
    regex: Regex,
    groups: Vec<String>,
}

impl RegexSpec {
    /// Compiles `pattern` under `name`
    pub fn new(name: impl Into<String>, pattern: &str) -> ScanResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ScanError::invalid_pattern(name, "regex name must not be empty"));
        }
        let regex = Regex::new(pattern).map_err(|e| ScanError::invalid_pattern(&name, e))?;
        let groups = regex
            .capture_names()
            .flatten()
            .map(str::to_string)
            .collect();
        Ok(Self {
            name,
            regex,
            groups,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Named capture groups in the order they appear in the pattern
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn has_groups(&self) -> bool {
        !self.groups.is_empty()
    }
}

impl fmt::Debug for RegexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexSpec")
            .field("name", &self.name)
            .field("pattern", &self.pattern())
            .field("groups", &self.groups)
            .finish()
    }
}

/// Insertion-ordered set of uniquely named patterns
#[derive(Debug, Clone, Default)]
pub struct RegexRegistry {
    specs: Vec<RegexSpec>,
    names: HashSet<String>,
}

impl RegexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from precompiled specs, rejecting duplicate names
    pub fn from_specs(specs: impl IntoIterator<Item = RegexSpec>) -> ScanResult<Self> {
        let mut registry = Self::new();
        for spec in specs {
            registry.insert(spec)?;
        }
        Ok(registry)
    }

    /// Compiles and registers a pattern. On error the registry is left unchanged.
    pub fn register(&mut self, name: impl Into<String>, pattern: &str) -> ScanResult<()> {
        let name = name.into();
        // Name check first so a duplicate is reported even if the pattern is also bad
        if self.names.contains(&name) {
            return Err(ScanError::duplicate_name(name));
        }
        self.insert(RegexSpec::new(name, pattern)?)
    }

    /// Registers a precompiled spec. On error the registry is left unchanged.
    pub fn insert(&mut self, spec: RegexSpec) -> ScanResult<()> {
        if self.names.contains(spec.name()) {
            return Err(ScanError::duplicate_name(spec.name()));
        }
        debug!(
            "Registered regex '{}': {} (groups: {:?})",
            spec.name(),
            spec.pattern(),
            spec.groups()
        );
        self.names.insert(spec.name().to_string());
        self.specs.push(spec);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegexSpec> {
        self.specs.iter()
    }

    /// Freezes the current patterns into a shareable read-only view
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot(self.specs.clone().into())
    }
}

/// Immutable, cheaply cloneable view of a registry handed to every worker
#[derive(Debug, Clone)]
pub struct RegistrySnapshot(Arc<[RegexSpec]>);

impl RegistrySnapshot {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(RegexSpec::name)
    }
}

impl Deref for RegistrySnapshot {
    type Target = [RegexSpec];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

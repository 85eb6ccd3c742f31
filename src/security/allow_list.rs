//! Allow-list patterns and where they come from.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};

use crate::security::AccessControlError;

/// One allow pattern compiled for both case modes.
#[derive(Debug)]
struct CompiledPattern {
    source: String,
    sensitive: Regex,
    insensitive: Regex,
}

impl CompiledPattern {
    fn compile(pattern: &str) -> Result<Self, AccessControlError> {
        let anchored = format!("^(?:{})$", pattern);
        let build = |case_insensitive: bool| {
            RegexBuilder::new(&anchored)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|source| AccessControlError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })
        };

        Ok(Self {
            source: pattern.to_string(),
            sensitive: build(false)?,
            insensitive: build(true)?,
        })
    }

    fn is_match(&self, candidate: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            self.sensitive.is_match(candidate)
        } else {
            self.insensitive.is_match(candidate)
        }
    }
}

/// A loaded, compiled allow-list with its load time.
///
/// Patterns match the whole source string.
#[derive(Debug)]
pub struct AllowList {
    patterns: Vec<CompiledPattern>,
    loaded_at: Instant,
    ttl: Duration,
}

impl AllowList {
    /// Compile `patterns`, stamping the list as loaded now.
    pub fn compile(patterns: &[String], ttl: Duration) -> Result<Self, AccessControlError> {
        let patterns = patterns
            .iter()
            .map(|p| CompiledPattern::compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            loaded_at: Instant::now(),
            ttl,
        })
    }

    /// Reject the list if any pattern admits one of `canaries`.
    pub fn self_test(&self, canaries: &[String]) -> Result<(), AccessControlError> {
        for canary in canaries {
            if let Some(pattern) = self.matching_pattern(canary, false) {
                return Err(AccessControlError::CanaryAdmitted {
                    canary: canary.clone(),
                    pattern: pattern.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, candidate: &str, case_sensitive: bool) -> bool {
        self.matching_pattern(candidate, case_sensitive).is_some()
    }

    fn matching_pattern(&self, candidate: &str, case_sensitive: bool) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.is_match(candidate, case_sensitive))
            .map(|p| p.source.as_str())
    }

    pub fn is_expired(&self) -> bool {
        self.loaded_at.elapsed() >= self.ttl
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Where raw allow patterns are read from.
pub trait AllowListSource: Send + Sync + 'static {
    fn load(&self) -> Result<Vec<String>, AccessControlError>;

    /// Human-readable origin for log lines.
    fn describe(&self) -> String;
}

/// Patterns fixed at construction (inline config, tests).
#[derive(Debug, Clone, Default)]
pub struct StaticAllowList {
    patterns: Vec<String>,
}

impl StaticAllowList {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

impl AllowListSource for StaticAllowList {
    fn load(&self) -> Result<Vec<String>, AccessControlError> {
        Ok(self.patterns.clone())
    }

    fn describe(&self) -> String {
        "inline".to_string()
    }
}

/// Patterns read from a TOML file under a known key.
///
/// The key may hold an array of strings or a multi-line string with one
/// pattern per line; blank lines and `#` comments are skipped.
#[derive(Debug, Clone)]
pub struct FileAllowList {
    path: PathBuf,
    key: String,
}

impl FileAllowList {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn missing_key(&self) -> AccessControlError {
        AccessControlError::MissingKey {
            path: self.path.display().to_string(),
            key: self.key.clone(),
        }
    }
}

impl AllowListSource for FileAllowList {
    fn load(&self) -> Result<Vec<String>, AccessControlError> {
        let path = self.path.display().to_string();
        let content = std::fs::read_to_string(&self.path).map_err(|source| AccessControlError::Read {
            path: path.clone(),
            source,
        })?;
        let table: toml::Table =
            toml::from_str(&content).map_err(|source| AccessControlError::Parse { path, source })?;

        match table.get(&self.key) {
            Some(toml::Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(|| self.missing_key()))
                .collect(),
            Some(toml::Value::String(lines)) => Ok(lines
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect()),
            _ => Err(self.missing_key()),
        }
    }

    fn describe(&self) -> String {
        format!("{}#{}", self.path.display(), self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn list(patterns: &[&str]) -> AllowList {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        AllowList::compile(&patterns, Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_whole_string_match() {
        let list = list(&[r"10\.0\.0\.\d+"]);
        assert!(list.matches("10.0.0.7", true));
        assert!(!list.matches("110.0.0.7", true));
        assert!(!list.matches("10.0.0.7.evil", true));
    }

    #[test]
    fn test_case_modes() {
        let list = list(&[r"gateway\.internal"]);
        assert!(list.matches("GATEWAY.internal", false));
        assert!(!list.matches("GATEWAY.internal", true));
    }

    #[test]
    fn test_self_test_rejects_canary() {
        let list = list(&[r".*\.example\.net"]);
        let err = list
            .self_test(&["ATTACKER.example.net".to_string()])
            .unwrap_err();
        assert!(matches!(err, AccessControlError::CanaryAdmitted { .. }));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = AllowList::compile(&["(".to_string()], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, AccessControlError::InvalidPattern { .. }));
    }

    #[test]
    fn test_file_source_array_and_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "allow = [\"127\\\\.0\\\\.0\\\\.1\"]\nhosts = \"\"\"\n# office\nbuild-\\\\d+\\\\.lan\n\nci\\\\.lan\n\"\"\""
        )
        .unwrap();

        let array = FileAllowList::new(file.path(), "allow").load().unwrap();
        assert_eq!(array, vec![r"127\.0\.0\.1".to_string()]);

        let lines = FileAllowList::new(file.path(), "hosts").load().unwrap();
        assert_eq!(lines, vec![r"build-\d+\.lan".to_string(), r"ci\.lan".to_string()]);

        let missing = FileAllowList::new(file.path(), "nope").load().unwrap_err();
        assert!(matches!(missing, AccessControlError::MissingKey { .. }));
    }
}

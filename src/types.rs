//! Core types shared across the analysis engine.
//!
//! This module defines analyzer options and the small value enums that
//! recognizers, analyzers, and formatters exchange.

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Byte ordering (endianness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Little-endian byte order.
    #[default]
    Little,
    /// Big-endian byte order.
    Big,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => write!(f, "little"),
            Endianness::Big => write!(f, "big"),
        }
    }
}

/// Text encodings understood by the encoding detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TextEncoding {
    /// UTF-8, with or without BOM.
    #[serde(rename = "utf-8")]
    Utf8,
    /// UTF-16, little-endian.
    #[serde(rename = "utf-16le")]
    Utf16Le,
    /// UTF-16, big-endian.
    #[serde(rename = "utf-16be")]
    Utf16Be,
    /// ISO-8859-1; every byte is a character.
    #[default]
    #[serde(rename = "latin-1")]
    Latin1,
}

impl TextEncoding {
    /// IANA charset name.
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16Le => "UTF-16LE",
            TextEncoding::Utf16Be => "UTF-16BE",
            TextEncoding::Latin1 => "ISO-8859-1",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Digest algorithms for file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-224
    #[serde(rename = "sha-224")]
    Sha224,
    /// SHA-256
    #[serde(rename = "sha-256")]
    Sha256,
    /// SHA-384
    #[serde(rename = "sha-384")]
    Sha384,
    /// SHA-512
    #[serde(rename = "sha-512")]
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ];

    /// Conventional algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha224 => "SHA-224",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Identifier usable inside a URI (`ni:` naming).
    pub fn uri_name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha224 => "sha-224",
            HashAlgorithm::Sha256 => "sha-256",
            HashAlgorithm::Sha384 => "sha-384",
            HashAlgorithm::Sha512 => "sha-512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.to_ascii_lowercase().replace('-', "");
        match normalized.as_str() {
            "sha224" => Ok(HashAlgorithm::Sha224),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(AnalysisError::ConfigError {
                message: format!("unknown hash algorithm '{}'", s),
            }),
        }
    }
}

/// Options for analysis behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerOptions {
    /// Maximum container nesting depth
    pub max_depth: usize,
    /// Bytes of a non-seekable stream kept in memory before spooling to disk
    pub spool_memory_limit: usize,
    /// Largest archive entry whose content is analyzed
    pub max_entry_size: u64,
    /// Digests computed for each file
    pub hash_algorithms: Vec<HashAlgorithm>,
    /// Largest file that is hashed
    pub hash_size_limit: u64,
    /// Largest unrecognized file embedded as a `data:` node
    pub data_uri_limit: u64,
    /// Analyze siblings of thread-safe containers concurrently
    pub parallel: bool,
    /// Worker threads (0 = one per CPU)
    pub threads: usize,
    /// Package description file names, matched case-insensitively
    pub description_files: Vec<String>,
    /// Encoding assumed for text without a BOM that is not valid UTF-8
    pub default_encoding: TextEncoding,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            max_depth: 32,
            spool_memory_limit: 16 * 1024 * 1024, // 16MB
            max_entry_size: 1024 * 1024 * 1024,   // 1GB
            hash_algorithms: vec![HashAlgorithm::Sha256],
            hash_size_limit: 64 * 1024 * 1024, // 64MB
            data_uri_limit: 64,
            parallel: true,
            threads: 0,
            description_files: vec!["FILE_ID.DIZ".to_string(), "DESC.SDI".to_string()],
            default_encoding: TextEncoding::Latin1,
        }
    }

    /// Create options for thorough analysis.
    pub fn thorough() -> Self {
        Self {
            max_depth: 64,
            max_entry_size: 8 * 1024 * 1024 * 1024, // 8GB
            hash_algorithms: HashAlgorithm::ALL.to_vec(),
            hash_size_limit: 1024 * 1024 * 1024, // 1GB
            data_uri_limit: 1024,
            ..Self::new()
        }
    }

    /// Create options for fast analysis.
    pub fn fast() -> Self {
        Self {
            max_depth: 8,
            spool_memory_limit: 4 * 1024 * 1024, // 4MB
            max_entry_size: 64 * 1024 * 1024,    // 64MB
            hash_algorithms: Vec::new(),
            hash_size_limit: 0,
            data_uri_limit: 0,
            ..Self::new()
        }
    }

    /// Load options from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&text)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject settings no analysis could run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(AnalysisError::ConfigError {
                message: "max_depth must be at least 1".to_string(),
            });
        }
        if self.spool_memory_limit == 0 {
            return Err(AnalysisError::ConfigError {
                message: "spool_memory_limit must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Worker thread count with `0` resolved to the CPU count.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Whether `name` is a configured description file name.
    pub fn is_description_file(&self, name: &str) -> bool {
        self.description_files
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_presets() {
        assert!(AnalyzerOptions::thorough().max_depth > AnalyzerOptions::new().max_depth);
        assert!(AnalyzerOptions::fast().hash_algorithms.is_empty());
        assert_eq!(AnalyzerOptions::thorough().hash_algorithms.len(), 4);
    }

    #[test]
    fn test_description_names_case_insensitive() {
        let options = AnalyzerOptions::new();
        assert!(options.is_description_file("file_id.diz"));
        assert!(!options.is_description_file("readme.txt"));
    }

    #[test]
    fn test_hash_algorithm_from_str() {
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_from_json_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_depth": 3, "hash_algorithms": ["sha-384"], "default_encoding": "utf-8"}}"#
        )
        .unwrap();

        let options = AnalyzerOptions::from_json_file(file.path()).unwrap();
        assert_eq!(options.max_depth, 3);
        assert_eq!(options.hash_algorithms, vec![HashAlgorithm::Sha384]);
        assert_eq!(options.default_encoding, TextEncoding::Utf8);
        assert_eq!(options.data_uri_limit, AnalyzerOptions::new().data_uri_limit);
    }

    #[test]
    fn test_validate_rejects_zero_depth() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_depth": 0}}"#).unwrap();
        assert!(AnalyzerOptions::from_json_file(file.path()).is_err());
    }
}

//! Parsing for `INFO` / `CLUSTER INFO` text output.
//!
//! All functions here are pure: raw text in, structured values out.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

/// Errors that can occur while parsing INFO output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InfoParseError {
    #[error("Failed to compile regex: {0}")]
    RegexCompilation(String),

    #[error("invalid keyspace line {line:?}: {reason}")]
    InvalidKeyspace { line: String, reason: String },
}

/// Parse key-value pairs from INFO command output.
///
/// INFO output format: `key:value` per line, with optional section headers starting with `#`.
///
/// # Example
/// ```
/// use valkey_cluster_admin::client::parsing::parse_info_output;
///
/// let info = "# Cluster\ncluster_known_nodes:6\ncluster_size:3\n";
/// let parsed = parse_info_output(info).unwrap();
/// assert_eq!(parsed.get("cluster_known_nodes"), Some(&"6".to_string()));
/// ```
pub fn parse_info_output(info: &str) -> Result<HashMap<String, String>, InfoParseError> {
    let kv_regex = Regex::new(r"^([\w-]+):(.*)$")
        .map_err(|e| InfoParseError::RegexCompilation(e.to_string()))?;

    let mut result = HashMap::new();

    for line in info.lines() {
        let line = line.trim();

        // Skip empty lines and section headers
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(caps) = kv_regex.captures(line)
            && let (Some(key), Some(value)) = (caps.get(1), caps.get(2))
        {
            result.insert(key.as_str().to_string(), value.as_str().trim().to_string());
        }
    }

    Ok(result)
}

/// Parse a specific value from INFO output by key name.
///
/// Returns the value as a string, or None if not found.
pub fn parse_info_value(info: &str, key: &str) -> Option<String> {
    parse_info_output(info)
        .ok()
        .and_then(|map| map.get(key).cloned())
}

/// The `db<N>:` lines of a keyspace section, joined by newlines.
///
/// Empty when the database holds no keys (the server omits the line).
pub fn db_section(keyspace: &str, db: u32) -> String {
    let prefix = format!("db{db}:");
    keyspace
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(&prefix))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Statistics for one logical database from `INFO keyspace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbKeyspace {
    pub db: u32,
    pub keys: i64,
    pub expires: i64,
    pub avg_ttl: Option<i64>,
}

/// Parsed `INFO keyspace` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyspaceInfo {
    pub databases: Vec<DbKeyspace>,
}

impl KeyspaceInfo {
    /// Parse `db<N>:keys=<k>,expires=<e>[,avg_ttl=<t>...]` lines.
    ///
    /// Lines whose key does not start with `db` are ignored. A `db` line
    /// missing `keys` or `expires`, or carrying a non-integer value for
    /// either, fails the whole parse.
    pub fn parse(info: &str) -> Result<Self, InfoParseError> {
        let mut databases = Vec::new();

        for line in info.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let Some(db) = key.strip_prefix("db") else {
                continue;
            };

            let invalid = |reason: String| InfoParseError::InvalidKeyspace {
                line: line.to_string(),
                reason,
            };

            let db = db
                .parse::<u32>()
                .map_err(|e| invalid(format!("invalid database index {db:?}: {e}")))?;

            let fields: HashMap<&str, &str> = value
                .split(',')
                .filter_map(|pair| pair.split_once('='))
                .collect();

            let required = |name: &str| -> Result<i64, InfoParseError> {
                let raw = fields
                    .get(name)
                    .ok_or_else(|| invalid(format!("missing `{name}`")))?;
                raw.parse::<i64>()
                    .map_err(|e| invalid(format!("invalid `{name}` value {raw:?}: {e}")))
            };

            databases.push(DbKeyspace {
                db,
                keys: required("keys")?,
                expires: required("expires")?,
                avg_ttl: fields.get("avg_ttl").and_then(|v| v.parse().ok()),
            });
        }

        Ok(KeyspaceInfo { databases })
    }

    /// Sum of `keys` across all databases, `None` on overflow.
    pub fn total_keys(&self) -> Option<i64> {
        self.databases
            .iter()
            .try_fold(0i64, |acc, db| acc.checked_add(db.keys))
    }

    /// Sum of `expires` across all databases, `None` on overflow.
    pub fn total_expires(&self) -> Option<i64> {
        self.databases
            .iter()
            .try_fold(0i64, |acc, db| acc.checked_add(db.expires))
    }
}

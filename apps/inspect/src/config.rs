// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inspector configuration loaded from environment variables.

use simple_spf_core::ParseOptions;

/// Inspector configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resolve references into links (`SPF_WITH_TREE`).
    pub with_tree: bool,
    /// Stop after the header section (`SPF_ONLY_HEADER`).
    pub only_header: bool,
    /// Decode the header statements (`SPF_WITH_HEADER`).
    pub with_header: bool,
    /// Number of worker threads for parallel parsing.
    pub worker_threads: usize,
    /// Pretty-print the JSON report.
    pub pretty: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through any variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ParseOptions::default();
        Self {
            with_tree: flag(&var, "SPF_WITH_TREE", defaults.with_tree),
            only_header: flag(&var, "SPF_ONLY_HEADER", defaults.only_header),
            with_header: flag(&var, "SPF_WITH_HEADER", defaults.with_header),
            worker_threads: var("SPF_WORKER_THREADS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or_else(num_cpus::get),
            pretty: flag(&var, "SPF_PRETTY", false),
        }
    }

    /// Parse options derived from the flags.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::default()
            .with_tree(self.with_tree)
            .only_header(self.only_header)
            .with_header(self.with_header)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn flag(var: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    var(key).and_then(|v| parse_bool(&v)).unwrap_or(default)
}

/// Accepts 1/0, true/false, yes/no, on/off (case-insensitive)
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_match_parse_options() {
        let config = config(&[]);
        assert_eq!(config.parse_options(), ParseOptions::default());
        assert!(!config.pretty);
        assert!(config.worker_threads >= 1);
    }

    #[test]
    fn test_flags() {
        let config = config(&[
            ("SPF_WITH_TREE", "yes"),
            ("SPF_ONLY_HEADER", "1"),
            ("SPF_WITH_HEADER", "TRUE"),
            ("SPF_PRETTY", "on"),
            ("SPF_WORKER_THREADS", "3"),
        ]);
        assert!(config.with_tree);
        assert!(config.only_header);
        assert!(config.with_header);
        assert!(config.pretty);
        assert_eq!(config.worker_threads, 3);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = config(&[
            ("SPF_WITH_HEADER", "maybe"),
            ("SPF_WORKER_THREADS", "0"),
        ]);
        assert!(config.with_header);
        assert_eq!(config.worker_threads, num_cpus::get());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(" Off "), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool(""), None);
    }
}

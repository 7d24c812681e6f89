// Import Policy - textual pre-check over source code
//
// Advisory only: `__import__("o" + "s")`, `importlib`, aliasing through other
// modules and similar indirection all pass this check. The subprocess boundary
// is what actually contains a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Modules rejected when a caller does not supply its own list
pub const DEFAULT_BLOCKED_MODULES: &[&str] = &[
    "os",
    "subprocess",
    "sys",
    "shutil",
    "pathlib",
    "socket",
    "asyncio",
];

/// A blocked module reference found by the pre-check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub module: String,
    /// The matched fragment, e.g. `import os` or `from os`
    pub pattern: String,
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PolicyViolation: module '{}' is blocked (matched `{}`); nothing was executed",
            self.module, self.pattern
        )
    }
}

/// Denylist of module names checked against `import <m>` / `from <m>` substrings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPolicy {
    blocked: BTreeSet<String>,
}

impl ImportPolicy {
    pub fn new<I, S>(blocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocked: blocked.into_iter().map(Into::into).collect(),
        }
    }

    /// Policy built from [`DEFAULT_BLOCKED_MODULES`]
    pub fn default_denylist() -> Self {
        Self::new(DEFAULT_BLOCKED_MODULES.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    pub fn blocked(&self) -> &BTreeSet<String> {
        &self.blocked
    }

    /// Scan `source` for blocked references.
    ///
    /// Plain substring matching: `import os` also matches `import ossaudiodev`
    /// and text inside strings or comments. Modules are checked in sorted order
    /// so the reported violation is deterministic.
    pub fn check(&self, source: &str) -> Result<(), PolicyViolation> {
        for module in &self.blocked {
            for keyword in ["import", "from"] {
                let pattern = format!("{} {}", keyword, module);
                if source.contains(&pattern) {
                    return Err(PolicyViolation {
                        module: module.clone(),
                        pattern,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_plain_import() {
        let policy = ImportPolicy::new(["os"]);
        let err = policy.check("import os\nprint(os.getcwd())").unwrap_err();
        assert_eq!(err.module, "os");
        assert_eq!(err.pattern, "import os");
    }

    #[test]
    fn test_blocks_from_import() {
        let policy = ImportPolicy::new(["subprocess"]);
        let err = policy.check("from subprocess import run").unwrap_err();
        assert_eq!(err.pattern, "from subprocess");
    }

    #[test]
    fn test_allows_unlisted_modules() {
        let policy = ImportPolicy::default_denylist();
        assert!(policy.check("import math\nprint(math.pi)").is_ok());
    }

    #[test]
    fn test_empty_policy_allows_everything() {
        let policy = ImportPolicy::default();
        assert!(policy.is_empty());
        assert!(policy.check("import os").is_ok());
    }

    #[test]
    fn test_substring_match_is_coarse() {
        // Prefix collisions are reported too
        let policy = ImportPolicy::new(["os"]);
        assert!(policy.check("import ossaudiodev").is_err());
    }

    #[test]
    fn test_dynamic_import_is_not_detected() {
        let policy = ImportPolicy::default_denylist();
        assert!(policy.check("m = __import__('o' + 's')").is_ok());
    }

    #[test]
    fn test_first_violation_is_deterministic() {
        let policy = ImportPolicy::new(["sys", "os"]);
        let err = policy.check("import sys\nimport os").unwrap_err();
        assert_eq!(err.module, "os");
    }

    #[test]
    fn test_violation_message() {
        let policy = ImportPolicy::new(["socket"]);
        let msg = policy.check("import socket").unwrap_err().to_string();
        assert!(msg.starts_with("PolicyViolation"));
        assert!(msg.contains("socket"));
    }
}

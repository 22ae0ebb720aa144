//! Directives embedded in a request, e.g. `output_dir: ./calc`.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Values a request may set for itself. Explicit directives win over config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directives {
    pub output_dir: Option<String>,
    pub repository: Option<String>,
    pub owner: Option<String>,
}

impl Directives {
    pub fn is_empty(&self) -> bool {
        self.output_dir.is_none() && self.repository.is_none() && self.owner.is_none()
    }
}

fn directive_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?im)^[\s\-*>]*(output_dir|github_repo|github_owner)\s*[:=]\s*[`'\x22]?([^`'\x22\s]+)[`'\x22]?\s*$",
            )
            .ok()
        })
        .as_ref()
}

/// Extract directives from `text`. The first occurrence of each key wins.
pub fn directives(text: &str) -> Directives {
    let mut out = Directives::default();
    let Some(pattern) = directive_pattern() else {
        return out;
    };
    for caps in pattern.captures_iter(text) {
        let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let slot = match key.as_str().to_lowercase().as_str() {
            "output_dir" => &mut out.output_dir,
            "github_repo" => &mut out.repository,
            "github_owner" => &mut out.owner,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.as_str().to_string());
        }
    }
    out
}

//! Server settings read from the environment.

use std::env;
use std::str::FromStr;

use tracing::warn;

use crate::runtime::DEFAULT_MAX_PASSES;
use crate::timer::RESEND_COUNTDOWN_SECS;

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Address the UI server binds to.
    pub addr: String,
    /// Directory served under `/static`.
    pub static_dir: String,
    pub resend_seconds: u32,
    pub max_reaction_passes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            static_dir: DEFAULT_STATIC_DIR.to_string(),
            resend_seconds: RESEND_COUNTDOWN_SECS,
            max_reaction_passes: DEFAULT_MAX_PASSES,
        }
    }
}

impl Settings {
    /// Reads `SCHEMAFORM_ADDR`, `SCHEMAFORM_STATIC_DIR`,
    /// `SCHEMAFORM_RESEND_SECONDS` and `SCHEMAFORM_MAX_REACTION_PASSES`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            addr: lookup("SCHEMAFORM_ADDR").unwrap_or(defaults.addr),
            static_dir: lookup("SCHEMAFORM_STATIC_DIR").unwrap_or(defaults.static_dir),
            resend_seconds: parse_or(&lookup, "SCHEMAFORM_RESEND_SECONDS", defaults.resend_seconds),
            max_reaction_passes: parse_or(
                &lookup,
                "SCHEMAFORM_MAX_REACTION_PASSES",
                defaults.max_reaction_passes,
            ),
        }
    }
}

fn parse_or<T: FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "malformed setting, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(Settings::from_lookup(lookup(&[])), Settings::default());
        assert_eq!(Settings::default().resend_seconds, 60);
        assert_eq!(Settings::default().addr, "127.0.0.1:3000");
    }

    #[test]
    fn reads_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("SCHEMAFORM_ADDR", "0.0.0.0:8080"),
            ("SCHEMAFORM_RESEND_SECONDS", " 30 "),
            ("SCHEMAFORM_MAX_REACTION_PASSES", "4"),
        ]));
        assert_eq!(settings.addr, "0.0.0.0:8080");
        assert_eq!(settings.resend_seconds, 30);
        assert_eq!(settings.max_reaction_passes, 4);
        assert_eq!(settings.static_dir, "static");
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let settings = Settings::from_lookup(lookup(&[("SCHEMAFORM_RESEND_SECONDS", "soon")]));
        assert_eq!(settings.resend_seconds, 60);
    }
}

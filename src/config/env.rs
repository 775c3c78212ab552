//! Environment-variable overrides for configuration values.
//!
//! Each overridable key has exactly one variable. When the variable is set it
//! replaces the document value outright; when it is unset the document value
//! is used unmodified. Fields are independent of one another.

use crate::error::ConfigError;
use std::collections::HashMap;

pub const LOGGING_LEVEL: &str = "MANGA_TAGGER_LOGGING_LEVEL";
pub const LOGGING_CONSOLE: &str = "MANGA_TAGGER_LOGGING_CONSOLE";
pub const LOGGING_FILE: &str = "MANGA_TAGGER_LOGGING_FILE";
pub const LOGGING_JSON: &str = "MANGA_TAGGER_LOGGING_JSON";
pub const LOGGING_TCP: &str = "MANGA_TAGGER_LOGGING_TCP";
pub const LOGGING_JSON_TCP: &str = "MANGA_TAGGER_LOGGING_JSONTCP";
pub const DB_NAME: &str = "MANGA_TAGGER_DB_NAME";
pub const DB_HOST_ADDRESS: &str = "MANGA_TAGGER_DB_HOST_ADDRESS";
pub const DB_PORT: &str = "MANGA_TAGGER_DB_PORT";
pub const DB_USERNAME: &str = "MANGA_TAGGER_DB_USERNAME";
pub const DB_PASSWORD: &str = "MANGA_TAGGER_DB_PASSWORD";
pub const DB_AUTH_SOURCE: &str = "MANGA_TAGGER_DB_AUTH_SOURCE";
pub const DB_SELECTION_TIMEOUT: &str = "MANGA_TAGGER_DB_SELECTION_TIMEOUT";
pub const TIMEZONE: &str = "TZ";
pub const DRY_RUN: &str = "MANGA_TAGGER_DRY_RUN";
pub const DB_INSERT: &str = "MANGA_TAGGER_DB_INSERT";
pub const RENAME_FILE: &str = "MANGA_TAGGER_RENAME_FILE";
pub const WRITE_COMICINFO: &str = "MANGA_TAGGER_WRITE_COMICINFO";
pub const THREADS: &str = "MANGA_TAGGER_THREADS";
pub const MAX_QUEUE_SIZE: &str = "MANGA_TAGGER_MAX_QUEUE_SIZE";
pub const DEBUG_MODE: &str = "MANGA_TAGGER_DEBUG_MODE";

/// How a variable's text is turned into a setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Used as-is when non-empty.
    Text,
    /// `true` (any case) is true, any other value is false.
    Flag,
    /// Parsed as a signed integer.
    Integer,
}

/// One row of the override table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Override {
    pub key: &'static str,
    pub var: &'static str,
    pub coercion: Coercion,
}

const fn row(key: &'static str, var: &'static str, coercion: Coercion) -> Override {
    Override { key, var, coercion }
}

/// Every configuration key that can be overridden from the environment.
pub const OVERRIDES: &[Override] = &[
    row("logger.logging_level", LOGGING_LEVEL, Coercion::Text),
    row("logger.console.enabled", LOGGING_CONSOLE, Coercion::Flag),
    row("logger.file.enabled", LOGGING_FILE, Coercion::Flag),
    row("logger.json.enabled", LOGGING_JSON, Coercion::Flag),
    row("logger.tcp.enabled", LOGGING_TCP, Coercion::Flag),
    row("logger.json_tcp.enabled", LOGGING_JSON_TCP, Coercion::Flag),
    row("database.database_name", DB_NAME, Coercion::Text),
    row("database.host_address", DB_HOST_ADDRESS, Coercion::Text),
    row("database.port", DB_PORT, Coercion::Integer),
    row("database.username", DB_USERNAME, Coercion::Text),
    row("database.password", DB_PASSWORD, Coercion::Text),
    row("database.auth_source", DB_AUTH_SOURCE, Coercion::Text),
    row(
        "database.server_selection_timeout_ms",
        DB_SELECTION_TIMEOUT,
        Coercion::Integer,
    ),
    row("application.timezone", TIMEZONE, Coercion::Text),
    row("application.dry_run.enabled", DRY_RUN, Coercion::Flag),
    row("application.dry_run.database_insert", DB_INSERT, Coercion::Flag),
    row("application.dry_run.rename_file", RENAME_FILE, Coercion::Flag),
    row(
        "application.dry_run.write_comicinfo",
        WRITE_COMICINFO,
        Coercion::Flag,
    ),
    row("application.multithreading.threads", THREADS, Coercion::Integer),
    row(
        "application.multithreading.max_queue_size",
        MAX_QUEUE_SIZE,
        Coercion::Integer,
    ),
    row("application.debug_mode", DEBUG_MODE, Coercion::Flag),
];

/// Source of environment variables.
///
/// Production code reads the process environment through [`ProcessEnv`];
/// tests hand in a `HashMap` instead of mutating global state.
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl EnvSource for HashMap<&str, &str> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).map(|value| value.to_string())
    }
}

/// Applies overrides from an [`EnvSource`].
#[derive(Clone, Copy)]
pub struct EnvOverrides<'a> {
    env: &'a dyn EnvSource,
}

impl<'a> EnvOverrides<'a> {
    pub fn new(env: &'a dyn EnvSource) -> Self {
        Self { env }
    }

    /// Non-empty variable text, if any.
    pub fn text_var(&self, var: &str) -> Option<String> {
        self.env.var(var).filter(|value| !value.is_empty())
    }

    /// `Some(true)` only for a case-insensitive `true` with nothing around it;
    /// `Some(false)` for any other value that is present; `None` when unset.
    pub fn flag_var(&self, var: &str) -> Option<bool> {
        self.env
            .var(var)
            .map(|value| value.eq_ignore_ascii_case("true"))
    }

    /// Parsed integer when the variable is set.
    pub fn integer_var(&self, var: &'static str) -> Result<Option<i64>, ConfigError> {
        match self.env.var(var) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidInteger { var, value }),
        }
    }

    pub fn text(&self, var: &str, document: &str) -> String {
        self.text_var(var).unwrap_or_else(|| document.to_string())
    }

    pub fn flag(&self, var: &str, document: bool) -> bool {
        self.flag_var(var).unwrap_or(document)
    }

    pub fn integer(&self, var: &'static str, document: i64) -> Result<i64, ConfigError> {
        Ok(self.integer_var(var)?.unwrap_or(document))
    }

    /// Rows of [`OVERRIDES`] whose variable is currently set.
    pub fn active(&self) -> Vec<&'static Override> {
        OVERRIDES
            .iter()
            .filter(|row| self.env.var(row.var).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&'static str, &'static str)]) -> HashMap<&'static str, &'static str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_text_override_wins_when_set() {
        let vars = env(&[(DB_HOST_ADDRESS, "mongo.internal")]);
        let overrides = EnvOverrides::new(&vars);
        assert_eq!(overrides.text(DB_HOST_ADDRESS, "localhost"), "mongo.internal");
        assert_eq!(overrides.text(DB_NAME, "manga_tagger"), "manga_tagger");
    }

    #[test]
    fn test_empty_text_does_not_override() {
        let vars = env(&[(DB_USERNAME, "")]);
        let overrides = EnvOverrides::new(&vars);
        assert_eq!(overrides.text(DB_USERNAME, "manga_tagger"), "manga_tagger");
    }

    #[test]
    fn test_flag_parsing() {
        let vars = env(&[
            (DRY_RUN, "TRUE"),
            (DEBUG_MODE, "yes"),
            (RENAME_FILE, "false"),
            (DB_INSERT, ""),
        ]);
        let overrides = EnvOverrides::new(&vars);

        assert_eq!(overrides.flag_var(DRY_RUN), Some(true));
        assert_eq!(overrides.flag_var(DEBUG_MODE), Some(false));
        assert_eq!(overrides.flag_var(RENAME_FILE), Some(false));
        assert_eq!(overrides.flag_var(DB_INSERT), Some(false));
        assert_eq!(overrides.flag_var(WRITE_COMICINFO), None);

        // Present-but-not-true forces false even over a true document value.
        assert!(!overrides.flag(DEBUG_MODE, true));
        assert!(overrides.flag(WRITE_COMICINFO, true));
    }

    #[test]
    fn test_padded_true_is_false() {
        let vars = env(&[(DRY_RUN, " true"), (DEBUG_MODE, "true\n"), (RENAME_FILE, "True")]);
        let overrides = EnvOverrides::new(&vars);

        assert_eq!(overrides.flag_var(DRY_RUN), Some(false));
        assert_eq!(overrides.flag_var(DEBUG_MODE), Some(false));
        assert_eq!(overrides.flag_var(RENAME_FILE), Some(true));
        assert!(!overrides.flag(DEBUG_MODE, true));
    }

    #[test]
    fn test_integer_parsing() {
        let vars = env(&[(DB_PORT, " 27018 "), (THREADS, "-3")]);
        let overrides = EnvOverrides::new(&vars);

        assert_eq!(overrides.integer(DB_PORT, 27017).unwrap(), 27018);
        assert_eq!(overrides.integer(THREADS, 8).unwrap(), -3);
        assert_eq!(overrides.integer(MAX_QUEUE_SIZE, 4).unwrap(), 4);
    }

    #[test]
    fn test_non_numeric_integer_is_an_error() {
        let vars = env(&[(DB_PORT, "twenty")]);
        let overrides = EnvOverrides::new(&vars);

        match overrides.integer(DB_PORT, 27017) {
            Err(ConfigError::InvalidInteger { var, value }) => {
                assert_eq!(var, DB_PORT);
                assert_eq!(value, "twenty");
            }
            other => panic!("expected InvalidInteger, got {other:?}"),
        }
    }

    #[test]
    fn test_active_lists_only_set_variables() {
        let vars = env(&[(TIMEZONE, "UTC"), (THREADS, "2")]);
        let overrides = EnvOverrides::new(&vars);

        let keys: Vec<_> = overrides.active().iter().map(|row| row.key).collect();
        assert_eq!(
            keys,
            vec![
                "application.timezone",
                "application.multithreading.threads"
            ]
        );
    }

    #[test]
    fn test_override_table_has_unique_variables() {
        let mut vars: Vec<_> = OVERRIDES.iter().map(|row| row.var).collect();
        vars.sort_unstable();
        vars.dedup();
        assert_eq!(vars.len(), OVERRIDES.len());
    }
}

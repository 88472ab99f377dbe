//! Start-up configuration from environment variables.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `FUNCWIRE_LISTEN` | `fd:0` | See [`ListenAddr`] |
//! | `FUNCWIRE_JSON_ESCAPE_HTML` | `false` | Escape `<`, `>`, `&` in responses |
//! | `FUNCWIRE_JSON_INDENT_PREFIX` | empty | Prefix of indented lines |
//! | `FUNCWIRE_JSON_INDENT_VALUE` | empty | One indentation level |

use std::collections::HashMap;
use std::env;

use crate::codec::JsonOptions;
use crate::error::{FuncwireError, Result};
use crate::transport::ListenAddr;

pub const ENV_LISTEN: &str = "FUNCWIRE_LISTEN";
pub const ENV_JSON_ESCAPE_HTML: &str = "FUNCWIRE_JSON_ESCAPE_HTML";
pub const ENV_JSON_INDENT_PREFIX: &str = "FUNCWIRE_JSON_INDENT_PREFIX";
pub const ENV_JSON_INDENT_VALUE: &str = "FUNCWIRE_JSON_INDENT_VALUE";

/// Options read once at start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeConfig {
    /// Where the host connects.
    pub listen: ListenAddr,
    /// Serialization options for responses.
    pub json: JsonOptions,
}

impl ServeConfig {
    /// Creates new config from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env::vars().filter(|(key, _)| key.starts_with("FUNCWIRE_")))
    }

    /// Creates new config from key/value pairs named like the environment
    /// variables. Unknown keys are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let listen = match vars.get(ENV_LISTEN) {
            Some(addr) => addr.parse()?,
            None => ListenAddr::default(),
        };

        let escape_html = match vars.get(ENV_JSON_ESCAPE_HTML) {
            Some(value) => parse_bool(ENV_JSON_ESCAPE_HTML, value)?,
            None => false,
        };

        let json = JsonOptions {
            escape_html,
            indent_prefix: vars.get(ENV_JSON_INDENT_PREFIX).cloned().unwrap_or_default(),
            indent_value: vars.get(ENV_JSON_INDENT_VALUE).cloned().unwrap_or_default(),
        };

        Ok(Self { listen, json })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(FuncwireError::Config(format!(
            "{} must be a boolean, got {:?}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults() {
        let config = ServeConfig::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.listen, ListenAddr::Inherited);
        assert_eq!(config.json, JsonOptions::default());
    }

    #[test]
    fn test_all_values() {
        let config = ServeConfig::from_vars([
            (ENV_LISTEN, "unix:/run/fn.sock"),
            (ENV_JSON_ESCAPE_HTML, "TRUE"),
            (ENV_JSON_INDENT_PREFIX, "> "),
            (ENV_JSON_INDENT_VALUE, "\t"),
            ("UNRELATED", "x"),
        ])
        .unwrap();

        assert_eq!(config.listen, ListenAddr::Unix(PathBuf::from("/run/fn.sock")));
        assert!(config.json.escape_html);
        assert_eq!(config.json.indent_prefix, "> ");
        assert_eq!(config.json.indent_value, "\t");
    }

    #[test]
    fn test_invalid_bool() {
        let err = ServeConfig::from_vars([(ENV_JSON_ESCAPE_HTML, "maybe")]).unwrap_err();
        assert!(matches!(err, FuncwireError::Config(_)));
        assert!(err.to_string().contains(ENV_JSON_ESCAPE_HTML));
    }

    #[test]
    fn test_invalid_listen_addr() {
        let err = ServeConfig::from_vars([(ENV_LISTEN, "tcp:no-port")]).unwrap_err();
        assert!(matches!(err, FuncwireError::Config(_)));
    }
}

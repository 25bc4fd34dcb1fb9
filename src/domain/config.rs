use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration for a supplier network directory.
///
/// This struct holds settings that control how records are loaded and which
/// values administrative actions accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Whether to allow the record directories to contain files that cannot
    /// be parsed as records. Such files are skipped instead of failing the
    /// load.
    pub allow_unrecognised: bool,

    /// The maximum number of significant digits in a debt amount, including
    /// the two decimal places.
    max_debt_digits: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_unrecognised: false,
            max_debt_digits: default_max_debt_digits(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Returns the maximum number of significant digits in a debt amount.
    #[must_use]
    pub const fn max_debt_digits(&self) -> u8 {
        self.max_debt_digits
    }
}

const fn default_max_debt_digits() -> u8 {
    12
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        allow_unrecognised: bool,

        /// Digits in a debt amount, including the two decimal places.
        #[serde(default = "default_max_debt_digits")]
        max_debt_digits: u8,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                allow_unrecognised,
                max_debt_digits,
            } => Self {
                allow_unrecognised,
                max_debt_digits: max_debt_digits.max(2),
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            allow_unrecognised: config.allow_unrecognised,
            max_debt_digits: config.max_debt_digits,
        }
    }
}

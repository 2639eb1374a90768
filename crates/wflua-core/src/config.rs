//! Compositor option model.
//!
//! Options are grouped in named sections. Every option has a declared kind
//! and is set from its string form, the way Wayfire's `set_value_str` works:
//! the string is parsed for the option's kind and rejected if it does not
//! parse. The headless compositor keeps one [`Config`]; a real host keeps its
//! own and only exposes [`ConfigStore`](crate::ConfigStore).

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{ConfigError, OptionError};

/// Declared type of an option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionKind {
    Bool,
    Int,
    Double,
    String,
    /// A string restricted to a fixed set of values.
    Choice(Vec<String>),
}

/// Current value of an option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl OptionKind {
    /// Parse `raw` as a value of this kind.
    pub fn parse(&self, raw: &str) -> Option<OptionValue> {
        match self {
            Self::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(OptionValue::Bool(true)),
                "false" | "0" => Some(OptionValue::Bool(false)),
                _ => None,
            },
            Self::Int => raw.trim().parse().ok().map(OptionValue::Int),
            Self::Double => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(OptionValue::Double),
            Self::String => Some(OptionValue::String(raw.to_string())),
            Self::Choice(allowed) => allowed
                .iter()
                .any(|a| a == raw)
                .then(|| OptionValue::String(raw.to_string())),
        }
    }

    /// The kind a TOML value maps to, if any.
    fn of_toml(value: &toml::Value) -> Option<(Self, OptionValue)> {
        match value {
            toml::Value::Boolean(b) => Some((Self::Bool, OptionValue::Bool(*b))),
            toml::Value::Integer(i) => Some((Self::Int, OptionValue::Int(*i))),
            toml::Value::Float(f) => Some((Self::Double, OptionValue::Double(*f))),
            toml::Value::String(s) => Some((Self::String, OptionValue::String(s.clone()))),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A single typed option.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigOption {
    name: String,
    kind: OptionKind,
    value: OptionValue,
}

impl ConfigOption {
    /// Create an option. Returns `None` if `default` does not parse as `kind`.
    pub fn new(name: impl Into<String>, kind: OptionKind, default: &str) -> Option<Self> {
        let value = kind.parse(default)?;
        Some(Self {
            name: name.into(),
            kind,
            value,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &OptionKind {
        &self.kind
    }

    pub fn value(&self) -> &OptionValue {
        &self.value
    }

    /// Set the value from its string form. Returns `false` if it does not parse.
    pub fn set_value_str(&mut self, raw: &str) -> bool {
        match self.kind.parse(raw) {
            Some(value) => {
                self.value = value;
                true
            }
            None => false,
        }
    }
}

/// A named group of options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSection {
    name: String,
    options: IndexMap<String, ConfigOption>,
}

impl ConfigSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add (or replace) an option.
    pub fn with_option(mut self, option: ConfigOption) -> Self {
        self.register(option);
        self
    }

    pub fn register(&mut self, option: ConfigOption) {
        self.options.insert(option.name.clone(), option);
    }

    pub fn get_option(&self, name: &str) -> Option<&ConfigOption> {
        self.options.get(name)
    }

    pub fn get_option_mut(&mut self, name: &str) -> Option<&mut ConfigOption> {
        self.options.get_mut(name)
    }

    pub fn options(&self) -> impl Iterator<Item = &ConfigOption> {
        self.options.values()
    }
}

/// The full option tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    sections: IndexMap<String, ConfigSection>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subset of Wayfire's stock options, enough to exercise every kind.
    pub fn wayfire_defaults() -> Self {
        let mut config = Self::new();

        let core = [
            ConfigOption::new(
                "preferred_decoration_mode",
                OptionKind::Choice(vec!["client".into(), "server".into()]),
                "client",
            ),
            ConfigOption::new("plugins", OptionKind::String, "wflua"),
            ConfigOption::new("close_top_view", OptionKind::String, "<super> KEY_Q"),
            ConfigOption::new("vwidth", OptionKind::Int, "3"),
            ConfigOption::new("vheight", OptionKind::Int, "3"),
            ConfigOption::new("xwayland", OptionKind::Bool, "true"),
            ConfigOption::new("max_render_time", OptionKind::Int, "-1"),
        ];
        let input = [
            ConfigOption::new("cursor_theme", OptionKind::String, "default"),
            ConfigOption::new("cursor_size", OptionKind::Int, "24"),
            ConfigOption::new("mouse_cursor_speed", OptionKind::Double, "0.0"),
            ConfigOption::new("kb_repeat_rate", OptionKind::Int, "40"),
            ConfigOption::new("kb_repeat_delay", OptionKind::Int, "400"),
            ConfigOption::new("natural_scroll", OptionKind::Bool, "false"),
        ];

        for (name, options) in [("core", core.as_slice()), ("input", input.as_slice())] {
            let mut section = ConfigSection::new(name);
            for option in options.iter().flatten() {
                section.register(option.clone());
            }
            config.add_section(section);
        }

        config
    }

    /// Parse a TOML document whose top-level tables are sections.
    ///
    /// Option kinds are inferred from the TOML value types.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = source.parse()?;
        let mut config = Self::new();

        for (section_name, value) in table {
            let toml::Value::Table(options) = value else {
                return Err(ConfigError::NotASection { key: section_name });
            };

            let mut section = ConfigSection::new(&section_name);
            for (option_name, value) in options {
                let (kind, value) =
                    OptionKind::of_toml(&value).ok_or_else(|| ConfigError::Unsupported {
                        section: section_name.clone(),
                        option: option_name.clone(),
                    })?;
                section.register(ConfigOption {
                    name: option_name,
                    kind,
                    value,
                });
            }
            config.add_section(section);
        }

        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Overlay `other` onto `self`.
    ///
    /// Options that already exist keep their declared kind and take the
    /// overlay's value if it parses; new sections and options are added as-is.
    pub fn merge(&mut self, other: Config) {
        for (name, section) in other.sections {
            match self.sections.get_mut(&name) {
                Some(existing) => {
                    for (option_name, option) in section.options {
                        match existing.options.get_mut(&option_name) {
                            Some(current) => {
                                if !current.set_value_str(&option.value.to_string()) {
                                    tracing::warn!(
                                        section = %name,
                                        option = %option_name,
                                        "Ignoring config value of the wrong type"
                                    );
                                }
                            }
                            None => {
                                existing.options.insert(option_name, option);
                            }
                        }
                    }
                }
                None => {
                    self.sections.insert(name, section);
                }
            }
        }
    }

    pub fn add_section(&mut self, section: ConfigSection) {
        self.sections.insert(section.name.clone(), section);
    }

    pub fn get_section(&self, name: &str) -> Option<&ConfigSection> {
        self.sections.get(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &ConfigSection> {
        self.sections.values()
    }

    /// Look up an option's current value.
    pub fn get(&self, section: &str, option: &str) -> Option<&OptionValue> {
        self.sections
            .get(section)
            .and_then(|s| s.get_option(option))
            .map(ConfigOption::value)
    }

    /// Look up `section`, then `option`, then parse `value` for the option's kind.
    pub fn set_option_str(
        &mut self,
        section: &str,
        option: &str,
        value: &str,
    ) -> Result<(), OptionError> {
        let sec = self
            .sections
            .get_mut(section)
            .ok_or_else(|| OptionError::InvalidSection {
                section: section.to_string(),
            })?;

        let opt = sec
            .get_option_mut(option)
            .ok_or_else(|| OptionError::InvalidOption {
                section: section.to_string(),
                option: option.to_string(),
            })?;

        if opt.set_value_str(value) {
            tracing::debug!("Option set: {section}/{option} = {value}");
            Ok(())
        } else {
            Err(OptionError::InvalidValue {
                section: section.to_string(),
                option: option.to_string(),
                value: value.to_string(),
            })
        }
    }
}

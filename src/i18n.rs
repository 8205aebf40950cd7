use std::collections::{HashMap, HashSet};

use rust_embed::RustEmbed;
use serde::Deserialize;
use tracing::warn;

use crate::form::{ConstraintKind, Control, ControlKind};

pub const DEFAULT_LOCALE: &str = "en-US";

#[derive(RustEmbed)]
#[folder = "locales/"]
struct LocaleAssets;

#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize)]
#[serde(from = "String")]
pub enum Locale {
    #[default]
    System,
    Tag(String),
}

impl From<String> for Locale {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("system") {
            return Self::System;
        }
        Self::Tag(value.trim().to_string())
    }
}

impl From<&str> for Locale {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl Locale {
    fn requested(&self) -> Option<String> {
        match self {
            Locale::System => system_locale(),
            Locale::Tag(tag) => Some(tag.clone()),
        }
    }
}

#[cfg(feature = "i18n")]
fn system_locale() -> Option<String> {
    sys_locale::get_locale()
}

#[cfg(not(feature = "i18n"))]
fn system_locale() -> Option<String> {
    None
}

/// Localized native validation messages, keyed like `constraint.valuemissing`.
#[derive(Debug)]
pub struct MessageCatalog {
    locales: HashMap<String, HashMap<String, String>>,
    normalized_locale_lookup: HashMap<String, String>,
    language_lookup: HashMap<String, String>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::load()
    }
}

impl MessageCatalog {
    /// Loads the catalogs embedded from `locales/*.toml`.
    pub fn load() -> Self {
        let sources = LocaleAssets::iter()
            .filter_map(|file| {
                let locale = file.strip_suffix(".toml")?.to_string();
                let asset = LocaleAssets::get(&file)?;
                match std::str::from_utf8(&asset.data) {
                    Ok(text) => Some((locale, text.to_string())),
                    Err(error) => {
                        warn!(%locale, %error, "skipping locale catalog that is not utf-8");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();
        Self::from_sources(
            sources
                .iter()
                .map(|(locale, text)| (locale.as_str(), text.as_str())),
        )
    }

    /// Builds a catalog from `(locale, toml)` pairs. Unparsable sources are skipped.
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut locales = HashMap::new();
        let mut normalized_locale_lookup = HashMap::new();
        let mut language_lookup = HashMap::<String, String>::new();
        let mut ambiguous_languages = HashSet::new();

        for (locale, source) in sources {
            let table = match source.parse::<toml::Table>() {
                Ok(table) => table,
                Err(error) => {
                    warn!(%locale, %error, "skipping unparsable locale catalog");
                    continue;
                }
            };
            let mut entries = HashMap::new();
            flatten_table(&table, None, &mut entries);

            let normalized = normalize_locale_tag(locale);
            normalized_locale_lookup.insert(normalized.clone(), locale.to_string());

            let language = normalized.split('-').next().unwrap_or_default().to_string();
            if let Some(existing) = language_lookup.get(&language) {
                if existing != locale {
                    ambiguous_languages.insert(language.clone());
                }
            } else {
                language_lookup.insert(language, locale.to_string());
            }

            locales.insert(locale.to_string(), entries);
        }

        for language in ambiguous_languages {
            language_lookup.remove(&language);
        }

        if !locales.contains_key(DEFAULT_LOCALE) {
            locales.insert(DEFAULT_LOCALE.to_string(), HashMap::new());
            normalized_locale_lookup.insert(
                normalize_locale_tag(DEFAULT_LOCALE),
                DEFAULT_LOCALE.to_string(),
            );
        }

        Self {
            locales,
            normalized_locale_lookup,
            language_lookup,
        }
    }

    pub fn resolve_locale(&self, locale: &Locale) -> &str {
        let Some(requested) = locale.requested() else {
            return DEFAULT_LOCALE;
        };

        let normalized = normalize_locale_tag(&requested);
        if let Some(locale) = self.normalized_locale_lookup.get(&normalized) {
            return locale;
        }

        let language = normalized.split('-').next().unwrap_or_default();
        if let Some(locale) = self.language_lookup.get(language) {
            return locale;
        }

        DEFAULT_LOCALE
    }

    pub fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        self.locales
            .get(locale)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    pub fn has_key(&self, locale: &Locale, key: &str) -> bool {
        self.find(locale, key).is_some()
    }

    /// Translated text with `{param}` interpolation; falls back to the
    /// default locale, then to the key itself.
    pub fn t_with(&self, locale: &Locale, key: &str, params: &[(&str, &str)]) -> String {
        let raw = self.find(locale, key).unwrap_or(key);
        if params.is_empty() {
            return raw.to_string();
        }
        format_template(raw, params)
    }

    pub fn t(&self, locale: &Locale, key: &str) -> String {
        self.t_with(locale, key, &[])
    }

    /// Browser-style message for a failing native constraint on `control`.
    pub fn constraint_message(
        &self,
        locale: &Locale,
        kind: ConstraintKind,
        control: &Control,
    ) -> String {
        if kind == ConstraintKind::CustomError
            && let Some(message) = control
                .constraints()
                .custom_error
                .as_deref()
                .filter(|message| !message.is_empty())
        {
            return message.to_string();
        }

        let constraints = control.constraints();
        let length = control.raw_value().chars().count().to_string();
        let min_length = constraints.min_length.map(|v| v.to_string()).unwrap_or_default();
        let max_length = constraints.max_length.map(|v| v.to_string()).unwrap_or_default();
        let min = constraints.min.map(|v| v.normalize().to_string()).unwrap_or_default();
        let max = constraints.max.map(|v| v.normalize().to_string()).unwrap_or_default();
        let params = [
            ("length", length.as_str()),
            ("minlength", min_length.as_str()),
            ("maxlength", max_length.as_str()),
            ("min", min.as_str()),
            ("max", max.as_str()),
        ];

        let base = format!("constraint.{}", kind.key());
        let specific = variant_suffix(kind, control.kind()).map(|suffix| format!("{base}_{suffix}"));
        let key = specific
            .filter(|key| self.has_key(locale, key))
            .unwrap_or(base);
        self.t_with(locale, &key, &params)
    }

    /// Generic message shown when a custom rule itself fails.
    pub fn fault_message(&self, locale: &Locale) -> String {
        self.t(locale, "rule.fault")
    }

    fn find(&self, locale: &Locale, key: &str) -> Option<&str> {
        let resolved = self.resolve_locale(locale);
        self.lookup(resolved, key)
            .or_else(|| self.lookup(DEFAULT_LOCALE, key))
    }
}

fn variant_suffix(kind: ConstraintKind, control: ControlKind) -> Option<&'static str> {
    match (kind, control) {
        (ConstraintKind::ValueMissing, ControlKind::Checkbox) => Some("checkbox"),
        (ConstraintKind::ValueMissing, ControlKind::Radio) => Some("radio"),
        (ConstraintKind::ValueMissing, ControlKind::File) => Some("file"),
        (ConstraintKind::ValueMissing, ControlKind::Select | ControlKind::SelectMultiple) => {
            Some("select")
        }
        (ConstraintKind::TypeMismatch, ControlKind::Email) => Some("email"),
        (ConstraintKind::TypeMismatch, ControlKind::Url) => Some("url"),
        _ => None,
    }
}

fn flatten_table(table: &toml::Table, prefix: Option<&str>, out: &mut HashMap<String, String>) {
    for (key, value) in table {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            toml::Value::String(text) => {
                out.insert(path, text.clone());
            }
            toml::Value::Table(child) => flatten_table(child, Some(&path), out),
            _ => {}
        }
    }
}

fn normalize_locale_tag(tag: &str) -> String {
    let trimmed = tag.trim();
    let without_encoding = trimmed.split('.').next().unwrap_or(trimmed);
    let without_variant = without_encoding
        .split('@')
        .next()
        .unwrap_or(without_encoding);
    without_variant
        .replace('_', "-")
        .split('-')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

fn format_template(template: &str, params: &[(&str, &str)]) -> String {
    let values = params.iter().copied().collect::<HashMap<&str, &str>>();
    let mut output = String::with_capacity(template.len());
    let mut cursor = 0;

    while cursor < template.len() {
        let tail = &template[cursor..];
        let Some(open_rel) = tail.find('{') else {
            output.push_str(tail);
            break;
        };

        let open = cursor + open_rel;
        output.push_str(&template[cursor..open]);

        let token_start = open + 1;
        let Some(close_rel) = template[token_start..].find('}') else {
            output.push_str(&template[open..]);
            break;
        };
        let close = token_start + close_rel;
        let token = &template[token_start..close];

        if let Some(value) = values.get(token) {
            output.push_str(value);
        } else {
            output.push_str(&template[open..=close]);
        }

        cursor = close + 1;
    }

    output
}

//! Variant token tables.
//!
//! Tables are plain data: a list of literal words and a list of regular
//! expressions per class. The built-in tables cover Russian (Cyrillic),
//! Serbian (Latin) and English catalog names; a YAML file can append more
//! without touching the grouping code.
//!
//! ```yaml
//! color:
//!   words: [antracit, "боја меда"]
//! size:
//!   patterns: ['\b\d+\s?kom\b']
//! ```
//!
//! A pattern may name a `value` capture group to control which part of the
//! match is reported as the attribute value.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::VariantError;

/// Attribute classes a name token can belong to, in stripping order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariantClass {
    Color,
    Size,
    Model,
}

impl VariantClass {
    pub const ALL: [VariantClass; 3] = [
        VariantClass::Color,
        VariantClass::Size,
        VariantClass::Model,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VariantClass::Color => "color",
            VariantClass::Size => "size",
            VariantClass::Model => "model",
        }
    }
}

impl fmt::Display for VariantClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const COLOR_WORDS: &[&str] = &[
    // English
    "red", "blue", "green", "black", "white", "yellow", "grey", "gray", "pink", "purple",
    "orange", "brown", "beige", "navy", "silver", "gold", "violet", "turquoise", "burgundy",
    "khaki",
    // Serbian, uninflected
    "beo", "roze", "braon", "bež", "bordo", "teget", "krem",
];

const COLOR_PATTERNS: &[&str] = &[
    // Russian adjectives in every gender and number.
    r"\b(?:красн|син|зел[её]н|ч[её]рн|бел|ж[её]лт|сер|розов|фиолетов|оранжев|коричнев|голуб|бежев|бордов|золот|серебрист|бирюзов)(?:ый|ий|ой|ая|яя|ое|ее|ые|ие|ого|его)\b",
    // Serbian Latin adjectives.
    r"\b(?:crven|plav|zelen|crn|siv|žut|zut|ljubičast|ljubicast|narandžast|narandzast|smeđ|smedj|zlatn|srebrn|tirkizn|bel)(?:a|o|i|e|u|om)?\b",
];

const SIZE_WORDS: &[&str] = &[
    "xxs", "xs", "s", "m", "l", "xl", "xxl", "xxxl", "2xl", "3xl", "4xl", "5xl",
];

const SIZE_PATTERNS: &[&str] = &[
    // Explicit size label: "size M", "veličina 42", "размер 48".
    r"\b(?:size|veličina|velicina|vel\.|размер)\s*:?\s*(?P<value>[\p{L}\p{N}]+(?:[.,/-][\p{L}\p{N}]+)?)",
    // Quantity with a unit: "500 ml", "1,5l", "250 г", "128GB".
    r"\b\d+(?:[.,]\d+)?\s?(?:ml|l|g|kg|mg|cm|mm|m|gb|tb|mb|w|mah|мл|л|г|кг|мг|см|мм|м|гб|тб)\b",
    // Screen and pipe sizes in inches.
    r#"\b\d+(?:[.,]\d+)?\s?(?:inch(?:es)?\b|")"#,
    // Clothing ranges: "46-48", "50/52".
    r"\b\d{2}\s?[-/]\s?\d{2}\b",
    // Shoe sizes 35 to 47, halves included.
    r"\b(?:3[5-9]|4[0-7])(?:[.,]5)?\b",
];

const MODEL_WORDS: &[&str] = &[];

const MODEL_PATTERNS: &[&str] = &[
    // Version numbers: "v2", "ver. 3", "version 2.1", "версия 5".
    r"\b(?:v|ver\.?|version|верси[яи])\s?\d+(?:\.\d+)*\b",
    // Model years.
    r"\b(?:19|20)\d{2}\b",
    // Generations: "2nd gen", "3 generation", "2-го поколения", "generacija 4".
    r"\b\d+(?:st|nd|rd|th|-?го|-?е)?\s?(?:gen(?:eration)?|поколени[еяй]|generacij[aeu])\b",
    r"\b(?:gen(?:eration)?|generacija)\s?\d+\b",
];

/// Words and regular expressions for one class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PatternTable {
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl PatternTable {
    fn from_static(words: &[&str], patterns: &[&str]) -> Self {
        Self {
            words: words.iter().map(|w| (*w).to_string()).collect(),
            patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    fn append(&mut self, other: PatternTable) {
        self.words.extend(other.words);
        self.patterns.extend(other.patterns);
    }
}

/// The full set of tables, one per [`VariantClass`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PatternTables {
    #[serde(default)]
    pub color: PatternTable,
    #[serde(default)]
    pub size: PatternTable,
    #[serde(default)]
    pub model: PatternTable,
}

impl PatternTables {
    /// The tables shipped with the crate.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            color: PatternTable::from_static(COLOR_WORDS, COLOR_PATTERNS),
            size: PatternTable::from_static(SIZE_WORDS, SIZE_PATTERNS),
            model: PatternTable::from_static(MODEL_WORDS, MODEL_PATTERNS),
        }
    }

    /// Parses extension tables from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`VariantError::Yaml`] when the document does not match the
    /// table layout.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, VariantError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads extension tables from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`VariantError::Io`] if the file cannot be read, or
    /// [`VariantError::Yaml`] if it cannot be parsed.
    pub fn from_path(path: &Path) -> Result<Self, VariantError> {
        let raw = std::fs::read_to_string(path).map_err(|source| VariantError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Appends `other` after the entries already present.
    pub fn extend(&mut self, other: PatternTables) {
        self.color.append(other.color);
        self.size.append(other.size);
        self.model.append(other.model);
    }

    fn table(&self, class: VariantClass) -> &PatternTable {
        match class {
            VariantClass::Color => &self.color,
            VariantClass::Size => &self.size,
            VariantClass::Model => &self.model,
        }
    }
}

/// Compiled expressions for one class, in table order.
#[derive(Debug, Clone)]
pub(crate) struct CompiledClass {
    pub(crate) class: VariantClass,
    pub(crate) regexes: Vec<Regex>,
}

/// Compiled form of [`PatternTables`].
#[derive(Debug, Clone)]
pub struct PatternSet {
    pub(crate) classes: Vec<CompiledClass>,
}

static BUILTIN: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::compile(&PatternTables::builtin()).expect("built-in variant patterns are valid")
});

impl PatternSet {
    /// The compiled built-in tables.
    #[must_use]
    pub fn builtin() -> PatternSet {
        BUILTIN.clone()
    }

    /// Compiles every table.
    ///
    /// # Errors
    ///
    /// Returns [`VariantError::InvalidPattern`] for the first expression that
    /// does not compile.
    pub fn compile(tables: &PatternTables) -> Result<Self, VariantError> {
        let mut classes = Vec::with_capacity(VariantClass::ALL.len());
        for class in VariantClass::ALL {
            let table = tables.table(class);
            let mut regexes = Vec::new();
            if let Some(source) = words_pattern(&table.words) {
                regexes.push(build(class, &source)?);
            }
            for pattern in &table.patterns {
                regexes.push(build(class, &format!("(?i){pattern}"))?);
            }
            classes.push(CompiledClass { class, regexes });
        }
        Ok(Self { classes })
    }
}

fn build(class: VariantClass, source: &str) -> Result<Regex, VariantError> {
    Regex::new(source).map_err(|source_err| VariantError::InvalidPattern {
        class: class.as_str(),
        pattern: source.to_string(),
        source: source_err,
    })
}

/// One alternation over all literal words, longest first so that `xxl` wins
/// over `xl`. Word boundaries are only added on sides that start or end with
/// a letter or digit.
fn words_pattern(words: &[String]) -> Option<String> {
    let mut words: Vec<&str> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return None;
    }
    words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
    words.dedup();

    let alternatives: Vec<String> = words
        .iter()
        .map(|word| {
            let lead = if word.chars().next().is_some_and(char::is_alphanumeric) {
                r"\b"
            } else {
                ""
            };
            let tail = if word.chars().last().is_some_and(char::is_alphanumeric) {
                r"\b"
            } else {
                ""
            };
            format!("{lead}{}{tail}", regex::escape(word))
        })
        .collect();
    Some(format!("(?i)(?:{})", alternatives.join("|")))
}

//! Retrieval and output options accumulated by shell commands.
//!
//! Retrieval options (`CrawlOptions`) control what metadata is fetched and
//! how it is filtered; output options (`OutputOptions`) control how a loaded
//! catalog is rendered. Both are plain data, mutated by the option commands
//! and consumed by the loaders and the render engine.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use strum::{Display, EnumIter, EnumString};

/// How much metadata the loader retrieves.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InfoLevel {
    /// Tables and views only.
    Minimum,
    /// Plus columns and foreign key references.
    Standard,
    /// Plus routines, sequences and object definitions.
    Detailed,
    /// Plus table row counts.
    Maximum,
}

impl Default for InfoLevel {
    fn default() -> Self {
        InfoLevel::Standard
    }
}

/// A regular-expression inclusion or exclusion rule over object names.
///
/// An include rule keeps only matching names; an exclude rule drops matching
/// names. The original pattern text is retained for display and for the
/// option commands that report what was stored.
#[derive(Debug, Clone)]
pub struct InclusionRule {
    pattern: String,
    regex: Regex,
    exclude: bool,
}

impl InclusionRule {
    /// Compile an include rule. Fails on malformed patterns so the failure
    /// surfaces at command time, before any retrieval happens.
    pub fn include(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(pattern)?,
            exclude: false,
        })
    }

    /// Compile an exclude rule.
    pub fn exclude(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(pattern)?,
            exclude: true,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_exclude(&self) -> bool {
        self.exclude
    }

    /// Whether `name` passes the rule.
    pub fn accepts(&self, name: &str) -> bool {
        if self.exclude {
            !self.regex.is_match(name)
        } else {
            self.regex.is_match(name)
        }
    }
}

impl fmt::Display for InclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.exclude { "exclude" } else { "include" };
        write!(f, "{} /{}/", kind, self.pattern)
    }
}

/// Limit rules: which schema objects are retrieved at all.
#[derive(Debug, Clone, Default)]
pub struct LimitOptions {
    pub schemas: Option<InclusionRule>,
    pub table_types: Option<Vec<String>>,
    pub tables: Option<InclusionRule>,
    pub exclude_columns: Option<InclusionRule>,
    pub routine_types: Option<Vec<String>>,
    pub routines: Option<InclusionRule>,
    pub exclude_parameters: Option<InclusionRule>,
    pub synonyms: Option<InclusionRule>,
    pub sequences: Option<InclusionRule>,
}

/// Grep rules: which retrieved objects survive into the catalog.
#[derive(Debug, Clone, Default)]
pub struct GrepOptions {
    pub columns: Option<InclusionRule>,
    pub parameters: Option<InclusionRule>,
    pub definitions: Option<InclusionRule>,
    pub invert_match: bool,
    pub only_matching: bool,
}

impl GrepOptions {
    pub fn is_active(&self) -> bool {
        self.columns.is_some() || self.parameters.is_some() || self.definitions.is_some()
    }
}

/// Structural filters applied after grep matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterOptions {
    pub exclude_empty_tables: bool,
    pub parent_depth: u32,
    pub child_depth: u32,
}

/// The accumulated retrieval configuration handed to a catalog loader.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    pub info_level: InfoLevel,
    pub limit: LimitOptions,
    pub grep: GrepOptions,
    pub filter: FilterOptions,
}

/// Rendering formats. `dot` is the diagram format and needs an output file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
    Html,
    Dot,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Text
    }
}

impl OutputFormat {
    /// Diagram formats cannot be streamed to the console.
    pub fn is_diagram(&self) -> bool {
        matches!(self, OutputFormat::Dot)
    }
}

/// Display toggles for the text renderers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowOptions {
    pub no_info: bool,
    pub no_remarks: bool,
    pub weak_associations: bool,
    pub portable_names: bool,
}

/// Sort toggles for the text renderers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortOptions {
    pub tables: bool,
    pub columns: bool,
    pub parameters: bool,
}

/// The accumulated output configuration consumed by `execute`.
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub title: Option<String>,
    pub output_file: Option<PathBuf>,
    pub format: OutputFormat,
    pub show: ShowOptions,
    pub sort: SortOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[test]
    fn inclusion_rule_include_and_exclude() {
        let include = InclusionRule::include("public\\..*").unwrap();
        assert!(include.accepts("public.books"));
        assert!(!include.accepts("audit.books"));

        let exclude = InclusionRule::exclude(".*\\.password").unwrap();
        assert!(exclude.accepts("public.books.title"));
        assert!(!exclude.accepts("public.users.password"));
    }

    #[test]
    fn inclusion_rule_keeps_pattern_text() {
        let rule = InclusionRule::include("t.*t").unwrap();
        assert_eq!(rule.pattern(), "t.*t");
        assert_eq!(rule.to_string(), "include /t.*t/");
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        assert!(InclusionRule::include("[unclosed").is_err());
        assert!(InclusionRule::exclude("(?<bad").is_err());
    }

    #[rstest]
    #[case("minimum", InfoLevel::Minimum)]
    #[case("standard", InfoLevel::Standard)]
    #[case("detailed", InfoLevel::Detailed)]
    #[case("maximum", InfoLevel::Maximum)]
    fn info_level_parses(#[case] text: &str, #[case] expected: InfoLevel) {
        assert_eq!(InfoLevel::from_str(text).unwrap(), expected);
    }

    #[test]
    fn info_levels_are_ordered() {
        assert!(InfoLevel::Minimum < InfoLevel::Standard);
        assert!(InfoLevel::Detailed < InfoLevel::Maximum);
    }

    #[rstest]
    #[case("text", false)]
    #[case("json", false)]
    #[case("html", false)]
    #[case("dot", true)]
    fn diagram_formats(#[case] text: &str, #[case] diagram: bool) {
        let format = OutputFormat::from_str(text).unwrap();
        assert_eq!(format.is_diagram(), diagram);
    }

    #[test]
    fn grep_options_active_only_with_rules() {
        let mut grep = GrepOptions::default();
        assert!(!grep.is_active());
        grep.invert_match = true;
        assert!(!grep.is_active());
        grep.columns = Some(InclusionRule::include(".*").unwrap());
        assert!(grep.is_active());
    }
}

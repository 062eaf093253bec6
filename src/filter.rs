use crate::config::{FilterKind, FilterSpec, FragmentRule, ParamRule};
use crate::errors::ConfigError;
use crate::normalizer::html;
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use std::borrow::Cow;

/// A compiled normalization step with the name it was configured under
#[derive(Debug)]
pub struct NamedFilter {
    pub name: String,
    pub filter: Filter,
}

/// Compiled filters. Text filters map markup to markup, tree filters map a parsed document in place.
#[derive(Debug)]
pub enum Filter {
    StripParams(ParamStripper),
    CollapseWhitespace,
    RemoveElements(ElementRemover),
    ReplaceFragments(FragmentRewriter),
}

impl NamedFilter {
    /// Compile a filter from its configuration
    pub fn compile(spec: &FilterSpec) -> Result<Self, ConfigError> {
        let regex_error = |source: regex::Error| ConfigError::Regex {
            filter: spec.name.clone(),
            source,
        };

        let filter = match &spec.kind {
            FilterKind::StripParams { rules } => {
                Filter::StripParams(ParamStripper::new(rules).map_err(regex_error)?)
            }
            FilterKind::CollapseWhitespace => Filter::CollapseWhitespace,
            FilterKind::RemoveElements { selectors } => {
                Filter::RemoveElements(ElementRemover::new(&spec.name, selectors)?)
            }
            FilterKind::ReplaceFragments { rules } => {
                Filter::ReplaceFragments(FragmentRewriter::new(rules).map_err(regex_error)?)
            }
        };

        Ok(Self {
            name: spec.name.clone(),
            filter,
        })
    }

    /// Whether this filter operates on a parsed tree rather than markup text
    pub fn is_tree_filter(&self) -> bool {
        matches!(self.filter, Filter::RemoveElements(_))
    }
}

/// Removes volatile query parameters embedded anywhere in the markup
#[derive(Debug)]
pub struct ParamStripper {
    rules: Vec<Regex>,
}

impl ParamStripper {
    pub fn new(rules: &[ParamRule]) -> Result<Self, regex::Error> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            // A parameter starts after `?`, `&` or an escaped `&amp;`; the trailing
            // separator is captured so the rest of the query stays well-formed.
            let pattern = format!(
                r"(?P<sep>&amp;|[?&])(?i:(?:{}))=(?:{})(?P<tail>&amp;|&)?",
                rule.name, rule.pattern
            );
            compiled.push(Regex::new(&pattern)?);
        }
        Ok(Self { rules: compiled })
    }

    /// Strip every matching parameter, repeating until nothing matches
    pub fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        loop {
            let mut stripped = false;
            for rule in &self.rules {
                let next = match rule.replace_all(&current, keep_query_well_formed) {
                    Cow::Borrowed(_) => None,
                    Cow::Owned(s) => Some(s),
                };
                if let Some(s) = next {
                    current = s;
                    stripped = true;
                }
            }
            // Removing `?a&` leaves a fresh `?` in front of the next parameter
            if !stripped {
                return current;
            }
        }
    }
}

fn keep_query_well_formed(caps: &Captures) -> String {
    let sep = caps.name("sep").map(|m| m.as_str());
    match (sep, caps.name("tail")) {
        (Some("?"), Some(_)) => "?".to_string(),
        (_, Some(tail)) => tail.as_str().to_string(),
        _ => String::new(),
    }
}

/// Rewrites residual dynamic fragments to fixed placeholders
#[derive(Debug)]
pub struct FragmentRewriter {
    rules: Vec<(Regex, String)>,
}

impl FragmentRewriter {
    pub fn new(rules: &[FragmentRule]) -> Result<Self, regex::Error> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            compiled.push((Regex::new(&rule.pattern)?, rule.replacement.clone()));
        }
        Ok(Self { rules: compiled })
    }

    pub fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        for (regex, replacement) in &self.rules {
            let next = match regex.replace_all(&current, replacement.as_str()) {
                Cow::Borrowed(_) => None,
                Cow::Owned(s) => Some(s),
            };
            if let Some(s) = next {
                current = s;
            }
        }
        current
    }
}

/// Drops whole subtrees matching any of a set of CSS selectors
#[derive(Debug)]
pub struct ElementRemover {
    selectors: Vec<Selector>,
}

impl ElementRemover {
    pub fn new(filter_name: &str, selectors: &[String]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let parsed = Selector::parse(selector).map_err(|e| ConfigError::Selector {
                filter: filter_name.to_string(),
                selector: selector.clone(),
                message: e.to_string(),
            })?;
            compiled.push(parsed);
        }
        Ok(Self {
            selectors: compiled,
        })
    }

    /// Remove matching subtrees, returning how many elements were detached
    pub fn apply(&self, doc: &mut Html) -> usize {
        html::remove_matching(doc, &self.selectors)
    }
}

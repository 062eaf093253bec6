//! Canonicalization of raw HTML.
//!
//! A [`Normalizer`] runs an ordered list of named filters over a document.
//! Text filters see markup, tree filters see a parsed document; the document
//! is parsed or serialized on demand when consecutive filters disagree, and
//! the result is always serialized markup.

pub mod html;
pub mod text;

#[cfg(test)]
mod tests;

use crate::config::NormalizerConfig;
use crate::errors::ConfigError;
use crate::filter::{Filter, NamedFilter};
use scraper::Html;

/// The document as it moves through the pipeline
enum Document {
    Markup(String),
    Tree(Html),
}

impl Document {
    fn into_markup(self) -> String {
        match self {
            Document::Markup(markup) => markup,
            Document::Tree(doc) => html::serialize_stable(doc),
        }
    }

    fn into_tree(self) -> Html {
        match self {
            Document::Markup(markup) => html::parse(&markup),
            Document::Tree(doc) => doc,
        }
    }
}

/// Deterministic raw-HTML to canonical-text transform
#[derive(Debug)]
pub struct Normalizer {
    filters: Vec<NamedFilter>,
    max_passes: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::from_config(&NormalizerConfig::default()).expect("Default filters should be valid")
    }
}

impl Normalizer {
    /// Compile every configured filter, in order
    pub fn from_config(config: &NormalizerConfig) -> Result<Self, ConfigError> {
        let filters = config
            .filters
            .iter()
            .map(NamedFilter::compile)
            .collect::<Result<Vec<_>, _>>()?;

        ::log::debug!(
            "Compiled {} normalization filters ({} on the parsed tree)",
            filters.len(),
            filters.iter().filter(|f| f.is_tree_filter()).count()
        );

        Ok(Self {
            filters,
            max_passes: config.max_passes.max(1),
        })
    }

    /// Names of the filters in the order they run
    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name.as_str()).collect()
    }

    /// Produce the canonical text for a raw document.
    ///
    /// The pipeline is re-run on its own output until it stops changing, so
    /// that `normalize(normalize(x)) == normalize(x)`. Re-parsing can expose
    /// matches a single pass cannot see, such as a parameter hidden behind
    /// `&#38;` that serializes back as `&amp;`.
    pub fn normalize(&self, raw: &str) -> String {
        let mut current = self.run_pipeline(raw);

        for pass in 1..self.max_passes {
            let next = self.run_pipeline(&current);
            if next == current {
                ::log::trace!("Normalization settled after {} passes", pass + 1);
                return current;
            }
            current = next;
        }

        if self.max_passes > 1 {
            ::log::warn!(
                "Normalization still changing after {} passes; check the filter configuration",
                self.max_passes
            );
        }
        current
    }

    /// One application of every filter in order
    fn run_pipeline(&self, raw: &str) -> String {
        let mut doc = Document::Markup(raw.to_string());

        for named in &self.filters {
            ::log::trace!("Applying filter {}", named.name);
            doc = match &named.filter {
                Filter::StripParams(stripper) => Document::Markup(stripper.apply(&doc.into_markup())),
                Filter::CollapseWhitespace => {
                    Document::Markup(text::collapse_whitespace(&doc.into_markup()))
                }
                Filter::RemoveElements(remover) => {
                    let mut tree = doc.into_tree();
                    let removed = remover.apply(&mut tree);
                    if removed > 0 {
                        ::log::trace!("Filter {} removed {} elements", named.name, removed);
                    }
                    Document::Tree(tree)
                }
                Filter::ReplaceFragments(rewriter) => {
                    Document::Markup(rewriter.apply(&doc.into_markup()))
                }
            };
        }

        doc.into_markup()
    }
}

use scraper::{Html, Selector};

/// Parses markup into a best-effort document tree.
///
/// The HTML5 parsing algorithm never rejects input: unclosed and misnested
/// markup is repaired, and what could not be repaired is recorded in `errors`.
pub fn parse(markup: &str) -> Html {
    let doc = Html::parse_document(markup);
    if !doc.errors.is_empty() {
        ::log::trace!("Tolerated {} parse errors", doc.errors.len());
    }
    doc
}

/// Elements whose contents do not survive a serialize and re-parse.
///
/// `noscript` text is escaped on output but read back as raw text, so every
/// round trip adds a layer of `&amp;`. `plaintext` has no end tag, so the one
/// written on output is read back as content.
const UNSTABLE_ELEMENTS: &[&str] = &["noscript", "plaintext"];

/// Serializes a document tree back to markup
pub fn serialize(doc: &Html) -> String {
    doc.html()
}

/// Serializes a document tree after detaching elements that cannot round trip
pub fn serialize_stable(mut doc: Html) -> String {
    let unstable: Vec<Selector> = UNSTABLE_ELEMENTS
        .iter()
        .filter_map(|name| Selector::parse(name).ok())
        .collect();
    let dropped = remove_matching(&mut doc, &unstable);
    if dropped > 0 {
        ::log::trace!("Dropped {} elements that do not round trip", dropped);
    }
    serialize(&doc)
}

/// Detaches every element matching one of the selectors together with its subtree
pub fn remove_matching(doc: &mut Html, selectors: &[Selector]) -> usize {
    // Collect first: the tree cannot be mutated while a selection borrows it
    let ids: Vec<_> = selectors
        .iter()
        .flat_map(|selector| doc.select(selector).map(|element| element.id()))
        .collect();

    let mut removed = 0;
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
            removed += 1;
        }
    }

    ::log::trace!("Removed {} elements", removed);
    removed
}

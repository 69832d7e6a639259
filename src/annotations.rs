//! Reserved class annotations on `<img>` elements.
//!
//! Authors steer the optimiser from their markup with class names carrying
//! the `poi-` prefix:
//!
//! - `poi-no-optimise` leaves the image untouched.
//! - `poi-<key>` selects the `<key>` entry of the optimisation registry
//!   (`[optimisations.<key>]` in the config file).
//!
//! Every other class is ordinary styling and passes through.
//!
//! ## Ordering
//!
//! Classes are kept in first-occurrence order of the raw `class` attribute,
//! with duplicates dropped. Selector order is merge order, so
//! `class="poi-thumb poi-hq"` lets `hq` win over `thumb` on any field both set.

/// Prefix marking a class as an optimiser annotation.
pub const ANNOTATION_PREFIX: &str = "poi-";

/// Class that disables processing for an element.
pub const NO_OPTIMISE: &str = "poi-no-optimise";

/// A single class name, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation<'a> {
    /// `poi-no-optimise`.
    NoOptimise,
    /// `poi-<key>`; holds the registry key with the prefix stripped.
    Selector(&'a str),
    /// Any other class.
    Plain(&'a str),
}

/// Classify one class name.
///
/// - `"poi-no-optimise"` → `NoOptimise`
/// - `"poi-thumb"` → `Selector("thumb")`
/// - `"poi-"` → `Selector("")` (matches no registry entry)
/// - `"hero"`, `"POI-thumb"` → `Plain(..)` (the prefix is case-sensitive)
pub fn parse_annotation(class: &str) -> Annotation<'_> {
    if class == NO_OPTIMISE {
        return Annotation::NoOptimise;
    }
    match class.strip_prefix(ANNOTATION_PREFIX) {
        Some(key) => Annotation::Selector(key),
        None => Annotation::Plain(class),
    }
}

/// The class list of one element, in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassAnnotations {
    classes: Vec<String>,
}

impl ClassAnnotations {
    /// Split a raw `class` attribute value on ASCII whitespace.
    pub fn parse(class_attr: &str) -> Self {
        let mut classes: Vec<String> = Vec::new();
        for class in class_attr.split_ascii_whitespace() {
            if !classes.iter().any(|c| c == class) {
                classes.push(class.to_string());
            }
        }
        Self { classes }
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    /// True when the element carries `poi-no-optimise`.
    pub fn no_optimise(&self) -> bool {
        self.classes()
            .any(|c| parse_annotation(c) == Annotation::NoOptimise)
    }

    /// Registry keys selected by `poi-<key>` classes, in merge order.
    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.classes().filter_map(|c| match parse_annotation(c) {
            Annotation::Selector(key) => Some(key),
            _ => None,
        })
    }
}

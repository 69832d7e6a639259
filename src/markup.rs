//! Replacement markup for optimised images.
//!
//! An eligible `<img>` becomes:
//!
//! ```html
//! <picture>
//!   <source type="image/webp" srcset="{site_url}/photo_640.webp">
//!   <source type="image/png" srcset="{site_url}/photo_640.png">
//!   <img src="{site_url}/photo_640.png" alt="..." class="...">
//! </picture>
//! ```
//!
//! When captions are enabled and the original carried a non-blank `title`,
//! the picture is wrapped as
//! `<figure><figcaption>{title}</figcaption><picture>…</picture></figure>`.
//!
//! The fragment is rendered with maud (so URLs and caption text are escaped)
//! and parsed back into DOM nodes that the rewriter splices into the document.
//! Every attribute of the original element except `src` is then copied onto
//! the embedded `<img>`, in the original order.

use crate::annotations::ClassAnnotations;
use crate::imaging::{DerivativePair, OutputFormat};
use kuchikikiki::traits::TendrilSink;
use kuchikikiki::{ElementData, NodeRef};
use maud::{Markup, html};
use std::path::{Component, Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("rendered replacement has no <{0}> element")]
    Template(&'static str),
}

/// Typed view of one `<img>` element in a parsed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReference {
    /// The `src` attribute, if present.
    pub src: Option<String>,
    /// Parsed `class` attribute.
    pub annotations: ClassAnnotations,
    /// Every attribute in document order, `src` included.
    pub attributes: Vec<(String, String)>,
    /// Non-blank `title` attribute.
    pub title: Option<String>,
}

impl ImageReference {
    /// Read an element's attributes into a typed reference.
    pub fn from_element(element: &ElementData) -> Self {
        let attrs = element.attributes.borrow();
        let attributes: Vec<(String, String)> = attrs
            .map
            .iter()
            .map(|(name, attr)| {
                let key = match &attr.prefix {
                    Some(prefix) => format!("{}:{}", prefix, name.local),
                    None => name.local.to_string(),
                };
                (key, attr.value.clone())
            })
            .collect();

        let lookup = |key: &str| {
            attributes
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        Self {
            src: lookup("src"),
            annotations: ClassAnnotations::parse(&lookup("class").unwrap_or_default()),
            title: lookup("title").filter(|t| !t.trim().is_empty()),
            attributes,
        }
    }

    /// Attributes to carry onto the replacement `<img>`: everything but `src`.
    pub fn carried_attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .filter(|(k, _)| k != "src")
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Public URL of a derivative file.
///
/// Strips `output_root` from `path`, joins the remaining components with
/// `/`, and prefixes `site_url` (whose trailing `/` is not doubled).
///
/// ```
/// # use optimise_images::markup::derivative_url;
/// # use std::path::Path;
/// let url = derivative_url(
///     Path::new("/site/output/images/photo_640.webp"),
///     Path::new("/site/output"),
///     "https://example.com",
/// );
/// assert_eq!(url, "https://example.com/images/photo_640.webp");
/// ```
pub fn derivative_url(path: &Path, output_root: &Path, site_url: &str) -> String {
    let relative = path.strip_prefix(output_root).unwrap_or(path);
    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("{}/{}", site_url.trim_end_matches('/'), segments.join("/"))
}

/// Render the replacement fragment as markup.
pub fn render_replacement(
    optimised_url: &str,
    compatible: OutputFormat,
    compatible_url: &str,
    caption: Option<&str>,
) -> Markup {
    let picture = html! {
        picture {
            source type=(OutputFormat::WebP.mime_type()) srcset=(optimised_url);
            source type=(compatible.mime_type()) srcset=(compatible_url);
            img src=(compatible_url);
        }
    };
    match caption {
        Some(title) => html! {
            figure {
                figcaption { (title) }
                (picture)
            }
        },
        None => picture,
    }
}

/// The nodes to splice into a document.
#[derive(Debug, Clone)]
pub struct Replacement {
    /// Top-level node: `<figure>` or `<picture>`, detached.
    pub node: NodeRef,
    /// The `<img>` inside it.
    pub img: NodeRef,
}

/// Build the replacement for `reference` from its derivatives.
pub fn build_replacement(
    derivatives: &DerivativePair,
    reference: &ImageReference,
    create_captions: bool,
    site_url: &str,
    output_root: &Path,
) -> Result<Replacement, MarkupError> {
    let optimised_url = derivative_url(&derivatives.optimised, output_root, site_url);
    let compatible_url = derivative_url(&derivatives.compatible, output_root, site_url);
    let caption = reference.title.as_deref().filter(|_| create_captions);

    let markup = render_replacement(
        &optimised_url,
        derivatives.compatible_format(),
        &compatible_url,
        caption,
    );

    let fragment = kuchikikiki::parse_html().one(markup.into_string());
    let root_tag = if caption.is_some() { "figure" } else { "picture" };
    let node = fragment
        .select_first(root_tag)
        .map_err(|_| MarkupError::Template(root_tag))?
        .as_node()
        .clone();
    let img = node
        .select_first("img")
        .map_err(|_| MarkupError::Template("img"))?;

    {
        let mut attrs = img.attributes.borrow_mut();
        for (name, value) in reference.carried_attributes() {
            attrs.insert(name, value.to_string());
        }
    }

    let img = img.as_node().clone();
    node.detach();
    Ok(Replacement { node, img })
}

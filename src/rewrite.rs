//! Document rewriting.
//!
//! Walks the generated site, and in every HTML document replaces each
//! eligible `<img>` with a `<picture>` (or `<figure>`) backed by optimised
//! derivatives.
//!
//! ## Eligibility
//!
//! An `<img>` is processed when all of these hold:
//!
//! 1. it does not carry the `poi-no-optimise` class;
//! 2. its parent is not a `<picture>` (it has not been rewritten already);
//! 3. it has a non-empty `src`;
//! 4. the `src` is local: it starts with the site URL, or has no scheme and
//!    is not protocol-relative;
//! 5. the `src` path ends in `.png`, `.jpg` or `.jpeg` (any case);
//! 6. it resolves to an existing file under the output root.
//!
//! Anything else is reported as a [`SkipReason`] and left untouched.
//!
//! ## Writes
//!
//! A document is written back only when at least one reference was
//! replaced, so rerunning over an already processed site writes nothing.
//! A failure to decode or encode one image leaves that `<img>` as it was
//! and the rest of the document is still processed.

use crate::config::{ConfigRegistry, SiteConfig};
use crate::imaging::rust_backend::write_atomically;
use crate::imaging::{CodecError, DerivativePair, ImageCodec, optimise};
use crate::markup::{ImageReference, MarkupError, build_replacement};
use kuchikikiki::NodeRef;
use kuchikikiki::iter::NodeIterator;
use kuchikikiki::traits::TendrilSink;
use rayon::prelude::*;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("Markup error: {0}")]
    Markup(#[from] MarkupError),
}

/// Everything a rewrite pass needs, built once per run.
#[derive(Debug, Clone)]
pub struct RewriteSettings {
    /// Directory the site was generated into.
    pub output_root: PathBuf,
    /// Public URL of the site; empty for root-relative URLs.
    pub site_url: String,
    pub registry: ConfigRegistry,
    pub create_captions: bool,
}

impl RewriteSettings {
    pub fn from_site_config(output_root: impl Into<PathBuf>, config: &SiteConfig) -> Self {
        Self {
            output_root: output_root.into(),
            site_url: config.site_url.clone(),
            registry: config.optimisations.clone(),
            create_captions: config.create_captions,
        }
    }
}

/// Why an `<img>` was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoOptimise,
    InsidePicture,
    MissingSrc,
    ExternalSource,
    UnsupportedExtension,
    OutsideRoot,
    MissingSource(PathBuf),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoOptimise => write!(f, "marked poi-no-optimise"),
            SkipReason::InsidePicture => write!(f, "already inside <picture>"),
            SkipReason::MissingSrc => write!(f, "no src"),
            SkipReason::ExternalSource => write!(f, "not hosted by this site"),
            SkipReason::UnsupportedExtension => write!(f, "not a PNG or JPEG"),
            SkipReason::OutsideRoot => write!(f, "resolves outside the output directory"),
            SkipReason::MissingSource(path) => write!(f, "{} does not exist", path.display()),
        }
    }
}

/// Progress events for the CLI printer.
#[derive(Debug, Clone)]
pub enum RewriteEvent {
    ImageOptimised {
        document: PathBuf,
        source: PathBuf,
        derivatives: DerivativePair,
    },
    ImageSkipped {
        document: PathBuf,
        src: String,
        reason: SkipReason,
    },
    ImageFailed {
        document: PathBuf,
        source: PathBuf,
        stage: &'static str,
        error: String,
    },
    DocumentRewritten {
        document: PathBuf,
        replaced: usize,
    },
    DocumentFailed {
        document: PathBuf,
        error: String,
    },
}

/// Per-document tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub written: bool,
    pub optimised: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Site-wide tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub documents: usize,
    pub documents_written: usize,
    pub documents_failed: usize,
    pub images_optimised: usize,
    pub images_skipped: usize,
    pub images_failed: usize,
}

impl RewriteSummary {
    pub fn has_failures(&self) -> bool {
        self.documents_failed > 0 || self.images_failed > 0
    }

    fn add(&mut self, outcome: &DocumentOutcome) {
        self.documents += 1;
        if outcome.written {
            self.documents_written += 1;
        }
        self.images_optimised += outcome.optimised;
        self.images_skipped += outcome.skipped;
        self.images_failed += outcome.failed;
    }
}

fn emit(events: Option<&Sender<RewriteEvent>>, event: RewriteEvent) {
    if let Some(tx) = events {
        // A closed printer is not a processing error.
        let _ = tx.send(event);
    }
}

// ============================================================================
// Source locality
// ============================================================================

/// True when `src` starts with a URI scheme such as `https:` or `data:`.
fn has_scheme(src: &str) -> bool {
    let Some((scheme, _)) = src.split_once(':') else {
        return false;
    };
    scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn has_image_extension(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            ["png", "jpg", "jpeg"]
                .iter()
                .any(|ok| e.eq_ignore_ascii_case(ok))
        })
}

/// Map an `src` attribute to a file under the output root.
///
/// ```
/// # use optimise_images::rewrite::{RewriteSettings, resolve_source, SkipReason};
/// # use optimise_images::config::ConfigRegistry;
/// let settings = RewriteSettings {
///     output_root: "/nonexistent/output".into(),
///     site_url: "https://example.com".into(),
///     registry: ConfigRegistry::default(),
///     create_captions: true,
/// };
/// assert_eq!(
///     resolve_source("https://cdn.example.org/a.png", &settings),
///     Err(SkipReason::ExternalSource)
/// );
/// assert_eq!(
///     resolve_source("https://example.com/a.gif", &settings),
///     Err(SkipReason::UnsupportedExtension)
/// );
/// ```
pub fn resolve_source(src: &str, settings: &RewriteSettings) -> Result<PathBuf, SkipReason> {
    let local = match src.strip_prefix(settings.site_url.as_str()) {
        Some(rest) if !settings.site_url.is_empty() => rest,
        _ if has_scheme(src) || src.starts_with("//") => {
            return Err(SkipReason::ExternalSource);
        }
        _ => src,
    };

    if !has_image_extension(local) {
        return Err(SkipReason::UnsupportedExtension);
    }

    let relative = Path::new(local.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(SkipReason::OutsideRoot);
    }

    let path = settings.output_root.join(relative);
    if path.is_file() {
        Ok(path)
    } else {
        Err(SkipReason::MissingSource(path))
    }
}

fn inside_picture(node: &NodeRef) -> bool {
    node.parent()
        .is_some_and(|p| p.as_element().is_some_and(|e| &*e.name.local == "picture"))
}

/// Decide whether `reference` is processed, and find its source file.
fn eligible_source(
    node: &NodeRef,
    reference: &ImageReference,
    settings: &RewriteSettings,
) -> Result<PathBuf, SkipReason> {
    if reference.annotations.no_optimise() {
        return Err(SkipReason::NoOptimise);
    }
    if inside_picture(node) {
        return Err(SkipReason::InsidePicture);
    }
    match reference.src.as_deref().map(str::trim) {
        Some(src) if !src.is_empty() => resolve_source(src, settings),
        _ => Err(SkipReason::MissingSrc),
    }
}

// ============================================================================
// Documents
// ============================================================================

fn read_document(path: &Path) -> Result<String, RewriteError> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).map_err(|e| RewriteError::Parse {
        path: path.to_path_buf(),
        reason: format!("not valid UTF-8 ({e})"),
    })
}

/// Rewrite one HTML document in place.
///
/// References are handled in document order. The document is serialized and
/// written back only if at least one reference was replaced.
pub fn process_document(
    codec: &impl ImageCodec,
    path: &Path,
    settings: &RewriteSettings,
    events: Option<&Sender<RewriteEvent>>,
) -> Result<DocumentOutcome, RewriteError> {
    let html = read_document(path)?;
    let document = kuchikikiki::parse_html().one(html);

    // Collected up front: the tree is mutated while iterating.
    let images: Vec<_> = document
        .descendants()
        .elements()
        .filter(|e| &*e.name.local == "img")
        .collect();

    let mut outcome = DocumentOutcome::default();

    for img in images {
        let node = img.as_node();
        let reference = ImageReference::from_element(&img);

        let source = match eligible_source(node, &reference, settings) {
            Ok(source) => source,
            Err(reason) => {
                log::debug!(
                    "{}: skipping {:?}: {}",
                    path.display(),
                    reference.src.as_deref().unwrap_or(""),
                    reason
                );
                outcome.skipped += 1;
                emit(
                    events,
                    RewriteEvent::ImageSkipped {
                        document: path.to_path_buf(),
                        src: reference.src.clone().unwrap_or_default(),
                        reason,
                    },
                );
                continue;
            }
        };

        let config = settings.registry.resolve(&reference.annotations);
        let derivatives = match optimise(codec, &source, &config) {
            Ok(pair) => pair,
            Err(e) => {
                report_image_failure(path, &source, &e, events);
                outcome.failed += 1;
                continue;
            }
        };

        let replacement = build_replacement(
            &derivatives,
            &reference,
            settings.create_captions,
            &settings.site_url,
            &settings.output_root,
        )?;
        node.insert_before(replacement.node);
        node.detach();
        outcome.optimised += 1;

        emit(
            events,
            RewriteEvent::ImageOptimised {
                document: path.to_path_buf(),
                source,
                derivatives,
            },
        );
    }

    if outcome.optimised > 0 {
        let mut bytes = Vec::new();
        document.serialize(&mut bytes)?;
        write_atomically(path, &bytes)?;
        outcome.written = true;
        log::info!(
            "{}: replaced {} image(s)",
            path.display(),
            outcome.optimised
        );
        emit(
            events,
            RewriteEvent::DocumentRewritten {
                document: path.to_path_buf(),
                replaced: outcome.optimised,
            },
        );
    }

    Ok(outcome)
}

fn report_image_failure(
    document: &Path,
    source: &Path,
    error: &CodecError,
    events: Option<&Sender<RewriteEvent>>,
) {
    log::warn!(
        "{}: could not optimise {}: {}",
        document.display(),
        source.display(),
        error
    );
    emit(
        events,
        RewriteEvent::ImageFailed {
            document: document.to_path_buf(),
            source: source.to_path_buf(),
            stage: error.stage(),
            error: error.to_string(),
        },
    );
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

/// All `.htm`/`.html` files under `root`, sorted by path.
pub fn discover_documents(root: &Path) -> Result<Vec<PathBuf>, RewriteError> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && is_html(entry.path()) {
            documents.push(entry.into_path());
        }
    }
    Ok(documents)
}

/// Rewrite every document of the site in parallel.
///
/// A failing document is reported and does not stop the others.
pub fn rewrite_site(
    codec: &impl ImageCodec,
    settings: &RewriteSettings,
    events: Option<Sender<RewriteEvent>>,
) -> Result<RewriteSummary, RewriteError> {
    let documents = discover_documents(&settings.output_root)?;
    log::debug!(
        "{} document(s) under {}",
        documents.len(),
        settings.output_root.display()
    );

    let events = events.as_ref();
    let results: Vec<_> = documents
        .par_iter()
        .map(|document| {
            let result = process_document(codec, document, settings, events);
            if let Err(e) = &result {
                log::error!("{}: {}", document.display(), e);
                emit(
                    events,
                    RewriteEvent::DocumentFailed {
                        document: document.clone(),
                        error: e.to_string(),
                    },
                );
            }
            result
        })
        .collect();

    let mut summary = RewriteSummary::default();
    for result in &results {
        match result {
            Ok(outcome) => summary.add(outcome),
            Err(_) => {
                summary.documents += 1;
                summary.documents_failed += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Lossless, OptimisationOverride};
    use crate::imaging::RustCodec;
    use crate::imaging::backend::SourceFormat;
    use crate::imaging::backend::tests::MockCodec;
    use crate::test_helpers::{read, write_jpeg, write_png, write_text};
    use image::{DynamicImage, GenericImageView};
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn settings(root: &Path) -> RewriteSettings {
        RewriteSettings {
            output_root: root.to_path_buf(),
            site_url: String::new(),
            registry: ConfigRegistry::default(),
            create_captions: true,
        }
    }

    fn page(body: &str) -> String {
        format!("<!DOCTYPE html><html><head><title>t</title></head><body>{body}</body></html>")
    }

    // =========================================================================
    // Source locality
    // =========================================================================

    #[test]
    fn root_relative_src_resolves_under_output() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("images/a.png"), 4, 4);
        assert_eq!(
            resolve_source("/images/a.png", &settings(tmp.path())),
            Ok(tmp.path().join("images/a.png"))
        );
    }

    #[test]
    fn site_url_prefix_is_stripped() {
        let tmp = TempDir::new().unwrap();
        write_jpeg(&tmp.path().join("a.JPEG"), 4, 4);
        let mut s = settings(tmp.path());
        s.site_url = "https://example.com".into();
        assert_eq!(
            resolve_source("https://example.com/a.JPEG", &s),
            Ok(tmp.path().join("a.JPEG"))
        );
    }

    #[test]
    fn external_sources_are_skipped() {
        let s = settings(Path::new("/nowhere"));
        for src in [
            "http://other.org/a.png",
            "https://other.org/a.jpg",
            "//cdn.other.org/a.png",
            "data:image/png;base64,AAAA.png",
        ] {
            assert_eq!(resolve_source(src, &s), Err(SkipReason::ExternalSource), "{src}");
        }
    }

    #[test]
    fn other_host_is_external_even_with_site_url() {
        let mut s = settings(Path::new("/nowhere"));
        s.site_url = "https://example.com".into();
        assert_eq!(
            resolve_source("https://cdn.example.org/a.png", &s),
            Err(SkipReason::ExternalSource)
        );
    }

    #[test]
    fn unsupported_extensions_are_skipped() {
        let s = settings(Path::new("/nowhere"));
        for src in ["/a.gif", "/a.svg", "/a.png?v=2", "/a", "/a.webp"] {
            assert_eq!(
                resolve_source(src, &s),
                Err(SkipReason::UnsupportedExtension),
                "{src}"
            );
        }
    }

    #[test]
    fn parent_components_are_rejected() {
        let s = settings(Path::new("/nowhere"));
        assert_eq!(
            resolve_source("../secret.png", &s),
            Err(SkipReason::OutsideRoot)
        );
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            resolve_source("gone.png", &settings(tmp.path())),
            Err(SkipReason::MissingSource(tmp.path().join("gone.png")))
        );
    }

    // =========================================================================
    // Documents
    // =========================================================================

    #[test]
    fn png_reference_becomes_picture() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("images/photo.png"), 1200, 800);
        let doc = tmp.path().join("index.html");
        write_text(&doc, &page(r#"<p><img src="/images/photo.png" alt="A photo"></p>"#));

        let outcome =
            process_document(&RustCodec::new(), &doc, &settings(tmp.path()), None).unwrap();

        assert_eq!(
            outcome,
            DocumentOutcome {
                written: true,
                optimised: 1,
                skipped: 0,
                failed: 0
            }
        );
        let parsed = kuchikikiki::parse_html().one(read(&doc));
        let sources: Vec<(String, String)> = parsed
            .select("p > picture > source")
            .unwrap()
            .map(|s| {
                let attrs = s.attributes.borrow();
                (
                    attrs.get("type").unwrap_or_default().to_string(),
                    attrs.get("srcset").unwrap_or_default().to_string(),
                )
            })
            .collect();
        assert_eq!(
            sources,
            vec![
                ("image/webp".to_string(), "/images/photo_640.webp".to_string()),
                ("image/png".to_string(), "/images/photo_640.png".to_string()),
            ]
        );
        let img = parsed.select_first("picture > img").unwrap();
        assert_eq!(img.attributes.borrow().get("src"), Some("/images/photo_640.png"));
        assert_eq!(img.attributes.borrow().get("alt"), Some("A photo"));
        assert_eq!(parsed.select("img").unwrap().count(), 1);

        let png = image::open(tmp.path().join("images/photo_640.png")).unwrap();
        assert_eq!(png.dimensions(), (640, 426));
        assert!(tmp.path().join("images/photo_640.webp").is_file());
    }

    #[test]
    fn titled_jpeg_becomes_figure() {
        let tmp = TempDir::new().unwrap();
        write_jpeg(&tmp.path().join("a.jpg"), 100, 50);
        let doc = tmp.path().join("post.htm");
        write_text(&doc, &page(r#"<img src="a.jpg" title="Harbour">"#));

        process_document(&RustCodec::new(), &doc, &settings(tmp.path()), None).unwrap();

        let html = read(&doc);
        assert!(html.contains("<figure><figcaption>Harbour</figcaption><picture>"));
        assert!(html.contains(r#"srcset="/a_640.jpg""#));
        assert!(tmp.path().join("a_640.jpg").is_file());
    }

    #[test]
    fn no_optimise_leaves_document_untouched() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("a.png"), 10, 10);
        let doc = tmp.path().join("index.html");
        // Deliberately non-canonical markup: any rewrite would normalise it.
        let original = "<html><body><IMG class='poi-no-optimise' src=a.png></body></html>";
        write_text(&doc, original);

        let codec = MockCodec::default();
        let outcome = process_document(&codec, &doc, &settings(tmp.path()), None).unwrap();

        assert!(!outcome.written);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(read(&doc), original);
        assert!(codec.get_operations().is_empty());
        assert!(!tmp.path().join("a_640.webp").exists());
    }

    #[test]
    fn img_without_src_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let doc = tmp.path().join("index.html");
        let original = page(r#"<img alt="no source"><img src="   ">"#);
        write_text(&doc, &original);

        let (tx, rx) = mpsc::channel();
        let outcome =
            process_document(&MockCodec::default(), &doc, &settings(tmp.path()), Some(&tx))
                .unwrap();
        drop(tx);

        assert_eq!(
            outcome,
            DocumentOutcome {
                written: false,
                optimised: 0,
                skipped: 2,
                failed: 0
            }
        );
        assert_eq!(read(&doc), original);
        let reasons: Vec<_> = rx
            .iter()
            .filter_map(|e| match e {
                RewriteEvent::ImageSkipped { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec![SkipReason::MissingSrc, SkipReason::MissingSrc]);
    }

    #[cfg(unix)]
    #[test]
    fn rewritten_document_keeps_its_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("a.png"), 8, 8);
        let doc = tmp.path().join("index.html");
        write_text(&doc, &page(r#"<img src="/a.png">"#));
        std::fs::set_permissions(&doc, std::fs::Permissions::from_mode(0o640)).unwrap();

        let outcome =
            process_document(&RustCodec::new(), &doc, &settings(tmp.path()), None).unwrap();

        assert!(outcome.written);
        let mode = std::fs::metadata(&doc).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn second_pass_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("a.png"), 20, 20);
        let doc = tmp.path().join("index.html");
        write_text(&doc, &page(r#"<img src="/a.png">"#));
        let s = settings(tmp.path());

        process_document(&RustCodec::new(), &doc, &s, None).unwrap();
        let first = read(&doc);

        let codec = MockCodec::default();
        let outcome = process_document(&codec, &doc, &s, None).unwrap();

        assert!(!outcome.written);
        assert_eq!(outcome.optimised, 0);
        assert_eq!(read(&doc), first);
        assert!(codec.get_operations().is_empty());
    }

    #[test]
    fn attributes_survive_on_embedded_img() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("a.png"), 8, 8);
        let doc = tmp.path().join("index.html");
        write_text(
            &doc,
            &page(r#"<img id="hero" src="/a.png" alt="x" class="wide" loading="lazy">"#),
        );

        process_document(&RustCodec::new(), &doc, &settings(tmp.path()), None).unwrap();

        let parsed = kuchikikiki::parse_html().one(read(&doc));
        let img = parsed.select_first("picture > img").unwrap();
        let attrs = img.attributes.borrow();
        assert_eq!(attrs.get("id"), Some("hero"));
        assert_eq!(attrs.get("alt"), Some("x"));
        assert_eq!(attrs.get("class"), Some("wide"));
        assert_eq!(attrs.get("loading"), Some("lazy"));
        assert_eq!(attrs.get("src"), Some("/a_640.png"));
    }

    #[test]
    fn class_selector_applies_registry_entry() {
        let tmp = TempDir::new().unwrap();
        write_jpeg(&tmp.path().join("a.jpg"), 400, 400);
        let doc = tmp.path().join("index.html");
        write_text(&doc, &page(r#"<img class="poi-thumb" src="/a.jpg">"#));

        let mut s = settings(tmp.path());
        s.registry = ConfigRegistry::new().with(
            "thumb",
            OptimisationOverride {
                max_width: Some(100),
                lossless: Some(Lossless::Always),
                ..Default::default()
            },
        );

        process_document(&RustCodec::new(), &doc, &s, None).unwrap();

        let html = read(&doc);
        assert!(html.contains(r#"srcset="/a_100.webp""#));
        assert!(html.contains(r#"srcset="/a_100.png""#));
        assert!(html.contains(r#"type="image/png""#));
        assert_eq!(
            image::open(tmp.path().join("a_100.png")).unwrap().dimensions(),
            (100, 100)
        );
    }

    #[test]
    fn failed_image_is_left_and_rest_processed() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("a.png"), 8, 8);
        write_png(&tmp.path().join("b.png"), 8, 8);
        let doc = tmp.path().join("index.html");
        write_text(&doc, &page(r#"<img src="/a.png"><img src="/b.png">"#));

        // One decodable source: the first decode succeeds, the second fails.
        let codec =
            MockCodec::with_source(SourceFormat::Png, DynamicImage::new_rgb8(8, 8));
        let (tx, rx) = mpsc::channel();
        let outcome =
            process_document(&codec, &doc, &settings(tmp.path()), Some(&tx)).unwrap();
        drop(tx);

        assert_eq!(outcome.optimised, 1);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.written);

        let html = read(&doc);
        assert!(html.contains(r#"<img src="/a_640.png">"#));
        assert!(html.contains(r#"<img src="/b.png">"#));

        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(events[0], RewriteEvent::ImageOptimised { .. }));
        assert!(matches!(
            &events[1],
            RewriteEvent::ImageFailed { stage: "decode", source, .. }
                if source == &tmp.path().join("b.png")
        ));
        assert!(matches!(
            events[2],
            RewriteEvent::DocumentRewritten { replaced: 1, .. }
        ));
    }

    #[test]
    fn only_failures_means_no_write() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("a.png"), 8, 8);
        let doc = tmp.path().join("index.html");
        let original = page(r#"<img src="/a.png">"#);
        write_text(&doc, &original);

        let codec = MockCodec::default();
        let outcome = process_document(&codec, &doc, &settings(tmp.path()), None).unwrap();

        assert_eq!(outcome.failed, 1);
        assert!(!outcome.written);
        assert_eq!(read(&doc), original);
    }

    #[test]
    fn references_processed_in_document_order() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("b.png"), 8, 8);
        write_jpeg(&tmp.path().join("a.jpg"), 8, 8);
        let doc = tmp.path().join("index.html");
        write_text(
            &doc,
            &page(r#"<img src="/b.png"><img src="https://x.org/y.png"><img src="/a.jpg">"#),
        );

        let (tx, rx) = mpsc::channel();
        process_document(&RustCodec::new(), &doc, &settings(tmp.path()), Some(&tx)).unwrap();
        drop(tx);

        let order: Vec<String> = rx
            .iter()
            .filter_map(|e| match e {
                RewriteEvent::ImageOptimised { source, .. } => {
                    Some(source.file_name().unwrap().to_string_lossy().into_owned())
                }
                RewriteEvent::ImageSkipped { src, .. } => Some(src),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec!["b.png", "https://x.org/y.png", "a.jpg"]);
    }

    #[test]
    fn non_utf8_document_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let doc = tmp.path().join("bad.html");
        std::fs::write(&doc, [0xff, 0xfe, 0x00, 0x3c]).unwrap();
        let err = process_document(&MockCodec::default(), &doc, &settings(tmp.path()), None)
            .unwrap_err();
        assert!(matches!(err, RewriteError::Parse { .. }));
    }

    // =========================================================================
    // Site
    // =========================================================================

    #[test]
    fn discover_finds_html_recursively_sorted() {
        let tmp = TempDir::new().unwrap();
        write_text(&tmp.path().join("b.html"), "");
        write_text(&tmp.path().join("a/index.HTM"), "");
        write_text(&tmp.path().join("a/feed.xml"), "");
        write_text(&tmp.path().join("c.htmlx"), "");

        let found = discover_documents(tmp.path()).unwrap();
        assert_eq!(
            found,
            vec![tmp.path().join("a/index.HTM"), tmp.path().join("b.html")]
        );
    }

    #[test]
    fn site_summary_counts_every_document() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("img/a.png"), 30, 20);
        write_text(&tmp.path().join("index.html"), &page(r#"<img src="/img/a.png">"#));
        write_text(
            &tmp.path().join("posts/one.html"),
            &page(r#"<img src="/img/a.png" class="poi-no-optimise">"#),
        );
        std::fs::write(tmp.path().join("posts/bad.html"), [0xff, 0xff]).unwrap();

        let summary = rewrite_site(&RustCodec::new(), &settings(tmp.path()), None).unwrap();

        assert_eq!(
            summary,
            RewriteSummary {
                documents: 3,
                documents_written: 1,
                documents_failed: 1,
                images_optimised: 1,
                images_skipped: 1,
                images_failed: 0,
            }
        );
        assert!(summary.has_failures());
    }
}

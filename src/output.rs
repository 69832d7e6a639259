//! CLI output formatting.
//!
//! # Optimise
//!
//! ```text
//! Compatible: photos/sunset_640.jpg
//! Optimised:  photos/sunset_640.webp
//! Optimisation results:
//!
//! Original size:    812.4kB
//! Compatible size:  96.1kB (88.2%)
//! Optimised size:   61.0kB (92.5%)
//! ```
//!
//! Warnings come before the results when a derivative is larger than the
//! file it was meant to improve on. Sizes are kilobytes rounded to one
//! decimal; percentages are savings relative to the original.
//!
//! # Rewrite
//!
//! One line per event, prefixed with the document path relative to the
//! output root so lines from parallel documents stay attributable:
//!
//! ```text
//! blog/post.html: images/a.png → images/a_640.png, images/a_640.webp
//! blog/post.html: skipped https://cdn.example.org/b.jpg (not hosted by this site)
//! blog/post.html: rewritten (1 image)
//! Documents: 12 scanned, 3 rewritten, 0 failed
//! Images: 5 optimised, 9 skipped, 0 failed
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::imaging::DerivativePair;
use crate::rewrite::{RewriteEvent, RewriteSummary};
use std::path::Path;

/// Show `path` relative to `root` when it lies under it.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// optimise
// ============================================================================

/// File sizes, in bytes, of one optimisation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeReport {
    pub original: u64,
    pub compatible: u64,
    pub optimised: u64,
}

impl SizeReport {
    /// Read the sizes of the source and its derivatives from disk.
    pub fn measure(source: &Path, pair: &DerivativePair) -> std::io::Result<Self> {
        Ok(Self {
            original: std::fs::metadata(source)?.len(),
            compatible: std::fs::metadata(&pair.compatible)?.len(),
            optimised: std::fs::metadata(&pair.optimised)?.len(),
        })
    }
}

/// Bytes to kilobytes, rounded to one decimal.
fn kilobytes(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 * 10.0).round() / 10.0
}

fn saving(original_kb: f64, size_kb: f64) -> String {
    if original_kb <= 0.0 {
        return "n/a".to_string();
    }
    format!("{:.1}%", (original_kb - size_kb) / original_kb * 100.0)
}

/// Format the derivative paths written for a single image.
pub fn format_derivatives(pair: &DerivativePair) -> Vec<String> {
    vec![
        format!("Compatible: {}", pair.compatible.display()),
        format!("Optimised:  {}", pair.optimised.display()),
    ]
}

/// Format the size comparison for a single image.
pub fn format_size_report(report: &SizeReport) -> Vec<String> {
    let original = kilobytes(report.original);
    let compatible = kilobytes(report.compatible);
    let optimised = kilobytes(report.optimised);

    let mut lines = Vec::new();
    if compatible > original {
        lines.push(format!(
            "Warning: the output compatible format file ({compatible:.1}kB) is larger than the original ({original:.1}kB)"
        ));
    }
    if optimised > compatible {
        lines.push(format!(
            "Warning: the output optimised format file ({optimised:.1}kB) is larger than the compatible version ({compatible:.1}kB)"
        ));
    }
    lines.push("Optimisation results:".to_string());
    lines.push(String::new());
    lines.push(format!("Original size:    {original:.1}kB"));
    lines.push(format!(
        "Compatible size:  {compatible:.1}kB ({})",
        saving(original, compatible)
    ));
    lines.push(format!(
        "Optimised size:   {optimised:.1}kB ({})",
        saving(original, optimised)
    ));
    lines
}

pub fn print_optimise_output(pair: &DerivativePair, report: &SizeReport) {
    for line in format_derivatives(pair)
        .into_iter()
        .chain(format_size_report(report))
    {
        println!("{}", line);
    }
}

// ============================================================================
// rewrite
// ============================================================================

/// Format a single rewrite progress event.
pub fn format_rewrite_event(event: &RewriteEvent, root: &Path) -> Vec<String> {
    match event {
        RewriteEvent::ImageOptimised {
            document,
            source,
            derivatives,
        } => vec![format!(
            "{}: {} → {}, {}",
            display_path(document, root),
            display_path(source, root),
            display_path(&derivatives.compatible, root),
            display_path(&derivatives.optimised, root)
        )],
        RewriteEvent::ImageSkipped {
            document,
            src,
            reason,
        } => vec![format!(
            "{}: skipped {} ({})",
            display_path(document, root),
            if src.is_empty() { "<img>" } else { src },
            reason
        )],
        RewriteEvent::ImageFailed {
            document,
            source,
            stage,
            error,
        } => vec![
            format!(
                "{}: failed to {} {}",
                display_path(document, root),
                stage,
                display_path(source, root)
            ),
            format!("    {}", error),
        ],
        RewriteEvent::DocumentRewritten { document, replaced } => vec![format!(
            "{}: rewritten ({})",
            display_path(document, root),
            plural(*replaced, "image")
        )],
        RewriteEvent::DocumentFailed { document, error } => vec![
            format!("{}: failed", display_path(document, root)),
            format!("    {}", error),
        ],
    }
}

/// Format the closing summary of a rewrite run.
pub fn format_rewrite_summary(summary: &RewriteSummary) -> Vec<String> {
    vec![
        format!(
            "Documents: {} scanned, {} rewritten, {} failed",
            summary.documents, summary.documents_written, summary.documents_failed
        ),
        format!(
            "Images: {} optimised, {} skipped, {} failed",
            summary.images_optimised, summary.images_skipped, summary.images_failed
        ),
    ]
}

pub fn print_rewrite_summary(summary: &RewriteSummary) {
    for line in format_rewrite_summary(summary) {
        println!("{}", line);
    }
}

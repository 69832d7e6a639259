use clap::{Parser, Subcommand};
use optimise_images::config::{self, Lossless, OptimisationConfig};
use optimise_images::imaging::{self, RustCodec};
use optimise_images::output;
use optimise_images::rewrite::{self, RewriteSettings};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "optimise-images")]
#[command(about = "Serve WebP with a resized JPEG/PNG fallback for every image on a static site")]
#[command(long_about = "\
Serve WebP with a resized JPEG/PNG fallback for every image on a static site

Run 'rewrite' over a generated site: each <img> pointing at a local PNG or
JPEG gets two derivatives written next to the source

  images/photo.png  →  images/photo_640.png  (compatible, lossless for PNG)
                       images/photo_640.webp (optimised)

and is replaced in the HTML with a <picture> offering both. Images with a
title are wrapped in <figure> with the title as <figcaption>.

Per-image settings come from class annotations:

  <img class=\"poi-thumb\" ...>        applies [optimisations.thumb]
  <img class=\"poi-no-optimise\" ...>  is left untouched

Run 'optimise-images gen-config' to generate a documented optimise-images.toml.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimise a single image and report the size savings
    Optimise(OptimiseArgs),
    /// Rewrite every HTML document in a generated site
    Rewrite(RewriteArgs),
    /// Print a stock optimise-images.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct OptimiseArgs {
    /// The PNG or JPEG file to optimise
    image_file: PathBuf,

    /// The width to resize the image to
    #[arg(long, default_value_t = 640)]
    max_width: u32,

    /// Quality setting to use for WebP export
    #[arg(long, default_value_t = 65)]
    webp_quality: u32,

    /// Quality setting to use for JPEG export
    #[arg(long, default_value_t = 75)]
    jpeg_quality: u32,

    /// Force lossless output format
    #[arg(long, conflicts_with = "force_lossy")]
    force_lossless: bool,

    /// Force lossy output format
    #[arg(long)]
    force_lossy: bool,
}

#[derive(clap::Args)]
struct RewriteArgs {
    /// Directory the site was generated into
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Config file (stock defaults when absent)
    #[arg(long, default_value = config::CONFIG_FILENAME)]
    config: PathBuf,

    /// Public site URL, overriding `site_url` from the config file
    #[arg(long)]
    site_url: Option<String>,

    /// Never wrap images in <figure>, even when they have a title
    #[arg(long)]
    no_captions: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Optimise(args) => {
            if !args.image_file.is_file() {
                return Err(format!("{} is not a file", args.image_file.display()).into());
            }
            let lossless = if args.force_lossless {
                Lossless::Always
            } else if args.force_lossy {
                Lossless::Never
            } else {
                Lossless::Auto
            };
            let settings = OptimisationConfig {
                max_width: args.max_width,
                jpeg_quality: args.jpeg_quality,
                webp_quality: args.webp_quality,
                lossless,
            };
            settings.validate()?;

            let pair = imaging::optimise(&RustCodec::new(), &args.image_file, &settings)?;
            let report = output::SizeReport::measure(&args.image_file, &pair)?;
            output::print_optimise_output(&pair, &report);
        }
        Command::Rewrite(args) => {
            let mut site = config::load_config(&args.config)?;
            if let Some(url) = args.site_url {
                site.site_url = url;
            }
            if args.no_captions {
                site.create_captions = false;
            }
            if !args.output.is_dir() {
                return Err(format!("{} is not a directory", args.output.display()).into());
            }

            init_thread_pool(&site.processing);
            let settings = RewriteSettings::from_site_config(&args.output, &site);

            let (tx, rx) = std::sync::mpsc::channel();
            let root = args.output.clone();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_rewrite_event(&event, &root) {
                        println!("{}", line);
                    }
                }
            });
            let result = rewrite::rewrite_site(&RustCodec::new(), &settings, Some(tx));
            printer
                .join()
                .map_err(|_| "output thread panicked".to_string())?;
            let summary = result?;
            output::print_rewrite_summary(&summary);

            if summary.has_failures() {
                std::process::exit(1);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: the config can constrain down,
/// not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

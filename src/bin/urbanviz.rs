//! CLI for urbanviz - analyze, cluster, and reimagine urban photographs.

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use urbanviz::cluster::{ClusterConfig, ClusterCount, ClusterEngine, ClusterReport};
use urbanviz::features::FeatureBuilder;
use urbanviz::future::{FutureGenerator, FutureRequest, GeneratedArtifact, SourceImage};
use urbanviz::prompt::providers::{OpenAiPromptProvider, TemplatePromptProvider};
use urbanviz::prompt::{PromptBook, PromptGenerator, PromptProvider};
use urbanviz::store::{Gallery, ResultsLayout};
use urbanviz::streetview::{LocationQuery, StreetViewClient};
use urbanviz::synthesis::providers::{OpenAiImageProvider, StabilityModel, StabilityProvider};
use urbanviz::synthesis::{ImageProvider, TransformParams};
use urbanviz::vision::providers::OpenAiVisionProvider;
use urbanviz::vision::{load_records, AnalyzeOptions, ImageAnalyzer, ResizeOptions};
use urbanviz::Config;

#[derive(Parser)]
#[command(name = "urbanviz")]
#[command(about = "Cluster urban photographs by style and render speculative futures")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Results root directory (overrides URBANVIZ_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe every image in a directory with a vision model
    Analyze(AnalyzeArgs),

    /// Cluster the analyzed images by style
    Cluster(ClusterArgs),

    /// Write one image-to-image prompt per cluster
    Prompts(PromptsArgs),

    /// Transform a source image into an urban future
    Generate(GenerateArgs),

    /// List generated futures
    Gallery(GalleryArgs),

    /// List available providers and configured keys
    Providers(ProvidersArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Directory of input images
    #[arg(short, long, default_value = "images")]
    input: PathBuf,

    /// Only scan the top-level directory
    #[arg(long)]
    no_recursive: bool,

    /// Pause between API calls in milliseconds
    #[arg(long, default_value_t = 1000)]
    pause_ms: u64,

    /// Image detail sent to the vision model
    #[arg(long, value_enum, default_value = "low")]
    detail: DetailArg,

    /// Width images are resized to before analysis
    #[arg(long, alias = "resize_width", default_value_t = 1024)]
    resize_width: u32,

    /// Height images are resized to before analysis
    #[arg(long, alias = "resize_height", default_value_t = 1024)]
    resize_height: u32,

    /// Letterbox instead of stretching when resizing
    #[arg(long, alias = "preserve_aspect_ratio", default_value_t = true, action = clap::ArgAction::Set)]
    preserve_aspect_ratio: bool,

    /// Cap on the vision model's answer length
    #[arg(long, alias = "max_tokens", default_value_t = 300)]
    max_tokens: u32,
}

impl AnalyzeArgs {
    fn options(&self) -> AnalyzeOptions {
        let mut options = AnalyzeOptions::new(&self.input);
        options.recursive = !self.no_recursive;
        options.pause = Duration::from_millis(self.pause_ms);
        options.resize = ResizeOptions {
            width: self.resize_width,
            height: self.resize_height,
            preserve_aspect_ratio: self.preserve_aspect_ratio,
        };
        options
    }
}

#[derive(Args)]
struct ClusterArgs {
    /// Number of clusters
    #[arg(short = 'k', long, default_value_t = 5, conflicts_with = "auto")]
    clusters: usize,

    /// Pick the cluster count by silhouette score
    #[arg(long)]
    auto: bool,

    /// Smallest cluster count tried with --auto
    #[arg(long, default_value_t = 2, requires = "auto")]
    min_clusters: usize,

    /// Largest cluster count tried with --auto
    #[arg(long, default_value_t = 10, requires = "auto")]
    max_clusters: usize,

    /// Seed for k-means initialization
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Cluster raw TF-IDF values instead of z-scores
    #[arg(long)]
    no_standardize: bool,
}

#[derive(Args)]
struct PromptsArgs {
    /// Prompt provider
    #[arg(short, long, value_enum, default_value = "openai")]
    provider: PromptProviderArg,
}

#[derive(Args)]
#[command(group(ArgGroup::new("source").required(true).args(["place", "random", "image"])))]
struct GenerateArgs {
    /// Fetch Street View imagery for a place name
    #[arg(long)]
    place: Option<String>,

    /// Fetch Street View imagery at a random location
    #[arg(long)]
    random: bool,

    /// Use a local image file
    #[arg(long)]
    image: Option<PathBuf>,

    /// Cluster prompt to apply (key, label, or name)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Literal prompt text, bypassing the prompt file
    #[arg(long, conflicts_with = "prompt")]
    text: Option<String>,

    /// Synthesis provider
    #[arg(long, value_enum, default_value = "stability")]
    provider: SynthesisProviderArg,

    /// Stable Diffusion model (stability provider only)
    #[arg(long, value_enum, default_value = "sd3.5-medium")]
    sd_model: StabilityModelArg,

    /// How far the result may drift from the source (0.0 - 1.0)
    #[arg(long, default_value_t = 0.7)]
    strength: f32,

    /// Prompt adherence (1.0 - 10.0)
    #[arg(long, default_value_t = 5.0)]
    guidance: f32,

    /// Seed (0 = random)
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Args)]
struct GalleryArgs {
    /// Show at most this many entries
    #[arg(short, long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct ProvidersArgs {
    /// Verify the Google Maps key against the Street View metadata endpoint
    #[arg(long)]
    check_streetview: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DetailArg {
    Low,
    High,
    Auto,
}

impl DetailArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
            Self::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PromptProviderArg {
    Openai,
    Template,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SynthesisProviderArg {
    Stability,
    Openai,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StabilityModelArg {
    #[value(name = "sd3.5-large")]
    Large,
    #[value(name = "sd3.5-large-turbo")]
    LargeTurbo,
    #[value(name = "sd3.5-medium")]
    Medium,
}

impl From<StabilityModelArg> for StabilityModel {
    fn from(arg: StabilityModelArg) -> Self {
        match arg {
            StabilityModelArg::Large => Self::Sd35Large,
            StabilityModelArg::LargeTurbo => Self::Sd35LargeTurbo,
            StabilityModelArg::Medium => Self::Sd35Medium,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(root) = cli.root.clone() {
        config = config.with_root(root);
    }

    match cli.command {
        Commands::Analyze(args) => analyze(args, &config, cli.json).await,
        Commands::Cluster(args) => cluster(args, &config, cli.json),
        Commands::Prompts(args) => prompts(args, &config, cli.json).await,
        Commands::Generate(args) => generate(args, &config, cli.json).await,
        Commands::Gallery(args) => gallery(args, &config, cli.json),
        Commands::Providers(args) => list_providers(args, &config, cli.json).await,
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "urbanviz=info",
        1 => "urbanviz=debug",
        _ => "urbanviz=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn analyze(args: AnalyzeArgs, config: &Config, json_output: bool) -> anyhow::Result<()> {
    let provider = OpenAiVisionProvider::builder()
        .api_key(config.require_openai_key()?)
        .model(&config.vision_model)
        .detail(args.detail.as_str())
        .max_output_tokens(args.max_tokens)
        .timeout(config.http_timeout)
        .build()?;

    let layout = config.layout();
    layout.ensure_dirs()?;

    let options = args.options();

    let report = ImageAnalyzer::new(provider, layout)
        .run(&options)
        .await
        .with_context(|| format!("analysis of {} failed", args.input.display()))?;

    if report.records.is_empty() {
        anyhow::bail!("no images found in {}", args.input.display());
    }

    if json_output {
        print_json(&serde_json::json!({
            "type": "analysis",
            "success": report.analyzed() > 0,
            "output": report.output.display().to_string(),
            "analyzed": report.analyzed(),
            "failed": report.failed(),
        }))?;
    } else {
        println!(
            "Analyzed {} of {} images -> {}",
            report.analyzed(),
            report.records.len(),
            report.output.display()
        );
        for record in report.records.iter().filter(|r| !r.is_analyzed()) {
            println!("  [FAILED] {}: {}", record.id, record.analysis);
        }
    }

    if report.analyzed() == 0 {
        anyhow::bail!("every image failed analysis");
    }
    Ok(())
}

fn cluster(args: ClusterArgs, config: &Config, json_output: bool) -> anyhow::Result<()> {
    let layout = config.layout();
    let records = load_records(&layout.analysis_results())?;
    let matrix = FeatureBuilder::default().build(&records)?;

    let count = if args.auto {
        ClusterCount::Auto {
            min: args.min_clusters,
            max: args.max_clusters,
        }
    } else {
        ClusterCount::Fixed(args.clusters)
    };
    let cluster_config = ClusterConfig {
        standardize: !args.no_standardize,
        ..ClusterConfig::default()
    }
    .with_count(count)
    .with_seed(args.seed);

    let assignment = ClusterEngine::new(cluster_config).run_matrix(&matrix)?;
    let report = ClusterReport::build(&assignment, &records);
    let output = layout.cluster_results();
    report.save(&output)?;

    if json_output {
        print_json(&report)?;
        return Ok(());
    }

    println!(
        "Clustered {} images into {} clusters -> {}",
        matrix.len(),
        report.k,
        output.display()
    );
    for score in &report.candidate_scores {
        println!("  k={}: silhouette {:.3}", score.k, score.score);
    }
    for summary in &report.clusters {
        println!("\nCluster {} ({} images)", summary.label, summary.size);
        for line in summary.describe().lines() {
            println!("  {line}");
        }
    }
    Ok(())
}

async fn prompts(args: PromptsArgs, config: &Config, json_output: bool) -> anyhow::Result<()> {
    let layout = config.layout();
    let report = ClusterReport::load(&layout.cluster_results())?;

    let book = match args.provider {
        PromptProviderArg::Openai => {
            let provider = OpenAiPromptProvider::builder()
                .api_key(config.require_openai_key()?)
                .model(&config.prompt_model)
                .timeout(config.http_timeout)
                .build()?;
            write_prompts(provider, &report).await
        }
        PromptProviderArg::Template => write_prompts(TemplatePromptProvider::new(), &report).await,
    };

    let output = layout.cluster_prompts();
    book.save(&output)?;

    if json_output {
        print_json(&book)?;
    } else {
        println!("Wrote {} prompts -> {}\n", book.len(), output.display());
        for p in book.prompts() {
            let marker = if p.is_failed() { "[FAILED] " } else { "" };
            println!("{}{} ({}, {} images)", marker, p.name, p.key(), p.size);
            println!("  {}", p.prompt);
        }
    }

    if !book.is_empty() && book.prompts().iter().all(|p| p.is_failed()) {
        anyhow::bail!("every prompt failed to generate");
    }
    Ok(())
}

async fn write_prompts<P: PromptProvider>(provider: P, report: &ClusterReport) -> PromptBook {
    PromptGenerator::new(provider).run(report).await
}

async fn generate(args: GenerateArgs, config: &Config, json_output: bool) -> anyhow::Result<()> {
    let layout = config.layout();
    layout.ensure_dirs()?;

    let params = TransformParams {
        strength: args.strength,
        guidance_scale: args.guidance,
        seed: args.seed,
    };
    params.validate()?;

    let (prompt_name, prompt) = match args.text {
        Some(text) => (None, text),
        None => {
            let book = PromptBook::load(&layout.cluster_prompts())?;
            let (name, text) = book.resolve(args.prompt.as_deref());
            (Some(name), text)
        }
    };

    let source = if let Some(path) = args.image {
        SourceImage::from_file(&path)?
    } else {
        let streetview = StreetViewClient::builder()
            .api_key(config.require_google_maps_key()?)
            .timeout(config.http_timeout)
            .build()?;
        let image = match args.place {
            Some(place) => streetview
                .fetch(&LocationQuery::Place(place.clone()))
                .await
                .with_context(|| format!("no usable Street View image for {place}"))?,
            None => streetview.find_random().await?,
        };
        SourceImage::from_street_view(image)
    };

    let mut request = FutureRequest::new(source, prompt).with_params(params);
    if let Some(name) = prompt_name {
        request = request.with_prompt_name(name);
    }

    let artifact = match args.provider {
        SynthesisProviderArg::Stability => {
            let provider = StabilityProvider::builder()
                .api_key(config.require_stability_key()?)
                .model(args.sd_model.into())
                .timeout(config.http_timeout)
                .build()?;
            run_generator(provider, layout, request).await?
        }
        SynthesisProviderArg::Openai => {
            let provider = OpenAiImageProvider::builder()
                .api_key(config.require_openai_key()?)
                .timeout(config.http_timeout)
                .build()?;
            run_generator(provider, layout, request).await?
        }
    };

    if json_output {
        print_json(&artifact)?;
    } else {
        println!(
            "Generated future: {} via {}",
            artifact.output_image.display(),
            artifact.provider
        );
        println!("Source: {}", artifact.source_image.display());
        if let Some(name) = &artifact.prompt_name {
            println!("Prompt: {name}");
        }
        if let Some(duration) = artifact.duration_ms {
            println!("Duration: {}ms", duration);
        }
    }
    Ok(())
}

async fn run_generator<P: ImageProvider>(
    provider: P,
    layout: ResultsLayout,
    request: FutureRequest,
) -> anyhow::Result<GeneratedArtifact> {
    let name = provider.name().to_string();
    FutureGenerator::new(provider, layout)
        .generate(request)
        .await
        .with_context(|| format!("generation with {name} failed"))
}

fn gallery(args: GalleryArgs, config: &Config, json_output: bool) -> anyhow::Result<()> {
    let mut entries = Gallery::new(&config.layout()).entries()?;
    if let Some(limit) = args.limit {
        entries.truncate(limit);
    }

    if json_output {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No generated futures yet.");
        return Ok(());
    }
    for entry in &entries {
        let missing = if entry.exists { "" } else { " [MISSING]" };
        println!("{}{}", entry.image.display(), missing);
        if let Some(artifact) = &entry.artifact {
            println!(
                "  {} | {}",
                artifact.created_at.format("%Y-%m-%d %H:%M:%S"),
                artifact.prompt_name.as_deref().unwrap_or("custom prompt")
            );
        }
        println!("  {}", entry.prompt);
    }
    Ok(())
}

async fn list_providers(args: ProvidersArgs, config: &Config, json_output: bool) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct ProviderInfo {
        name: &'static str,
        stage: &'static str,
        env_var: &'static str,
        configured: bool,
    }

    let openai = config.openai_api_key.is_some();
    let providers = vec![
        ProviderInfo {
            name: "OpenAI vision (Responses API)",
            stage: "analyze",
            env_var: "OPENAI_API_KEY",
            configured: openai,
        },
        ProviderInfo {
            name: "OpenAI prompts (Responses API)",
            stage: "prompts",
            env_var: "OPENAI_API_KEY",
            configured: openai,
        },
        ProviderInfo {
            name: "Template prompts (offline)",
            stage: "prompts",
            env_var: "-",
            configured: true,
        },
        ProviderInfo {
            name: "Stable Diffusion 3 (Stability AI)",
            stage: "generate",
            env_var: "STABILITY_API_KEY",
            configured: config.stability_api_key.is_some(),
        },
        ProviderInfo {
            name: "OpenAI image edits",
            stage: "generate",
            env_var: "OPENAI_API_KEY",
            configured: openai,
        },
        ProviderInfo {
            name: "Google Street View Static API",
            stage: "generate",
            env_var: "GOOGLE_MAPS_API_KEY",
            configured: config.google_maps_api_key.is_some(),
        },
    ];

    let streetview_status = if args.check_streetview {
        let client = StreetViewClient::builder()
            .api_key(config.require_google_maps_key()?)
            .timeout(config.http_timeout)
            .build()?;
        Some(client.check_key().await?)
    } else {
        None
    };

    if json_output {
        print_json(&serde_json::json!({
            "providers": providers,
            "streetview_status": streetview_status,
        }))?;
        return Ok(());
    }

    println!("Available providers:\n");
    for stage in ["analyze", "prompts", "generate"] {
        println!("{}:", stage.to_uppercase());
        for p in providers.iter().filter(|p| p.stage == stage) {
            let status = if p.configured { "✓" } else { "✗" };
            println!("  {} {}", status, p.name);
            println!("    API key: {}", p.env_var);
        }
    }
    if let Some(status) = streetview_status {
        println!("\nStreet View metadata check: {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_args(argv: &[&str]) -> AnalyzeArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Analyze(args) => args,
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_analyze_defaults() {
        let args = analyze_args(&["urbanviz", "analyze"]);
        assert_eq!(args.max_tokens, 300);
        let options = args.options();
        assert_eq!(options.resize, ResizeOptions::default());
        assert!(options.recursive);
        assert_eq!(options.pause, Duration::from_secs(1));
    }

    #[test]
    fn test_analyze_resize_flags() {
        let args = analyze_args(&[
            "urbanviz",
            "analyze",
            "--input",
            "photos",
            "--resize-width",
            "512",
            "--resize-height",
            "384",
            "--preserve-aspect-ratio",
            "false",
            "--max_tokens",
            "600",
            "--no-recursive",
        ]);
        assert_eq!(args.max_tokens, 600);
        let options = args.options();
        assert_eq!(options.input_dir, PathBuf::from("photos"));
        assert!(!options.recursive);
        assert_eq!(
            options.resize,
            ResizeOptions {
                width: 512,
                height: 384,
                preserve_aspect_ratio: false,
            }
        );
    }
}

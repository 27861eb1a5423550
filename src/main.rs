use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser};

use style_transplant::config::{
    find_default_config, init_default_config, load_config, AppConfig, DEFAULT_CONFIG_FILE,
};
use style_transplant::docx::package::{verify_passthrough, DOCUMENT_PART, STYLES_PART};
use style_transplant::pipeline::{dump_catalog, find_styles_by_text, ProcessingStats, Transplant};
use style_transplant::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "style-transplant")]
#[command(about = "Re-style a .docx with another document's style catalog", long_about = None)]
struct Args {
    /// Write a default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Template .docx whose styles are applied
    #[arg(short, long, value_name = "DOCX")]
    template: Option<PathBuf>,

    /// Target .docx whose content is kept
    #[arg(value_name = "DOCX")]
    target: Option<PathBuf>,

    /// Output .docx (default: processed_<target file name> next to the target)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Config file path (default: search for style-transplant.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the paragraphs/tables of the target containing TEXT with their styles, as JSON
    #[arg(long, value_name = "TEXT")]
    find: Option<String>,

    /// Print the style catalogs of the given packages as JSON, then exit
    #[arg(long)]
    dump_styles: bool,

    /// After writing, check that every untouched part matches the target byte for byte
    #[arg(long)]
    verify: bool,

    /// Print processing stats as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn default_output_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("output.docx");
    target.with_file_name(format!("processed_{name}"))
}

fn resolve_config(args: &Args, target: &Path) -> anyhow::Result<AppConfig> {
    let workdir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let path = match args.config.clone() {
        Some(p) => Some(p),
        None => find_default_config(workdir, DEFAULT_CONFIG_FILE),
    };
    match path {
        Some(p) => {
            log::info!("Config: {}", p.display());
            load_config(&p)
        }
        None => Ok(AppConfig::default()),
    }
}

fn report(progress: &ConsoleProgress, stats: &ProcessingStats) {
    progress.info(format!(
        "Paragraphs: {}  Tables: {}  Styles: template {} / target {}",
        stats.paragraphs(),
        stats.tables(),
        stats.template_styles(),
        stats.target_styles()
    ));
    let refs = stats.references();
    progress.info(format!(
        "References: {} (paragraph {}, run {}, table {}), distinct ids {}",
        stats.references_total(),
        refs.paragraph,
        refs.run,
        refs.table,
        stats.used_ids()
    ));
    progress.info(format!(
        "Rewritten: {}  Untouched: {}  Ids mapped: {}  Unmapped: {}",
        stats.rewritten_total(),
        stats.untouched_total(),
        stats.ids_mapped(),
        stats.ids_unmapped()
    ));
    progress.info(format!(
        "Style part: {} removed, {} inserted, defaults {}",
        stats.styles_removed(),
        stats.styles_inserted(),
        if stats.defaults_replaced() {
            "replaced"
        } else {
            "dropped"
        }
    ));
    for (from, mapped) in stats.mapping().iter() {
        log::debug!("{from} -> {} ({:?})", mapped.template_id, mapped.rule);
    }
    for diag in stats.diagnostics() {
        progress.warn(diag.to_string());
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.json);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        log::info!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    if args.dump_styles {
        let mut dumps = Vec::new();
        for path in args.template.iter().chain(args.target.iter()) {
            dumps.push(dump_catalog(path).with_context(|| format!("dump {}", path.display()))?);
        }
        anyhow::ensure!(!dumps.is_empty(), "--dump-styles needs --template and/or a target");
        println!("{}", serde_json::to_string_pretty(&dumps)?);
        return Ok(());
    }

    let target = match args.target.clone() {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  style-transplant -t <template.docx> <target.docx> [-o <output.docx>]\n  style-transplant --find <TEXT> <target.docx>\n"
            );
            return Ok(());
        }
    };

    if let Some(needle) = args.find.as_deref() {
        let found = find_styles_by_text(&target, needle)
            .with_context(|| format!("query {}", target.display()))?;
        for diag in found.iter().filter_map(|o| o.diagnostic()) {
            progress.warn(diag.to_string());
        }
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    let template = args
        .template
        .clone()
        .context("missing -t/--template")?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_for(&target));
    let cfg = resolve_config(&args, &target).context("load config")?;

    progress.info(format!("Template: {}", template.display()));
    progress.info(format!("Target: {}", target.display()));
    let stats = Transplant::new(cfg.mapping_rules())
        .process(&template, &target, &output)
        .context("transplant styles")?;
    progress.info(format!("Wrote output: {}", output.display()));
    report(&progress, &stats);

    if args.verify {
        let mut modified = vec![STYLES_PART];
        if stats.content_rewritten() {
            modified.push(DOCUMENT_PART);
        }
        let check = verify_passthrough(&target, &output, &modified).context("verify output")?;
        anyhow::ensure!(
            check.is_clean(),
            "output differs from target outside the rewritten parts: changed {:?}, missing {:?}",
            check.changed,
            check.missing
        );
        progress.info(format!("Verified {} untouched part(s)", check.checked));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

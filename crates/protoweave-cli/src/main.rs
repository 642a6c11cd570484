//! protoweave - Generate protobuf schemas from declarative schema units
//!
//! This tool reads a project file declaring schema units, discovers the types
//! each unit owns from the supplied metadata, and writes one `.proto` schema
//! per unit plus its adapter plan and a registration manifest.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use protoweave_core::emit::{EmittedUnit, SchemaEmitter, DEFAULT_MANIFEST_NAME};
use protoweave_core::{Diagnostic, Error, ProjectConfig, ProjectResolver, Resolution, TypeUniverse};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Generate protobuf schemas and marshalling adapters from schema units
#[derive(Parser, Debug)]
#[command(name = "protoweave")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project file declaring metadata sources and schema units
    #[arg(short, long, default_value = "protoweave.toml")]
    project: PathBuf,

    /// Output directory for generated files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Additional metadata file or directory (repeatable)
    #[arg(short, long)]
    metadata: Vec<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dry run - don't write files, just show what would be generated
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files whose content differs
    #[arg(long)]
    force: bool,

    /// Only list resolved units and their types
    #[arg(long)]
    list_only: bool,

    /// Diagnostic report format
    #[arg(long, value_enum, default_value = "text")]
    report: ReportFormat,

    /// File name of the registration manifest, relative to the output directory
    #[arg(long, default_value = DEFAULT_MANIFEST_NAME)]
    manifest_name: String,
}

/// How diagnostics are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    /// One line per diagnostic on stderr
    Text,
    /// A JSON array on stdout
    Json,
}

/// Result of writing one generated file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Written,
    Unchanged,
}

#[derive(Default)]
struct WriteStats {
    written: usize,
    unchanged: usize,
    failed: usize,
}

impl WriteStats {
    fn record(&mut self, path: &Path, outcome: Result<WriteOutcome>) {
        match outcome {
            Ok(WriteOutcome::Written) => {
                println!("Wrote {}", path.display());
                self.written += 1;
            }
            Ok(WriteOutcome::Unchanged) => {
                debug!("Unchanged: {}", path.display());
                self.unchanged += 1;
            }
            Err(e) => {
                error!("Failed to write {}: {:#}", path.display(), e);
                self.failed += 1;
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    if !run(&cli)? {
        std::process::exit(1);
    }
    Ok(())
}

/// Runs the whole pipeline, returning false when an error was reported
fn run(cli: &Cli) -> Result<bool> {
    let project = ProjectConfig::load(&cli.project)
        .with_context(|| format!("Failed to load project: {}", cli.project.display()))?;

    let sources: Vec<&PathBuf> = project.metadata.iter().chain(&cli.metadata).collect();
    if sources.is_empty() {
        bail!("No metadata given: list files in the project or pass --metadata");
    }
    let universe = load_metadata(&sources)?;
    info!("Loaded {} types", universe.len());

    let resolution = ProjectResolver::new(&universe, project.units)
        .resolve()
        .context("Failed to resolve schema units")?;
    if resolution.aborted {
        report(&resolution.diagnostics, cli.report)?;
        return Ok(false);
    }

    if cli.list_only {
        report(&resolution.diagnostics, cli.report)?;
        list_units(&resolution);
        return Ok(!resolution.has_errors());
    }

    let emission = SchemaEmitter::new(&universe, &resolution)
        .emit()
        .context("Failed to emit schemas")?;
    let diagnostics: Vec<Diagnostic> = resolution
        .diagnostics
        .iter()
        .chain(&emission.diagnostics)
        .cloned()
        .collect();
    report(&diagnostics, cli.report)?;

    let mut stats = WriteStats::default();
    for unit in &emission.units {
        write_unit(cli, unit, &mut stats)?;
    }

    if !emission.manifest.is_empty() {
        let path = output_path(&cli.output, &cli.manifest_name)?;
        let content = emission.manifest.render();
        if cli.dry_run {
            println!("Would write: {}", path.display());
        } else {
            stats.record(&path, write_output(&path, &content, cli.force));
        }
    }

    if !cli.dry_run {
        info!(
            "Summary: {} units, {} written, {} unchanged, {} failed",
            emission.units.len(),
            stats.written,
            stats.unchanged,
            stats.failed
        );
    }

    Ok(!resolution.has_errors() && !emission.has_errors() && stats.failed == 0)
}

/// Loads and merges every metadata source into one universe
fn load_metadata(sources: &[&PathBuf]) -> Result<TypeUniverse> {
    let mut universe = TypeUniverse::new();

    for source in sources {
        if source.is_dir() {
            debug!("Scanning metadata directory: {}", source.display());
            for entry in WalkDir::new(source)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                match load_metadata_file(path)? {
                    Some(loaded) => universe
                        .merge(loaded)
                        .with_context(|| format!("Conflicting metadata in {}", path.display()))?,
                    None => trace!("Skipping non-metadata file: {}", path.display()),
                }
            }
        } else {
            match load_metadata_file(source)? {
                Some(loaded) => universe
                    .merge(loaded)
                    .with_context(|| format!("Conflicting metadata in {}", source.display()))?,
                None => bail!("Unsupported metadata file: {}", source.display()),
            }
        }
    }

    Ok(universe)
}

/// Loads one metadata file by extension; `None` for unrelated files
fn load_metadata_file(path: &Path) -> Result<Option<TypeUniverse>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    let universe = match extension.as_deref() {
        Some("json") => TypeUniverse::load_json(path)?,
        Some("pb") | Some("desc") => {
            let data = fs::read(path)
                .with_context(|| format!("Failed to read metadata file: {}", path.display()))?;
            TypeUniverse::from_descriptor_set_bytes(&data)
                .with_context(|| format!("Failed to decode descriptor set: {}", path.display()))?
        }
        _ => return Ok(None),
    };

    debug!("Loaded {} types from {}", universe.len(), path.display());
    Ok(Some(universe))
}

fn report(diagnostics: &[Diagnostic], format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => {
            for diagnostic in diagnostics {
                match &diagnostic.type_name {
                    Some(type_name) => eprintln!("{} ({})", diagnostic, type_name),
                    None => eprintln!("{}", diagnostic),
                }
            }
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(diagnostics)?);
        }
    }
    Ok(())
}

fn list_units(resolution: &Resolution) {
    for unit in &resolution.units {
        println!("{} -> {}", unit.name(), unit.schema_file_name());
        for type_name in &unit.types {
            println!("  {}", type_name);
        }
        for import in &unit.imports {
            println!("  {} (from {})", import.type_name, import.owner);
        }
    }
}

/// Writes a unit's schema and its adapter plan
fn write_unit(cli: &Cli, unit: &EmittedUnit, stats: &mut WriteStats) -> Result<()> {
    let schema_path = output_path(&cli.output, &unit.file.file_name)?;
    let adapters_path = schema_path.with_extension("adapters.json");
    let adapters = serde_json::to_string_pretty(&unit.adapters)?;

    if cli.dry_run {
        println!("Would write: {}", schema_path.display());
        println!("Would write: {}", adapters_path.display());
        if cli.verbose > 0 {
            println!("---");
            println!("{}", unit.text);
            println!("---");
        }
        return Ok(());
    }

    stats.record(&schema_path, write_output(&schema_path, &unit.text, cli.force));
    stats.record(&adapters_path, write_output(&adapters_path, &adapters, cli.force));
    Ok(())
}

/// Joins a generated relative path onto the output directory, refusing
/// anything that could land outside it
fn output_path(output_dir: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative);
    let escapes = relative.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || relative.as_os_str().is_empty() {
        return Err(Error::path_traversal(relative).into());
    }
    Ok(output_dir.join(relative))
}

/// Writes `content` unless an identical file is already there
fn write_output(path: &Path, content: &str, force: bool) -> Result<WriteOutcome> {
    if path.exists() {
        let existing = fs::read(path)
            .with_context(|| format!("Failed to read existing file: {}", path.display()))?;
        if blake3::hash(&existing) == blake3::hash(content.as_bytes()) {
            return Ok(WriteOutcome::Unchanged);
        }
        if !force {
            bail!(
                "File already exists: {} (use --force to overwrite)",
                path.display()
            );
        }
        warn!("Overwriting {}", path.display());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, content)
        .with_context(|| format!("Failed to write file: {}", path.display()))?;

    Ok(WriteOutcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TYPES: &str = r#"{
        "types": [
            {
                "package": "shop",
                "name": "Order",
                "kind": "message",
                "fields": [
                    {"name": "id", "number": 1, "kind": {"scalar": "uint64"}, "required": true}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_output_path_rejects_escapes() {
        let dir = Path::new("/tmp/out");
        assert_eq!(
            output_path(dir, "first/First.proto").unwrap(),
            PathBuf::from("/tmp/out/first/First.proto")
        );
        assert!(output_path(dir, "../First.proto").is_err());
        assert!(output_path(dir, "/etc/First.proto").is_err());
        assert!(output_path(dir, "a/../../First.proto").is_err());
        assert!(output_path(dir, "").is_err());
    }

    #[test]
    fn test_write_output_skips_identical_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/Unit.proto");

        assert_eq!(write_output(&path, "a", false).unwrap(), WriteOutcome::Written);
        assert_eq!(write_output(&path, "a", false).unwrap(), WriteOutcome::Unchanged);
        assert!(write_output(&path, "b", false).is_err());
        assert_eq!(write_output(&path, "b", true).unwrap(), WriteOutcome::Written);
        assert_eq!(fs::read_to_string(&path).unwrap(), "b");
    }

    #[test]
    fn test_load_metadata_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("more")).unwrap();
        fs::write(dir.path().join("more/types.json"), TYPES).unwrap();
        fs::write(dir.path().join("README.md"), "not metadata").unwrap();

        let source = dir.path().to_path_buf();
        let universe = load_metadata(&[&source]).unwrap();
        assert_eq!(universe.len(), 1);
    }

    #[test]
    fn test_load_metadata_rejects_unknown_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("types.yaml");
        fs::write(&path, "types: []").unwrap();
        assert!(load_metadata(&[&path]).is_err());
    }

    #[test]
    fn test_run_writes_schema_adapters_and_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("types.json"), TYPES).unwrap();
        fs::write(
            dir.path().join("protoweave.toml"),
            r#"
            metadata = ["types.json"]

            [[unit]]
            name = "shop.ShopSchema"
            basePackages = ["shop"]
            schemaFileName = "shop/Shop.proto"
            schemaPackageName = "shop"
            "#,
        )
        .unwrap();

        let out = dir.path().join("out");
        let cli = Cli::parse_from([
            "protoweave",
            "--project",
            dir.path().join("protoweave.toml").to_str().unwrap(),
            "--output",
            out.to_str().unwrap(),
        ]);

        assert!(run(&cli).unwrap());
        let schema = fs::read_to_string(out.join("shop/Shop.proto")).unwrap();
        assert!(schema.contains("package shop;"));
        assert!(schema.contains("required uint64 id = 1;"));
        assert!(out.join("shop/Shop.adapters.json").exists());
        assert_eq!(
            fs::read_to_string(out.join(DEFAULT_MANIFEST_NAME)).unwrap(),
            "shop.ShopSchema\n"
        );

        // Second run finds everything unchanged
        assert!(run(&cli).unwrap());
    }

    fn project_cli(dir: &TempDir, units: &str) -> Cli {
        fs::write(dir.path().join("types.json"), TYPES).unwrap();
        fs::write(
            dir.path().join("protoweave.toml"),
            format!("metadata = [\"types.json\"]\n{}", units),
        )
        .unwrap();
        Cli::parse_from([
            "protoweave",
            "--project",
            dir.path().join("protoweave.toml").to_str().unwrap(),
            "--output",
            dir.path().join("out").to_str().unwrap(),
        ])
    }

    #[test]
    fn test_run_emits_healthy_units_next_to_rejected_ones() {
        let dir = TempDir::new().unwrap();
        let cli = project_cli(
            &dir,
            r#"
            [[unit]]
            name = "shop.Broken"
            includeClasses = ["shop.Order"]
            excludeClasses = ["shop.Order"]

            [[unit]]
            name = "shop.ShopSchema"
            basePackages = ["shop"]
            "#,
        );

        assert!(!run(&cli).unwrap());
        let out = dir.path().join("out");
        assert!(out.join("ShopSchema.proto").exists());
        assert_eq!(
            fs::read_to_string(out.join(DEFAULT_MANIFEST_NAME)).unwrap(),
            "shop.ShopSchema\n"
        );
    }

    #[test]
    fn test_run_writes_nothing_when_resolution_aborts() {
        let dir = TempDir::new().unwrap();
        let cli = project_cli(
            &dir,
            r#"
            [[unit]]
            name = "shop.ShopSchema"
            basePackages = ["shop"]
            dependsOn = ["shop.ShopSchema"]
            "#,
        );

        assert!(!run(&cli).unwrap());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

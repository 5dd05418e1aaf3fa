//! protolift - Reconstruct Protocol Buffer definitions from Lua descriptor code
//!
//! This tool reads the `*_pb.lua` modules that Lua protobuf runtimes generate
//! and reconstructs them into human-readable `.proto` source files.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use protolift_core::proto::{self, descriptor, walk};
use protolift_core::schema::ProtoSyntax;
use protolift_core::syntax::module_name;
use protolift_core::{
    Error, LuaSourceLoader, ProtoReconstructor, ReconstructorConfig, SchemaFile, StatsWriter,
    WriterConfig,
};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// File name of the `--format descriptor-set` output
const DESCRIPTOR_SET_FILE: &str = "descriptor_set.pb";

/// Reconstruct Protocol Buffer definitions from Lua descriptor code
#[derive(Parser, Debug)]
#[command(name = "protolift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Output directory for reconstructed .proto files
    #[arg(short, long, default_value = ".", env = "PROTOLIFT_OUTPUT")]
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "proto")]
    format: OutputFormat,

    /// Type enum fields as int32 instead of referencing the enum
    #[arg(long)]
    skip_enums: bool,

    /// Syntax declared by reconstructed files
    #[arg(long, default_value = "proto2", value_parser = parse_syntax)]
    syntax: ProtoSyntax,

    /// Dry run - don't write files, just show what would be written
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files without prompting
    #[arg(long)]
    force: bool,

    /// Only list reconstructed files without writing them
    #[arg(long)]
    list_only: bool,

    /// Conflict resolution strategy for same-name different-content protos
    #[arg(long, value_enum, default_value = "hash-suffix")]
    conflict_strategy: ConflictStrategy,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single Lua module; sibling modules resolve its imports
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of Lua modules to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for reconstructed definitions
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Standard .proto format
    Proto,
    /// Just the filename (for scripting)
    Filename,
    /// A serialized FileDescriptorSet of every reconstructed file
    DescriptorSet,
}

/// Strategy for resolving naming conflicts
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConflictStrategy {
    /// Append a short content hash: file~a1b2c3d4.proto
    HashSuffix,
    /// Append source module name: file~from-module.proto
    SourceSuffix,
    /// Skip conflicting files (keep first occurrence only)
    SkipConflicts,
}

fn parse_syntax(value: &str) -> std::result::Result<ProtoSyntax, String> {
    ProtoSyntax::try_from(value).map_err(|e| e.to_string())
}

/// Tracks written proto files for deduplication
#[derive(Default)]
struct ProtoRegistry {
    /// Maps proto filename -> (content_hash, output_path)
    seen: HashMap<String, Vec<(String, PathBuf)>>,
    /// Statistics
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    total_found: usize,
    duplicates_skipped: usize,
    conflicts_renamed: usize,
    written: usize,
}

impl ProtoRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute a short hash of the content (first 8 chars of blake3)
    fn content_hash(content: &str) -> String {
        let hash = blake3::hash(content.as_bytes());
        hash.to_hex()[..8].to_string()
    }

    /// Check if this exact content was already seen for this filename
    fn is_duplicate(&self, filename: &str, content_hash: &str) -> bool {
        self.seen
            .get(filename)
            .map(|entries| entries.iter().any(|(h, _)| h == content_hash))
            .unwrap_or(false)
    }

    /// Get the number of variants we've seen for this filename
    fn variant_count(&self, filename: &str) -> usize {
        self.seen.get(filename).map(|e| e.len()).unwrap_or(0)
    }

    /// Register a proto file and return the resolved output path
    fn register(
        &mut self,
        filename: &str,
        content_hash: &str,
        output_dir: &Path,
        source_module: Option<&str>,
        strategy: ConflictStrategy,
    ) -> Option<PathBuf> {
        self.stats.total_found += 1;

        if self.is_duplicate(filename, content_hash) {
            debug!("Skipping duplicate: {} (hash: {})", filename, content_hash);
            self.stats.duplicates_skipped += 1;
            return None;
        }

        let output_path = if self.variant_count(filename) == 0 {
            output_dir.join(filename)
        } else {
            match strategy {
                ConflictStrategy::SkipConflicts => {
                    debug!(
                        "Skipping conflict: {} (different content, hash: {})",
                        filename, content_hash
                    );
                    self.stats.duplicates_skipped += 1;
                    return None;
                }
                ConflictStrategy::HashSuffix => {
                    let new_name = Self::add_suffix(filename, &format!("~{}", content_hash));
                    info!(
                        "Conflict resolved: {} -> {} (content differs)",
                        filename, new_name
                    );
                    self.stats.conflicts_renamed += 1;
                    output_dir.join(new_name)
                }
                ConflictStrategy::SourceSuffix => {
                    let source = source_module.unwrap_or("unknown");
                    let new_name = Self::add_suffix(filename, &format!("~from-{}", source));
                    info!(
                        "Conflict resolved: {} -> {} (from {})",
                        filename, new_name, source
                    );
                    self.stats.conflicts_renamed += 1;
                    output_dir.join(new_name)
                }
            }
        };

        self.seen
            .entry(filename.to_string())
            .or_default()
            .push((content_hash.to_string(), output_path.clone()));

        Some(output_path)
    }

    /// Add a suffix before the .proto extension
    fn add_suffix(filename: &str, suffix: &str) -> String {
        if let Some(stem) = filename.strip_suffix(".proto") {
            format!("{}{}.proto", stem, suffix)
        } else {
            format!("{}{}", filename, suffix)
        }
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} found, {} duplicates skipped, {} conflicts renamed, {} written",
            self.stats.total_found,
            self.stats.duplicates_skipped,
            self.stats.conflicts_renamed,
            self.stats.written
        );
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

    let config = ReconstructorConfig::new()
        .skip_enums(cli.skip_enums)
        .syntax(cli.syntax);

    let files = if let Some(ref file) = cli.input.file {
        reconstruct_single_file(file, config)?
    } else if let Some(ref directory) = cli.input.directory {
        reconstruct_directory(directory, config)?
    } else {
        bail!("Either --file or --directory must be specified")
    };

    emit(&cli, &files)
}

/// Reconstruct one module, resolving its imports against its directory
fn reconstruct_single_file(file: &Path, config: ReconstructorConfig) -> Result<Vec<Rc<SchemaFile>>> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let source_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name: {}", file.display()))?;
    let directory = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let (loader, skipped) = LuaSourceLoader::load_lenient(directory)
        .with_context(|| format!("Failed to load {}", directory.display()))?;
    for err in skipped {
        if matches!(&err, Error::Syntax { source_name: name, .. } if name == source_name) {
            return Err(err).with_context(|| format!("Failed to parse {}", file.display()));
        }
    }

    let mut session = ProtoReconstructor::new(&loader).with_config(config);
    session
        .reconstruct(module_name(source_name))
        .with_context(|| format!("Failed to reconstruct {}", file.display()))?;

    Ok(session.files().to_vec())
}

/// Reconstruct every module of a directory, skipping modules that fail
fn reconstruct_directory(directory: &Path, config: ReconstructorConfig) -> Result<Vec<Rc<SchemaFile>>> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Loading directory: {}", directory.display());

    let (loader, skipped) = LuaSourceLoader::load_lenient(directory)
        .with_context(|| format!("Failed to load {}", directory.display()))?;

    let mut session = ProtoReconstructor::new(&loader).with_config(config);
    let mut failed = skipped.len();

    for module in loader.modules() {
        match session.reconstruct(module) {
            Ok(file) => debug!("{} -> {}", module, file.file_name()),
            Err(e) if e.is_recoverable() => {
                // Log error but continue with other modules
                warn!("Error processing {}: {}", module, e);
                failed += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to reconstruct {}", module)),
        }
    }

    info!(
        "Processed {} modules: {} files reconstructed, {} failed",
        loader.len() + skipped.len(),
        session.files().len(),
        failed
    );

    Ok(session.files().to_vec())
}

/// Print or write the reconstructed files in the requested format
fn emit(cli: &Cli, files: &[Rc<SchemaFile>]) -> Result<()> {
    let mut stats = StatsWriter::default();
    for file in files {
        // Counting never fails
        let _ = walk(file, &mut stats);
    }
    info!(
        "Reconstructed {} files: {} messages ({} fields), {} enums ({} values), {} imports",
        stats.file_count,
        stats.message_count,
        stats.field_count,
        stats.enum_count,
        stats.enum_value_count,
        stats.import_count
    );

    if cli.list_only {
        for file in files {
            println!("{}", file.file_name());
        }
        return Ok(());
    }

    match cli.format {
        OutputFormat::Filename => {
            for file in files {
                println!("{}", file.file_name());
            }
        }
        OutputFormat::DescriptorSet => {
            let bytes = descriptor::encode_descriptor_set(files)
                .context("Failed to build descriptor set")?;
            let output_path = cli.output.join(DESCRIPTOR_SET_FILE);

            if cli.dry_run {
                println!("Would write: {} ({} bytes)", output_path.display(), bytes.len());
            } else {
                write_output_file(&output_path, &bytes, cli.force)?;
                println!("Wrote {}", output_path.display());
            }
        }
        OutputFormat::Proto => {
            let mut registry = ProtoRegistry::new();
            let config = WriterConfig::default();

            for file in files {
                let filename = file.file_name();
                if !is_safe_file_name(filename) {
                    error!("Refusing to write outside the output directory: {}", filename);
                    continue;
                }

                let content = proto::render_with(file, &config);
                let content_hash = ProtoRegistry::content_hash(&content);
                let source_module = file.source_name().map(module_name);

                let Some(output_path) = registry.register(
                    filename,
                    &content_hash,
                    &cli.output,
                    source_module,
                    cli.conflict_strategy,
                ) else {
                    continue;
                };

                if cli.dry_run {
                    println!("Would write: {}", output_path.display());
                    if cli.verbose > 0 {
                        println!("---");
                        println!("{}", content);
                        println!("---");
                    }
                    continue;
                }

                match write_output_file(&output_path, content.as_bytes(), cli.force) {
                    Ok(()) => {
                        println!("Wrote {}", output_path.display());
                        registry.stats.written += 1;
                    }
                    Err(e) => {
                        error!("Failed to write {}: {:#}", output_path.display(), e);
                    }
                }
            }

            if !cli.dry_run {
                registry.print_summary();
            }
        }
    }

    Ok(())
}

/// File names come from Lua identifiers, but nothing stops a crafted module
/// from naming its table `..` or using separators
fn is_safe_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

/// Write an output file, creating parent directories
fn write_output_file(output_path: &Path, content: &[u8], force: bool) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if output_path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    let mut file = fs::File::create(output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;

    file.write_all(content)
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COMMON: &str = r#"
local protobuf = require "protobuf/protobuf"
local Common_pbTable = {}
Common_pbTable.ITEM = protobuf.Descriptor()
Common_pbTable.ITEM_ID_FIELD = protobuf.FieldDescriptor()
Common_pbTable.ITEM_ID_FIELD.name = "id"
Common_pbTable.ITEM_ID_FIELD.number = 1
Common_pbTable.ITEM_ID_FIELD.label = 1
Common_pbTable.ITEM_ID_FIELD.type = 5
Common_pbTable.ITEM.name = "Item"
Common_pbTable.ITEM.fields = {Common_pbTable.ITEM_ID_FIELD}
return Common_pbTable
"#;

    const BAG: &str = r#"
local protobuf = require "protobuf/protobuf"
local common_pb = require "common_pb"
local Bag_pbTable = {}
Bag_pbTable.BAG = protobuf.Descriptor()
Bag_pbTable.BAG_ITEMS_FIELD = protobuf.FieldDescriptor()
Bag_pbTable.BAG_ITEMS_FIELD.name = "items"
Bag_pbTable.BAG_ITEMS_FIELD.number = 1
Bag_pbTable.BAG_ITEMS_FIELD.label = 3
Bag_pbTable.BAG_ITEMS_FIELD.type = 11
Bag_pbTable.BAG_ITEMS_FIELD.message_type = common_pb.ITEM
Bag_pbTable.BAG.name = "Bag"
Bag_pbTable.BAG.fields = {Bag_pbTable.BAG_ITEMS_FIELD}
return Bag_pbTable
"#;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("common_pb.lua"), COMMON).unwrap();
        fs::write(dir.path().join("bag_pb.lua"), BAG).unwrap();
        fs::write(dir.path().join("broken_pb.lua"), "local = =").unwrap();
        fs::write(dir.path().join("orphan_pb.lua"), "local T = {}\nreturn T\n").unwrap();
        dir
    }

    #[test]
    fn test_reconstruct_directory_skips_failures() {
        let dir = fixture();
        let files = reconstruct_directory(dir.path(), ReconstructorConfig::new()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["Common.proto", "Bag.proto"]);
    }

    #[test]
    fn test_reconstruct_single_file_resolves_siblings() {
        let dir = fixture();
        let files = reconstruct_single_file(&dir.path().join("bag_pb.lua"), ReconstructorConfig::new()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].imports(), ["Common.proto"]);
    }

    #[test]
    fn test_reconstruct_single_file_reports_own_syntax_error() {
        let dir = fixture();
        let err = reconstruct_single_file(&dir.path().join("broken_pb.lua"), ReconstructorConfig::new()).unwrap_err();
        assert!(format!("{:#}", err).contains("broken_pb.lua"));
    }

    #[test]
    fn test_proto_registry_deduplication() {
        let mut registry = ProtoRegistry::new();
        let temp_dir = TempDir::new().unwrap();

        let content = "syntax = \"proto2\";\npackage test;";
        let hash = ProtoRegistry::content_hash(content);

        let path1 = registry.register("test.proto", &hash, temp_dir.path(), None, ConflictStrategy::HashSuffix);
        assert!(path1.is_some());
        assert!(path1.unwrap().ends_with("test.proto"));

        let path2 = registry.register("test.proto", &hash, temp_dir.path(), None, ConflictStrategy::HashSuffix);
        assert!(path2.is_none());

        assert_eq!(registry.stats.duplicates_skipped, 1);
    }

    #[test]
    fn test_proto_registry_conflict_strategies() {
        let mut registry = ProtoRegistry::new();
        let temp_dir = TempDir::new().unwrap();

        let hash1 = ProtoRegistry::content_hash("package test1;");
        let hash2 = ProtoRegistry::content_hash("package test2;");
        let hash3 = ProtoRegistry::content_hash("package test3;");

        let first = registry.register("T.proto", &hash1, temp_dir.path(), Some("a_pb"), ConflictStrategy::HashSuffix);
        assert!(first.unwrap().ends_with("T.proto"));

        let second = registry
            .register("T.proto", &hash2, temp_dir.path(), Some("b_pb"), ConflictStrategy::SourceSuffix)
            .unwrap();
        assert!(second.ends_with("T~from-b_pb.proto"));

        let third = registry.register("T.proto", &hash3, temp_dir.path(), Some("c_pb"), ConflictStrategy::SkipConflicts);
        assert!(third.is_none());

        assert_eq!(registry.stats.conflicts_renamed, 1);
        assert_eq!(registry.stats.duplicates_skipped, 1);
    }

    #[test]
    fn test_add_suffix() {
        assert_eq!(
            ProtoRegistry::add_suffix("test.proto", "~abc123"),
            "test~abc123.proto"
        );
        assert_eq!(ProtoRegistry::add_suffix("test", "~abc123"), "test~abc123");
    }

    #[test]
    fn test_content_hash() {
        let hash1 = ProtoRegistry::content_hash("hello");
        let hash2 = ProtoRegistry::content_hash("hello");
        let hash3 = ProtoRegistry::content_hash("world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
    }

    #[test]
    fn test_is_safe_file_name() {
        assert!(is_safe_file_name("Person.proto"));
        assert!(!is_safe_file_name("../Person.proto"));
        assert!(!is_safe_file_name("a/b.proto"));
        assert!(!is_safe_file_name("/etc/passwd"));
        assert!(!is_safe_file_name(".."));
    }

    #[test]
    fn test_write_output_file_respects_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("T.proto");

        write_output_file(&path, b"one", false).unwrap();
        assert!(write_output_file(&path, b"two", false).is_err());
        write_output_file(&path, b"two", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn test_parse_syntax() {
        assert_eq!(parse_syntax("proto3").unwrap(), ProtoSyntax::Proto3);
        assert!(parse_syntax("proto9").is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

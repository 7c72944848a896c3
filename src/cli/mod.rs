//! CLI subcommands — compile, validate, init, lineage, sources.

use crate::core::compiler::{CompileOptions, CompiledRecipe, Compiler};
use crate::core::config::{self, CompilerConfig};
use crate::core::discovery::{discover_recipe, RecipeKind};
use crate::core::error::ErrorKind;
use crate::core::overlay::OverridesSource;
use crate::core::registry::Registry;
use clap::Subcommand;
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a recipe and print the resulting entity
    Compile {
        /// Recipe file, or directory holding one recipe
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Recipe kind to look for in a directory (service, application, cloud, template)
        #[arg(short, long)]
        kind: Option<RecipeKind>,

        /// Overrides file (replaces <base>.overrides)
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// Properties file (replaces <base>.properties)
        #[arg(long)]
        properties: Option<PathBuf>,

        /// External property, KEY=VALUE (repeatable)
        #[arg(short = 'D', value_name = "KEY=VALUE")]
        define: Vec<String>,

        /// Output format
        #[arg(long, default_value = "yaml")]
        format: OutputFormat,

        /// Skip validation hooks
        #[arg(long)]
        no_validate: bool,
    },

    /// Compile and validate a recipe without printing it
    Validate {
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(short, long)]
        kind: Option<RecipeKind>,
    },

    /// Scaffold a new service recipe with its properties file
    Init {
        /// Directory to create the recipe in (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Service name
        #[arg(short, long)]
        name: String,
    },

    /// Print the extension lineage of a service recipe
    Lineage {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Print every input file with its BLAKE3 hash, and the combined digest
    Sources {
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(short, long)]
        kind: Option<RecipeKind>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yaml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown format '{}' (expected yaml or json)", other)),
        }
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands, config_file: Option<&Path>) -> Result<(), String> {
    let registry = Registry::shared();
    match cmd {
        Commands::Init { path, name } => cmd_init(&path, &name),
        Commands::Compile {
            path,
            kind,
            overrides,
            properties,
            define,
            format,
            no_validate,
        } => {
            let options = CompileOptions {
                properties_file: properties,
                overrides: overrides.map(OverridesSource::File),
                external_properties: parse_defines(&define)?,
                validate: no_validate.then_some(false),
                ..CompileOptions::default()
            };
            let config = load_config(config_file)?;
            cmd_compile(registry, &config, &path, kind, &options, format)
        }
        Commands::Validate { path, kind } => {
            cmd_validate(registry, &load_config(config_file)?, &path, kind)
        }
        Commands::Lineage { path } => cmd_lineage(registry, &load_config(config_file)?, &path),
        Commands::Sources { path, kind } => {
            cmd_sources(registry, &load_config(config_file)?, &path, kind)
        }
    }
}

fn load_config(config_file: Option<&Path>) -> Result<CompilerConfig, String> {
    let cwd = std::env::current_dir().map_err(|e| format!("cannot read current dir: {}", e))?;
    config::load_config(config_file, &cwd)
}

/// `-D key=value` pairs; values are read as YAML scalars (`8080` is a number).
fn parse_defines(defines: &[String]) -> Result<Option<IndexMap<String, Value>>, String> {
    if defines.is_empty() {
        return Ok(None);
    }
    let mut out = IndexMap::new();
    for define in defines {
        let (key, raw) = define
            .split_once('=')
            .ok_or_else(|| format!("invalid -D '{}': expected KEY=VALUE", define))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("invalid -D '{}': empty key", define));
        }
        let value = match serde_yaml_ng::from_str::<Value>(raw) {
            Ok(v @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => v,
            _ => Value::String(raw.to_string()),
        };
        out.insert(key.to_string(), value);
    }
    Ok(Some(out))
}

/// Resolve a path argument to a recipe file. A directory must hold exactly
/// one recipe; with `kind` only that suffix is considered.
fn locate(path: &Path, kind: Option<RecipeKind>) -> Result<PathBuf, String> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if !path.is_dir() {
        return Err(format!("{} does not exist", path.display()));
    }
    let kinds = match kind {
        Some(k) => vec![k],
        None => RecipeKind::ALL.to_vec(),
    };
    let mut found = Vec::new();
    for k in kinds {
        match discover_recipe(path, k.suffix()) {
            Ok(file) => found.push(file),
            Err(ErrorKind::MissingRecipe { .. }) if kind.is_none() => {}
            Err(e) => return Err(e.to_string()),
        }
    }
    match found.len() {
        0 => Err(format!("no recipe found in {}", path.display())),
        1 => Ok(found.remove(0)),
        _ => Err(format!(
            "{} holds recipes of several kinds; pick one with --kind",
            path.display()
        )),
    }
}

fn compile(
    registry: &Registry,
    config: &CompilerConfig,
    path: &Path,
    kind: Option<RecipeKind>,
    options: &CompileOptions,
) -> Result<CompiledRecipe, String> {
    let compiler = Compiler::new(registry, config);
    let result = match kind {
        Some(kind) if path.is_dir() => compiler.compile_dir(path, kind, options),
        _ => compiler.compile_file(&locate(path, kind)?, options),
    };
    result.map_err(|e| e.to_string())
}

fn cmd_compile(
    registry: &Registry,
    config: &CompilerConfig,
    path: &Path,
    kind: Option<RecipeKind>,
    options: &CompileOptions,
    format: OutputFormat,
) -> Result<(), String> {
    let compiled = compile(registry, config, path, kind, options)?;
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml_ng::to_string(&compiled.root)
            .map_err(|e| format!("cannot render yaml: {}", e))?,
        OutputFormat::Json => serde_json::to_string_pretty(&compiled.root)
            .map_err(|e| format!("cannot render json: {}", e))?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn cmd_validate(
    registry: &Registry,
    config: &CompilerConfig,
    path: &Path,
    kind: Option<RecipeKind>,
) -> Result<(), String> {
    let options = CompileOptions {
        validate: Some(true),
        ..CompileOptions::default()
    };
    let compiled = compile(registry, config, path, kind, &options)?;
    println!(
        "OK: {} {}",
        compiled.kind(),
        compiled.root.name().unwrap_or_else(|| "<unnamed>".to_string())
    );
    Ok(())
}

fn cmd_lineage(registry: &Registry, config: &CompilerConfig, path: &Path) -> Result<(), String> {
    let compiled = compile(
        registry,
        config,
        path,
        Some(RecipeKind::Service),
        &CompileOptions::default(),
    )?;
    println!("{}", compiled.file.display());
    for base in compiled.lineage() {
        println!("  extends {}", base);
    }
    Ok(())
}

fn cmd_sources(
    registry: &Registry,
    config: &CompilerConfig,
    path: &Path,
    kind: Option<RecipeKind>,
) -> Result<(), String> {
    let compiled = compile(registry, config, path, kind, &CompileOptions::default())?;
    for source in &compiled.sources {
        println!("{}  {}", source.hash, source.path.display());
    }
    println!("digest: {}", compiled.digest);
    Ok(())
}

fn cmd_init(path: &Path, name: &str) -> Result<(), String> {
    if name.trim().is_empty() || name.contains(['/', '\\']) {
        return Err(format!("invalid service name '{}'", name));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;

    let recipe_path = path.join(format!("{}{}", name, RecipeKind::Service.suffix()));
    let properties_path = recipe_path.with_extension("properties");
    for existing in [&recipe_path, &properties_path] {
        if existing.exists() {
            return Err(format!("{} already exists", existing.display()));
        }
    }

    let recipe = format!(
        r#"service {{
    name "{name}"
    type "APP_SERVER"
    numInstances instances
    maxAllowedInstances 2

    lifecycle {{
        install "install.sh"
        start "start.sh"
        stop "stop.sh"
    }}

    network {{
        port port
    }}
}}
"#
    );
    let properties = "instances = 1\nport = 8080\n";

    std::fs::write(&recipe_path, recipe)
        .map_err(|e| format!("cannot write {}: {}", recipe_path.display(), e))?;
    std::fs::write(&properties_path, properties)
        .map_err(|e| format!("cannot write {}: {}", properties_path.display(), e))?;

    println!("Initialized service '{}' at {}", name, path.display());
    println!("  Created: {}", recipe_path.display());
    println!("  Created: {}", properties_path.display());
    Ok(())
}

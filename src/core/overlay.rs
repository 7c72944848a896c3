//! Overlay environment: the name → value table visible while a recipe is
//! evaluated.
//!
//! Layers, lowest precedence first:
//!
//! 1. configured defaults
//! 2. inherited values (a base recipe sees its extending recipe's table)
//! 3. the properties file (`<base>.properties` or an explicit file)
//! 4. overrides (`<base>.overrides`, an explicit file, or script text)
//! 5. external properties supplied by an enclosing compilation
//! 6. ambient caller variables, including `recipeFilePath` and `recipeDir`
//!
//! Keys are flat and dotted (`a.b.c`). A higher layer replaces a key outright;
//! nothing is merged across layers.

use super::error::{CompileError, ErrorKind};
use super::parser::{self, Body, Declaration, Expr, StrPart};
use super::provenance::Provenance;
use super::types::yaml_value_to_string;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PROPERTIES_EXTENSION: &str = "properties";
pub const OVERRIDES_EXTENSION: &str = "overrides";
pub const RECIPE_FILE_PATH_VAR: &str = "recipeFilePath";
pub const RECIPE_DIR_VAR: &str = "recipeDir";

/// Where a layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerSource {
    Defaults,
    Inherited,
    PropertiesFile,
    Overrides,
    External,
    Ambient,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub source: LayerSource,
    /// File the layer was read from, if any
    pub origin: Option<PathBuf>,
    pub values: IndexMap<String, Value>,
}

/// Override values given either as a file or as literal text.
#[derive(Debug, Clone, PartialEq)]
pub enum OverridesSource {
    File(PathBuf),
    Script(String),
}

/// Layered, flattened name → value table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    layers: Vec<Layer>,
    merged: IndexMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer above every existing one.
    pub fn push(&mut self, layer: Layer) {
        for (key, value) in &layer.values {
            overwrite(&mut self.merged, key, value.clone());
        }
        self.layers.push(layer);
    }

    /// Effective flat table.
    pub fn merged(&self) -> &IndexMap<String, Value> {
        &self.merged
    }

    /// Resolve `key`: exact match, then descent into a map-valued prefix, then
    /// a mapping rebuilt from longer dotted keys.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        lookup_flat(&self.merged, key)
    }

    /// Highest layer defining `key` exactly.
    pub fn source_of(&self, key: &str) -> Option<LayerSource> {
        self.layers
            .iter()
            .rev()
            .find(|l| l.values.contains_key(key))
            .map(|l| l.source)
    }

    /// Effective table without ambient variables, handed down to base recipes.
    pub fn inheritable(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        for layer in self.layers.iter().filter(|l| l.source != LayerSource::Ambient) {
            for (key, value) in &layer.values {
                overwrite(&mut out, key, value.clone());
            }
        }
        out
    }
}

/// Insert `key`, dropping dotted children it now shadows.
fn overwrite(map: &mut IndexMap<String, Value>, key: &str, value: Value) {
    let prefix = format!("{}.", key);
    map.retain(|k, _| !k.starts_with(&prefix));
    map.insert(key.to_string(), value);
}

pub fn lookup_flat(map: &IndexMap<String, Value>, key: &str) -> Option<Value> {
    if let Some(v) = map.get(key) {
        return Some(v.clone());
    }

    let segments: Vec<&str> = key.split('.').collect();
    for i in (1..segments.len()).rev() {
        let prefix = segments[..i].join(".");
        if let Some(Value::Mapping(m)) = map.get(&prefix) {
            if let Some(v) = descend(m, &segments[i..]) {
                return Some(v);
            }
        }
    }

    let dotted = format!("{}.", key);
    let mut nested = Mapping::new();
    let mut found = false;
    for (k, v) in map {
        if let Some(rest) = k.strip_prefix(&dotted) {
            let path: Vec<&str> = rest.split('.').collect();
            insert_path(&mut nested, &path, v.clone());
            found = true;
        }
    }
    found.then_some(Value::Mapping(nested))
}

fn descend(map: &Mapping, path: &[&str]) -> Option<Value> {
    let (first, rest) = path.split_first()?;
    let value = map.get(*first)?;
    if rest.is_empty() {
        return Some(value.clone());
    }
    match value {
        Value::Mapping(m) => descend(m, rest),
        _ => None,
    }
}

/// Set `path` inside `map`, creating intermediate mappings.
pub fn insert_path(map: &mut Mapping, path: &[&str], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let key = Value::String(first.to_string());
    if rest.is_empty() {
        map.insert(key, value);
        return;
    }
    let child = map
        .entry(key)
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !child.is_mapping() {
        *child = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(inner) = child {
        insert_path(inner, rest, value);
    }
}

// ============================================================================
// Values shared with the evaluator
// ============================================================================

/// Value of a literal scalar expression; `None` for anything else.
pub(crate) fn literal(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Null => Some(Value::Null),
        Expr::Bool(b) => Some(Value::Bool(*b)),
        Expr::Int(i) => Some(Value::from(*i)),
        Expr::Float(f) => Some(Value::from(*f)),
        Expr::Str(s) => Some(Value::String(s.clone())),
        _ => None,
    }
}

/// Expand `${...}` parts. On failure returns the unresolved name.
pub(crate) fn interpolate<F>(parts: &[StrPart], resolve: F) -> Result<String, String>
where
    F: Fn(&str) -> Option<Value>,
{
    let mut out = String::new();
    for part in parts {
        match part {
            StrPart::Lit(s) => out.push_str(s),
            StrPart::Ref(name) => {
                let value = resolve(name).ok_or_else(|| name.clone())?;
                out.push_str(&yaml_value_to_string(&value));
            }
        }
    }
    Ok(out)
}

// ============================================================================
// Properties files
// ============================================================================

/// Parse properties text into a flat table. References resolve against keys
/// defined earlier in the same text, then against `lower`.
pub fn parse_properties(
    text: &str,
    path: &Path,
    lower: &Environment,
) -> Result<IndexMap<String, Value>, CompileError> {
    let parse_err = |line: Option<usize>, message: String| {
        let err = CompileError::new(
            path,
            ErrorKind::PropertiesParseError {
                path: path.to_path_buf(),
                message,
            },
        );
        match line {
            Some(l) => err.at_line(l),
            None => err,
        }
    };
    let recipe = parser::parse_recipe(text).map_err(|e| parse_err(e.line, e.message))?;

    let mut visible = lower.merged().clone();
    let mut out = IndexMap::new();
    flatten(&recipe.declarations, "", &mut visible, &mut out)
        .map_err(|(line, message)| parse_err(Some(line), message))?;
    Ok(out)
}

fn flatten(
    declarations: &[Declaration],
    prefix: &str,
    visible: &mut IndexMap<String, Value>,
    out: &mut IndexMap<String, Value>,
) -> Result<(), (usize, String)> {
    for decl in declarations {
        let key = if prefix.is_empty() {
            decl.name.clone()
        } else {
            format!("{}.{}", prefix, decl.name)
        };
        let expr = match &decl.body {
            Body::Block(children) => {
                flatten(children, &key, visible, out)?;
                continue;
            }
            Body::Assign(e) => e,
            Body::Args(args) if args.len() == 1 => &args[0],
            Body::Args(_) => {
                return Err((decl.line, format!("'{}' takes exactly one value", key)));
            }
        };
        let value = property_value(expr, visible).map_err(|m| (decl.line, m))?;
        overwrite(visible, &key, value.clone());
        overwrite(out, &key, value);
    }
    Ok(())
}

fn property_value(expr: &Expr, visible: &IndexMap<String, Value>) -> Result<Value, String> {
    if let Some(v) = literal(expr) {
        return Ok(v);
    }
    match expr {
        Expr::Interpolated(parts) => interpolate(parts, |k| lookup_flat(visible, k))
            .map(Value::String)
            .map_err(|name| format!("could not resolve '{}'", name)),
        Expr::Reference(name) => {
            lookup_flat(visible, name).ok_or_else(|| format!("could not resolve '{}'", name))
        }
        Expr::List(items) => items
            .iter()
            .map(|e| property_value(e, visible))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Expr::Map(entries) => {
            let mut m = Mapping::new();
            for (k, e) in entries {
                m.insert(Value::String(k.clone()), property_value(e, visible)?);
            }
            Ok(Value::Mapping(m))
        }
        Expr::Block { name, .. } => Err(format!("block '{}' is not a property value", name)),
        Expr::Load(target) => Err(format!("load(\"{}\") is not allowed in properties", target)),
        _ => Err("unsupported value".to_string()),
    }
}

// ============================================================================
// Building the environment
// ============================================================================

/// Everything [`build_environment`] needs for one recipe.
#[derive(Debug, Clone)]
pub struct OverlayInputs<'a> {
    pub recipe_file: &'a Path,
    pub defaults: &'a IndexMap<String, Value>,
    pub inherited: Option<&'a IndexMap<String, Value>>,
    /// Explicit properties file; must exist
    pub properties_file: Option<&'a Path>,
    pub overrides: Option<&'a OverridesSource>,
    pub external: Option<&'a IndexMap<String, Value>>,
    pub ambient: &'a IndexMap<String, Value>,
    pub max_overrides_bytes: u64,
}

/// `<dir>/<base>.<extension>` for `<dir>/<base>.recipe`.
pub fn sibling_file(recipe_file: &Path, extension: &str) -> PathBuf {
    recipe_file.with_extension(extension)
}

pub(crate) fn read_text(path: &Path) -> Result<String, CompileError> {
    if !path.exists() {
        return Err(CompileError::new(
            path,
            ErrorKind::FileNotFound {
                path: path.to_path_buf(),
            },
        ));
    }
    std::fs::read_to_string(path).map_err(|source| {
        CompileError::new(
            path,
            ErrorKind::Io {
                path: path.to_path_buf(),
                source,
            },
        )
    })
}

fn file_layer(
    env: &Environment,
    source: LayerSource,
    path: &Path,
    text: &str,
) -> Result<Layer, CompileError> {
    let values = parse_properties(text, path, env)?;
    debug!(file = %path.display(), keys = values.len(), layer = ?source, "loaded properties");
    Ok(Layer {
        source,
        origin: Some(path.to_path_buf()),
        values,
    })
}

fn check_overrides_size(path: &Path, len: usize, max: u64) -> Result<(), CompileError> {
    if len as u64 > max {
        return Err(CompileError::new(
            path,
            ErrorKind::PropertiesParseError {
                path: path.to_path_buf(),
                message: format!("overrides are {} bytes, the limit is {}", len, max),
            },
        ));
    }
    Ok(())
}

/// Build the layered environment for one recipe, recording every file read.
pub fn build_environment(
    inputs: &OverlayInputs<'_>,
    provenance: &mut Provenance,
) -> Result<Environment, CompileError> {
    let mut env = Environment::new();
    env.push(Layer {
        source: LayerSource::Defaults,
        origin: None,
        values: inputs.defaults.clone(),
    });
    if let Some(inherited) = inputs.inherited {
        env.push(Layer {
            source: LayerSource::Inherited,
            origin: None,
            values: inherited.clone(),
        });
    }

    let properties_path = match inputs.properties_file {
        Some(explicit) => Some(explicit.to_path_buf()),
        None => Some(sibling_file(inputs.recipe_file, PROPERTIES_EXTENSION)).filter(|p| p.is_file()),
    };
    if let Some(path) = properties_path {
        let text = read_text(&path)?;
        provenance.record(&path, &text);
        let layer = file_layer(&env, LayerSource::PropertiesFile, &path, &text)?;
        env.push(layer);
    }

    let overrides = match inputs.overrides {
        Some(OverridesSource::File(path)) => Some((path.clone(), read_text(path)?)),
        Some(OverridesSource::Script(text)) => Some((PathBuf::from("<overrides script>"), text.clone())),
        None => {
            let sibling = sibling_file(inputs.recipe_file, OVERRIDES_EXTENSION);
            if sibling.is_file() {
                let text = read_text(&sibling)?;
                Some((sibling, text))
            } else {
                None
            }
        }
    };
    if let Some((path, text)) = overrides {
        check_overrides_size(&path, text.len(), inputs.max_overrides_bytes)?;
        provenance.record(&path, &text);
        let layer = file_layer(&env, LayerSource::Overrides, &path, &text)?;
        env.push(layer);
    }

    if let Some(external) = inputs.external {
        env.push(Layer {
            source: LayerSource::External,
            origin: None,
            values: external.clone(),
        });
    }

    let mut ambient = inputs.ambient.clone();
    ambient.insert(
        RECIPE_FILE_PATH_VAR.to_string(),
        Value::String(inputs.recipe_file.display().to_string()),
    );
    let dir = inputs
        .recipe_file
        .parent()
        .map(|d| d.display().to_string())
        .unwrap_or_default();
    ambient.insert(RECIPE_DIR_VAR.to_string(), Value::String(dir));
    env.push(Layer {
        source: LayerSource::Ambient,
        origin: None,
        values: ambient,
    });

    Ok(env)
}

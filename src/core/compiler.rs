//! Compilation entry points.
//!
//! A [`Compiler`] pairs a [`Registry`] with a [`CompilerConfig`]. Every call
//! opens a [`CompileSession`] that owns the parse cache, the chain of recipes
//! being compiled (for cycle detection) and the provenance record. The
//! session is dropped when the call returns, on success or failure.

use super::discovery::{discover_recipe, RecipeKind};
use super::entity::{Entity, EntityKind};
use super::error::{CompileError, ErrorKind};
use super::evaluator::Evaluator;
use super::overlay::{build_environment, read_text, OverlayInputs, OverridesSource};
use super::parser::{self, Recipe, SyntaxError};
use super::provenance::{Provenance, SourceDigest};
use super::registry::Registry;
use super::types::{Application, Cloud, CloudTemplate, Service};
use super::validate::{validate, ValidationContext};
use super::config::CompilerConfig;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

/// Per-call inputs.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Explicit properties file; replaces `<base>.properties`
    pub properties_file: Option<PathBuf>,
    /// Explicit overrides file or script; replaces `<base>.overrides`
    pub overrides: Option<OverridesSource>,
    /// Values from an enclosing compilation
    pub external_properties: Option<IndexMap<String, Value>>,
    /// Caller variables, highest precedence
    pub ambient: IndexMap<String, Value>,
    /// Overrides the configured `validate` flag
    pub validate: Option<bool>,
}

/// A successfully compiled recipe.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledRecipe {
    pub root: Entity,
    pub file: PathBuf,
    pub sources: Vec<SourceDigest>,
    pub digest: String,
}

impl CompiledRecipe {
    pub fn kind(&self) -> EntityKind {
        self.root.kind()
    }

    /// Extension lineage of a service root, most recent base first.
    pub fn lineage(&self) -> &[String] {
        match &self.root {
            Entity::Service(s) => &s.extended_services_paths,
            _ => &[],
        }
    }

    fn wrong_root(file: PathBuf, expected: EntityKind, found: EntityKind) -> CompileError {
        CompileError::new(file, ErrorKind::WrongRootType { expected, found })
    }

    pub fn into_service(self) -> Result<Service, CompileError> {
        let found = self.root.kind();
        self.root
            .into_service()
            .ok_or_else(|| Self::wrong_root(self.file, EntityKind::Service, found))
    }

    pub fn into_application(self) -> Result<Application, CompileError> {
        let found = self.root.kind();
        self.root
            .into_application()
            .ok_or_else(|| Self::wrong_root(self.file, EntityKind::Application, found))
    }

    pub fn into_cloud(self) -> Result<Cloud, CompileError> {
        let found = self.root.kind();
        self.root
            .into_cloud()
            .ok_or_else(|| Self::wrong_root(self.file, EntityKind::Cloud, found))
    }

    pub fn into_template(self) -> Result<CloudTemplate, CompileError> {
        let found = self.root.kind();
        self.root
            .into_template()
            .ok_or_else(|| Self::wrong_root(self.file, EntityKind::CloudTemplate, found))
    }
}

// ============================================================================
// Session
// ============================================================================

/// How a recipe compiled from inside another one receives its environment.
pub(crate) enum Nested<'a> {
    /// Base recipe of `extend`: the extending recipe's table sits beneath
    /// the base's own files.
    Base { inherited: &'a IndexMap<String, Value> },
    /// Service directory of an application: the application's table is
    /// layered above the service's own files.
    ApplicationService { external: &'a IndexMap<String, Value> },
}

/// State for one top-level compile call.
pub struct CompileSession<'r> {
    registry: &'r Registry,
    config: &'r CompilerConfig,
    ambient: &'r IndexMap<String, Value>,
    cache: FxHashMap<PathBuf, Rc<Recipe>>,
    chain: Vec<PathBuf>,
    provenance: Provenance,
}

fn syntax_error(path: &Path, e: SyntaxError) -> CompileError {
    let err = CompileError::new(path, ErrorKind::ParseError { message: e.message });
    match e.line {
        Some(line) => err.at_line(line),
        None => err,
    }
}

impl<'r> CompileSession<'r> {
    fn new(
        registry: &'r Registry,
        config: &'r CompilerConfig,
        ambient: &'r IndexMap<String, Value>,
    ) -> Self {
        Self {
            registry,
            config,
            ambient,
            cache: FxHashMap::default(),
            chain: Vec::new(),
            provenance: Provenance::default(),
        }
    }

    pub(crate) fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub(crate) fn search_paths(&self) -> &'r [PathBuf] {
        &self.config.search_paths
    }

    /// Push `path` onto the active chain; fails if it is already there.
    pub(crate) fn enter(&mut self, path: &Path) -> Result<(), CompileError> {
        if let Some(start) = self.chain.iter().position(|p| p == path) {
            let mut cycle = self.chain[start..].to_vec();
            cycle.push(path.to_path_buf());
            let at = self.chain.last().cloned().unwrap_or_else(|| path.to_path_buf());
            return Err(CompileError::new(at, ErrorKind::CircularReference { cycle }));
        }
        self.chain.push(path.to_path_buf());
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.chain.pop();
    }

    /// Read a file and record it in the provenance.
    pub(crate) fn source(&mut self, path: &Path) -> Result<String, CompileError> {
        let text = read_text(path)?;
        self.provenance.record(path, &text);
        Ok(text)
    }

    fn parse_text(&mut self, path: &Path, text: &str) -> Result<Rc<Recipe>, CompileError> {
        if let Some(recipe) = self.cache.get(path) {
            return Ok(Rc::clone(recipe));
        }
        let recipe = Rc::new(parser::parse_recipe(text).map_err(|e| syntax_error(path, e))?);
        self.cache.insert(path.to_path_buf(), Rc::clone(&recipe));
        Ok(recipe)
    }

    /// Read and parse a recipe file, reusing an earlier parse in this session.
    pub(crate) fn parse_file(&mut self, path: &Path) -> Result<Rc<Recipe>, CompileError> {
        if let Some(recipe) = self.cache.get(path) {
            return Ok(Rc::clone(recipe));
        }
        let text = self.source(path)?;
        self.parse_text(path, &text)
    }

    /// Compile a recipe reached from the one being evaluated.
    pub(crate) fn compile_nested(
        &mut self,
        path: &Path,
        nested: Nested<'_>,
    ) -> Result<Entity, CompileError> {
        self.enter(path)?;
        let result = self.compile_nested_inner(path, nested);
        self.leave();
        result
    }

    fn compile_nested_inner(&mut self, path: &Path, nested: Nested<'_>) -> Result<Entity, CompileError> {
        let recipe = self.parse_file(path)?;
        let (inherited, external) = match nested {
            Nested::Base { inherited } => (Some(inherited), None),
            Nested::ApplicationService { external } => (None, Some(external)),
        };
        let inputs = OverlayInputs {
            recipe_file: path,
            defaults: &self.config.defaults,
            inherited,
            properties_file: None,
            overrides: None,
            external,
            ambient: self.ambient,
            max_overrides_bytes: self.config.max_overrides_bytes,
        };
        let env = build_environment(&inputs, &mut self.provenance)?;
        debug!(file = %path.display(), depth = self.chain.len(), "compiling nested recipe");
        Evaluator::new(self, &env, path).evaluate(&recipe)
    }
}

impl Drop for CompileSession<'_> {
    fn drop(&mut self) {
        let cached = self.cache.len();
        self.cache.clear();
        debug!(cached, "released parse cache");
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiles recipes against a registry and configuration.
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'a> {
    registry: &'a Registry,
    config: &'a CompilerConfig,
}

fn absolute(path: &Path) -> Result<PathBuf, CompileError> {
    if !path.exists() {
        return Err(CompileError::new(
            path,
            ErrorKind::FileNotFound {
                path: path.to_path_buf(),
            },
        ));
    }
    path.canonicalize().map_err(|source| {
        CompileError::new(
            path,
            ErrorKind::Io {
                path: path.to_path_buf(),
                source,
            },
        )
    })
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a Registry, config: &'a CompilerConfig) -> Self {
        Self { registry, config }
    }

    /// Discover the recipe of `kind` in `dir` and compile it. The root must
    /// be of the kind's entity type.
    pub fn compile_dir(
        &self,
        dir: &Path,
        kind: RecipeKind,
        options: &CompileOptions,
    ) -> Result<CompiledRecipe, CompileError> {
        let file = discover_recipe(dir, kind.suffix()).map_err(|k| CompileError::new(dir, k))?;
        let compiled = self.compile_file(&file, options)?;
        let expected = kind.root_kind();
        if compiled.kind() != expected {
            return Err(CompileError::new(
                compiled.file,
                ErrorKind::WrongRootType {
                    expected,
                    found: compiled.root.kind(),
                },
            ));
        }
        Ok(compiled)
    }

    pub fn compile_file(
        &self,
        path: &Path,
        options: &CompileOptions,
    ) -> Result<CompiledRecipe, CompileError> {
        let path = absolute(path)?;
        let text = read_text(&path)?;
        self.compile(&text, &path, options)
    }

    /// Compile recipe text as if it were read from `virtual_path`. Sibling
    /// files and relative references resolve against that path's directory.
    pub fn compile_source(
        &self,
        text: &str,
        virtual_path: &Path,
        options: &CompileOptions,
    ) -> Result<CompiledRecipe, CompileError> {
        self.compile(text, virtual_path, options)
    }

    fn compile(
        &self,
        text: &str,
        path: &Path,
        options: &CompileOptions,
    ) -> Result<CompiledRecipe, CompileError> {
        let mut session = CompileSession::new(self.registry, self.config, &options.ambient);
        session.enter(path)?;
        session.provenance.record(path, text);
        let recipe = session.parse_text(path, text)?;

        let inputs = OverlayInputs {
            recipe_file: path,
            defaults: &self.config.defaults,
            inherited: None,
            properties_file: options.properties_file.as_deref(),
            overrides: options.overrides.as_ref(),
            external: options.external_properties.as_ref(),
            ambient: &options.ambient,
            max_overrides_bytes: self.config.max_overrides_bytes,
        };
        let env = build_environment(&inputs, &mut session.provenance)?;
        let root = Evaluator::new(&mut session, &env, path).evaluate(&recipe)?;
        session.leave();

        if options.validate.unwrap_or(self.config.validate) {
            validate(&root, self.registry, &ValidationContext::new(path))
                .map_err(|k| CompileError::new(path, k))?;
        }

        let provenance = std::mem::take(&mut session.provenance);
        let compiled = CompiledRecipe {
            root,
            file: path.to_path_buf(),
            digest: provenance.digest(),
            sources: provenance.into_sources(),
        };
        info!(
            file = %compiled.file.display(),
            kind = %compiled.kind(),
            name = compiled.root.name().unwrap_or_default(),
            sources = compiled.sources.len(),
            "compiled recipe"
        );
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ExecutableEntry;
    use std::fs;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, text).unwrap();
        path
    }

    fn quiet() -> CompilerConfig {
        CompilerConfig {
            validate: false,
            ..CompilerConfig::default()
        }
    }

    #[test]
    fn test_compiler_extend_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let bar = write(
            dir.path(),
            "bar-service.recipe",
            "service {\n  name \"bar\"\n  numInstances 1\n  lifecycle.init \"bar_install.sh\"\n}\n",
        );
        let foo = write(
            dir.path(),
            "foo-service.recipe",
            "service {\n  extend \"bar-service\"\n  name \"foo\"\n  numInstances 2\n}\n",
        );
        let registry = Registry::builtin();
        let config = quiet();
        let compiled = Compiler::new(&registry, &config)
            .compile_file(&foo, &CompileOptions::default())
            .unwrap();
        assert_eq!(compiled.lineage(), [bar.canonicalize().unwrap().display().to_string()]);
        assert_eq!(compiled.sources.len(), 2);

        let svc = compiled.into_service().unwrap();
        assert_eq!(svc.name.as_deref(), Some("foo"));
        assert_eq!(svc.num_instances, 2);
        assert_eq!(
            svc.lifecycle.unwrap().init,
            Some(ExecutableEntry::Command("bar_install.sh".to_string()))
        );
    }

    #[test]
    fn test_compiler_extend_equals_base_except_overrides() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "base-service.recipe",
            "service {\n name \"base\"\n icon \"x.png\"\n retries 3\n network { port 80 }\n}\n",
        );
        let child = write(
            dir.path(),
            "child-service.recipe",
            "service {\n extend \"base-service\"\n retries 5\n}\n",
        );
        let registry = Registry::builtin();
        let config = quiet();
        let compiler = Compiler::new(&registry, &config);
        let base = compiler
            .compile_file(&dir.path().join("base-service.recipe"), &CompileOptions::default())
            .unwrap()
            .into_service()
            .unwrap();
        let mut derived = compiler
            .compile_file(&child, &CompileOptions::default())
            .unwrap()
            .into_service()
            .unwrap();
        assert_eq!(derived.retries, 5);
        assert_eq!(derived.extended_services_paths.len(), 1);
        derived.retries = base.retries;
        derived.extended_services_paths.clear();
        assert_eq!(derived, base);
    }

    #[test]
    fn test_compiler_lineage_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a-service.recipe", "service { name \"a\" }");
        let b = write(dir.path(), "b-service.recipe", "service {\n extend \"a-service\"\n}");
        let c = write(dir.path(), "c-service.recipe", "service {\n extend \"b-service\"\n}");
        let registry = Registry::builtin();
        let config = quiet();
        let compiled = Compiler::new(&registry, &config)
            .compile_file(&c, &CompileOptions::default())
            .unwrap();
        let expected: Vec<String> = [b, a]
            .iter()
            .map(|p| p.canonicalize().unwrap().display().to_string())
            .collect();
        assert_eq!(compiled.lineage(), expected.as_slice());
    }

    #[test]
    fn test_compiler_circular_extend() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a-service.recipe", "service {\n extend \"b-service\"\n}");
        let b = write(dir.path(), "b-service.recipe", "service {\n extend \"a-service\"\n}");
        let registry = Registry::builtin();
        let config = quiet();
        let err = Compiler::new(&registry, &config)
            .compile_file(&b, &CompileOptions::default())
            .unwrap_err();
        match err.kind() {
            ErrorKind::CircularReference { cycle } => assert_eq!(cycle.len(), 3),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_compiler_extend_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let foo = write(dir.path(), "foo-service.recipe", "service {\n extend \"nowhere\"\n}");
        let registry = Registry::builtin();
        let config = quiet();
        let err = Compiler::new(&registry, &config)
            .compile_file(&foo, &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ExtensionResolutionFailure { .. }));
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_compiler_base_sees_child_properties() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bar-service.recipe", "service {\n name \"bar\"\n numInstances count\n}");
        write(dir.path(), "foo-service.properties", "count = 3\n");
        let foo = write(dir.path(), "foo-service.recipe", "service {\n extend \"bar-service\"\n}");
        let registry = Registry::builtin();
        let config = quiet();
        let svc = Compiler::new(&registry, &config)
            .compile_file(&foo, &CompileOptions::default())
            .unwrap()
            .into_service()
            .unwrap();
        assert_eq!(svc.num_instances, 3);
    }

    #[test]
    fn test_compiler_application_services_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "shop-application.recipe",
            r#"
application {
    name "shop"
    service { name "db" }
    service {
        name "web"
        dependsOn (["db"])
    }
    service { name "db" }
}
"#,
        );
        let registry = Registry::builtin();
        let config = quiet();
        let app = Compiler::new(&registry, &config)
            .compile_dir(dir.path(), RecipeKind::Application, &CompileOptions::default())
            .unwrap()
            .into_application()
            .unwrap();
        let names: Vec<_> = app.services.iter().map(|s| s.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["db", "web", "db"]);
        assert_eq!(app.services[1].depends_on, vec!["db".to_string()]);
    }

    #[test]
    fn test_compiler_application_loads_service_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "tomcat/tomcat-service.recipe",
            "service {\n name \"tomcat\"\n numInstances port_count\n lifecycle { start \"run.sh\" }\n}",
        );
        write(dir.path(), "app-application.properties", "port_count = 2\n");
        let app_file = write(
            dir.path(),
            "app-application.recipe",
            "application {\n name \"app\"\n service {\n  name \"tomcat\"\n  dependsOn ([\"db\"])\n }\n}",
        );
        let registry = Registry::builtin();
        let config = quiet();
        let compiled = Compiler::new(&registry, &config)
            .compile_file(&app_file, &CompileOptions::default())
            .unwrap();
        assert_eq!(compiled.sources.len(), 3);
        let app = compiled.into_application().unwrap();
        let tomcat = &app.services[0];
        assert_eq!(tomcat.num_instances, 2);
        assert_eq!(tomcat.depends_on, vec!["db".to_string()]);
        assert!(tomcat.lifecycle.is_some());
    }

    #[test]
    fn test_compiler_overrides_beat_properties() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "web-service.properties", "instances = 1\nport = 80\n");
        write(dir.path(), "web-service.overrides", "instances = 4\n");
        write(
            dir.path(),
            "web-service.recipe",
            "service {\n name \"web\"\n numInstances instances\n maxAllowedInstances 4\n network { port port }\n}",
        );
        let registry = Registry::builtin();
        let config = CompilerConfig::default();
        let svc = Compiler::new(&registry, &config)
            .compile_dir(dir.path(), RecipeKind::Service, &CompileOptions::default())
            .unwrap()
            .into_service()
            .unwrap();
        assert_eq!(svc.num_instances, 4);
        assert_eq!(svc.network.unwrap().port, Some(80));
    }

    #[test]
    fn test_compiler_discovery_failures() {
        let registry = Registry::builtin();
        let config = quiet();
        let compiler = Compiler::new(&registry, &config);

        let empty = tempfile::tempdir().unwrap();
        let err = compiler
            .compile_dir(empty.path(), RecipeKind::Service, &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingRecipe { .. }));

        let two = tempfile::tempdir().unwrap();
        write(two.path(), "a-service.recipe", "service { name \"a\" }");
        write(two.path(), "b-service.recipe", "service { name \"b\" }");
        let err = compiler
            .compile_dir(two.path(), RecipeKind::Service, &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MultipleCandidateFiles { .. }));
    }

    #[test]
    fn test_compiler_wrong_root_type() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "x-service.recipe", "cloud { name \"c\" }");
        let registry = Registry::builtin();
        let config = quiet();
        let err = Compiler::new(&registry, &config)
            .compile_dir(dir.path(), RecipeKind::Service, &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WrongRootType { expected: EntityKind::Service, found: EntityKind::Cloud }
        ));
    }

    #[test]
    fn test_compiler_load_statement_and_value() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lifecycle.fragment", "lifecycle { start \"run.sh\" }\n");
        write(dir.path(), "deps.fragment", "[\"db\", \"cache\"]\n");
        let recipe = write(
            dir.path(),
            "web-service.recipe",
            "service {\n name \"web\"\n load \"lifecycle.fragment\"\n dependsOn load(\"deps.fragment\")\n}",
        );
        let registry = Registry::builtin();
        let config = quiet();
        let compiled = Compiler::new(&registry, &config)
            .compile_file(&recipe, &CompileOptions::default())
            .unwrap();
        assert_eq!(compiled.sources.len(), 3);
        let svc = compiled.into_service().unwrap();
        assert_eq!(svc.depends_on, vec!["db".to_string(), "cache".to_string()]);
        assert!(svc.lifecycle.is_some());
    }

    #[test]
    fn test_compiler_load_error_names_fragment() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.fragment", "\nbogus 1\n");
        let recipe = write(dir.path(), "web-service.recipe", "service {\n load \"bad.fragment\"\n}");
        let registry = Registry::builtin();
        let config = quiet();
        let err = Compiler::new(&registry, &config)
            .compile_file(&recipe, &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnknownProperty { .. }));
        assert!(err.file.ends_with("bad.fragment"));
        assert_eq!(err.line, Some(2));
        assert_eq!(err.chain.len(), 1);
    }

    #[test]
    fn test_compiler_self_loading_fragment_is_circular() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "loop.fragment", "load \"loop.fragment\"\n");
        let recipe = write(dir.path(), "web-service.recipe", "service {\n load \"loop.fragment\"\n}");
        let registry = Registry::builtin();
        let config = quiet();
        let err = Compiler::new(&registry, &config)
            .compile_file(&recipe, &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::CircularReference { .. }));
    }

    #[test]
    fn test_compiler_load_cycle_through_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dir_name = dir.path().file_name().unwrap().to_str().unwrap().to_string();
        write(
            dir.path(),
            "loop.fragment",
            &format!("load \"../{dir_name}/loop.fragment\"\n"),
        );
        let recipe = write(dir.path(), "web-service.recipe", "service {\n load \"loop.fragment\"\n}");
        let registry = Registry::builtin();
        let config = quiet();
        let err = Compiler::new(&registry, &config)
            .compile_file(&recipe, &CompileOptions::default())
            .unwrap_err();
        match err.kind() {
            ErrorKind::CircularReference { cycle } => {
                assert_eq!(cycle.len(), 2);
                assert_eq!(cycle[0], cycle[1]);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_compiler_missing_fragment_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = write(
            dir.path(),
            "web-service.recipe",
            "service {\n name \"web\"\n load \"absent.fragment\"\n}",
        );
        let registry = Registry::builtin();
        let config = quiet();
        let compiler = Compiler::new(&registry, &config);
        let err = compiler
            .compile_file(&recipe, &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::FileNotFound { path } if path.ends_with("absent.fragment")));
        assert_eq!(err.line, Some(3));
        assert!(err.file.ends_with("web-service.recipe"));

        let recipe = write(
            dir.path(),
            "api-service.recipe",
            "service {\n name \"api\"\n dependsOn load(\"absent.fragment\")\n}",
        );
        let err = compiler
            .compile_file(&recipe, &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::FileNotFound { .. }));
    }

    #[test]
    fn test_compiler_concurrent_compiles_share_registry() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "base-service.recipe", "service {\n name \"base\"\n numInstances 1\n}\n");
        let recipe = write(
            dir.path(),
            "web-service.recipe",
            "service {\n extend \"base-service\"\n name \"web\"\n}\n",
        );
        let config = CompilerConfig::default();
        let compiler = Compiler::new(Registry::shared(), &config);

        let names: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let recipe = recipe.clone();
                    scope.spawn(move || {
                        compiler
                            .compile_file(&recipe, &CompileOptions::default())
                            .unwrap()
                            .into_service()
                            .unwrap()
                            .name
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(names.len(), 8);
        assert!(names.iter().all(|n| n == "web"));
    }

    #[test]
    fn test_compiler_validation_failure_and_opt_out() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = write(
            dir.path(),
            "web-service.recipe",
            "service {\n name \"web\"\n numInstances 3\n maxAllowedInstances 2\n}",
        );
        let registry = Registry::builtin();
        let config = CompilerConfig::default();
        let compiler = Compiler::new(&registry, &config);
        let err = compiler
            .compile_file(&recipe, &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ValidationFailure { .. }));

        let options = CompileOptions {
            validate: Some(false),
            ..CompileOptions::default()
        };
        assert!(compiler.compile_file(&recipe, &options).is_ok());
    }

    #[test]
    fn test_compiler_ambient_beats_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "web-service.properties", "svcName = \"fromFile\"\n");
        let recipe = write(dir.path(), "web-service.recipe", "service { name svcName }");
        let registry = Registry::builtin();
        let config = quiet();
        let mut options = CompileOptions::default();
        options
            .ambient
            .insert("svcName".to_string(), Value::String("ambient".to_string()));
        let svc = Compiler::new(&registry, &config)
            .compile_file(&recipe, &options)
            .unwrap()
            .into_service()
            .unwrap();
        assert_eq!(svc.name.as_deref(), Some("ambient"));
    }

    #[test]
    fn test_compiler_digest_tracks_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = write(dir.path(), "web-service.recipe", "service { name who }");
        write(dir.path(), "web-service.properties", "who = \"a\"\n");
        let registry = Registry::builtin();
        let config = quiet();
        let compiler = Compiler::new(&registry, &config);
        let first = compiler.compile_file(&recipe, &CompileOptions::default()).unwrap();
        write(dir.path(), "web-service.properties", "who = \"b\"\n");
        let second = compiler.compile_file(&recipe, &CompileOptions::default()).unwrap();
        assert_ne!(first.digest, second.digest);
    }

    #[test]
    fn test_compiler_compile_source_virtual_path() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "v-service.properties", "n = \"virtual\"\n");
        let registry = Registry::builtin();
        let config = quiet();
        let compiled = Compiler::new(&registry, &config)
            .compile_source(
                "service { name n }",
                &dir.path().join("v-service.recipe"),
                &CompileOptions::default(),
            )
            .unwrap();
        assert_eq!(compiled.root.name().as_deref(), Some("virtual"));
        assert!(compiled.into_cloud().is_err());
    }
}

//! Scoped evaluator: walks parsed declarations and builds the root entity.
//!
//! Each open block is a [`Scope`] on a stack. A declaration is either a
//! registered block (push a scope, evaluate, pop, bind onto the parent), a
//! property assignment on the top scope, or one of the `extend` / `load`
//! directives. Top-level assignments outside any block become locals that
//! references can see.

use super::binder::{self, UsedProperties};
use super::compiler::{CompileSession, Nested};
use super::discovery::{discover_recipe, RecipeKind};
use super::entity::{Entity, EntityKind};
use super::error::{CompileError, ErrorKind};
use super::extend::resolve_extend;
use super::overlay::{interpolate, literal, lookup_flat, Environment};
use super::parser::{self, Body, Declaration, Expr, Recipe};
use indexmap::IndexMap;
use serde_yaml_ng::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

const EXTEND: &str = "extend";
const LOAD: &str = "load";
const NAME: &str = "name";

/// One open block.
struct Scope {
    entity: Entity,
    used: UsedProperties,
    /// Declarations evaluated so far in this block
    position: usize,
    /// First exclusive-family block opened here, as (family, element name)
    exclusive: Option<(&'static str, &'static str)>,
}

impl Scope {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            used: UsedProperties::default(),
            position: 0,
            exclusive: None,
        }
    }
}

pub(crate) struct Evaluator<'s, 'r> {
    session: &'s mut CompileSession<'r>,
    env: &'s Environment,
    recipe_file: PathBuf,
    /// Fragment files being spliced, innermost last
    fragments: Vec<PathBuf>,
    locals: IndexMap<String, Value>,
    stack: Vec<Scope>,
    root: Option<Entity>,
}

impl<'s, 'r> Evaluator<'s, 'r> {
    pub(crate) fn new(
        session: &'s mut CompileSession<'r>,
        env: &'s Environment,
        recipe_file: &Path,
    ) -> Self {
        Self {
            session,
            env,
            recipe_file: recipe_file.to_path_buf(),
            fragments: Vec::new(),
            locals: IndexMap::new(),
            stack: Vec::new(),
            root: None,
        }
    }

    /// Evaluate a whole recipe and return its root entity.
    pub(crate) fn evaluate(mut self, recipe: &Recipe) -> Result<Entity, CompileError> {
        for decl in &recipe.declarations {
            self.top_level(decl)?;
        }
        match self.root.take() {
            Some(root) => Ok(root),
            None => Err(CompileError::new(
                &self.recipe_file,
                ErrorKind::EmptyOrMalformedRecipe {
                    reason: "no root block was declared".to_string(),
                },
            )),
        }
    }

    fn current_file(&self) -> &Path {
        self.fragments.last().unwrap_or(&self.recipe_file)
    }

    fn current_dir(&self) -> PathBuf {
        self.current_file()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn fail(&self, line: usize, kind: ErrorKind) -> CompileError {
        CompileError::new(self.current_file(), kind).at_line(line)
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn top_level(&mut self, decl: &Declaration) -> Result<(), CompileError> {
        match &decl.body {
            Body::Block(body) => self.open_block(&decl.name, body, decl.line),
            Body::Args(args) if decl.name == LOAD => self.splice(args, decl.line),
            Body::Args(_) if decl.name == EXTEND => Err(self.fail(
                decl.line,
                ErrorKind::UnsupportedExtension {
                    target: "outside of a block".to_string(),
                },
            )),
            Body::Args(_) => Err(self.fail(
                decl.line,
                ErrorKind::UnknownDeclaration {
                    name: decl.name.clone(),
                },
            )),
            Body::Assign(expr) => {
                let value = self.eval(expr, decl.line)?;
                debug!(local = %decl.name, "defined");
                self.locals.insert(decl.name.clone(), value);
                Ok(())
            }
        }
    }

    fn statement(&mut self, decl: &Declaration) -> Result<(), CompileError> {
        let line = decl.line;
        match &decl.body {
            Body::Args(args) if decl.name == EXTEND => self.extend(args, line)?,
            Body::Args(args) if decl.name == LOAD => self.splice(args, line)?,
            Body::Block(body) => self.open_block(&decl.name, body, line)?,
            Body::Args(args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, line)?);
                }
                self.assign(&decl.name, values, line)?;
            }
            Body::Assign(expr) => {
                let value = self.eval(expr, line)?;
                self.assign(&decl.name, vec![value], line)?;
            }
        }
        if let Some(scope) = self.stack.last_mut() {
            scope.position += 1;
        }
        Ok(())
    }

    fn assign(&mut self, name: &str, values: Vec<Value>, line: usize) -> Result<(), CompileError> {
        let registry = self.session.registry();
        let bound = match self.stack.last_mut() {
            Some(scope) if name.contains('.') => {
                binder::bind_path(registry, &mut scope.entity, &mut scope.used, name, values)
            }
            Some(scope) => binder::bind(&mut scope.entity, &mut scope.used, name, values),
            None => Err(ErrorKind::UnknownDeclaration {
                name: name.to_string(),
            }),
        };
        bound.map_err(|kind| self.fail(line, kind))?;
        if name == NAME {
            self.load_application_service(line)?;
        }
        Ok(())
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    fn open_block(&mut self, name: &str, body: &[Declaration], line: usize) -> Result<(), CompileError> {
        let entity = self.evaluate_block(name, body, line, true)?;
        let bound = match self.stack.last_mut() {
            Some(parent) => binder::bind_entity(&mut parent.entity, &mut parent.used, entity),
            None => {
                debug!(root = %entity.kind(), file = %self.recipe_file.display(), "root block closed");
                self.root = Some(entity);
                Ok(())
            }
        };
        bound.map_err(|kind| self.fail(line, kind))
    }

    /// Build the entity for `name { body }`. `attached` blocks are declared
    /// as statements and bind onto their parent; detached ones are values.
    fn evaluate_block(
        &mut self,
        name: &str,
        body: &[Declaration],
        line: usize,
        attached: bool,
    ) -> Result<Entity, CompileError> {
        let registry = self.session.registry();
        let Some(descriptor) = registry.describe(name) else {
            return Err(self.fail(
                line,
                ErrorKind::UnknownDeclaration {
                    name: name.to_string(),
                },
            ));
        };
        let illegal = |reason: String| ErrorKind::IllegalNestingOrRoot {
            name: name.to_string(),
            reason,
        };

        let parent = self.stack.last();
        let parent_kind = parent.map(|s| s.entity.kind());
        if attached && parent.is_none() && self.root.is_some() {
            return Err(self.fail(
                line,
                illegal("cannot be declared: the recipe already has a root element".to_string()),
            ));
        }
        descriptor
            .check_placement(parent_kind)
            .map_err(|reason| self.fail(line, illegal(reason)))?;

        let mut initial = Entity::new(descriptor.kind);
        if let (true, Some(parent)) = (attached, parent) {
            if let Some(family) = descriptor.exclusive_family {
                let clash = parent.exclusive.filter(|(seen, _)| *seen == family);
                if let Some((_, existing)) = clash {
                    return Err(self.fail(
                        line,
                        ErrorKind::DuplicateProcessingUnitDeclaration {
                            name: name.to_string(),
                            existing: existing.to_string(),
                            family: family.to_string(),
                        },
                    ));
                }
            }
            // Keep content the parent already carries (from `extend` or a
            // dotted assignment) so the block refines it.
            if parent.entity.kind() != EntityKind::Application {
                if let Some(current) = parent.entity.property(name).filter(|v| !v.is_null()) {
                    let parent_kind = parent.entity.kind();
                    initial = Entity::from_value(descriptor.kind, current).map_err(|message| {
                        self.fail(
                            line,
                            ErrorKind::TypeCoercionFailure {
                                entity: parent_kind,
                                name: name.to_string(),
                                message,
                            },
                        )
                    })?;
                }
            }
        }

        if let (true, Some(family), Some(parent)) =
            (attached, descriptor.exclusive_family, self.stack.last_mut())
        {
            parent.exclusive = Some((family, descriptor.element_name));
        }

        debug!(block = name, depth = self.stack.len(), "open");
        self.stack.push(Scope::new(initial));
        let mut outcome = Ok(());
        for decl in body {
            outcome = self.statement(decl);
            if outcome.is_err() {
                break;
            }
        }
        let scope = self.stack.pop();
        outcome?;
        match scope {
            Some(scope) => {
                debug!(block = name, bound = scope.used.len(), "close");
                Ok(scope.entity)
            }
            None => Err(self.fail(
                line,
                ErrorKind::EmptyOrMalformedRecipe {
                    reason: format!("block '{}' closed without being opened", name),
                },
            )),
        }
    }

    // ========================================================================
    // Directives
    // ========================================================================

    fn extend(&mut self, args: &[Expr], line: usize) -> Result<(), CompileError> {
        let registry = self.session.registry();
        let Some(scope) = self.stack.last() else {
            return Err(self.fail(
                line,
                ErrorKind::UnsupportedExtension {
                    target: "outside of a block".to_string(),
                },
            ));
        };
        let kind = scope.entity.kind();
        let position = scope.position;
        if !registry.describe_kind(kind).is_some_and(|d| d.extensible) {
            return Err(self.fail(
                line,
                ErrorKind::UnsupportedExtension {
                    target: format!("in a '{}' block", kind),
                },
            ));
        }
        if position != 0 {
            return Err(self.fail(line, ErrorKind::IllegalExtendPosition { entity: kind }));
        }

        let reference = self.single_path(args, kind, EXTEND, line)?;
        let base_path = resolve_extend(&reference, &self.current_dir(), self.session.search_paths())
            .map_err(|k| self.fail(line, k))?;
        let inherited = self.env.inheritable();
        let base = self
            .session
            .compile_nested(&base_path, Nested::Base { inherited: &inherited })
            .map_err(|e| e.within(self.current_file()))?;

        let found = base.kind();
        let Some(mut service) = base.into_service() else {
            return Err(self.fail(
                line,
                ErrorKind::WrongRootType {
                    expected: EntityKind::Service,
                    found,
                },
            ));
        };
        service
            .extended_services_paths
            .insert(0, base_path.display().to_string());
        info!(base = %base_path.display(), "extended");

        if let Some(scope) = self.stack.last_mut() {
            scope.entity = Entity::Service(service);
        }
        Ok(())
    }

    /// Absolute, symlink-free path of a fragment named relative to the
    /// current file. Cycle detection compares these.
    fn fragment_path(&self, relative: &str, line: usize) -> Result<PathBuf, CompileError> {
        let joined = self.current_dir().join(relative);
        if !joined.is_file() {
            return Err(self.fail(line, ErrorKind::FileNotFound { path: joined }));
        }
        joined.canonicalize().map_err(|source| {
            self.fail(
                line,
                ErrorKind::Io {
                    path: joined.clone(),
                    source,
                },
            )
        })
    }

    /// `load "fragment"` as a statement: splice the fragment's declarations
    /// into the current scope.
    fn splice(&mut self, args: &[Expr], line: usize) -> Result<(), CompileError> {
        let kind = self
            .stack
            .last()
            .map(|s| s.entity.kind())
            .unwrap_or(EntityKind::Application);
        let relative = self.single_path(args, kind, LOAD, line)?;
        let path = self.fragment_path(&relative, line)?;
        let outer = self.current_file().to_path_buf();

        self.session.enter(&path).map_err(|e| e.at_line(line).within(&outer))?;
        let recipe = match self.session.parse_file(&path) {
            Ok(recipe) => recipe,
            Err(e) => {
                self.session.leave();
                return Err(e.within(&outer));
            }
        };
        debug!(fragment = %path.display(), declarations = recipe.declarations.len(), "splicing");

        self.fragments.push(path);
        let mut outcome = Ok(());
        for decl in &recipe.declarations {
            outcome = if self.stack.is_empty() {
                self.top_level(decl)
            } else {
                self.statement(decl)
            };
            if outcome.is_err() {
                break;
            }
        }
        self.fragments.pop();
        self.session.leave();
        outcome.map_err(|e| e.within(&outer))
    }

    /// `load("fragment")` as a value: evaluate the fragment as one expression.
    fn load_value(&mut self, relative: &str, line: usize) -> Result<Value, CompileError> {
        let path = self.fragment_path(relative, line)?;
        let outer = self.current_file().to_path_buf();

        self.session.enter(&path).map_err(|e| e.at_line(line).within(&outer))?;
        let parsed = self.session.source(&path).and_then(|text| {
            parser::parse_expression(&text).map_err(|e| {
                let err = CompileError::new(&path, ErrorKind::ParseError { message: e.message });
                match e.line {
                    Some(l) => err.at_line(l),
                    None => err,
                }
            })
        });
        let value = match parsed {
            Ok(expr) => {
                self.fragments.push(path);
                let value = self.eval(&expr, 1);
                self.fragments.pop();
                value
            }
            Err(e) => Err(e),
        };
        self.session.leave();
        value.map_err(|e| e.within(&outer))
    }

    fn single_path(
        &mut self,
        args: &[Expr],
        kind: EntityKind,
        directive: &str,
        line: usize,
    ) -> Result<String, CompileError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, line)?);
        }
        match values.as_slice() {
            [Value::String(s)] => Ok(s.clone()),
            _ => Err(self.fail(
                line,
                ErrorKind::TypeCoercionFailure {
                    entity: kind,
                    name: directive.to_string(),
                    message: "expected a single recipe path string".to_string(),
                },
            )),
        }
    }

    /// A service inside an application root whose `name` matches a
    /// sub-directory of the application takes its definition from the
    /// service recipe found there.
    fn load_application_service(&mut self, line: usize) -> Result<(), CompileError> {
        let [app, svc] = self.stack.as_slice() else {
            return Ok(());
        };
        if app.entity.kind() != EntityKind::Application || svc.entity.kind() != EntityKind::Service {
            return Ok(());
        }
        let Some(name) = svc.entity.name() else {
            return Ok(());
        };
        let position = svc.position;
        let service_dir = self
            .recipe_file
            .parent()
            .map(|dir| dir.join(&name))
            .filter(|dir| dir.is_dir());
        let Some(service_dir) = service_dir else {
            debug!(service = %name, "no service directory, keeping inline definition");
            return Ok(());
        };

        let recipe = discover_recipe(&service_dir, RecipeKind::Service.suffix())
            .map_err(|k| self.fail(line, k))?;
        let external = self.env.inheritable();
        let loaded = self
            .session
            .compile_nested(&recipe, Nested::ApplicationService { external: &external })
            .map_err(|e| e.within(self.current_file()))?;
        if loaded.kind() != EntityKind::Service {
            return Err(self.fail(
                line,
                ErrorKind::WrongRootType {
                    expected: EntityKind::Service,
                    found: loaded.kind(),
                },
            ));
        }
        if position > 0 {
            warn!(
                service = %name,
                recipe = %recipe.display(),
                "declarations before 'name' are replaced by the service recipe"
            );
        }

        let mut entity = loaded;
        binder::set_coerced(&mut entity, NAME, Value::String(name.clone()))
            .map_err(|k| self.fail(line, k))?;
        if let Some(scope) = self.stack.last_mut() {
            scope.entity = entity;
        }
        info!(service = %name, recipe = %recipe.display(), "loaded application service");
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn resolve(&self, name: &str) -> Option<Value> {
        if let Some(value) = lookup_flat(&self.locals, name) {
            return Some(value);
        }
        let value = self.env.lookup(name)?;
        trace!(reference = name, layer = ?self.env.source_of(name), "resolved");
        Some(value)
    }

    fn eval(&mut self, expr: &Expr, line: usize) -> Result<Value, CompileError> {
        match expr {
            Expr::Null | Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => {
                Ok(literal(expr).unwrap_or(Value::Null))
            }
            Expr::Interpolated(parts) => interpolate(parts, |k| self.resolve(k))
                .map(Value::String)
                .map_err(|name| self.fail(line, ErrorKind::UnresolvedReference { name })),
            Expr::Reference(name) => self.resolve(name).ok_or_else(|| {
                self.fail(line, ErrorKind::UnresolvedReference { name: name.clone() })
            }),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, line)?);
                }
                Ok(Value::Sequence(out))
            }
            Expr::Map(entries) => {
                let mut out = Mapping::new();
                for (key, item) in entries {
                    let value = self.eval(item, line)?;
                    out.insert(Value::String(key.clone()), value);
                }
                Ok(Value::Mapping(out))
            }
            Expr::Block { name, body, line } => {
                let entity = self.evaluate_block(name, body, *line, false)?;
                entity.to_value().map_err(|message| {
                    self.fail(
                        *line,
                        ErrorKind::TypeCoercionFailure {
                            entity: entity.kind(),
                            name: name.clone(),
                            message,
                        },
                    )
                })
            }
            Expr::Load(relative) => self.load_value(relative, line),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::compiler::{CompileOptions, Compiler};
    use crate::core::config::CompilerConfig;
    use crate::core::registry::Registry;
    use crate::core::types::{ExecutableEntry, Widget};
    use super::*;

    fn compile(src: &str) -> Result<Entity, CompileError> {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::builtin();
        let config = CompilerConfig {
            validate: false,
            ..CompilerConfig::default()
        };
        Compiler::new(&registry, &config)
            .compile_source(src, &dir.path().join("t-service.recipe"), &CompileOptions::default())
            .map(|c| c.root)
    }

    #[test]
    fn test_evaluator_nested_blocks_bind() {
        let root = compile(
            r#"
service {
    name "tomcat"
    numInstances 2
    lifecycle {
        install "install.sh"
        start "run.sh"
    }
    network { port 8080 }
}
"#,
        )
        .unwrap();
        let svc = root.into_service().unwrap();
        assert_eq!(svc.name.as_deref(), Some("tomcat"));
        assert_eq!(svc.num_instances, 2);
        let lifecycle = svc.lifecycle.unwrap();
        assert_eq!(lifecycle.start, Some(ExecutableEntry::Command("run.sh".to_string())));
        assert_eq!(svc.network.unwrap().port, Some(8080));
    }

    #[test]
    fn test_evaluator_unknown_block() {
        let err = compile("service {\n  lifecycel {\n  }\n}\n").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnknownDeclaration { name } if name == "lifecycel"));
        assert_eq!(err.line, Some(2));
        assert!(err.file.ends_with("t-service.recipe"));
    }

    #[test]
    fn test_evaluator_illegal_nesting() {
        let err = compile("lifecycle { }").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IllegalNestingOrRoot { .. }));

        let err = compile("cloud { network { } }").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IllegalNestingOrRoot { name, .. } if name == "network"));
    }

    #[test]
    fn test_evaluator_second_root_rejected() {
        let err = compile("service { name \"a\" }\nservice { name \"b\" }").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IllegalNestingOrRoot { .. }));
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_evaluator_processing_unit_family_exclusive() {
        let err = compile("service {\n dataGrid { }\n memcached { }\n}").unwrap_err();
        match err.kind() {
            ErrorKind::DuplicateProcessingUnitDeclaration { name, existing, .. } => {
                assert_eq!(name, "memcached");
                assert_eq!(existing, "dataGrid");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_evaluator_same_processing_unit_twice() {
        let err = compile("service {\n dataGrid { }\n dataGrid { }\n}").unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::DuplicateProcessingUnitDeclaration { name, existing, .. }
                if name == "dataGrid" && existing == "dataGrid"
        ));
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_evaluator_lifecycle_excludes_processing_units() {
        let err = compile("service {\n lifecycle { start \"a\" }\n dataGrid { }\n}").unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::DuplicateProcessingUnitDeclaration { name, existing, .. }
                if name == "dataGrid" && existing == "lifecycle"
        ));

        let err = compile("service {\n statelessProcessingUnit { }\n lifecycle { }\n}").unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::DuplicateProcessingUnitDeclaration { name, .. } if name == "lifecycle"
        ));
    }

    #[test]
    fn test_evaluator_duplicate_property() {
        let err = compile("service {\n name \"a\"\n name \"b\"\n}").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DuplicateProperty { name } if name == "name"));
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_evaluator_empty_recipe() {
        let err = compile("// nothing here\n").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::EmptyOrMalformedRecipe { .. }));
    }

    #[test]
    fn test_evaluator_locals_and_interpolation() {
        let root = compile(
            r#"
base = "/opt/app"
service {
    name "svc"
    lifecycle { start "${base}/run.sh" }
}
"#,
        )
        .unwrap();
        let svc = root.into_service().unwrap();
        assert_eq!(
            svc.lifecycle.unwrap().start,
            Some(ExecutableEntry::Command("/opt/app/run.sh".to_string()))
        );
    }

    #[test]
    fn test_evaluator_unresolved_reference() {
        let err = compile("service { name missing.key }").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnresolvedReference { name } if name == "missing.key"));
    }

    #[test]
    fn test_evaluator_extend_outside_service() {
        let err = compile("cloud { extend \"x\" }").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedExtension { .. }));
        let err = compile("extend \"x\"").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedExtension { .. }));
    }

    #[test]
    fn test_evaluator_extend_not_first() {
        let err = compile("service {\n name \"a\"\n extend \"b\"\n}").unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::IllegalExtendPosition { entity: EntityKind::Service }
        ));
    }

    #[test]
    fn test_evaluator_template_block_as_value() {
        let root = compile(
            r#"
cloud {
    name "ec2"
    templates ([
        SMALL: template { imageId "ami-1"; localDirectory "upload" }
    ])
}
"#,
        )
        .unwrap();
        let cloud = root.into_cloud().unwrap();
        let small = cloud.templates.get("SMALL").unwrap();
        assert_eq!(small.image_id.as_deref(), Some("ami-1"));
    }

    #[test]
    fn test_evaluator_monitoring_and_scaling_blocks() {
        let root = compile(
            r#"
service {
    name "tomcat"
    maxJarSize 1024
    userInterface {
        metricGroups = ([
            metricGroup { name "process"; metrics (["cpu", ["heap", "MEMORY"]]) }
        ])
        widgetGroups = ([
            widgetGroup {
                name "cpu"
                title "CPU"
                widgets ([
                    balanceGauge { metric "cpu" },
                    barLineChart { metric "cpu"; axisYUnit "PERCENTAGE" }
                ])
            }
        ])
    }
    serviceStatistics ([
        serviceStatistics { name "cpu"; metric "cpu"; movingTimeRangeInSeconds 20 }
    ])
    scalingRules ([
        scalingRule {
            serviceStatistics "cpu"
            highThreshold { value 90; instancesIncrease 2 }
            lowThreshold { value 30 }
        }
    ])
    plugins ([ plugin { name "jmx"; className "org.example.JmxPlugin"; config ([port: 9999]) } ])
}
"#,
        )
        .unwrap();
        let svc = root.into_service().unwrap();
        assert_eq!(svc.max_jar_size, 1024);

        let ui = svc.user_interface.unwrap();
        assert_eq!(ui.metric_groups[0].metrics.len(), 2);
        let widgets = &ui.widget_groups[0].widgets;
        assert!(matches!(widgets[0], Widget::BalanceGauge(_)));
        assert!(matches!(widgets[1], Widget::BarLineChart(ref c) if c.axis_y_unit.as_deref() == Some("PERCENTAGE")));

        assert_eq!(svc.service_statistics[0].moving_time_range_in_seconds, 20);
        let rule = &svc.scaling_rules[0];
        assert_eq!(rule.service_statistics, Some(Value::from("cpu")));
        let high = rule.high_threshold.as_ref().unwrap();
        assert_eq!((high.value, high.instances_increase), (Some(90.0), 2));
        assert_eq!(rule.low_threshold.as_ref().unwrap().instances_decrease, 1);

        assert_eq!(svc.plugins[0].class_name.as_deref(), Some("org.example.JmxPlugin"));
        assert_eq!(svc.plugins[0].config["port"], Value::from(9999));
    }

    #[test]
    fn test_evaluator_widget_outside_widget_group() {
        let err = compile("service {\n userInterface {\n balanceGauge { metric \"cpu\" }\n }\n}").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IllegalNestingOrRoot { name, .. } if name == "balanceGauge"));
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_evaluator_template_installer_block() {
        let root = compile(
            "template {\n imageId \"ami-1\"\n installer { fileTransferRetries 5; remoteExecutionPort 5985 }\n}",
        )
        .unwrap();
        let installer = root.into_template().unwrap().installer;
        assert_eq!(installer.file_transfer_retries, 5);
        assert_eq!(installer.remote_execution_port, 5985);
        assert_eq!(installer.connection_test_interval_millis, 5000);
    }

    #[test]
    fn test_evaluator_dotted_then_block_refines() {
        let root = compile(
            "service {\n lifecycle.init \"a.sh\"\n lifecycle { start \"b.sh\" }\n}",
        )
        .unwrap();
        let lifecycle = root.into_service().unwrap().lifecycle.unwrap();
        assert_eq!(lifecycle.init, Some(ExecutableEntry::Command("a.sh".to_string())));
        assert_eq!(lifecycle.start, Some(ExecutableEntry::Command("b.sh".to_string())));
    }
}

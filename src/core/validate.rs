//! Post-construction validation.
//!
//! Hooks are plain functions registered per entity kind in the
//! [`Registry`]. [`validate`] walks the compiled tree root first, then
//! children depth-first, and stops at the first hook that fails. Hooks only
//! inspect; nothing here mutates an entity.

use super::entity::{Entity, EntityKind};
use super::error::ErrorKind;
use super::registry::Registry;
use super::types::METRIC_UNITS;
use regex::Regex;
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Context handed to every hook.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Recipe file the root entity was compiled from
    pub file_path: PathBuf,
}

impl ValidationContext {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    fn recipe_dir(&self) -> &Path {
        self.file_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Run every registered hook on `root` and everything reachable from it.
pub fn validate(
    root: &Entity,
    registry: &Registry,
    ctx: &ValidationContext,
) -> Result<(), ErrorKind> {
    let kind = root.kind();
    if let Some(descriptor) = registry.describe_kind(kind) {
        for hook in &descriptor.validators {
            hook(root, ctx).map_err(|message| ErrorKind::ValidationFailure {
                entity: kind,
                message,
            })?;
        }
    }
    for child in root.children() {
        validate(&child, registry, ctx)?;
    }
    Ok(())
}

const SERVICE_TIERS: &[&str] = &[
    "WEB_SERVER",
    "APP_SERVER",
    "DATABASE",
    "NOSQL_DB",
    "MESSAGE_BUS",
    "ESB_SERVER",
    "LOAD_BALANCER",
    "SECURITY_SERVER",
    "UNDEFINED",
];

const MONITORS_CACHE_TIMEOUT: &str = "monitorsCacheExpirationTimeout";
const KEY_FILE_PLACEHOLDER: &str = "ENTER_KEY_FILE_NAME";
const SERVICE_SUFFIX: &str = "-service.recipe";

fn is_blank(s: Option<&str>) -> bool {
    s.map_or(true, |s| s.trim().is_empty())
}

// ============================================================================
// Service
// ============================================================================

pub(crate) fn service_name(entity: &Entity, _ctx: &ValidationContext) -> Result<(), String> {
    let Entity::Service(svc) = entity else {
        return Ok(());
    };
    match svc.name.as_deref() {
        None => Err("the service's name is missing".to_string()),
        Some(n) if n.trim().is_empty() => Err("the service's name is empty".to_string()),
        Some(_) => Ok(()),
    }
}

pub(crate) fn service_instances(entity: &Entity, _ctx: &ValidationContext) -> Result<(), String> {
    let Entity::Service(svc) = entity else {
        return Ok(());
    };
    if svc.min_allowed_instances == 0 {
        return Err(format!(
            "minimum number of instances ({}) must be 1 or higher",
            svc.min_allowed_instances
        ));
    }
    if svc.min_allowed_instances > svc.max_allowed_instances {
        return Err(format!(
            "maximum number of instances ({}) must be equal or greater than the minimum number of instances ({})",
            svc.max_allowed_instances, svc.min_allowed_instances
        ));
    }
    if svc.min_allowed_instances > svc.num_instances {
        return Err(format!(
            "number of instances ({}) must be equal or greater than the minimum number of instances ({})",
            svc.num_instances, svc.min_allowed_instances
        ));
    }
    if svc.num_instances > svc.max_allowed_instances {
        return Err(format!(
            "the requested number of instances ({}) exceeds the maximum number of instances allowed ({})",
            svc.num_instances, svc.max_allowed_instances
        ));
    }
    Ok(())
}

pub(crate) fn service_type(entity: &Entity, _ctx: &ValidationContext) -> Result<(), String> {
    let Entity::Service(svc) = entity else {
        return Ok(());
    };
    match svc.service_type.as_deref() {
        Some(t) if !SERVICE_TIERS.iter().any(|k| k.eq_ignore_ascii_case(t)) => Err(format!(
            "the service type '{}' is undefined; known types are {}",
            t,
            SERVICE_TIERS.join(", ")
        )),
        _ => Ok(()),
    }
}

pub(crate) fn service_retries(entity: &Entity, _ctx: &ValidationContext) -> Result<(), String> {
    match entity {
        Entity::Service(svc) if svc.retries < -1 => Err(
            "valid values for retries are -1 (always retry) and above; use 0 for no retries"
                .to_string(),
        ),
        _ => Ok(()),
    }
}

pub(crate) fn service_custom_properties(
    entity: &Entity,
    _ctx: &ValidationContext,
) -> Result<(), String> {
    let Entity::Service(svc) = entity else {
        return Ok(());
    };
    if let Some(raw) = svc.custom_properties.get(MONITORS_CACHE_TIMEOUT) {
        raw.trim()
            .parse::<i64>()
            .map_err(|_| format!("the {} property must be an integer, got '{}'", MONITORS_CACHE_TIMEOUT, raw))?;
    }
    Ok(())
}

/// The icon must exist next to the recipe or next to one of the recipes it
/// extends. Only checked when compiling a service recipe directly.
pub(crate) fn service_icon(entity: &Entity, ctx: &ValidationContext) -> Result<(), String> {
    let Entity::Service(svc) = entity else {
        return Ok(());
    };
    let Some(icon) = svc.icon.as_deref() else {
        return Ok(());
    };
    let is_service_file = ctx
        .file_path
        .to_string_lossy()
        .trim()
        .ends_with(SERVICE_SUFFIX);
    if !is_service_file {
        return Ok(());
    }

    let mut candidate = ctx.recipe_dir().join(icon);
    if candidate.is_file() {
        return Ok(());
    }
    for extended in &svc.extended_services_paths {
        let extended = Path::new(extended);
        let dir = if extended.is_file() {
            extended.parent().unwrap_or(extended)
        } else {
            extended
        };
        candidate = dir.join(icon);
        if candidate.is_file() {
            return Ok(());
        }
    }
    Err(format!("the icon file \"{}\" does not exist", candidate.display()))
}

// ============================================================================
// Service children
// ============================================================================

pub(crate) fn lifecycle_detection(entity: &Entity, _ctx: &ValidationContext) -> Result<(), String> {
    let Entity::Lifecycle(lc) = entity else {
        return Ok(());
    };
    if lc.start_detection_timeout_secs == 0 {
        return Err("startDetectionTimeoutSecs must be positive".to_string());
    }
    if lc.start_detection_interval_secs == 0 {
        return Err("startDetectionIntervalSecs must be positive".to_string());
    }
    Ok(())
}

pub(crate) fn network_port(entity: &Entity, _ctx: &ValidationContext) -> Result<(), String> {
    match entity {
        Entity::Network(net) => match net.port {
            Some(port) if !(1..=65535).contains(&port) => {
                Err(format!("port {} is out of range 1-65535", port))
            }
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

/// Each metric is a name or a `[name, unit]` pair with a known unit.
pub(crate) fn user_interface_metrics(entity: &Entity, _ctx: &ValidationContext) -> Result<(), String> {
    let Entity::UserInterface(ui) = entity else {
        return Ok(());
    };
    for group in &ui.metric_groups {
        let group_name = group.name.as_deref().unwrap_or("<unnamed>");
        for metric in &group.metrics {
            match metric {
                Value::String(_) => {}
                Value::Sequence(pair) => match pair.as_slice() {
                    [Value::String(_), Value::String(unit)]
                        if METRIC_UNITS.iter().any(|u| u.eq_ignore_ascii_case(unit)) => {}
                    [Value::String(_), unit] => {
                        return Err(format!(
                            "metric group \"{}\": unit {:?} is not one of {}",
                            group_name,
                            unit,
                            METRIC_UNITS.join(", ")
                        ))
                    }
                    _ => {
                        return Err(format!(
                            "metric group \"{}\": a metric list must be [name, unit]",
                            group_name
                        ))
                    }
                },
                other => {
                    return Err(format!(
                        "metric group \"{}\": expected a metric name or [name, unit], got {:?}",
                        group_name, other
                    ))
                }
            }
        }
    }
    Ok(())
}

/// A scaling rule naming its statistics must name a declared entry.
pub(crate) fn service_scaling_rules(entity: &Entity, _ctx: &ValidationContext) -> Result<(), String> {
    let Entity::Service(svc) = entity else {
        return Ok(());
    };
    for rule in &svc.scaling_rules {
        match &rule.service_statistics {
            None | Some(Value::Null) => {
                return Err("a scaling rule must set serviceStatistics".to_string());
            }
            Some(Value::String(name)) => {
                let declared = svc
                    .service_statistics
                    .iter()
                    .any(|s| s.name.as_deref() == Some(name.as_str()));
                if !declared {
                    return Err(format!(
                        "scaling rule refers to serviceStatistics \"{}\" which is not declared",
                        name
                    ));
                }
            }
            Some(_) => {}
        }
    }
    Ok(())
}

// ============================================================================
// Cloud
// ============================================================================

pub(crate) fn cloud_management_template(
    entity: &Entity,
    _ctx: &ValidationContext,
) -> Result<(), String> {
    let Entity::Cloud(cloud) = entity else {
        return Ok(());
    };
    let name = cloud.configuration.management_machine_template.as_deref();
    if is_blank(name) {
        return Err("managementMachineTemplate may not be empty".to_string());
    }
    let name = name.unwrap_or_default();
    if !cloud.templates.contains_key(name) {
        return Err(format!(
            "the management machine template \"{}\" is not listed in the cloud's templates section",
            name
        ));
    }
    Ok(())
}

pub(crate) fn cloud_user_key_file(entity: &Entity, ctx: &ValidationContext) -> Result<(), String> {
    let Entity::Cloud(cloud) = entity else {
        return Ok(());
    };
    if let Some(key_file) = cloud.user.key_file.as_deref().filter(|k| !k.trim().is_empty()) {
        let path = ctx.recipe_dir().join(key_file);
        if !path.is_file() {
            return Err(format!("the specified key file was not found: {}", path.display()));
        }
    }
    Ok(())
}

fn ssh_logging_level() -> &'static Option<Regex> {
    static LEVEL: OnceLock<Option<Regex>> = OnceLock::new();
    LEVEL.get_or_init(|| Regex::new(r"^(INFO|FINE|FINER|FINEST|WARNING|DEBUG)$").ok())
}

pub(crate) fn provider_settings(entity: &Entity, _ctx: &ValidationContext) -> Result<(), String> {
    let Entity::CloudProvider(provider) = entity else {
        return Ok(());
    };
    if is_blank(provider.provider.as_deref()) {
        return Err("provider cannot be empty".to_string());
    }
    if let Some(raw) = provider.cloudify_url.as_deref().filter(|u| !u.is_empty()) {
        url::Url::parse(raw).map_err(|e| format!("invalid cloudify url \"{}\": {}", raw, e))?;
    }
    if !(1..=2).contains(&provider.number_of_management_machines) {
        return Err(format!(
            "invalid numberOfManagementMachines \"{}\"; valid values are 1 or 2",
            provider.number_of_management_machines
        ));
    }
    let valid_level = ssh_logging_level()
        .as_ref()
        .map_or(true, |re| re.is_match(&provider.ssh_logging_level));
    if !valid_level {
        return Err(format!(
            "sshLoggingLevel \"{}\" is invalid; supported values are INFO, FINE, FINER, FINEST, WARNING, DEBUG",
            provider.ssh_logging_level
        ));
    }
    Ok(())
}

// ============================================================================
// Templates
// ============================================================================

pub(crate) fn template_defaults(entity: &Entity, _ctx: &ValidationContext) -> Result<(), String> {
    let Entity::CloudTemplate(template) = entity else {
        return Ok(());
    };
    if template.remote_directory.trim().is_empty() {
        return Err("remote directory for template is missing".to_string());
    }
    if is_blank(template.local_directory.as_deref()) {
        return Err("local directory for template is missing".to_string());
    }
    if template.key_file.as_deref() == Some(KEY_FILE_PLACEHOLDER) {
        return Err(format!(
            "key file name still has the default value of {}",
            KEY_FILE_PLACEHOLDER
        ));
    }
    Ok(())
}

/// The upload directory is relative to the recipe directory and must exist;
/// the key file, when set, lives inside it.
pub(crate) fn template_upload_dir(entity: &Entity, ctx: &ValidationContext) -> Result<(), String> {
    let Entity::CloudTemplate(template) = entity else {
        return Ok(());
    };
    let Some(local) = template.local_directory.as_deref() else {
        return Ok(());
    };
    if Path::new(local).is_absolute() {
        return Err(
            "upload directory of a cloud template must be relative to the cloud configuration directory"
                .to_string(),
        );
    }
    let upload_dir = ctx.recipe_dir().join(local);
    if !upload_dir.exists() {
        return Err(format!("could not find upload directory at: {}", upload_dir.display()));
    }
    if !upload_dir.is_dir() {
        return Err(format!(
            "upload directory, set to: {} is not a directory",
            upload_dir.display()
        ));
    }
    if let Some(key_file) = template.key_file.as_deref().filter(|k| !k.trim().is_empty()) {
        let key_path = upload_dir.join(key_file);
        if !key_path.is_file() {
            return Err(format!("the specified key file was not found: {}", key_path.display()));
        }
    }
    Ok(())
}

/// Kinds that carry at least one hook, for diagnostics.
pub fn validated_kinds(registry: &Registry) -> Vec<EntityKind> {
    EntityKind::ALL
        .into_iter()
        .filter(|k| {
            registry
                .describe_kind(*k)
                .is_some_and(|d| !d.validators.is_empty())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::*;

    fn ctx() -> ValidationContext {
        ValidationContext::new("/nowhere/app-application.recipe")
    }

    fn named_service(name: &str) -> Service {
        Service {
            name: Some(name.to_string()),
            ..Service::default()
        }
    }

    fn yaml(s: &str) -> serde_yaml_ng::Value {
        serde_yaml_ng::from_str(s).unwrap()
    }

    #[test]
    fn test_validate_user_interface_metrics() {
        let mut ui = UserInterface {
            metric_groups: vec![MetricGroup {
                name: Some("process".into()),
                metrics: vec![yaml("cpu"), yaml("[heap, MEMORY]")],
            }],
            ..UserInterface::default()
        };
        assert!(user_interface_metrics(&Entity::UserInterface(ui.clone()), &ctx()).is_ok());

        for bad in ["[heap, bytes]", "[heap, MEMORY, extra]", "{a: 1}", "[[x], MEMORY]"] {
            ui.metric_groups[0].metrics = vec![yaml(bad)];
            let err = user_interface_metrics(&Entity::UserInterface(ui.clone()), &ctx()).unwrap_err();
            assert!(err.contains("process"), "{bad}: {err}");
        }
    }

    #[test]
    fn test_validate_scaling_rule_statistics_reference() {
        let mut svc = Service {
            service_statistics: vec![Statistics {
                name: Some("cpu".into()),
                ..Statistics::default()
            }],
            scaling_rules: vec![ScalingRule {
                service_statistics: Some(yaml("cpu")),
                ..ScalingRule::default()
            }],
            ..named_service("s")
        };
        assert!(service_scaling_rules(&Entity::Service(svc.clone()), &ctx()).is_ok());

        svc.scaling_rules[0].service_statistics = Some(yaml("memory"));
        let err = service_scaling_rules(&Entity::Service(svc.clone()), &ctx()).unwrap_err();
        assert!(err.contains("memory"));

        svc.scaling_rules[0].service_statistics = None;
        assert!(service_scaling_rules(&Entity::Service(svc), &ctx()).is_err());
    }

    #[test]
    fn test_validate_default_service_passes() {
        let reg = Registry::builtin();
        let root = Entity::Service(named_service("tomcat"));
        assert!(validate(&root, &reg, &ctx()).is_ok());
    }

    #[test]
    fn test_validate_service_name_missing() {
        let reg = Registry::builtin();
        let err = validate(&Entity::Service(Service::default()), &reg, &ctx()).unwrap_err();
        assert!(matches!(err, ErrorKind::ValidationFailure { entity: EntityKind::Service, .. }));
        assert!(err.to_string().contains("name is missing"));
    }

    #[test]
    fn test_validate_instances_exceed_max() {
        let svc = Service {
            num_instances: 3,
            max_allowed_instances: 2,
            ..named_service("s")
        };
        let err = service_instances(&Entity::Service(svc), &ctx()).unwrap_err();
        assert!(err.contains("exceeds the maximum"));
    }

    #[test]
    fn test_validate_unknown_service_type() {
        let svc = Service {
            service_type: Some("mainframe".into()),
            ..named_service("s")
        };
        assert!(service_type(&Entity::Service(svc), &ctx()).is_err());
        let svc = Service {
            service_type: Some("web_server".into()),
            ..named_service("s")
        };
        assert!(service_type(&Entity::Service(svc), &ctx()).is_ok());
    }

    #[test]
    fn test_validate_retries_lower_bound() {
        let svc = Service {
            retries: -2,
            ..named_service("s")
        };
        assert!(service_retries(&Entity::Service(svc), &ctx()).is_err());
    }

    #[test]
    fn test_validate_monitors_cache_timeout_must_be_integer() {
        let mut svc = named_service("s");
        svc.custom_properties
            .insert(MONITORS_CACHE_TIMEOUT.into(), "soon".into());
        assert!(service_custom_properties(&Entity::Service(svc.clone()), &ctx()).is_err());
        svc.custom_properties
            .insert(MONITORS_CACHE_TIMEOUT.into(), "5000".into());
        assert!(service_custom_properties(&Entity::Service(svc), &ctx()).is_ok());
    }

    #[test]
    fn test_validate_icon_found_in_lineage_dir() {
        let base_dir = tempfile::tempdir().unwrap();
        let child_dir = tempfile::tempdir().unwrap();
        std::fs::write(base_dir.path().join("icon.png"), b"png").unwrap();
        let base_recipe = base_dir.path().join("base-service.recipe");
        std::fs::write(&base_recipe, "service {}").unwrap();

        let ctx = ValidationContext::new(child_dir.path().join("child-service.recipe"));
        let mut svc = named_service("child");
        svc.icon = Some("icon.png".into());
        assert!(service_icon(&Entity::Service(svc.clone()), &ctx).is_err());

        svc.extended_services_paths = vec![base_recipe.display().to_string()];
        assert!(service_icon(&Entity::Service(svc), &ctx).is_ok());
    }

    #[test]
    fn test_validate_icon_skipped_for_application_file() {
        let mut svc = named_service("s");
        svc.icon = Some("missing.png".into());
        assert!(service_icon(&Entity::Service(svc), &ctx()).is_ok());
    }

    #[test]
    fn test_validate_network_port_range() {
        let net = ServiceNetwork {
            port: Some(70000),
            ..ServiceNetwork::default()
        };
        assert!(network_port(&Entity::Network(net), &ctx()).is_err());
    }

    #[test]
    fn test_validate_provider_rules() {
        let mut provider = CloudProvider {
            provider: Some("aws-ec2".into()),
            number_of_management_machines: 1,
            ..CloudProvider::default()
        };
        assert!(provider_settings(&Entity::CloudProvider(provider.clone()), &ctx()).is_ok());

        provider.number_of_management_machines = 3;
        assert!(provider_settings(&Entity::CloudProvider(provider.clone()), &ctx()).is_err());

        provider.number_of_management_machines = 2;
        provider.ssh_logging_level = "TRACE".into();
        let err = provider_settings(&Entity::CloudProvider(provider.clone()), &ctx()).unwrap_err();
        assert!(err.contains("sshLoggingLevel"));

        provider.ssh_logging_level = "FINE".into();
        provider.cloudify_url = Some("not a url".into());
        assert!(provider_settings(&Entity::CloudProvider(provider), &ctx()).is_err());
    }

    #[test]
    fn test_validate_cloud_management_template_listed() {
        let mut cloud = Cloud::default();
        assert!(cloud_management_template(&Entity::Cloud(cloud.clone()), &ctx()).is_err());
        cloud.configuration.management_machine_template = Some("SMALL".into());
        let err = cloud_management_template(&Entity::Cloud(cloud.clone()), &ctx()).unwrap_err();
        assert!(err.contains("not listed"));
        cloud.templates.insert("SMALL".into(), CloudTemplate::default());
        assert!(cloud_management_template(&Entity::Cloud(cloud), &ctx()).is_ok());
    }

    #[test]
    fn test_validate_template_upload_dir_and_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("upload")).unwrap();
        let ctx = ValidationContext::new(dir.path().join("ec2-cloud.recipe"));

        let mut template = CloudTemplate {
            local_directory: Some("upload".into()),
            ..CloudTemplate::default()
        };
        assert!(template_defaults(&Entity::CloudTemplate(template.clone()), &ctx).is_ok());
        assert!(template_upload_dir(&Entity::CloudTemplate(template.clone()), &ctx).is_ok());

        template.key_file = Some("id.pem".into());
        assert!(template_upload_dir(&Entity::CloudTemplate(template.clone()), &ctx).is_err());
        std::fs::write(dir.path().join("upload/id.pem"), b"key").unwrap();
        assert!(template_upload_dir(&Entity::CloudTemplate(template.clone()), &ctx).is_ok());

        template.key_file = Some(KEY_FILE_PLACEHOLDER.into());
        assert!(template_defaults(&Entity::CloudTemplate(template.clone()), &ctx).is_err());

        template.local_directory = Some("/abs/upload".into());
        assert!(template_upload_dir(&Entity::CloudTemplate(template), &ctx).is_err());
    }

    #[test]
    fn test_validate_traverses_into_application_services() {
        let reg = Registry::builtin();
        let app = Application {
            name: Some("petclinic".into()),
            services: vec![named_service("a"), Service::default()],
        };
        let err = validate(&Entity::Application(app), &reg, &ctx()).unwrap_err();
        assert!(err.to_string().contains("name is missing"));
    }

    #[test]
    fn test_validate_validated_kinds_cover_service_and_cloud() {
        let kinds = validated_kinds(&Registry::builtin());
        assert!(kinds.contains(&EntityKind::Service));
        assert!(kinds.contains(&EntityKind::CloudTemplate));
        assert!(!kinds.contains(&EntityKind::Compute));
    }
}

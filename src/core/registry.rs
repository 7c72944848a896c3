//! Entity registry: block identifier → descriptor.
//!
//! Built once and read-only afterwards. Callers either construct one with
//! [`Registry::builtin`] and pass it around, or use the process-wide
//! [`Registry::shared`] instance.

use super::entity::{Entity, EntityKind};
use super::validate::{self, ValidationContext};
use indexmap::IndexMap;
use std::fmt;
use std::sync::OnceLock;

/// A validation hook: inspect an entity, fail with a message.
pub type ValidationHook = fn(&Entity, &ValidationContext) -> Result<(), String>;

/// Family name of the processing-unit blocks; a service holds at most one.
pub const PROCESSING_UNIT_FAMILY: &str = "processingUnit";

/// How a block may be declared and what it compiles into.
#[derive(Clone)]
pub struct Descriptor {
    pub element_name: &'static str,
    pub kind: EntityKind,
    pub allow_as_root: bool,
    pub allow_nested: bool,
    /// Block the declaration must sit directly inside, when constrained
    pub required_parent: Option<EntityKind>,
    /// Sibling kinds sharing a family are mutually exclusive within one parent
    pub exclusive_family: Option<&'static str>,
    /// Whether `extend` may appear inside this block
    pub extensible: bool,
    pub validators: Vec<ValidationHook>,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("element_name", &self.element_name)
            .field("kind", &self.kind)
            .field("allow_as_root", &self.allow_as_root)
            .field("allow_nested", &self.allow_nested)
            .field("required_parent", &self.required_parent)
            .field("exclusive_family", &self.exclusive_family)
            .field("extensible", &self.extensible)
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl Descriptor {
    fn new(kind: EntityKind, allow_as_root: bool, allow_nested: bool) -> Self {
        Self {
            element_name: kind.element_name(),
            kind,
            allow_as_root,
            allow_nested,
            required_parent: None,
            exclusive_family: None,
            extensible: false,
            validators: Vec::new(),
        }
    }

    fn under(mut self, parent: EntityKind) -> Self {
        self.required_parent = Some(parent);
        self
    }

    fn family(mut self, family: &'static str) -> Self {
        self.exclusive_family = Some(family);
        self
    }

    fn extensible(mut self) -> Self {
        self.extensible = true;
        self
    }

    fn hooks(mut self, hooks: &[ValidationHook]) -> Self {
        self.validators.extend_from_slice(hooks);
        self
    }

    /// Check that the block may be opened with `parent` as the enclosing
    /// entity (`None` at document root). Returns the reason on failure.
    pub fn check_placement(&self, parent: Option<EntityKind>) -> Result<(), String> {
        match parent {
            None if !self.allow_as_root => Err("cannot be used as a root element".to_string()),
            None => Ok(()),
            Some(_) if !self.allow_nested => Err("cannot be nested in another element".to_string()),
            Some(p) => match self.required_parent {
                Some(required) if required != p => Err(format!(
                    "must be declared inside a '{}' block, not '{}'",
                    required, p
                )),
                _ => Ok(()),
            },
        }
    }
}

/// Immutable lookup table of every known block.
#[derive(Debug, Clone)]
pub struct Registry {
    descriptors: IndexMap<&'static str, Descriptor>,
}

static SHARED: OnceLock<Registry> = OnceLock::new();

impl Registry {
    /// The built-in block table.
    pub fn builtin() -> Self {
        use EntityKind::*;
        let entries = vec![
            Descriptor::new(Application, true, false),
            Descriptor::new(Service, true, true)
                .under(Application)
                .extensible()
                .hooks(&[
                    validate::service_name,
                    validate::service_instances,
                    validate::service_type,
                    validate::service_retries,
                    validate::service_custom_properties,
                    validate::service_icon,
                    validate::service_scaling_rules,
                ]),
            Descriptor::new(Lifecycle, false, true)
                .under(Service)
                .family(PROCESSING_UNIT_FAMILY)
                .hooks(&[validate::lifecycle_detection]),
            Descriptor::new(Network, false, true)
                .under(Service)
                .hooks(&[validate::network_port]),
            Descriptor::new(Compute, false, true).under(Service),
            Descriptor::new(IsolationSla, false, true).under(Service),
            Descriptor::new(StatelessProcessingUnit, false, true)
                .under(Service)
                .family(PROCESSING_UNIT_FAMILY),
            Descriptor::new(StatefulProcessingUnit, false, true)
                .under(Service)
                .family(PROCESSING_UNIT_FAMILY),
            Descriptor::new(MirrorProcessingUnit, false, true)
                .under(Service)
                .family(PROCESSING_UNIT_FAMILY),
            Descriptor::new(DataGrid, false, true)
                .under(Service)
                .family(PROCESSING_UNIT_FAMILY),
            Descriptor::new(Memcached, false, true)
                .under(Service)
                .family(PROCESSING_UNIT_FAMILY),
            Descriptor::new(Sla, false, true),
            Descriptor::new(UserInterface, false, true)
                .under(Service)
                .hooks(&[validate::user_interface_metrics]),
            Descriptor::new(MetricGroup, false, true).under(UserInterface),
            Descriptor::new(WidgetGroup, false, true).under(UserInterface),
            Descriptor::new(BalanceGauge, false, true).under(WidgetGroup),
            Descriptor::new(BarLineChart, false, true).under(WidgetGroup),
            Descriptor::new(ScalingRule, false, true).under(Service),
            Descriptor::new(HighThreshold, false, true).under(ScalingRule),
            Descriptor::new(LowThreshold, false, true).under(ScalingRule),
            Descriptor::new(ServiceStatistics, false, true).under(Service),
            Descriptor::new(PerInstanceStatistics, false, true).under(Service),
            Descriptor::new(Plugin, false, true).under(Service),
            Descriptor::new(Cloud, true, false).hooks(&[
                validate::cloud_management_template,
                validate::cloud_user_key_file,
            ]),
            Descriptor::new(CloudProvider, false, true)
                .under(Cloud)
                .hooks(&[validate::provider_settings]),
            Descriptor::new(CloudUser, false, true).under(Cloud),
            Descriptor::new(CloudConfiguration, false, true).under(Cloud),
            Descriptor::new(CloudTemplate, true, true).hooks(&[
                validate::template_defaults,
                validate::template_upload_dir,
            ]),
            Descriptor::new(TemplateInstaller, true, true).under(CloudTemplate),
        ];

        let descriptors = entries
            .into_iter()
            .map(|d| (d.element_name, d))
            .collect();
        Self { descriptors }
    }

    /// Process-wide registry, built on first use.
    pub fn shared() -> &'static Registry {
        SHARED.get_or_init(Registry::builtin)
    }

    pub fn describe(&self, name: &str) -> Option<&Descriptor> {
        self.descriptors.get(name)
    }

    pub fn describe_kind(&self, kind: EntityKind) -> Option<&Descriptor> {
        self.descriptors.get(kind.element_name())
    }

    /// Descriptors sharing an exclusive family.
    pub fn family_members<'a>(&'a self, family: &'a str) -> impl Iterator<Item = &'a Descriptor> + 'a {
        self.descriptors
            .values()
            .filter(move |d| d.exclusive_family == Some(family))
    }

    pub fn element_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

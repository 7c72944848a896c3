//! Entities and their property capability.
//!
//! [`Entity`] wraps every compilable struct from [`super::types`] behind one
//! enum so the evaluator can hold a stack of heterogeneous scopes. Property
//! access goes through the serialized form: the writable properties of an
//! entity are the keys of its serde mapping minus [`EntityKind::read_only`],
//! and setting a property is insert-into-mapping followed by deserialize.

use super::types::*;
use serde::{Serialize, Serializer};
use serde_yaml_ng::{Mapping, Value};
use std::fmt;

/// Every block type a recipe can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Application,
    Service,
    Lifecycle,
    Network,
    Compute,
    IsolationSla,
    StatelessProcessingUnit,
    StatefulProcessingUnit,
    MirrorProcessingUnit,
    DataGrid,
    Memcached,
    Sla,
    Cloud,
    CloudProvider,
    CloudUser,
    CloudConfiguration,
    CloudTemplate,
    UserInterface,
    MetricGroup,
    WidgetGroup,
    BalanceGauge,
    BarLineChart,
    ScalingRule,
    HighThreshold,
    LowThreshold,
    ServiceStatistics,
    PerInstanceStatistics,
    Plugin,
    TemplateInstaller,
}

impl EntityKind {
    pub const ALL: [EntityKind; 29] = [
        EntityKind::Application,
        EntityKind::Service,
        EntityKind::Lifecycle,
        EntityKind::Network,
        EntityKind::Compute,
        EntityKind::IsolationSla,
        EntityKind::StatelessProcessingUnit,
        EntityKind::StatefulProcessingUnit,
        EntityKind::MirrorProcessingUnit,
        EntityKind::DataGrid,
        EntityKind::Memcached,
        EntityKind::Sla,
        EntityKind::Cloud,
        EntityKind::CloudProvider,
        EntityKind::CloudUser,
        EntityKind::CloudConfiguration,
        EntityKind::CloudTemplate,
        EntityKind::UserInterface,
        EntityKind::MetricGroup,
        EntityKind::WidgetGroup,
        EntityKind::BalanceGauge,
        EntityKind::BarLineChart,
        EntityKind::ScalingRule,
        EntityKind::HighThreshold,
        EntityKind::LowThreshold,
        EntityKind::ServiceStatistics,
        EntityKind::PerInstanceStatistics,
        EntityKind::Plugin,
        EntityKind::TemplateInstaller,
    ];

    /// Block identifier used in recipe source. Also the name of the parent
    /// property a finished nested block is bound to.
    pub fn element_name(self) -> &'static str {
        match self {
            EntityKind::Application => "application",
            EntityKind::Service => "service",
            EntityKind::Lifecycle => "lifecycle",
            EntityKind::Network => "network",
            EntityKind::Compute => "compute",
            EntityKind::IsolationSla => "isolationSLA",
            EntityKind::StatelessProcessingUnit => "statelessProcessingUnit",
            EntityKind::StatefulProcessingUnit => "statefulProcessingUnit",
            EntityKind::MirrorProcessingUnit => "mirrorProcessingUnit",
            EntityKind::DataGrid => "dataGrid",
            EntityKind::Memcached => "memcached",
            EntityKind::Sla => "sla",
            EntityKind::Cloud => "cloud",
            EntityKind::CloudProvider => "provider",
            EntityKind::CloudUser => "user",
            EntityKind::CloudConfiguration => "configuration",
            EntityKind::CloudTemplate => "template",
            EntityKind::UserInterface => "userInterface",
            EntityKind::MetricGroup => "metricGroup",
            EntityKind::WidgetGroup => "widgetGroup",
            EntityKind::BalanceGauge => "balanceGauge",
            EntityKind::BarLineChart => "barLineChart",
            EntityKind::ScalingRule => "scalingRule",
            EntityKind::HighThreshold => "highThreshold",
            EntityKind::LowThreshold => "lowThreshold",
            EntityKind::ServiceStatistics => "serviceStatistics",
            EntityKind::PerInstanceStatistics => "perInstanceStatistics",
            EntityKind::Plugin => "plugin",
            EntityKind::TemplateInstaller => "installer",
        }
    }

    /// Properties present on the type that recipes may not assign.
    pub fn read_only(self) -> &'static [&'static str] {
        match self {
            EntityKind::Service => &["extendedServicesPaths"],
            EntityKind::CloudTemplate => &["absoluteUploadDir"],
            _ => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element_name())
    }
}

/// A compiled (or in-progress) entity of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Application(Application),
    Service(Service),
    Lifecycle(ServiceLifecycle),
    Network(ServiceNetwork),
    Compute(ComputeDetails),
    IsolationSla(IsolationSla),
    StatelessProcessingUnit(ProcessingUnit),
    StatefulProcessingUnit(ProcessingUnit),
    MirrorProcessingUnit(ProcessingUnit),
    DataGrid(DataGrid),
    Memcached(Memcached),
    Sla(Sla),
    Cloud(Cloud),
    CloudProvider(CloudProvider),
    CloudUser(CloudUser),
    CloudConfiguration(CloudConfiguration),
    CloudTemplate(CloudTemplate),
    UserInterface(UserInterface),
    MetricGroup(MetricGroup),
    WidgetGroup(WidgetGroup),
    BalanceGauge(BalanceGauge),
    BarLineChart(BarLineChart),
    ScalingRule(ScalingRule),
    HighThreshold(HighThreshold),
    LowThreshold(LowThreshold),
    ServiceStatistics(Statistics),
    PerInstanceStatistics(Statistics),
    Plugin(Plugin),
    TemplateInstaller(TemplateInstaller),
}

/// Apply `$body` to the inner struct of whichever variant `$entity` is.
macro_rules! each_entity {
    ($entity:expr, $inner:ident => $body:expr) => {
        match $entity {
            Entity::Application($inner) => $body,
            Entity::Service($inner) => $body,
            Entity::Lifecycle($inner) => $body,
            Entity::Network($inner) => $body,
            Entity::Compute($inner) => $body,
            Entity::IsolationSla($inner) => $body,
            Entity::StatelessProcessingUnit($inner) => $body,
            Entity::StatefulProcessingUnit($inner) => $body,
            Entity::MirrorProcessingUnit($inner) => $body,
            Entity::DataGrid($inner) => $body,
            Entity::Memcached($inner) => $body,
            Entity::Sla($inner) => $body,
            Entity::Cloud($inner) => $body,
            Entity::CloudProvider($inner) => $body,
            Entity::CloudUser($inner) => $body,
            Entity::CloudConfiguration($inner) => $body,
            Entity::CloudTemplate($inner) => $body,
            Entity::UserInterface($inner) => $body,
            Entity::MetricGroup($inner) => $body,
            Entity::WidgetGroup($inner) => $body,
            Entity::BalanceGauge($inner) => $body,
            Entity::BarLineChart($inner) => $body,
            Entity::ScalingRule($inner) => $body,
            Entity::HighThreshold($inner) => $body,
            Entity::LowThreshold($inner) => $body,
            Entity::ServiceStatistics($inner) => $body,
            Entity::PerInstanceStatistics($inner) => $body,
            Entity::Plugin($inner) => $body,
            Entity::TemplateInstaller($inner) => $body,
        }
    };
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        each_entity!(self, inner => inner.serialize(serializer))
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, String> {
    serde_yaml_ng::from_value(value).map_err(|e| e.to_string())
}

impl Entity {
    /// A fresh entity with every property at its default.
    pub fn new(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Application => Entity::Application(Application::default()),
            EntityKind::Service => Entity::Service(Service::default()),
            EntityKind::Lifecycle => Entity::Lifecycle(ServiceLifecycle::default()),
            EntityKind::Network => Entity::Network(ServiceNetwork::default()),
            EntityKind::Compute => Entity::Compute(ComputeDetails::default()),
            EntityKind::IsolationSla => Entity::IsolationSla(IsolationSla::default()),
            EntityKind::StatelessProcessingUnit => {
                Entity::StatelessProcessingUnit(ProcessingUnit::default())
            }
            EntityKind::StatefulProcessingUnit => {
                Entity::StatefulProcessingUnit(ProcessingUnit::default())
            }
            EntityKind::MirrorProcessingUnit => {
                Entity::MirrorProcessingUnit(ProcessingUnit::default())
            }
            EntityKind::DataGrid => Entity::DataGrid(DataGrid::default()),
            EntityKind::Memcached => Entity::Memcached(Memcached::default()),
            EntityKind::Sla => Entity::Sla(Sla::default()),
            EntityKind::Cloud => Entity::Cloud(Cloud::default()),
            EntityKind::CloudProvider => Entity::CloudProvider(CloudProvider::default()),
            EntityKind::CloudUser => Entity::CloudUser(CloudUser::default()),
            EntityKind::CloudConfiguration => {
                Entity::CloudConfiguration(CloudConfiguration::default())
            }
            EntityKind::CloudTemplate => Entity::CloudTemplate(CloudTemplate::default()),
            EntityKind::UserInterface => Entity::UserInterface(UserInterface::default()),
            EntityKind::MetricGroup => Entity::MetricGroup(MetricGroup::default()),
            EntityKind::WidgetGroup => Entity::WidgetGroup(WidgetGroup::default()),
            EntityKind::BalanceGauge => Entity::BalanceGauge(BalanceGauge::default()),
            EntityKind::BarLineChart => Entity::BarLineChart(BarLineChart::default()),
            EntityKind::ScalingRule => Entity::ScalingRule(ScalingRule::default()),
            EntityKind::HighThreshold => Entity::HighThreshold(HighThreshold::default()),
            EntityKind::LowThreshold => Entity::LowThreshold(LowThreshold::default()),
            EntityKind::ServiceStatistics => Entity::ServiceStatistics(Statistics::default()),
            EntityKind::PerInstanceStatistics => Entity::PerInstanceStatistics(Statistics::default()),
            EntityKind::Plugin => Entity::Plugin(Plugin::default()),
            EntityKind::TemplateInstaller => Entity::TemplateInstaller(TemplateInstaller::default()),
        }
    }

    /// Rebuild an entity of `kind` from its serialized form.
    pub fn from_value(kind: EntityKind, value: Value) -> Result<Self, String> {
        Ok(match kind {
            EntityKind::Application => Entity::Application(decode(value)?),
            EntityKind::Service => Entity::Service(decode(value)?),
            EntityKind::Lifecycle => Entity::Lifecycle(decode(value)?),
            EntityKind::Network => Entity::Network(decode(value)?),
            EntityKind::Compute => Entity::Compute(decode(value)?),
            EntityKind::IsolationSla => Entity::IsolationSla(decode(value)?),
            EntityKind::StatelessProcessingUnit => Entity::StatelessProcessingUnit(decode(value)?),
            EntityKind::StatefulProcessingUnit => Entity::StatefulProcessingUnit(decode(value)?),
            EntityKind::MirrorProcessingUnit => Entity::MirrorProcessingUnit(decode(value)?),
            EntityKind::DataGrid => Entity::DataGrid(decode(value)?),
            EntityKind::Memcached => Entity::Memcached(decode(value)?),
            EntityKind::Sla => Entity::Sla(decode(value)?),
            EntityKind::Cloud => Entity::Cloud(decode(value)?),
            EntityKind::CloudProvider => Entity::CloudProvider(decode(value)?),
            EntityKind::CloudUser => Entity::CloudUser(decode(value)?),
            EntityKind::CloudConfiguration => Entity::CloudConfiguration(decode(value)?),
            EntityKind::CloudTemplate => Entity::CloudTemplate(decode(value)?),
            EntityKind::UserInterface => Entity::UserInterface(decode(value)?),
            EntityKind::MetricGroup => Entity::MetricGroup(decode(value)?),
            EntityKind::WidgetGroup => Entity::WidgetGroup(decode(value)?),
            EntityKind::BalanceGauge => Entity::BalanceGauge(decode(value)?),
            EntityKind::BarLineChart => Entity::BarLineChart(decode(value)?),
            EntityKind::ScalingRule => Entity::ScalingRule(decode(value)?),
            EntityKind::HighThreshold => Entity::HighThreshold(decode(value)?),
            EntityKind::LowThreshold => Entity::LowThreshold(decode(value)?),
            EntityKind::ServiceStatistics => Entity::ServiceStatistics(decode(value)?),
            EntityKind::PerInstanceStatistics => Entity::PerInstanceStatistics(decode(value)?),
            EntityKind::Plugin => Entity::Plugin(decode(value)?),
            EntityKind::TemplateInstaller => Entity::TemplateInstaller(decode(value)?),
        })
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Application(_) => EntityKind::Application,
            Entity::Service(_) => EntityKind::Service,
            Entity::Lifecycle(_) => EntityKind::Lifecycle,
            Entity::Network(_) => EntityKind::Network,
            Entity::Compute(_) => EntityKind::Compute,
            Entity::IsolationSla(_) => EntityKind::IsolationSla,
            Entity::StatelessProcessingUnit(_) => EntityKind::StatelessProcessingUnit,
            Entity::StatefulProcessingUnit(_) => EntityKind::StatefulProcessingUnit,
            Entity::MirrorProcessingUnit(_) => EntityKind::MirrorProcessingUnit,
            Entity::DataGrid(_) => EntityKind::DataGrid,
            Entity::Memcached(_) => EntityKind::Memcached,
            Entity::Sla(_) => EntityKind::Sla,
            Entity::Cloud(_) => EntityKind::Cloud,
            Entity::CloudProvider(_) => EntityKind::CloudProvider,
            Entity::CloudUser(_) => EntityKind::CloudUser,
            Entity::CloudConfiguration(_) => EntityKind::CloudConfiguration,
            Entity::CloudTemplate(_) => EntityKind::CloudTemplate,
            Entity::UserInterface(_) => EntityKind::UserInterface,
            Entity::MetricGroup(_) => EntityKind::MetricGroup,
            Entity::WidgetGroup(_) => EntityKind::WidgetGroup,
            Entity::BalanceGauge(_) => EntityKind::BalanceGauge,
            Entity::BarLineChart(_) => EntityKind::BarLineChart,
            Entity::ScalingRule(_) => EntityKind::ScalingRule,
            Entity::HighThreshold(_) => EntityKind::HighThreshold,
            Entity::LowThreshold(_) => EntityKind::LowThreshold,
            Entity::ServiceStatistics(_) => EntityKind::ServiceStatistics,
            Entity::PerInstanceStatistics(_) => EntityKind::PerInstanceStatistics,
            Entity::Plugin(_) => EntityKind::Plugin,
            Entity::TemplateInstaller(_) => EntityKind::TemplateInstaller,
        }
    }

    /// Serialized form of the entity.
    pub fn to_value(&self) -> Result<Value, String> {
        each_entity!(self, inner => serde_yaml_ng::to_value(inner).map_err(|e| e.to_string()))
    }

    fn to_mapping(&self) -> Result<Mapping, String> {
        match self.to_value()? {
            Value::Mapping(map) => Ok(map),
            other => Err(format!("{} did not serialize to a mapping: {:?}", self.kind(), other)),
        }
    }

    /// Current value of a property, `None` if the type has no such property.
    pub fn property(&self, name: &str) -> Option<Value> {
        self.to_mapping().ok()?.get(name).cloned()
    }

    /// Names a recipe may assign on this entity, in field order.
    pub fn writable_properties(&self) -> Vec<String> {
        let read_only = self.kind().read_only();
        let mut names: Vec<String> = self
            .to_mapping()
            .map(|map| {
                map.keys()
                    .filter_map(|k| k.as_str())
                    .filter(|k| !read_only.contains(k))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if self.kind() == EntityKind::Application {
            names.push("service".to_string());
        }
        names
    }

    pub fn is_writable(&self, name: &str) -> bool {
        self.writable_properties().iter().any(|p| p == name)
    }

    /// Assign `value` to `name` with no coercion beyond what serde performs.
    ///
    /// Application is the one repeatable container: assigning `service`
    /// appends to `services` instead of replacing anything.
    pub fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        let kind = self.kind();
        if let Entity::Application(app) = self {
            if name == "service" {
                let service: Service = decode(value).map_err(PropertyError::Coercion)?;
                app.services.push(service);
                return Ok(());
            }
        }
        if kind.read_only().contains(&name) {
            return Err(PropertyError::Unknown);
        }
        let mut map = self.to_mapping().map_err(PropertyError::Coercion)?;
        let key = Value::String(name.to_string());
        if !map.contains_key(&key) {
            return Err(PropertyError::Unknown);
        }
        map.insert(key, value);
        *self = Entity::from_value(kind, Value::Mapping(map)).map_err(PropertyError::Coercion)?;
        Ok(())
    }

    /// The `name` property, for display.
    pub fn name(&self) -> Option<String> {
        match self.property("name")? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Nested entities reachable from this one, in field order.
    pub fn children(&self) -> Vec<Entity> {
        let mut out = Vec::new();
        match self {
            Entity::Application(app) => {
                out.extend(app.services.iter().cloned().map(Entity::Service));
            }
            Entity::Service(svc) => {
                out.extend(svc.lifecycle.clone().map(Entity::Lifecycle));
                out.extend(svc.network.clone().map(Entity::Network));
                out.extend(svc.compute.clone().map(Entity::Compute));
                out.extend(svc.isolation_sla.clone().map(Entity::IsolationSla));
                out.extend(svc.stateless_processing_unit.clone().map(Entity::StatelessProcessingUnit));
                out.extend(svc.stateful_processing_unit.clone().map(Entity::StatefulProcessingUnit));
                out.extend(svc.mirror_processing_unit.clone().map(Entity::MirrorProcessingUnit));
                out.extend(svc.data_grid.clone().map(Entity::DataGrid));
                out.extend(svc.memcached.clone().map(Entity::Memcached));
                out.extend(svc.user_interface.clone().map(Entity::UserInterface));
                out.extend(svc.plugins.iter().cloned().map(Entity::Plugin));
                out.extend(svc.scaling_rules.iter().cloned().map(Entity::ScalingRule));
                out.extend(svc.service_statistics.iter().cloned().map(Entity::ServiceStatistics));
                out.extend(
                    svc.per_instance_statistics
                        .iter()
                        .cloned()
                        .map(Entity::PerInstanceStatistics),
                );
            }
            Entity::UserInterface(ui) => {
                out.extend(ui.metric_groups.iter().cloned().map(Entity::MetricGroup));
                out.extend(ui.widget_groups.iter().cloned().map(Entity::WidgetGroup));
            }
            Entity::WidgetGroup(group) => {
                out.extend(group.widgets.iter().cloned().map(|w| match w {
                    Widget::BalanceGauge(g) => Entity::BalanceGauge(g),
                    Widget::BarLineChart(c) => Entity::BarLineChart(c),
                }));
            }
            Entity::ScalingRule(rule) => {
                out.extend(rule.high_threshold.clone().map(Entity::HighThreshold));
                out.extend(rule.low_threshold.clone().map(Entity::LowThreshold));
            }
            Entity::CloudTemplate(template) => {
                out.push(Entity::TemplateInstaller(template.installer.clone()));
            }
            Entity::StatelessProcessingUnit(pu)
            | Entity::StatefulProcessingUnit(pu)
            | Entity::MirrorProcessingUnit(pu) => {
                out.extend(pu.sla.clone().map(Entity::Sla));
            }
            Entity::DataGrid(grid) => out.extend(grid.sla.clone().map(Entity::Sla)),
            Entity::Memcached(mc) => out.extend(mc.sla.clone().map(Entity::Sla)),
            Entity::Cloud(cloud) => {
                out.extend(cloud.provider.clone().map(Entity::CloudProvider));
                out.push(Entity::CloudUser(cloud.user.clone()));
                out.push(Entity::CloudConfiguration(cloud.configuration.clone()));
                out.extend(cloud.templates.values().cloned().map(Entity::CloudTemplate));
            }
            _ => {}
        }
        out
    }

    pub fn into_service(self) -> Option<Service> {
        match self {
            Entity::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_application(self) -> Option<Application> {
        match self {
            Entity::Application(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_cloud(self) -> Option<Cloud> {
        match self {
            Entity::Cloud(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_template(self) -> Option<CloudTemplate> {
        match self {
            Entity::CloudTemplate(t) => Some(t),
            _ => None,
        }
    }
}

/// Why [`Entity::set_property`] refused a value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyError {
    /// No such property, or it is read-only
    Unknown,
    /// The value does not deserialize into the property's type
    Coercion(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_element_names_unique() {
        let mut names: Vec<&str> = EntityKind::ALL.iter().map(|k| k.element_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_entity_new_matches_kind() {
        for kind in EntityKind::ALL {
            assert_eq!(Entity::new(kind).kind(), kind);
        }
    }

    #[test]
    fn test_entity_set_scalar_property() {
        let mut e = Entity::new(EntityKind::Service);
        e.set_property("numInstances", Value::from(3)).unwrap();
        e.set_property("name", Value::from("tomcat")).unwrap();
        let svc = e.into_service().unwrap();
        assert_eq!(svc.num_instances, 3);
        assert_eq!(svc.name.as_deref(), Some("tomcat"));
    }

    #[test]
    fn test_entity_unknown_property_rejected() {
        let mut e = Entity::new(EntityKind::Service);
        assert_eq!(
            e.set_property("numInstancez", Value::from(3)),
            Err(PropertyError::Unknown)
        );
    }

    #[test]
    fn test_entity_read_only_property_rejected() {
        let mut e = Entity::new(EntityKind::Service);
        assert!(!e.is_writable("extendedServicesPaths"));
        assert_eq!(
            e.set_property("extendedServicesPaths", Value::Sequence(vec![])),
            Err(PropertyError::Unknown)
        );
    }

    #[test]
    fn test_entity_type_mismatch_is_coercion_error() {
        let mut e = Entity::new(EntityKind::Service);
        let err = e.set_property("numInstances", Value::from("many")).unwrap_err();
        assert!(matches!(err, PropertyError::Coercion(_)));
        // failed assignment leaves the entity untouched
        assert_eq!(e.property("numInstances"), Some(Value::from(1)));
    }

    #[test]
    fn test_entity_application_service_appends() {
        let mut app = Entity::new(EntityKind::Application);
        for name in ["a", "b"] {
            let mut svc = Entity::new(EntityKind::Service);
            svc.set_property("name", Value::from(name)).unwrap();
            app.set_property("service", svc.to_value().unwrap()).unwrap();
        }
        let app = app.into_application().unwrap();
        let names: Vec<_> = app.services.iter().filter_map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_entity_writable_properties_include_service_on_application() {
        let app = Entity::new(EntityKind::Application);
        assert!(app.is_writable("service"));
        assert!(app.is_writable("name"));
        assert!(!Entity::new(EntityKind::Service).is_writable("service"));
    }

    #[test]
    fn test_entity_children_of_service() {
        let mut svc = Service::default();
        svc.lifecycle = Some(ServiceLifecycle::default());
        svc.data_grid = Some(DataGrid {
            sla: Some(Sla::default()),
        });
        let children = Entity::Service(svc).children();
        let kinds: Vec<_> = children.iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec![EntityKind::Lifecycle, EntityKind::DataGrid]);
        assert_eq!(children[1].children()[0].kind(), EntityKind::Sla);
    }

    #[test]
    fn test_entity_children_of_user_interface() {
        let ui = UserInterface {
            metric_groups: vec![MetricGroup::default()],
            widget_groups: vec![WidgetGroup {
                widgets: vec![
                    Widget::BalanceGauge(BalanceGauge::default()),
                    Widget::BarLineChart(BarLineChart::default()),
                ],
                ..WidgetGroup::default()
            }],
        };
        let children = Entity::UserInterface(ui).children();
        let kinds: Vec<_> = children.iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec![EntityKind::MetricGroup, EntityKind::WidgetGroup]);
        let widgets: Vec<_> = children[1].children().iter().map(|c| c.kind()).collect();
        assert_eq!(widgets, vec![EntityKind::BalanceGauge, EntityKind::BarLineChart]);
    }

    #[test]
    fn test_entity_name_and_conversions() {
        let mut e = Entity::new(EntityKind::Cloud);
        e.set_property("name", Value::from("ec2")).unwrap();
        assert_eq!(e.name().as_deref(), Some("ec2"));
        assert!(e.clone().into_service().is_none());
        assert!(e.into_cloud().is_some());
        assert_eq!(Entity::new(EntityKind::CloudTemplate).name(), None);
    }
}

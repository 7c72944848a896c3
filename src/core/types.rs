//! Compiled entity types.
//!
//! Every block a recipe can declare compiles into one of these structs. All
//! of them derive Serialize/Deserialize with camelCase field names, which is
//! what makes them bindable: the serialized form is the property table the
//! binder writes into (see [`super::entity`]).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Applications
// ============================================================================

/// Root of an `-application` recipe: a named, ordered set of services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Application {
    /// Application name
    pub name: Option<String>,

    /// Services in declaration order
    pub services: Vec<Service>,
}

// ============================================================================
// Services
// ============================================================================

/// A deployable service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Service {
    /// Service name
    pub name: Option<String>,

    /// Icon file, relative to the recipe directory
    pub icon: Option<String>,

    /// Service tier (WEB_SERVER, DATABASE, ...)
    #[serde(rename = "type")]
    pub service_type: Option<String>,

    /// Requested instance count
    pub num_instances: u32,

    /// Lower bound for elastic scaling
    pub min_allowed_instances: u32,

    /// Upper bound for elastic scaling
    pub max_allowed_instances: u32,

    /// Whether instances may be added/removed after install
    pub elastic: bool,

    /// Public URL of the service
    pub url: Option<String>,

    /// Install retries (-1 retries forever)
    pub retries: i32,

    /// Names of services that must be installed first
    pub depends_on: Vec<String>,

    /// Lifecycle event handlers
    pub lifecycle: Option<ServiceLifecycle>,

    /// Network descriptor
    pub network: Option<ServiceNetwork>,

    /// Compute placement
    pub compute: Option<ComputeDetails>,

    /// Isolation policy
    #[serde(rename = "isolationSLA")]
    pub isolation_sla: Option<IsolationSla>,

    /// Named custom commands
    pub custom_commands: IndexMap<String, ExecutableEntry>,

    /// Free-form string properties
    pub custom_properties: IndexMap<String, String>,

    // -- Processing units (at most one per service) --
    pub stateless_processing_unit: Option<ProcessingUnit>,
    pub stateful_processing_unit: Option<ProcessingUnit>,
    pub mirror_processing_unit: Option<ProcessingUnit>,
    pub data_grid: Option<DataGrid>,
    pub memcached: Option<Memcached>,

    /// Metrics layout shown in the web UI
    pub user_interface: Option<UserInterface>,

    /// Agent plugins loaded with each instance
    pub plugins: Vec<Plugin>,

    /// Upper bound in bytes for the packaged service
    pub max_jar_size: u64,

    // -- Elastic scaling --
    pub scaling_rules: Vec<ScalingRule>,
    pub service_statistics: Vec<Statistics>,
    pub per_instance_statistics: Vec<Statistics>,
    pub sampling_period_in_seconds: u32,
    pub scale_in_cooldown_in_seconds: u32,
    pub scale_out_cooldown_in_seconds: u32,

    /// Absolute paths of the recipes this service extends, most recent first
    pub extended_services_paths: Vec<String>,
}

/// 150 MiB.
pub const DEFAULT_MAX_JAR_SIZE: u64 = 150 * 1024 * 1024;

impl Default for Service {
    fn default() -> Self {
        Self {
            name: None,
            icon: None,
            service_type: None,
            num_instances: 1,
            min_allowed_instances: 1,
            max_allowed_instances: 1,
            elastic: false,
            url: None,
            retries: -1,
            depends_on: Vec::new(),
            lifecycle: None,
            network: None,
            compute: None,
            isolation_sla: None,
            custom_commands: IndexMap::new(),
            custom_properties: IndexMap::new(),
            stateless_processing_unit: None,
            stateful_processing_unit: None,
            mirror_processing_unit: None,
            data_grid: None,
            memcached: None,
            user_interface: None,
            plugins: Vec::new(),
            max_jar_size: DEFAULT_MAX_JAR_SIZE,
            scaling_rules: Vec::new(),
            service_statistics: Vec::new(),
            per_instance_statistics: Vec::new(),
            sampling_period_in_seconds: 60,
            scale_in_cooldown_in_seconds: 0,
            scale_out_cooldown_in_seconds: 0,
            extended_services_paths: Vec::new(),
        }
    }
}

/// A lifecycle handler: a command line, an argv list, or a per-OS map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutableEntry {
    Command(String),
    Args(Vec<String>),
    PerOs(IndexMap<String, String>),
}

impl fmt::Display for ExecutableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(c) => write!(f, "{}", c),
            Self::Args(args) => write!(f, "{}", args.join(" ")),
            Self::PerOs(map) => {
                let parts: Vec<String> = map.iter().map(|(os, c)| format!("{os}: {c}")).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Service lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceLifecycle {
    pub init: Option<ExecutableEntry>,
    pub pre_install: Option<ExecutableEntry>,
    pub install: Option<ExecutableEntry>,
    pub post_install: Option<ExecutableEntry>,
    pub pre_start: Option<ExecutableEntry>,
    pub start: Option<ExecutableEntry>,
    pub post_start: Option<ExecutableEntry>,
    pub pre_stop: Option<ExecutableEntry>,
    pub stop: Option<ExecutableEntry>,
    pub post_stop: Option<ExecutableEntry>,
    pub shutdown: Option<ExecutableEntry>,
    pub start_detection: Option<ExecutableEntry>,
    pub stop_detection: Option<ExecutableEntry>,
    pub locator: Option<ExecutableEntry>,
    pub monitors: Option<ExecutableEntry>,
    pub details: Option<ExecutableEntry>,

    /// Seconds to wait for start detection to succeed
    pub start_detection_timeout_secs: u32,

    /// Seconds between start detection attempts
    pub start_detection_interval_secs: u32,
}

impl Default for ServiceLifecycle {
    fn default() -> Self {
        Self {
            init: None,
            pre_install: None,
            install: None,
            post_install: None,
            pre_start: None,
            start: None,
            post_start: None,
            pre_stop: None,
            stop: None,
            post_stop: None,
            shutdown: None,
            start_detection: None,
            stop_detection: None,
            locator: None,
            monitors: None,
            details: None,
            start_detection_timeout_secs: 90,
            start_detection_interval_secs: 1,
        }
    }
}

/// Network descriptor of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceNetwork {
    pub port: Option<i32>,
    pub protocol_description: Option<String>,
    pub description: Option<String>,
}

/// Compute placement of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputeDetails {
    /// Cloud template name
    pub template: Option<String>,
}

/// Isolation policy of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IsolationSla {
    pub mode: IsolationMode,
    pub instance_cpu_cores: f64,
    #[serde(rename = "instanceMemoryMB")]
    pub instance_memory_mb: u32,
    pub use_management: bool,
}

impl Default for IsolationSla {
    fn default() -> Self {
        Self {
            mode: IsolationMode::Dedicated,
            instance_cpu_cores: 0.0,
            instance_memory_mb: 0,
            use_management: false,
        }
    }
}

/// How service instances share machines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationMode {
    #[default]
    #[serde(alias = "dedicated", alias = "Dedicated")]
    Dedicated,
    #[serde(alias = "global", alias = "Global")]
    Global,
    #[serde(alias = "app_shared", alias = "appShared", alias = "AppShared")]
    AppShared,
    #[serde(alias = "tenant_shared", alias = "tenantShared", alias = "TenantShared")]
    TenantShared,
}

// ============================================================================
// Monitoring UI
// ============================================================================

/// Web-UI layout for a service's metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInterface {
    pub metric_groups: Vec<MetricGroup>,
    pub widget_groups: Vec<WidgetGroup>,
}

/// Named set of metrics. Each metric is a name or a `[name, unit]` pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricGroup {
    pub name: Option<String>,
    pub metrics: Vec<serde_yaml_ng::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetGroup {
    pub name: Option<String>,
    pub title: Option<String>,
    pub widgets: Vec<Widget>,
}

/// A gauge carries only `metric`; anything with an axis is a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Widget {
    BalanceGauge(BalanceGauge),
    BarLineChart(BarLineChart),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BalanceGauge {
    pub metric: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BarLineChart {
    pub metric: Option<String>,
    pub axis_y_unit: Option<String>,
}

/// Units a `[name, unit]` metric may carry.
pub const METRIC_UNITS: &[&str] = &["REGULAR", "PERCENTAGE", "MEMORY", "DURATION"];

// ============================================================================
// Scaling and plugins
// ============================================================================

/// Scale out above `highThreshold`, scale in below `lowThreshold`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScalingRule {
    /// Name of a declared `serviceStatistics` entry, or an inline one
    pub service_statistics: Option<serde_yaml_ng::Value>,
    pub high_threshold: Option<HighThreshold>,
    pub low_threshold: Option<LowThreshold>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HighThreshold {
    pub value: Option<f64>,
    pub instances_increase: u32,
}

impl Default for HighThreshold {
    fn default() -> Self {
        Self {
            value: None,
            instances_increase: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LowThreshold {
    pub value: Option<f64>,
    pub instances_decrease: u32,
}

impl Default for LowThreshold {
    fn default() -> Self {
        Self {
            value: None,
            instances_decrease: 1,
        }
    }
}

/// Aggregation of one metric, service-wide or per instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    pub name: Option<String>,
    pub metric: Option<String>,
    /// Aggregation over the time window (average, minimum, maximum, percentile)
    pub time_statistics: String,
    /// Aggregation across instances
    pub instances_statistics: String,
    pub moving_time_range_in_seconds: u32,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            name: None,
            metric: None,
            time_statistics: "average".to_string(),
            instances_statistics: "average".to_string(),
            moving_time_range_in_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Plugin {
    pub name: Option<String>,
    pub class_name: Option<String>,
    pub config: IndexMap<String, serde_yaml_ng::Value>,
}

// ============================================================================
// Processing units
// ============================================================================

/// Stateless, stateful and mirror processing units share one shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingUnit {
    /// Jar or directory holding the unit's binaries
    pub binaries: Option<String>,
    pub sla: Option<Sla>,
    pub context_properties: IndexMap<String, String>,
}

/// In-memory data grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataGrid {
    pub sla: Option<Sla>,
}

/// Memcached-compatible grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Memcached {
    pub binaries: Option<String>,
    pub port: Option<i32>,
    pub sla: Option<Sla>,
}

/// Capacity agreement of a processing unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sla {
    pub memory_capacity: Option<u32>,
    pub max_memory_capacity: Option<u32>,
    pub memory_capacity_per_container: Option<u32>,
    pub highly_available: bool,
}

// ============================================================================
// Clouds
// ============================================================================

/// Root of a `-cloud` recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cloud {
    pub name: Option<String>,
    pub provider: Option<CloudProvider>,
    pub user: CloudUser,
    pub configuration: CloudConfiguration,
    pub templates: IndexMap<String, CloudTemplate>,
    pub custom: IndexMap<String, serde_yaml_ng::Value>,
}

/// Cloud provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudProvider {
    pub provider: Option<String>,
    pub cloudify_url: Option<String>,
    pub machine_name_prefix: Option<String>,
    pub management_group: Option<String>,
    pub number_of_management_machines: u32,
    pub dedicated_management_machines: bool,
    pub zones: Vec<String>,
    pub ssh_logging_level: String,
    #[serde(rename = "reservedMemoryCapacityPerMachineInMB")]
    pub reserved_memory_capacity_per_machine_in_mb: u32,
    #[serde(rename = "reservedMemoryCapacityPerManagementMachineInMB")]
    pub reserved_memory_capacity_per_management_machine_in_mb: u32,
}

impl Default for CloudProvider {
    fn default() -> Self {
        Self {
            provider: None,
            cloudify_url: None,
            machine_name_prefix: None,
            management_group: None,
            number_of_management_machines: 0,
            dedicated_management_machines: true,
            zones: vec!["agent".to_string()],
            ssh_logging_level: "INFO".to_string(),
            reserved_memory_capacity_per_machine_in_mb: 0,
            reserved_memory_capacity_per_management_machine_in_mb: 0,
        }
    }
}

/// Cloud credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudUser {
    pub user: Option<String>,
    pub api_key: Option<String>,
    pub key_file: Option<String>,
}

/// Cloud driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudConfiguration {
    pub class_name: Option<String>,
    pub management_machine_template: Option<String>,
    pub connect_to_private_ip: bool,
    pub bootstrap_management_on_public_ip: bool,
    pub remote_username: Option<String>,
    pub remote_password: Option<String>,
    pub persistent_storage_path: Option<String>,
}

impl Default for CloudConfiguration {
    fn default() -> Self {
        Self {
            class_name: None,
            management_machine_template: None,
            connect_to_private_ip: true,
            bootstrap_management_on_public_ip: true,
            remote_username: None,
            remote_password: None,
            persistent_storage_path: None,
        }
    }
}

/// A machine template; root of a `-template` recipe or a value in
/// `Cloud::templates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudTemplate {
    pub image_id: Option<String>,
    pub hardware_id: Option<String>,
    pub location_id: Option<String>,
    #[serde(rename = "machineMemoryMB")]
    pub machine_memory_mb: u32,
    pub number_of_cores: u32,
    pub local_directory: Option<String>,
    pub key_file: Option<String>,
    pub options: IndexMap<String, serde_yaml_ng::Value>,
    pub overrides: IndexMap<String, serde_yaml_ng::Value>,
    pub custom: IndexMap<String, serde_yaml_ng::Value>,
    pub file_transfer: FileTransferMode,
    pub remote_execution: RemoteExecutionMode,
    pub username: Option<String>,
    pub password: Option<String>,
    pub remote_directory: String,
    pub privileged: bool,
    pub initialization_command: Option<String>,
    pub java_url: Option<String>,
    pub env: IndexMap<String, String>,
    pub installer: TemplateInstaller,

    /// Filled in by installers after upload; never set from a recipe
    pub absolute_upload_dir: Option<String>,
}

impl Default for CloudTemplate {
    fn default() -> Self {
        Self {
            image_id: None,
            hardware_id: None,
            location_id: None,
            machine_memory_mb: 0,
            number_of_cores: 1,
            local_directory: None,
            key_file: None,
            options: IndexMap::new(),
            overrides: IndexMap::new(),
            custom: IndexMap::new(),
            file_transfer: FileTransferMode::Scp,
            remote_execution: RemoteExecutionMode::Ssh,
            username: None,
            password: None,
            remote_directory: "upload".to_string(),
            privileged: false,
            initialization_command: None,
            java_url: None,
            env: IndexMap::new(),
            installer: TemplateInstaller::default(),
            absolute_upload_dir: None,
        }
    }
}

/// Connection settings used when installing onto a machine of a template.
/// Ports of -1 mean the protocol default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateInstaller {
    pub connection_test_route_resolution_timeout_millis: u32,
    pub connection_test_interval_millis: u32,
    pub connection_test_connect_timeout_millis: u32,
    pub file_transfer_connection_timeout_millis: u32,
    pub file_transfer_retries: u32,
    pub file_transfer_port: i32,
    pub file_transfer_connection_retry_interval_millis: u32,
    pub remote_execution_port: i32,
    pub remote_execution_connection_timeout_millis: u32,
}

impl Default for TemplateInstaller {
    fn default() -> Self {
        Self {
            connection_test_route_resolution_timeout_millis: 2 * 60 * 1000,
            connection_test_interval_millis: 5000,
            connection_test_connect_timeout_millis: 10_000,
            file_transfer_connection_timeout_millis: 10_000,
            file_transfer_retries: 3,
            file_transfer_port: -1,
            file_transfer_connection_retry_interval_millis: 5000,
            remote_execution_port: -1,
            remote_execution_connection_timeout_millis: 10_000,
        }
    }
}

/// File transfer protocol used to upload to a machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileTransferMode {
    #[serde(alias = "sftp", alias = "Sftp")]
    Sftp,
    #[default]
    #[serde(alias = "scp", alias = "Scp")]
    Scp,
    #[serde(alias = "cifs", alias = "Cifs")]
    Cifs,
}

/// Remote execution protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteExecutionMode {
    #[default]
    #[serde(alias = "ssh", alias = "Ssh")]
    Ssh,
    #[serde(alias = "winrm", alias = "WinRm", alias = "Winrm")]
    Winrm,
}

// ============================================================================
// Value helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for interpolation and
/// string-typed properties.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => serde_yaml_ng::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| format!("{:?}", other)),
    }
}

// ============================================================================
// Tests
// ============================================================================

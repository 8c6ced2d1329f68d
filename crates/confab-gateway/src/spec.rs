//! Tool specifications, handlers, and the registry.
//!
//! A tool is a self-describing unit: identity (name, version), contract
//! (parameter and result schemas), policy (required permissions,
//! timeout class, cancel-on-interruption), and logic (the
//! [`ToolHandler`]). The gateway pipeline checks everything declared
//! here before and after the handler runs, so handlers themselves
//! never re-check permissions or schemas.
//!
//! # Registering a tool
//!
//! ```
//! use confab_gateway::{ToolSpec, TimeoutClass, ToolRegistry, ToolHandler, ToolError, CancelToken};
//! use confab_types::Permission;
//! use serde_json::{json, Value};
//!
//! struct LookupBooking;
//!
//! #[async_trait::async_trait]
//! impl ToolHandler for LookupBooking {
//!     async fn execute(&self, params: Value, _cancel: CancelToken) -> Result<Value, ToolError> {
//!         let reference = params["reference"].as_str()
//!             .ok_or_else(|| ToolError::failed("missing 'reference'"))?;
//!         Ok(json!({ "reference": reference, "status": "confirmed" }))
//!     }
//! }
//!
//! let registry = ToolRegistry::new();
//! let spec = ToolSpec::new("lookup_booking", "1")
//!     .description("Look up a booking by reference")
//!     .parameters_schema(json!({
//!         "type": "object",
//!         "properties": { "reference": { "type": "string" } },
//!         "required": ["reference"]
//!     }))
//!     .required_permissions(Permission::DATA_READ)
//!     .timeout_class(TimeoutClass::DataFetch);
//! registry.register(spec, LookupBooking).unwrap();
//! ```

use crate::CancelToken;
use confab_types::{ErrorCode, Permission};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

// ─── ToolError ──────────────────────────────────────────────────────

/// Error returned by a tool handler.
///
/// Handlers distinguish transient infrastructure failures (retryable)
/// from real execution failures and observed cancellation; the gateway
/// maps these onto its own taxonomy.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The operation failed and retrying the identical call will not
    /// help.
    #[error("{0}")]
    Failed(String),

    /// A transient infrastructure failure (connection reset, upstream
    /// 5xx). The gateway retries these with backoff.
    #[error("transient: {0}")]
    Transient(String),

    /// The handler observed its cancellation token and cleaned up.
    #[error("cancelled")]
    Cancelled,
}

impl ToolError {
    /// Creates a non-retryable failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Creates a retryable transient failure.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

// ─── ToolHandler ────────────────────────────────────────────────────

/// Executable logic behind a registered tool.
///
/// # Pre-conditions
///
/// The gateway guarantees before calling `execute()`:
///
/// 1. The caller's permissions are a superset of the tool's required
///    set.
/// 2. `params` validates against the declared parameter schema.
/// 3. The tool's business rule (if any) accepted the parameters.
///
/// # Cancellation contract
///
/// Handlers doing real I/O must watch `cancel` and, once it fires,
/// release resources (close handles, release locks) and return
/// [`ToolError::Cancelled`]. The gateway signals the token on deadline
/// expiry and on conversational interruption; it waits a bounded grace
/// period for the handler to return before abandoning it.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Executes the tool with validated parameters.
    async fn execute(
        &self,
        params: serde_json::Value,
        cancel: CancelToken,
    ) -> Result<serde_json::Value, ToolError>;
}

// ─── TimeoutClass ───────────────────────────────────────────────────

/// Execution deadline class for a tool.
///
/// | Class | Default deadline | Typical tools |
/// |-------|------------------|---------------|
/// | `DataFetch` | 8s | lookups, availability |
/// | `Computation` | 20s | pricing, routing |
/// | `Action` | 25s | bookings, charges, notifications |
///
/// Per-tool overrides and config can replace the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutClass {
    /// Read-only external fetch.
    DataFetch,
    /// Local or remote computation.
    Computation,
    /// Side-effecting external action.
    Action,
}

impl TimeoutClass {
    /// Returns the built-in default deadline for this class.
    #[must_use]
    pub fn default_deadline(self) -> Duration {
        match self {
            Self::DataFetch => Duration::from_secs(8),
            Self::Computation => Duration::from_secs(20),
            Self::Action => Duration::from_secs(25),
        }
    }
}

// ─── ToolSpec ───────────────────────────────────────────────────────

/// Business rule predicate over validated parameters.
///
/// Pure: returns `Err(reason)` to reject, and must not have side
/// effects.
pub type BusinessRule = dyn Fn(&serde_json::Value) -> Result<(), String> + Send + Sync;

/// Declarative description of a tool.
#[derive(Clone)]
pub struct ToolSpec {
    /// Unique tool name.
    pub name: String,
    /// Tool version; name+version is the registry key.
    pub version: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema the parameters must satisfy.
    pub parameters_schema: serde_json::Value,
    /// JSON Schema the result must satisfy, if declared.
    pub result_schema: Option<serde_json::Value>,
    /// Permissions the caller must hold.
    pub required_permissions: Permission,
    /// Deadline class.
    pub timeout_class: TimeoutClass,
    /// Per-tool deadline override.
    pub timeout_override: Option<Duration>,
    /// Whether an interruption of the owning turn cancels in-flight
    /// execution.
    pub cancel_on_interruption: bool,
    /// Optional business rule checked after schema validation.
    pub business_rule: Option<Arc<BusinessRule>>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("required_permissions", &self.required_permissions.names())
            .field("timeout_class", &self.timeout_class)
            .field("cancel_on_interruption", &self.cancel_on_interruption)
            .field("has_business_rule", &self.business_rule.is_some())
            .finish()
    }
}

impl ToolSpec {
    /// Creates a spec with permissive defaults: empty object schema,
    /// no result schema, no permissions required, `Computation` class,
    /// cancellable on interruption.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            parameters_schema: serde_json::json!({ "type": "object" }),
            result_schema: None,
            required_permissions: Permission::empty(),
            timeout_class: TimeoutClass::Computation,
            timeout_override: None,
            cancel_on_interruption: true,
            business_rule: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    /// Sets the parameter schema.
    #[must_use]
    pub fn parameters_schema(mut self, schema: serde_json::Value) -> Self {
        self.parameters_schema = schema;
        self
    }

    /// Sets the result schema.
    #[must_use]
    pub fn result_schema(mut self, schema: serde_json::Value) -> Self {
        self.result_schema = Some(schema);
        self
    }

    /// Sets the required permission set.
    #[must_use]
    pub fn required_permissions(mut self, permissions: Permission) -> Self {
        self.required_permissions = permissions;
        self
    }

    /// Sets the timeout class.
    #[must_use]
    pub fn timeout_class(mut self, class: TimeoutClass) -> Self {
        self.timeout_class = class;
        self
    }

    /// Overrides the deadline for this tool.
    #[must_use]
    pub fn timeout_override(mut self, deadline: Duration) -> Self {
        self.timeout_override = Some(deadline);
        self
    }

    /// Sets whether interruption cancels in-flight execution.
    #[must_use]
    pub fn cancel_on_interruption(mut self, cancel: bool) -> Self {
        self.cancel_on_interruption = cancel;
        self
    }

    /// Attaches a business rule.
    #[must_use]
    pub fn business_rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.business_rule = Some(Arc::new(rule));
        self
    }

    /// Returns the effective deadline: override, else class default.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.timeout_override
            .unwrap_or_else(|| self.timeout_class.default_deadline())
    }
}

// ─── Registry ───────────────────────────────────────────────────────

/// Registration failure.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A declared schema did not compile.
    #[error("invalid schema for {tool}: {detail}")]
    InvalidSchema {
        /// Tool being registered.
        tool: String,
        /// Compiler diagnostic.
        detail: String,
    },

    /// The name+version pair is already registered.
    #[error("tool already registered: {tool}@{version}")]
    Duplicate {
        /// Conflicting name.
        tool: String,
        /// Conflicting version.
        version: String,
    },
}

impl ErrorCode for RegistryError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidSchema { .. } => "REGISTRY_INVALID_SCHEMA",
            Self::Duplicate { .. } => "REGISTRY_DUPLICATE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// A registered tool with its compiled validators.
pub struct RegisteredTool {
    /// The declarative spec.
    pub spec: ToolSpec,
    pub(crate) params_validator: jsonschema::Validator,
    pub(crate) result_validator: Option<jsonschema::Validator>,
    pub(crate) handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    /// Validates a parameter object against the compiled schema.
    ///
    /// Returns the first violation with its instance path.
    pub fn validate_parameters(&self, params: &serde_json::Value) -> Result<(), String> {
        match self.params_validator.validate(params) {
            Ok(()) => Ok(()),
            Err(e) => Err(format!("{} at {}", e, e.instance_path())),
        }
    }

    /// Validates a result against the compiled result schema, if any.
    pub fn validate_result(&self, result: &serde_json::Value) -> Result<(), String> {
        match &self.result_validator {
            Some(validator) => match validator.validate(result) {
                Ok(()) => Ok(()),
                Err(e) => Err(format!("{} at {}", e, e.instance_path())),
            },
            None => Ok(()),
        }
    }
}

/// Shared, cross-session tool registry.
///
/// Registration happens at startup; lookups are concurrent reads.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<(String, String), Arc<RegisteredTool>>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, compiling its schemas.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidSchema`] if a schema does not compile
    /// - [`RegistryError::Duplicate`] if name+version already exists
    pub fn register<H: ToolHandler + 'static>(
        &self,
        spec: ToolSpec,
        handler: H,
    ) -> Result<(), RegistryError> {
        let params_validator = jsonschema::validator_for(&spec.parameters_schema).map_err(|e| {
            RegistryError::InvalidSchema {
                tool: spec.name.clone(),
                detail: e.to_string(),
            }
        })?;

        let result_validator = match &spec.result_schema {
            Some(schema) => Some(jsonschema::validator_for(schema).map_err(|e| {
                RegistryError::InvalidSchema {
                    tool: spec.name.clone(),
                    detail: e.to_string(),
                }
            })?),
            None => None,
        };

        let key = (spec.name.clone(), spec.version.clone());
        let mut tools = self.tools.write();
        if tools.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                tool: key.0,
                version: key.1,
            });
        }

        info!(tool = %spec.name, version = %spec.version, "tool registered");
        tools.insert(
            key,
            Arc::new(RegisteredTool {
                spec,
                params_validator,
                result_validator,
                handler: Arc::new(handler),
            }),
        );
        Ok(())
    }

    /// Looks up a tool by name and version.
    #[must_use]
    pub fn get(&self, name: &str, version: &str) -> Option<Arc<RegisteredTool>> {
        self.tools
            .read()
            .get(&(name.to_string(), version.to_string()))
            .cloned()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

use crate::constants::upstream;
use crate::errors::ToolError;
use crate::managers::api::{ApiCall, ApiManager, ResultEnvelope};
use crate::services::tool_executor::ToolHandler;
use crate::services::transport::HttpMethod;
use crate::services::validation::Validation;
use crate::utils::tool_errors::unknown_choice_error;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

macro_rules! resource_types {
    ($($variant:ident => $tag:literal,)+) => {
        /// Upstream resource collections, each living under `/<tag>`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ResourceType {
            $($variant,)+
        }

        impl ResourceType {
            pub const ALL: &'static [ResourceType] = &[$(ResourceType::$variant,)+];
            pub const TAGS: &'static [&'static str] = &[$($tag,)+];

            pub fn tag(self) -> &'static str {
                match self {
                    $(ResourceType::$variant => $tag,)+
                }
            }
        }
    };
}

resource_types! {
    Frameworks => "frameworks",
    Controls => "controls",
    Assessments => "assessments",
    Usecase => "usecase",
    Tenant => "tenant",
    Documents => "documents",
    PolicyDocuments => "policyDocuments",
    AwsS3 => "awsS3",
    AzureBlob => "azureBlob",
    Lambda => "lambda",
    CloudProviders => "cloudProviders",
    CloudFrameworks => "cloudFrameworks",
    MethodologyMetrics => "methodologyMetrics",
    Tco => "tco",
    AdoptionInsights => "adoptionInsights",
    ModelValidation => "modelValidation",
    TenantDetails => "tenantDetails",
    UsecaseAssessment => "usecaseAssessment",
    Feature => "feature",
    GradingTypes => "grading-types",
    AppMetadata => "app-metadata",
}

impl ResourceType {
    pub fn path(self) -> String {
        format!("/{}", self.tag())
    }
}

impl FromStr for ResourceType {
    type Err = ToolError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim().trim_start_matches('/');
        ResourceType::ALL
            .iter()
            .copied()
            .find(|kind| kind.tag() == raw)
            .ok_or_else(|| unknown_choice_error("resource type", raw, ResourceType::TAGS))
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Get,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];
    const NAMES: &'static [&'static str] = &["list", "get", "create", "update", "delete"];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn method(self) -> HttpMethod {
        match self {
            Operation::List | Operation::Get => HttpMethod::Get,
            Operation::Create => HttpMethod::Post,
            Operation::Update => HttpMethod::Put,
            Operation::Delete => HttpMethod::Delete,
        }
    }

    pub fn needs_id(self) -> bool {
        matches!(self, Operation::Get | Operation::Update | Operation::Delete)
    }

    pub fn needs_payload(self) -> bool {
        matches!(self, Operation::Create | Operation::Update)
    }
}

impl FromStr for Operation {
    type Err = ToolError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(raw))
            .ok_or_else(|| unknown_choice_error("operation", raw, Operation::NAMES))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    pub resource: ResourceType,
    pub operation: Operation,
    pub resource_id: Option<String>,
    pub payload: Option<Value>,
    pub token: String,
}

impl ResourceRequest {
    /// Checks the id/payload requirements of the operation. Runs before any
    /// network traffic.
    pub fn validate(&self) -> Result<(), ToolError> {
        let has_id = self
            .resource_id
            .as_deref()
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false);
        if self.operation.needs_id() && !has_id {
            return Err(ToolError::invalid_params(format!(
                "resource_id required for {} operation",
                self.operation
            )));
        }
        if self.operation.needs_payload() && !payload_present(self.payload.as_ref()) {
            return Err(ToolError::invalid_params(format!(
                "data required for {} operation",
                self.operation
            )));
        }
        Ok(())
    }

    fn into_call(self) -> ApiCall {
        let mut call = ApiCall::new(self.resource.path(), self.operation.method()).token(self.token);
        if self.operation.needs_id() {
            call.resource_id = self.resource_id;
        }
        if self.operation.needs_payload() {
            call.data = self.payload;
        }
        call
    }
}

fn payload_present(payload: Option<&Value>) -> bool {
    match payload {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailRequest {
    pub email_data: Map<String, Value>,
    pub use_aws: bool,
    pub token: String,
}

impl EmailRequest {
    const REQUIRED_FIELDS: [&'static str; 3] = ["to", "subject", "body"];

    pub fn validate(&self) -> Result<(), ToolError> {
        for field in Self::REQUIRED_FIELDS {
            if !self.email_data.contains_key(field) {
                return Err(ToolError::invalid_params(format!(
                    "email_data must contain '{}'",
                    field
                )));
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &'static str {
        if self.use_aws {
            upstream::AWS_EMAIL_PATH
        } else {
            upstream::EMAIL_PATH
        }
    }
}

/// Generic resource-operation dispatcher on top of [`ApiManager`].
pub struct ResourceManager {
    api: Arc<ApiManager>,
}

impl ResourceManager {
    pub fn new(api: Arc<ApiManager>) -> Self {
        Self { api }
    }

    pub async fn manage_resource(&self, request: ResourceRequest) -> Result<ResultEnvelope, ToolError> {
        request.validate()?;
        Ok(self.api.call(request.into_call()).await)
    }

    pub async fn send_email(&self, request: EmailRequest) -> Result<ResultEnvelope, ToolError> {
        request.validate()?;
        let call = ApiCall::new(request.path(), HttpMethod::Post)
            .token(request.token)
            .data(Value::Object(request.email_data));
        Ok(self.api.call(call).await)
    }
}

/// How a tool's arguments pick the resource collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSelector {
    Fixed(ResourceType),
    Field {
        field: &'static str,
        allowed: &'static [ResourceType],
    },
}

/// One row of the tool table: tool name, collection selector and the
/// argument carrying the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolBinding {
    pub tool: &'static str,
    pub selector: ResourceSelector,
    pub id_field: &'static str,
}

pub const RESOURCE_TOOL_BINDINGS: &[ToolBinding] = &[
    ToolBinding {
        tool: "manage_frameworks",
        selector: ResourceSelector::Fixed(ResourceType::Frameworks),
        id_field: "framework_id",
    },
    ToolBinding {
        tool: "manage_controls",
        selector: ResourceSelector::Fixed(ResourceType::Controls),
        id_field: "control_id",
    },
    ToolBinding {
        tool: "manage_assessments",
        selector: ResourceSelector::Fixed(ResourceType::Assessments),
        id_field: "assessment_id",
    },
    ToolBinding {
        tool: "manage_usecases",
        selector: ResourceSelector::Fixed(ResourceType::Usecase),
        id_field: "usecase_id",
    },
    ToolBinding {
        tool: "manage_tenant",
        selector: ResourceSelector::Fixed(ResourceType::Tenant),
        id_field: "tenant_id",
    },
    ToolBinding {
        tool: "manage_documents",
        selector: ResourceSelector::Field {
            field: "document_type",
            allowed: &[ResourceType::Documents, ResourceType::PolicyDocuments],
        },
        id_field: "document_id",
    },
    ToolBinding {
        tool: "manage_cloud_resources",
        selector: ResourceSelector::Field {
            field: "resource_type",
            allowed: &[
                ResourceType::AwsS3,
                ResourceType::AzureBlob,
                ResourceType::Lambda,
                ResourceType::CloudProviders,
                ResourceType::CloudFrameworks,
            ],
        },
        id_field: "resource_id",
    },
    ToolBinding {
        tool: "get_metrics_and_insights",
        selector: ResourceSelector::Field {
            field: "metric_type",
            allowed: &[
                ResourceType::MethodologyMetrics,
                ResourceType::Tco,
                ResourceType::AdoptionInsights,
                ResourceType::ModelValidation,
            ],
        },
        id_field: "resource_id",
    },
    ToolBinding {
        tool: "manage_resource",
        selector: ResourceSelector::Field {
            field: "resource",
            allowed: ResourceType::ALL,
        },
        id_field: "resource_id",
    },
];

pub const SEND_EMAIL_TOOL: &str = "send_email";

/// Tool handler for one [`ToolBinding`] row.
pub struct ResourceTool {
    manager: Arc<ResourceManager>,
    binding: ToolBinding,
    validation: Validation,
}

impl ResourceTool {
    pub fn new(manager: Arc<ResourceManager>, binding: ToolBinding) -> Self {
        Self {
            manager,
            binding,
            validation: Validation::new(),
        }
    }

    fn resource(&self, args: &Value) -> Result<ResourceType, ToolError> {
        match self.binding.selector {
            ResourceSelector::Fixed(kind) => Ok(kind),
            ResourceSelector::Field { field, allowed } => {
                let raw = self
                    .validation
                    .ensure_string(args.get(field).unwrap_or(&Value::Null), field)?;
                allowed
                    .iter()
                    .copied()
                    .find(|kind| kind.tag() == raw)
                    .ok_or_else(|| {
                        let tags: Vec<&str> = allowed.iter().map(|kind| kind.tag()).collect();
                        unknown_choice_error(field, &raw, &tags)
                    })
            }
        }
    }

    pub fn parse_request(&self, args: &Value) -> Result<ResourceRequest, ToolError> {
        let resource = self.resource(args)?;
        let operation = self
            .validation
            .ensure_string(args.get("operation").unwrap_or(&Value::Null), "operation")?
            .parse::<Operation>()?;
        let token = self
            .validation
            .ensure_string(args.get("token").unwrap_or(&Value::Null), "token")?;
        Ok(ResourceRequest {
            resource,
            operation,
            resource_id: self
                .validation
                .ensure_optional_string(args.get(self.binding.id_field), self.binding.id_field)?,
            payload: args.get("data").cloned(),
            token,
        })
    }
}

#[async_trait]
impl ToolHandler for ResourceTool {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        let request = self.parse_request(&args)?;
        let envelope = self.manager.manage_resource(request).await?;
        Ok(envelope.to_value())
    }
}

pub struct EmailTool {
    manager: Arc<ResourceManager>,
    validation: Validation,
}

impl EmailTool {
    pub fn new(manager: Arc<ResourceManager>) -> Self {
        Self {
            manager,
            validation: Validation::new(),
        }
    }
}

#[async_trait]
impl ToolHandler for EmailTool {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        let email_data = self
            .validation
            .ensure_optional_object(args.get("email_data"), "email_data")?
            .ok_or_else(|| ToolError::invalid_params("email_data is required"))?;
        let request = EmailRequest {
            email_data,
            use_aws: self
                .validation
                .ensure_optional_bool(args.get("use_aws"), "use_aws")?
                .unwrap_or(false),
            token: self
                .validation
                .ensure_string(args.get("token").unwrap_or(&Value::Null), "token")?,
        };
        Ok(self.manager.send_email(request).await?.to_value())
    }
}

//! Provider - Trait abstracting the EC2 control-plane calls
//!
//! One method per API call issued by the provisioning sequence. Every request
//! carries literal parameters plus identifiers returned by earlier calls.

use std::future::Future;
use std::pin::Pin;

use crate::blueprint::IngressRule;
use crate::resource::{ResourceKind, Tags};

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource: Option<ResourceKind>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(kind) = self.resource {
            write!(f, "[{}] {}", kind.as_str(), self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, kind: ResourceKind) -> Self {
        self.resource = Some(kind);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVpcRequest {
    pub cidr_block: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInternetGatewayRequest {
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachInternetGatewayRequest {
    pub internet_gateway_id: String,
    pub vpc_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubnetRequest {
    pub vpc_id: String,
    pub cidr_block: String,
    pub tags: Tags,
}

/// Toggle for the subnet's "auto-assign public IPv4" attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapPublicIpRequest {
    pub subnet_id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRouteTableRequest {
    pub vpc_id: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRouteRequest {
    pub route_table_id: String,
    pub destination_cidr_block: String,
    pub gateway_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociateRouteTableRequest {
    pub route_table_id: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSecurityGroupRequest {
    pub vpc_id: String,
    pub group_name: String,
    pub description: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeIngressRequest {
    pub group_id: String,
    pub rules: Vec<IngressRule>,
}

/// Launch of exactly one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInstanceRequest {
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub security_group_ids: Vec<String>,
    pub subnet_id: String,
    /// Boot script in plain text; providers encode it as their API requires
    pub user_data: String,
    pub tags: Tags,
}

/// EC2 control-plane operations used by the provisioner
///
/// Creation methods return the provider-assigned identifier.
/// Each call blocks the sequence until the provider answers.
pub trait Ec2Provider: Send + Sync {
    /// Name of this Provider (e.g., "aws")
    fn name(&self) -> &'static str;

    fn create_vpc(&self, request: &CreateVpcRequest) -> BoxFuture<'_, ProviderResult<String>>;

    fn create_internet_gateway(
        &self,
        request: &CreateInternetGatewayRequest,
    ) -> BoxFuture<'_, ProviderResult<String>>;

    fn attach_internet_gateway(
        &self,
        request: &AttachInternetGatewayRequest,
    ) -> BoxFuture<'_, ProviderResult<()>>;

    fn create_subnet(
        &self,
        request: &CreateSubnetRequest,
    ) -> BoxFuture<'_, ProviderResult<String>>;

    fn map_public_ip_on_launch(
        &self,
        request: &MapPublicIpRequest,
    ) -> BoxFuture<'_, ProviderResult<()>>;

    fn create_route_table(
        &self,
        request: &CreateRouteTableRequest,
    ) -> BoxFuture<'_, ProviderResult<String>>;

    fn create_route(&self, request: &CreateRouteRequest) -> BoxFuture<'_, ProviderResult<()>>;

    /// Returns the association identifier
    fn associate_route_table(
        &self,
        request: &AssociateRouteTableRequest,
    ) -> BoxFuture<'_, ProviderResult<String>>;

    fn create_security_group(
        &self,
        request: &CreateSecurityGroupRequest,
    ) -> BoxFuture<'_, ProviderResult<String>>;

    fn authorize_ingress(
        &self,
        request: &AuthorizeIngressRequest,
    ) -> BoxFuture<'_, ProviderResult<()>>;

    /// Returns the instance identifier
    fn run_instance(&self, request: &RunInstanceRequest) -> BoxFuture<'_, ProviderResult<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[derive(Debug)]
    struct Rejected;

    impl std::fmt::Display for Rejected {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "InvalidKeyPair.NotFound")
        }
    }

    impl std::error::Error for Rejected {}

    #[test]
    fn display_includes_resource_kind() {
        let err = ProviderError::new("Failed to launch instance")
            .for_resource(ResourceKind::Instance);
        assert_eq!(err.to_string(), "[instance] Failed to launch instance");
        assert_eq!(
            ProviderError::new("no credentials").to_string(),
            "no credentials"
        );
    }

    #[test]
    fn cause_is_exposed_as_source() {
        let err = ProviderError::new("Failed to launch instance").with_cause(Rejected);
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("InvalidKeyPair.NotFound"));
    }
}

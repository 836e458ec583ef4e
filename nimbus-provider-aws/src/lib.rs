//! Nimbus AWS Provider
//!
//! EC2 implementation of the provisioning calls

mod tags;
pub mod user_data;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::{AttributeBooleanValue, InstanceType, IpPermission, IpRange};
use log::debug;
use nimbus_core::blueprint::IngressRule;
use nimbus_core::provider::{
    AssociateRouteTableRequest, AttachInternetGatewayRequest, AuthorizeIngressRequest, BoxFuture,
    CreateInternetGatewayRequest, CreateRouteRequest, CreateRouteTableRequest,
    CreateSecurityGroupRequest, CreateSubnetRequest, CreateVpcRequest, Ec2Provider,
    MapPublicIpRequest, ProviderError, ProviderResult, RunInstanceRequest,
};
use nimbus_core::resource::ResourceKind;

use crate::tags::tag_specification;

/// AWS Provider
pub struct AwsProvider {
    ec2_client: Ec2Client,
    region: String,
}

impl AwsProvider {
    /// Create a new AWS Provider from a named credential profile
    ///
    /// Requests are signed with SigV4, the SDK default.
    pub async fn new(profile: &str, region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(profile)
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            ec2_client: Ec2Client::new(&config),
            region: region.to_string(),
        }
    }

    /// Create with a specific client (for testing)
    pub fn with_client(ec2_client: Ec2Client, region: String) -> Self {
        Self { ec2_client, region }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    // ========== VPC and Internet Gateway ==========

    async fn create_ec2_vpc(&self, request: CreateVpcRequest) -> ProviderResult<String> {
        debug!("CreateVpc cidr_block={}", request.cidr_block);

        let result = self
            .ec2_client
            .create_vpc()
            .cidr_block(&request.cidr_block)
            .tag_specifications(tag_specification(ResourceKind::Vpc, &request.tags))
            .send()
            .await
            .map_err(|e| sdk_error("create VPC", ResourceKind::Vpc, e))?;

        let vpc_id = result.vpc().and_then(|v| v.vpc_id()).ok_or_else(|| {
            ProviderError::new("VPC created but no ID returned").for_resource(ResourceKind::Vpc)
        })?;

        debug!("Created VPC {} in {}", vpc_id, self.region);
        Ok(vpc_id.to_string())
    }

    async fn create_ec2_internet_gateway(
        &self,
        request: CreateInternetGatewayRequest,
    ) -> ProviderResult<String> {
        debug!("CreateInternetGateway");

        let result = self
            .ec2_client
            .create_internet_gateway()
            .tag_specifications(tag_specification(
                ResourceKind::InternetGateway,
                &request.tags,
            ))
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    "create internet gateway",
                    ResourceKind::InternetGateway,
                    e,
                )
            })?;

        let igw_id = result
            .internet_gateway()
            .and_then(|igw| igw.internet_gateway_id())
            .ok_or_else(|| {
                ProviderError::new("Internet Gateway created but no ID returned")
                    .for_resource(ResourceKind::InternetGateway)
            })?;

        debug!("Created internet gateway {}", igw_id);
        Ok(igw_id.to_string())
    }

    async fn attach_ec2_internet_gateway(
        &self,
        request: AttachInternetGatewayRequest,
    ) -> ProviderResult<()> {
        debug!(
            "AttachInternetGateway igw={} vpc={}",
            request.internet_gateway_id, request.vpc_id
        );

        self.ec2_client
            .attach_internet_gateway()
            .internet_gateway_id(&request.internet_gateway_id)
            .vpc_id(&request.vpc_id)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    "attach internet gateway",
                    ResourceKind::InternetGateway,
                    e,
                )
            })?;

        Ok(())
    }

    // ========== Subnet ==========

    async fn create_ec2_subnet(&self, request: CreateSubnetRequest) -> ProviderResult<String> {
        debug!(
            "CreateSubnet vpc={} cidr_block={}",
            request.vpc_id, request.cidr_block
        );

        let result = self
            .ec2_client
            .create_subnet()
            .vpc_id(&request.vpc_id)
            .cidr_block(&request.cidr_block)
            .tag_specifications(tag_specification(ResourceKind::Subnet, &request.tags))
            .send()
            .await
            .map_err(|e| sdk_error("create subnet", ResourceKind::Subnet, e))?;

        let subnet_id = result.subnet().and_then(|s| s.subnet_id()).ok_or_else(|| {
            ProviderError::new("Subnet created but no ID returned")
                .for_resource(ResourceKind::Subnet)
        })?;

        debug!("Created subnet {}", subnet_id);
        Ok(subnet_id.to_string())
    }

    async fn modify_ec2_subnet_public_ip(&self, request: MapPublicIpRequest) -> ProviderResult<()> {
        debug!(
            "ModifySubnetAttribute subnet={} map_public_ip_on_launch={}",
            request.subnet_id, request.enabled
        );

        self.ec2_client
            .modify_subnet_attribute()
            .subnet_id(&request.subnet_id)
            .map_public_ip_on_launch(
                AttributeBooleanValue::builder()
                    .value(request.enabled)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error("set public IP mapping", ResourceKind::Subnet, e))?;

        Ok(())
    }

    // ========== Route Table ==========

    async fn create_ec2_route_table(
        &self,
        request: CreateRouteTableRequest,
    ) -> ProviderResult<String> {
        debug!("CreateRouteTable vpc={}", request.vpc_id);

        let result = self
            .ec2_client
            .create_route_table()
            .vpc_id(&request.vpc_id)
            .tag_specifications(tag_specification(ResourceKind::RouteTable, &request.tags))
            .send()
            .await
            .map_err(|e| sdk_error("create route table", ResourceKind::RouteTable, e))?;

        let rt_id = result
            .route_table()
            .and_then(|rt| rt.route_table_id())
            .ok_or_else(|| {
                ProviderError::new("Route Table created but no ID returned")
                    .for_resource(ResourceKind::RouteTable)
            })?;

        debug!("Created route table {}", rt_id);
        Ok(rt_id.to_string())
    }

    async fn create_ec2_route(&self, request: CreateRouteRequest) -> ProviderResult<()> {
        debug!(
            "CreateRoute rtb={} destination={} gateway={}",
            request.route_table_id, request.destination_cidr_block, request.gateway_id
        );

        self.ec2_client
            .create_route()
            .route_table_id(&request.route_table_id)
            .destination_cidr_block(&request.destination_cidr_block)
            .gateway_id(&request.gateway_id)
            .send()
            .await
            .map_err(|e| sdk_error("create route", ResourceKind::RouteTable, e))?;

        Ok(())
    }

    async fn associate_ec2_route_table(
        &self,
        request: AssociateRouteTableRequest,
    ) -> ProviderResult<String> {
        debug!(
            "AssociateRouteTable rtb={} subnet={}",
            request.route_table_id, request.subnet_id
        );

        let result = self
            .ec2_client
            .associate_route_table()
            .route_table_id(&request.route_table_id)
            .subnet_id(&request.subnet_id)
            .send()
            .await
            .map_err(|e| sdk_error("associate route table", ResourceKind::RouteTable, e))?;

        let association_id = result.association_id().ok_or_else(|| {
            ProviderError::new("Route Table associated but no association ID returned")
                .for_resource(ResourceKind::RouteTable)
        })?;

        Ok(association_id.to_string())
    }

    // ========== Security Group ==========

    async fn create_ec2_security_group(
        &self,
        request: CreateSecurityGroupRequest,
    ) -> ProviderResult<String> {
        debug!(
            "CreateSecurityGroup name={} vpc={}",
            request.group_name, request.vpc_id
        );

        let result = self
            .ec2_client
            .create_security_group()
            .group_name(&request.group_name)
            .description(&request.description)
            .vpc_id(&request.vpc_id)
            .tag_specifications(tag_specification(
                ResourceKind::SecurityGroup,
                &request.tags,
            ))
            .send()
            .await
            .map_err(|e| sdk_error("create security group", ResourceKind::SecurityGroup, e))?;

        let sg_id = result.group_id().ok_or_else(|| {
            ProviderError::new("Security Group created but no ID returned")
                .for_resource(ResourceKind::SecurityGroup)
        })?;

        debug!("Created security group {}", sg_id);
        Ok(sg_id.to_string())
    }

    async fn authorize_ec2_ingress(&self, request: AuthorizeIngressRequest) -> ProviderResult<()> {
        debug!(
            "AuthorizeSecurityGroupIngress group={} rules={}",
            request.group_id,
            request.rules.len()
        );

        let permissions: Vec<IpPermission> = request.rules.iter().map(ip_permission).collect();

        self.ec2_client
            .authorize_security_group_ingress()
            .group_id(&request.group_id)
            .set_ip_permissions(Some(permissions))
            .send()
            .await
            .map_err(|e| sdk_error("authorize ingress", ResourceKind::SecurityGroup, e))?;

        Ok(())
    }

    // ========== Instances ==========

    async fn run_ec2_instance(&self, request: RunInstanceRequest) -> ProviderResult<String> {
        debug!(
            "RunInstances image={} type={} subnet={} key={}",
            request.image_id, request.instance_type, request.subnet_id, request.key_name
        );

        let mut req = self
            .ec2_client
            .run_instances()
            .image_id(&request.image_id)
            .instance_type(instance_type(&request.instance_type))
            .key_name(&request.key_name)
            .min_count(1)
            .max_count(1)
            .subnet_id(&request.subnet_id)
            .user_data(user_data::encode(&request.user_data))
            .tag_specifications(tag_specification(ResourceKind::Instance, &request.tags));

        for sg_id in &request.security_group_ids {
            req = req.security_group_ids(sg_id);
        }

        let result = req
            .send()
            .await
            .map_err(|e| sdk_error("launch instance", ResourceKind::Instance, e))?;

        let instance_id = result
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .ok_or_else(|| {
                ProviderError::new("Instance launched but no ID returned")
                    .for_resource(ResourceKind::Instance)
            })?;

        debug!("Launched instance {}", instance_id);
        Ok(instance_id.to_string())
    }
}

impl Ec2Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn create_vpc(&self, request: &CreateVpcRequest) -> BoxFuture<'_, ProviderResult<String>> {
        let request = request.clone();
        Box::pin(async move { self.create_ec2_vpc(request).await })
    }

    fn create_internet_gateway(
        &self,
        request: &CreateInternetGatewayRequest,
    ) -> BoxFuture<'_, ProviderResult<String>> {
        let request = request.clone();
        Box::pin(async move { self.create_ec2_internet_gateway(request).await })
    }

    fn attach_internet_gateway(
        &self,
        request: &AttachInternetGatewayRequest,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let request = request.clone();
        Box::pin(async move { self.attach_ec2_internet_gateway(request).await })
    }

    fn create_subnet(
        &self,
        request: &CreateSubnetRequest,
    ) -> BoxFuture<'_, ProviderResult<String>> {
        let request = request.clone();
        Box::pin(async move { self.create_ec2_subnet(request).await })
    }

    fn map_public_ip_on_launch(
        &self,
        request: &MapPublicIpRequest,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let request = request.clone();
        Box::pin(async move { self.modify_ec2_subnet_public_ip(request).await })
    }

    fn create_route_table(
        &self,
        request: &CreateRouteTableRequest,
    ) -> BoxFuture<'_, ProviderResult<String>> {
        let request = request.clone();
        Box::pin(async move { self.create_ec2_route_table(request).await })
    }

    fn create_route(&self, request: &CreateRouteRequest) -> BoxFuture<'_, ProviderResult<()>> {
        let request = request.clone();
        Box::pin(async move { self.create_ec2_route(request).await })
    }

    fn associate_route_table(
        &self,
        request: &AssociateRouteTableRequest,
    ) -> BoxFuture<'_, ProviderResult<String>> {
        let request = request.clone();
        Box::pin(async move { self.associate_ec2_route_table(request).await })
    }

    fn create_security_group(
        &self,
        request: &CreateSecurityGroupRequest,
    ) -> BoxFuture<'_, ProviderResult<String>> {
        let request = request.clone();
        Box::pin(async move { self.create_ec2_security_group(request).await })
    }

    fn authorize_ingress(
        &self,
        request: &AuthorizeIngressRequest,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let request = request.clone();
        Box::pin(async move { self.authorize_ec2_ingress(request).await })
    }

    fn run_instance(&self, request: &RunInstanceRequest) -> BoxFuture<'_, ProviderResult<String>> {
        let request = request.clone();
        Box::pin(async move { self.run_ec2_instance(request).await })
    }
}

/// Wrap an SDK failure, keeping the original error as the cause
fn sdk_error<E>(action: &str, kind: ResourceKind, err: E) -> ProviderError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ProviderError::new(format!("Failed to {}: {}", action, DisplayErrorContext(&err)))
        .for_resource(kind)
        .with_cause(err)
}

/// Convert an ingress rule to an EC2 IpPermission with a single source range
fn ip_permission(rule: &IngressRule) -> IpPermission {
    IpPermission::builder()
        .ip_protocol(&rule.protocol)
        .from_port(rule.from_port)
        .to_port(rule.to_port)
        .ip_ranges(
            IpRange::builder()
                .cidr_ip(&rule.cidr)
                .description(&rule.description)
                .build(),
        )
        .build()
}

/// Instance size class as sent to EC2; sizes the SDK does not list pass
/// through unchanged and are accepted or rejected by the service
fn instance_type(value: &str) -> InstanceType {
    InstanceType::from(value)
}

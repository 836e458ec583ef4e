//! Provisioner - Execute the provisioning sequence against a Provider
//!
//! Steps run strictly one after another, each request carrying identifiers
//! returned by earlier calls. The first failure stops the run. Resources
//! created up to that point are left in place and reported back in the error;
//! there is no rollback.

use log::{debug, info};

use crate::blueprint::Blueprint;
use crate::error::ProvisionError;
use crate::plan::{Plan, Step};
use crate::provider::{
    AssociateRouteTableRequest, AttachInternetGatewayRequest, AuthorizeIngressRequest,
    CreateInternetGatewayRequest, CreateRouteRequest, CreateRouteTableRequest,
    CreateSecurityGroupRequest, CreateSubnetRequest, CreateVpcRequest, Ec2Provider,
    MapPublicIpRequest, ProviderError, RunInstanceRequest,
};
use crate::resource::{ResourceKind, ResourceRef};

/// An instance launched for one machine spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedInstance {
    pub name: String,
    pub instance_id: String,
}

/// Identifiers threaded through the sequence, in creation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedIds {
    pub vpc_id: String,
    pub internet_gateway_id: String,
    pub subnet_id: String,
    pub route_table_id: String,
    pub route_table_association_id: String,
    pub security_group_id: String,
    /// One entry per machine spec, in declared order
    pub instances: Vec<LaunchedInstance>,
}

/// Result of one completed step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    /// Set when the step created a tagged resource
    pub resource: Option<ResourceRef>,
}

impl StepOutcome {
    /// Confirmation line shown to the user
    pub fn message(&self) -> String {
        match (&self.step, &self.resource) {
            (Step::LaunchInstance { .. }, Some(r)) => {
                format!("Created instance {} ({})", r.id, r.name)
            }
            (_, Some(r)) => format!("Created {} id {}", r.kind, r.id),
            (Step::AttachInternetGateway, None) => "Attached internet gateway to vpc".to_string(),
            (Step::EnablePublicIp, None) => {
                "Enabled auto-assign public IP on public subnet".to_string()
            }
            (Step::CreateDefaultRoute, None) => {
                "Created route table rule to internet gateway".to_string()
            }
            (Step::AssociateRouteTable, None) => {
                "Associated public subnet with public route table".to_string()
            }
            (Step::AuthorizeIngress { rule_count }, None) => {
                format!("Created {} inbound rule(s) on security group", rule_count)
            }
            (step, None) => format!("Completed: {}", step),
        }
    }
}

/// Bookkeeping for a single run
struct Run<F> {
    created: Vec<ResourceRef>,
    observer: F,
}

impl<F: FnMut(&StepOutcome)> Run<F> {
    fn new(observer: F) -> Self {
        Self {
            created: Vec::new(),
            observer,
        }
    }

    fn completed(&mut self, step: Step, resource: Option<ResourceRef>) {
        if let Some(ref r) = resource {
            self.created.push(r.clone());
        }
        let outcome = StepOutcome { step, resource };
        info!("{}", outcome.message());
        (self.observer)(&outcome);
    }

    fn failed(&mut self, step: Step, source: ProviderError) -> ProvisionError {
        ProvisionError::StepFailed {
            step,
            created: std::mem::take(&mut self.created),
            source,
        }
    }
}

/// Runs a Blueprint's sequence using a Provider
pub struct Provisioner<P: Ec2Provider> {
    provider: P,
    blueprint: Blueprint,
}

impl<P: Ec2Provider> Provisioner<P> {
    pub fn new(provider: P, blueprint: Blueprint) -> Self {
        Self {
            provider,
            blueprint,
        }
    }

    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn plan(&self) -> Plan {
        Plan::from_blueprint(&self.blueprint)
    }

    /// Execute every step in order, calling `observer` after each success
    ///
    /// Fails fast: after the first error no further call is issued and nothing
    /// is cleaned up. The error lists what was created before the failure.
    pub async fn apply<F>(&self, observer: F) -> Result<ProvisionedIds, ProvisionError>
    where
        F: FnMut(&StepOutcome),
    {
        self.blueprint
            .validate()
            .map_err(ProvisionError::InvalidBlueprint)?;

        let bp = &self.blueprint;
        let provider = &self.provider;
        let mut run = Run::new(observer);

        debug!(
            "Provisioning with provider '{}' in {} (profile {})",
            provider.name(),
            bp.region,
            bp.profile
        );

        // VPC
        let vpc_name = bp.resource_name(ResourceKind::Vpc);
        let vpc_id = provider
            .create_vpc(&CreateVpcRequest {
                cidr_block: bp.vpc_cidr.clone(),
                tags: bp.tags(&vpc_name),
            })
            .await
            .map_err(|e| run.failed(Step::CreateVpc, e))?;
        run.completed(
            Step::CreateVpc,
            Some(ResourceRef::new(ResourceKind::Vpc, &vpc_id, vpc_name)),
        );

        // Internet gateway, attached to the VPC
        let igw_name = bp.resource_name(ResourceKind::InternetGateway);
        let internet_gateway_id = provider
            .create_internet_gateway(&CreateInternetGatewayRequest {
                tags: bp.tags(&igw_name),
            })
            .await
            .map_err(|e| run.failed(Step::CreateInternetGateway, e))?;
        run.completed(
            Step::CreateInternetGateway,
            Some(ResourceRef::new(
                ResourceKind::InternetGateway,
                &internet_gateway_id,
                igw_name,
            )),
        );

        provider
            .attach_internet_gateway(&AttachInternetGatewayRequest {
                internet_gateway_id: internet_gateway_id.clone(),
                vpc_id: vpc_id.clone(),
            })
            .await
            .map_err(|e| run.failed(Step::AttachInternetGateway, e))?;
        run.completed(Step::AttachInternetGateway, None);

        // Public subnet
        let subnet_name = bp.resource_name(ResourceKind::Subnet);
        let subnet_id = provider
            .create_subnet(&CreateSubnetRequest {
                vpc_id: vpc_id.clone(),
                cidr_block: bp.subnet_cidr.clone(),
                tags: bp.tags(&subnet_name),
            })
            .await
            .map_err(|e| run.failed(Step::CreateSubnet, e))?;
        run.completed(
            Step::CreateSubnet,
            Some(ResourceRef::new(
                ResourceKind::Subnet,
                &subnet_id,
                subnet_name,
            )),
        );

        provider
            .map_public_ip_on_launch(&MapPublicIpRequest {
                subnet_id: subnet_id.clone(),
                enabled: true,
            })
            .await
            .map_err(|e| run.failed(Step::EnablePublicIp, e))?;
        run.completed(Step::EnablePublicIp, None);

        // Route table with a default route through the gateway
        let rt_name = bp.resource_name(ResourceKind::RouteTable);
        let route_table_id = provider
            .create_route_table(&CreateRouteTableRequest {
                vpc_id: vpc_id.clone(),
                tags: bp.tags(&rt_name),
            })
            .await
            .map_err(|e| run.failed(Step::CreateRouteTable, e))?;
        run.completed(
            Step::CreateRouteTable,
            Some(ResourceRef::new(
                ResourceKind::RouteTable,
                &route_table_id,
                rt_name,
            )),
        );

        provider
            .create_route(&CreateRouteRequest {
                route_table_id: route_table_id.clone(),
                destination_cidr_block: bp.default_route_cidr.clone(),
                gateway_id: internet_gateway_id.clone(),
            })
            .await
            .map_err(|e| run.failed(Step::CreateDefaultRoute, e))?;
        run.completed(Step::CreateDefaultRoute, None);

        let route_table_association_id = provider
            .associate_route_table(&AssociateRouteTableRequest {
                route_table_id: route_table_id.clone(),
                subnet_id: subnet_id.clone(),
            })
            .await
            .map_err(|e| run.failed(Step::AssociateRouteTable, e))?;
        debug!("Route table association id {}", route_table_association_id);
        run.completed(Step::AssociateRouteTable, None);

        // Security group and its inbound rules
        let sg_name = bp.security_group_name();
        let security_group_id = provider
            .create_security_group(&CreateSecurityGroupRequest {
                vpc_id: vpc_id.clone(),
                group_name: sg_name.clone(),
                description: bp.security_group_description.clone(),
                tags: bp.tags(&sg_name),
            })
            .await
            .map_err(|e| run.failed(Step::CreateSecurityGroup, e))?;
        run.completed(
            Step::CreateSecurityGroup,
            Some(ResourceRef::new(
                ResourceKind::SecurityGroup,
                &security_group_id,
                sg_name,
            )),
        );

        let authorize_step = Step::AuthorizeIngress {
            rule_count: bp.ingress_rules.len(),
        };
        provider
            .authorize_ingress(&AuthorizeIngressRequest {
                group_id: security_group_id.clone(),
                rules: bp.ingress_rules.clone(),
            })
            .await
            .map_err(|e| run.failed(authorize_step.clone(), e))?;
        run.completed(authorize_step, None);

        // Instances, one at a time in declared order
        let mut instances = Vec::with_capacity(bp.machines.len());
        for machine in &bp.machines {
            let step = Step::LaunchInstance {
                name: machine.name.clone(),
            };
            let instance_id = provider
                .run_instance(&RunInstanceRequest {
                    image_id: machine.image_id.clone(),
                    instance_type: machine.instance_type.clone(),
                    key_name: bp.key_name.clone(),
                    security_group_ids: vec![security_group_id.clone()],
                    subnet_id: subnet_id.clone(),
                    user_data: bp.boot_script.clone(),
                    tags: bp.tags(&machine.name),
                })
                .await
                .map_err(|e| run.failed(step.clone(), e))?;
            run.completed(
                step,
                Some(ResourceRef::new(
                    ResourceKind::Instance,
                    &instance_id,
                    &machine.name,
                )),
            );
            instances.push(LaunchedInstance {
                name: machine.name.clone(),
                instance_id,
            });
        }

        Ok(ProvisionedIds {
            vpc_id,
            internet_gateway_id,
            subnet_id,
            route_table_id,
            route_table_association_id,
            security_group_id,
            instances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{ANYWHERE, IMAGE_ID, MachineSpec};
    use crate::provider::{BoxFuture, ProviderResult};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        CreateVpc(CreateVpcRequest),
        CreateInternetGateway(CreateInternetGatewayRequest),
        AttachInternetGateway(AttachInternetGatewayRequest),
        CreateSubnet(CreateSubnetRequest),
        MapPublicIp(MapPublicIpRequest),
        CreateRouteTable(CreateRouteTableRequest),
        CreateRoute(CreateRouteRequest),
        AssociateRouteTable(AssociateRouteTableRequest),
        CreateSecurityGroup(CreateSecurityGroupRequest),
        AuthorizeIngress(AuthorizeIngressRequest),
        RunInstance(RunInstanceRequest),
    }

    impl Call {
        fn op(&self) -> &'static str {
            match self {
                Call::CreateVpc(_) => "create_vpc",
                Call::CreateInternetGateway(_) => "create_internet_gateway",
                Call::AttachInternetGateway(_) => "attach_internet_gateway",
                Call::CreateSubnet(_) => "create_subnet",
                Call::MapPublicIp(_) => "map_public_ip_on_launch",
                Call::CreateRouteTable(_) => "create_route_table",
                Call::CreateRoute(_) => "create_route",
                Call::AssociateRouteTable(_) => "associate_route_table",
                Call::CreateSecurityGroup(_) => "create_security_group",
                Call::AuthorizeIngress(_) => "authorize_ingress",
                Call::RunInstance(_) => "run_instance",
            }
        }
    }

    const ALL_OPS: [&str; 11] = [
        "create_vpc",
        "create_internet_gateway",
        "attach_internet_gateway",
        "create_subnet",
        "map_public_ip_on_launch",
        "create_route_table",
        "create_route",
        "associate_route_table",
        "create_security_group",
        "authorize_ingress",
        "run_instance",
    ];

    /// Records every call and hands out sequential identifiers
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<Call>>,
        /// Reject the nth (1-based) call of the named operation
        fail_on: Option<(&'static str, usize)>,
    }

    impl RecordingProvider {
        fn new() -> Self {
            Self::default()
        }

        fn failing_on(op: &'static str, occurrence: usize) -> Self {
            Self {
                fail_on: Some((op, occurrence)),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn respond<T: Send + 'static>(
            &self,
            call: Call,
            value: impl FnOnce(usize) -> T,
        ) -> BoxFuture<'_, ProviderResult<T>> {
            let op = call.op();
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            let seq = calls.len();
            let occurrence = calls.iter().filter(|c| c.op() == op).count();
            let result = match self.fail_on {
                Some((fail_op, n)) if fail_op == op && n == occurrence => {
                    Err(ProviderError::new(format!("{} rejected", op)))
                }
                _ => Ok(value(seq)),
            };
            Box::pin(async move { result })
        }
    }

    impl Ec2Provider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn create_vpc(&self, request: &CreateVpcRequest) -> BoxFuture<'_, ProviderResult<String>> {
            self.respond(Call::CreateVpc(request.clone()), |n| {
                format!("vpc-{:04}", n)
            })
        }

        fn create_internet_gateway(
            &self,
            request: &CreateInternetGatewayRequest,
        ) -> BoxFuture<'_, ProviderResult<String>> {
            self.respond(Call::CreateInternetGateway(request.clone()), |n| {
                format!("igw-{:04}", n)
            })
        }

        fn attach_internet_gateway(
            &self,
            request: &AttachInternetGatewayRequest,
        ) -> BoxFuture<'_, ProviderResult<()>> {
            self.respond(Call::AttachInternetGateway(request.clone()), |_| ())
        }

        fn create_subnet(
            &self,
            request: &CreateSubnetRequest,
        ) -> BoxFuture<'_, ProviderResult<String>> {
            self.respond(Call::CreateSubnet(request.clone()), |n| {
                format!("subnet-{:04}", n)
            })
        }

        fn map_public_ip_on_launch(
            &self,
            request: &MapPublicIpRequest,
        ) -> BoxFuture<'_, ProviderResult<()>> {
            self.respond(Call::MapPublicIp(request.clone()), |_| ())
        }

        fn create_route_table(
            &self,
            request: &CreateRouteTableRequest,
        ) -> BoxFuture<'_, ProviderResult<String>> {
            self.respond(Call::CreateRouteTable(request.clone()), |n| {
                format!("rtb-{:04}", n)
            })
        }

        fn create_route(&self, request: &CreateRouteRequest) -> BoxFuture<'_, ProviderResult<()>> {
            self.respond(Call::CreateRoute(request.clone()), |_| ())
        }

        fn associate_route_table(
            &self,
            request: &AssociateRouteTableRequest,
        ) -> BoxFuture<'_, ProviderResult<String>> {
            self.respond(Call::AssociateRouteTable(request.clone()), |n| {
                format!("rtbassoc-{:04}", n)
            })
        }

        fn create_security_group(
            &self,
            request: &CreateSecurityGroupRequest,
        ) -> BoxFuture<'_, ProviderResult<String>> {
            self.respond(Call::CreateSecurityGroup(request.clone()), |n| {
                format!("sg-{:04}", n)
            })
        }

        fn authorize_ingress(
            &self,
            request: &AuthorizeIngressRequest,
        ) -> BoxFuture<'_, ProviderResult<()>> {
            self.respond(Call::AuthorizeIngress(request.clone()), |_| ())
        }

        fn run_instance(
            &self,
            request: &RunInstanceRequest,
        ) -> BoxFuture<'_, ProviderResult<String>> {
            self.respond(Call::RunInstance(request.clone()), |n| {
                format!("i-{:04}", n)
            })
        }
    }

    type Applied = (
        Provisioner<RecordingProvider>,
        Result<ProvisionedIds, ProvisionError>,
        Vec<StepOutcome>,
    );

    async fn apply_default(provider: RecordingProvider) -> Applied {
        let provisioner = Provisioner::new(provider, Blueprint::default());
        let mut outcomes = Vec::new();
        let result = provisioner.apply(|o| outcomes.push(o.clone())).await;
        (provisioner, result, outcomes)
    }

    #[tokio::test]
    async fn identifiers_flow_into_dependent_requests() {
        let (provisioner, result, _) = apply_default(RecordingProvider::new()).await;
        let ids = result.unwrap();

        for call in provisioner.provider().calls() {
            match call {
                Call::AttachInternetGateway(r) => {
                    assert_eq!(r.internet_gateway_id, ids.internet_gateway_id);
                    assert_eq!(r.vpc_id, ids.vpc_id);
                }
                Call::CreateSubnet(r) => assert_eq!(r.vpc_id, ids.vpc_id),
                Call::MapPublicIp(r) => assert_eq!(r.subnet_id, ids.subnet_id),
                Call::CreateRouteTable(r) => assert_eq!(r.vpc_id, ids.vpc_id),
                Call::CreateRoute(r) => assert_eq!(r.route_table_id, ids.route_table_id),
                Call::AssociateRouteTable(r) => {
                    assert_eq!(r.route_table_id, ids.route_table_id);
                    assert_eq!(r.subnet_id, ids.subnet_id);
                }
                Call::CreateSecurityGroup(r) => assert_eq!(r.vpc_id, ids.vpc_id),
                Call::AuthorizeIngress(r) => assert_eq!(r.group_id, ids.security_group_id),
                Call::RunInstance(r) => {
                    assert_eq!(r.subnet_id, ids.subnet_id);
                    assert_eq!(r.security_group_ids, vec![ids.security_group_id.clone()]);
                }
                Call::CreateVpc(_) | Call::CreateInternetGateway(_) => {}
            }
        }
    }

    #[tokio::test]
    async fn other_layout_threads_its_own_identifiers() {
        let blueprint = Blueprint {
            name_prefix: "Staging".to_string(),
            vpc_cidr: "172.16.0.0/16".to_string(),
            subnet_cidr: "172.16.4.0/24".to_string(),
            machines: vec![
                MachineSpec::new("build-01", IMAGE_ID, "t3.medium"),
                MachineSpec::new("build-02", IMAGE_ID, "t3.medium"),
            ],
            ..Blueprint::default()
        };
        let provisioner = Provisioner::new(RecordingProvider::new(), blueprint.clone());
        let mut lines = Vec::new();
        let ids = provisioner
            .apply(|o| lines.push(o.message()))
            .await
            .unwrap();

        let mut launches = Vec::new();
        let mut names = Vec::new();
        for call in provisioner.provider().calls() {
            match call {
                Call::CreateVpc(r) => {
                    assert_eq!(r.cidr_block, "172.16.0.0/16");
                    names.push(r.tags.get("Name").map(String::from));
                }
                Call::CreateInternetGateway(r) => names.push(r.tags.get("Name").map(String::from)),
                Call::AttachInternetGateway(r) => {
                    assert_eq!(r.internet_gateway_id, ids.internet_gateway_id);
                    assert_eq!(r.vpc_id, ids.vpc_id);
                }
                Call::CreateSubnet(r) => {
                    assert_eq!(r.vpc_id, ids.vpc_id);
                    assert_eq!(r.cidr_block, "172.16.4.0/24");
                    names.push(r.tags.get("Name").map(String::from));
                }
                Call::MapPublicIp(r) => assert_eq!(r.subnet_id, ids.subnet_id),
                Call::CreateRouteTable(r) => {
                    assert_eq!(r.vpc_id, ids.vpc_id);
                    names.push(r.tags.get("Name").map(String::from));
                }
                Call::CreateRoute(r) => {
                    assert_eq!(r.route_table_id, ids.route_table_id);
                    assert_eq!(r.gateway_id, ids.internet_gateway_id);
                }
                Call::AssociateRouteTable(r) => {
                    assert_eq!(r.route_table_id, ids.route_table_id);
                    assert_eq!(r.subnet_id, ids.subnet_id);
                }
                Call::CreateSecurityGroup(r) => {
                    assert_eq!(r.vpc_id, ids.vpc_id);
                    assert_eq!(r.group_name, "Staging-sg");
                    names.push(r.tags.get("Name").map(String::from));
                }
                Call::AuthorizeIngress(r) => assert_eq!(r.group_id, ids.security_group_id),
                Call::RunInstance(r) => launches.push(r),
            }
        }

        assert_eq!(
            names,
            ["Staging-vpc", "Staging-ig", "Staging-subnet", "Staging-rt", "Staging-sg"]
                .map(|n| Some(n.to_string()))
        );

        assert_eq!(launches.len(), blueprint.machines.len());
        for (launch, machine) in launches.iter().zip(&blueprint.machines) {
            assert_eq!(launch.subnet_id, ids.subnet_id);
            assert_eq!(launch.security_group_ids, vec![ids.security_group_id.clone()]);
            assert_eq!(launch.tags.get("Name"), Some(machine.name.as_str()));
            assert_eq!(launch.instance_type, "t3.medium");
        }

        let launched: Vec<&str> = ids.instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(launched, vec!["build-01", "build-02"]);
        assert_eq!(lines.len(), 12);
    }

    #[tokio::test]
    async fn calls_follow_plan_order() {
        let (provisioner, result, outcomes) = apply_default(RecordingProvider::new()).await;
        assert!(result.is_ok());

        let ops: Vec<&str> = provisioner
            .provider()
            .calls()
            .iter()
            .map(|c| c.op())
            .collect();
        let mut expected: Vec<&str> = ALL_OPS[..10].to_vec();
        expected.extend(["run_instance"; 3]);
        assert_eq!(ops, expected);

        let steps: Vec<Step> = outcomes.into_iter().map(|o| o.step).collect();
        assert_eq!(steps, provisioner.plan().steps());
    }

    #[tokio::test]
    async fn single_default_route_and_association() {
        let (provisioner, result, _) = apply_default(RecordingProvider::new()).await;
        let ids = result.unwrap();
        let calls = provisioner.provider().calls();

        let routes: Vec<&CreateRouteRequest> = calls
            .iter()
            .filter_map(|c| match c {
                Call::CreateRoute(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].destination_cidr_block, ANYWHERE);
        assert_eq!(routes[0].gateway_id, ids.internet_gateway_id);

        let associations: Vec<&AssociateRouteTableRequest> = calls
            .iter()
            .filter_map(|c| match c {
                Call::AssociateRouteTable(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(associations.len(), 1);
        assert_eq!(associations[0].subnet_id, ids.subnet_id);
        assert_eq!(ids.route_table_association_id, "rtbassoc-0008");
    }

    #[tokio::test]
    async fn ingress_opens_ssh_and_http_to_all_sources() {
        let (provisioner, _, _) = apply_default(RecordingProvider::new()).await;
        let calls = provisioner.provider().calls();
        let rules = calls
            .iter()
            .find_map(|c| match c {
                Call::AuthorizeIngress(r) => Some(r.rules.clone()),
                _ => None,
            })
            .unwrap();

        for port in [22, 80] {
            assert!(
                rules
                    .iter()
                    .any(|r| r.protocol == "tcp" && r.covers_port(port) && r.cidr == ANYWHERE),
                "no rule for port {}",
                port
            );
        }
    }

    #[tokio::test]
    async fn one_launch_per_machine() {
        let (provisioner, result, _) = apply_default(RecordingProvider::new()).await;
        let ids = result.unwrap();
        let launches: Vec<RunInstanceRequest> = provisioner
            .provider()
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::RunInstance(r) => Some(r),
                _ => None,
            })
            .collect();

        assert_eq!(launches.len(), 3);
        let bp = Blueprint::default();
        for (launch, machine) in launches.iter().zip(&bp.machines) {
            assert_eq!(launch.tags.get("Name"), Some(machine.name.as_str()));
            assert_eq!(launch.tags.get("project"), Some("wecloud"));
            assert_eq!(launch.instance_type, machine.instance_type);
            assert_eq!(launch.image_id, machine.image_id);
            assert_eq!(launch.key_name, "lara-us-east-1");
            assert_eq!(launch.user_data, bp.boot_script);
            assert_eq!(launch.subnet_id, ids.subnet_id);
        }
    }

    #[tokio::test]
    async fn every_resource_carries_project_tag() {
        let (provisioner, _, _) = apply_default(RecordingProvider::new()).await;
        let mut tagged = 0;
        for call in provisioner.provider().calls() {
            let tags = match call {
                Call::CreateVpc(r) => r.tags,
                Call::CreateInternetGateway(r) => r.tags,
                Call::CreateSubnet(r) => r.tags,
                Call::CreateRouteTable(r) => r.tags,
                Call::CreateSecurityGroup(r) => r.tags,
                Call::RunInstance(r) => r.tags,
                _ => continue,
            };
            assert_eq!(tags.get("project"), Some("wecloud"));
            assert!(tags.get("Name").is_some());
            tagged += 1;
        }
        assert_eq!(tagged, 8);
    }

    #[tokio::test]
    async fn first_failure_stops_the_sequence() {
        for op in ALL_OPS {
            let (provisioner, result, outcomes) =
                apply_default(RecordingProvider::failing_on(op, 1)).await;
            let calls = provisioner.provider().calls();

            assert_eq!(calls.last().map(|c| c.op()), Some(op));
            assert_eq!(
                calls.iter().filter(|c| c.op() == op).count(),
                1,
                "{} issued more than once",
                op
            );
            assert_eq!(outcomes.len(), calls.len() - 1);

            let err = result.unwrap_err();
            let created_before = outcomes.iter().filter(|o| o.resource.is_some()).count();
            assert_eq!(err.created().len(), created_before);
            assert!(matches!(err, ProvisionError::StepFailed { .. }));
        }
    }

    #[tokio::test]
    async fn failed_second_launch_reports_leftovers() {
        let (provisioner, result, _) =
            apply_default(RecordingProvider::failing_on("run_instance", 2)).await;
        let err = result.unwrap_err();

        assert_eq!(
            err.failed_step(),
            Some(&Step::LaunchInstance {
                name: "worker-node-01".to_string()
            })
        );
        let kinds: Vec<ResourceKind> = err.created().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Vpc,
                ResourceKind::InternetGateway,
                ResourceKind::Subnet,
                ResourceKind::RouteTable,
                ResourceKind::SecurityGroup,
                ResourceKind::Instance,
            ]
        );
        assert_eq!(err.created()[5].name, "master-node-01");

        // worker-node-02 is never attempted
        let launches = provisioner
            .provider()
            .calls()
            .iter()
            .filter(|c| c.op() == "run_instance")
            .count();
        assert_eq!(launches, 2);
    }

    #[tokio::test]
    async fn invalid_blueprint_makes_no_calls() {
        let blueprint = Blueprint {
            subnet_cidr: "10.9.0.0/28".to_string(),
            ..Blueprint::default()
        };
        let provisioner = Provisioner::new(RecordingProvider::new(), blueprint);
        let result = provisioner.apply(|_| {}).await;

        assert!(matches!(result, Err(ProvisionError::InvalidBlueprint(_))));
        assert!(provisioner.provider().calls().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_public_subnet_and_instances() {
        let blueprint = Blueprint {
            vpc_cidr: "10.0.0.0/24".to_string(),
            subnet_cidr: "10.0.0.0/28".to_string(),
            ..Blueprint::default()
        };
        let provisioner = Provisioner::new(RecordingProvider::new(), blueprint);
        let mut lines = Vec::new();
        let ids = provisioner
            .apply(|o| lines.push(o.message()))
            .await
            .unwrap();

        let calls = provisioner.provider().calls();
        let public_ip: Vec<&MapPublicIpRequest> = calls
            .iter()
            .filter_map(|c| match c {
                Call::MapPublicIp(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(public_ip.len(), 1);
        assert!(public_ip[0].enabled);
        assert_eq!(public_ip[0].subnet_id, ids.subnet_id);

        let names: Vec<&str> = ids.instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["master-node-01", "worker-node-01", "worker-node-02"]
        );

        let instance_lines: Vec<&String> = lines
            .iter()
            .filter(|l| l.starts_with("Created instance"))
            .collect();
        assert_eq!(instance_lines.len(), 3);
        for (line, instance) in instance_lines.iter().zip(&ids.instances) {
            assert_eq!(
                **line,
                format!(
                    "Created instance {} ({})",
                    instance.instance_id, instance.name
                )
            );
        }
        assert_eq!(lines[0], format!("Created vpc id {}", ids.vpc_id));
        assert_eq!(lines.len(), 13);
    }
}

//! Plan - Ordered list of provisioning steps
//!
//! A Plan describes the calls a run will make, in order. Building one has no
//! side effects; the identifiers each step consumes only exist once the
//! earlier steps have run.

use std::fmt;

use crate::blueprint::Blueprint;

/// One provider call in the provisioning sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    CreateVpc,
    CreateInternetGateway,
    AttachInternetGateway,
    CreateSubnet,
    EnablePublicIp,
    CreateRouteTable,
    CreateDefaultRoute,
    AssociateRouteTable,
    CreateSecurityGroup,
    AuthorizeIngress { rule_count: usize },
    LaunchInstance { name: String },
}

impl Step {
    /// Whether this step creates a new tagged resource
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Step::CreateVpc
                | Step::CreateInternetGateway
                | Step::CreateSubnet
                | Step::CreateRouteTable
                | Step::CreateSecurityGroup
                | Step::LaunchInstance { .. }
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::CreateVpc => write!(f, "create vpc"),
            Step::CreateInternetGateway => write!(f, "create internet gateway"),
            Step::AttachInternetGateway => write!(f, "attach internet gateway to vpc"),
            Step::CreateSubnet => write!(f, "create public subnet"),
            Step::EnablePublicIp => write!(f, "enable auto-assign public IP on public subnet"),
            Step::CreateRouteTable => write!(f, "create public route table"),
            Step::CreateDefaultRoute => write!(f, "add default route to internet gateway"),
            Step::AssociateRouteTable => {
                write!(f, "associate public subnet with public route table")
            }
            Step::CreateSecurityGroup => write!(f, "create security group"),
            Step::AuthorizeIngress { rule_count } => {
                write!(f, "authorize {} inbound rule(s)", rule_count)
            }
            Step::LaunchInstance { name } => write!(f, "launch instance {}", name),
        }
    }
}

/// Plan containing Steps to be executed
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full sequence for a blueprint: network setup, then one launch per machine
    pub fn from_blueprint(blueprint: &Blueprint) -> Self {
        let mut plan = Self::new();
        plan.add(Step::CreateVpc);
        plan.add(Step::CreateInternetGateway);
        plan.add(Step::AttachInternetGateway);
        plan.add(Step::CreateSubnet);
        plan.add(Step::EnablePublicIp);
        plan.add(Step::CreateRouteTable);
        plan.add(Step::CreateDefaultRoute);
        plan.add(Step::AssociateRouteTable);
        plan.add(Step::CreateSecurityGroup);
        plan.add(Step::AuthorizeIngress {
            rule_count: blueprint.ingress_rules.len(),
        });
        for machine in &blueprint.machines {
            plan.add(Step::LaunchInstance {
                name: machine.name.clone(),
            });
        }
        plan
    }

    pub fn add(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for step in &self.steps {
            if step.is_create() {
                summary.create += 1;
            } else {
                summary.modify += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub modify: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to modify",
            self.create, self.modify
        )
    }
}

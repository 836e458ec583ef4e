//! Blueprint - The fixed resource layout provisioned by a run
//!
//! All inputs are literal constants, including the credential profile and
//! region. None of them can be set from a file or a command-line flag.

use crate::resource::{ResourceKind, Tags};
use crate::validation::{self, ValidationError};

pub const DEFAULT_PROFILE: &str = "lara-private";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Request signing version; SigV4 is what the SDK signs with
pub const SIGNATURE_VERSION: &str = "v4";

/// Source range matching every IPv4 address
pub const ANYWHERE: &str = "0.0.0.0/0";

pub const PROJECT: &str = "wecloud";
pub const NAME_PREFIX: &str = "Eval-1";
pub const VPC_CIDR: &str = "10.0.0.0/24";
pub const SUBNET_CIDR: &str = "10.0.0.0/28";
pub const KEY_NAME: &str = "lara-us-east-1";
pub const IMAGE_ID: &str = "ami-06aa3f7caf3a30282";

/// Boot script passed verbatim to every instance
pub const BOOT_SCRIPT: &str = r#"#!/bin/bash

# Update system packages
sudo apt-get update

# Install Python 3.10
sudo apt-get install -y python3.10

# Install Node.js 18.x
curl -fsSL https://deb.nodesource.com/setup_18.x | sudo -E bash -
sudo apt-get install -y nodejs

# Install Java 11
sudo apt-get install -y openjdk-11-jdk

# Install Docker Engine
sudo apt-get install -y docker.io

# Install Nginx to test internet connection
sudo apt install nginx
"#;

/// One compute node to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSpec {
    /// Display name, used as the instance's `Name` tag
    pub name: String,
    pub image_id: String,
    /// Instance size class (e.g., "t2.micro")
    pub instance_type: String,
}

impl MachineSpec {
    pub fn new(
        name: impl Into<String>,
        image_id: impl Into<String>,
        instance_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image_id: image_id.into(),
            instance_type: instance_type.into(),
        }
    }
}

/// Inbound firewall rule on the security group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    /// IP protocol (tcp, udp, icmp, or -1 for all)
    pub protocol: String,
    pub from_port: i32,
    pub to_port: i32,
    pub cidr: String,
    pub description: String,
}

impl IngressRule {
    /// Single TCP port open to the given source range
    pub fn tcp(port: i32, cidr: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            protocol: "tcp".to_string(),
            from_port: port,
            to_port: port,
            cidr: cidr.into(),
            description: description.into(),
        }
    }

    pub fn covers_port(&self, port: i32) -> bool {
        self.from_port <= port && port <= self.to_port
    }
}

/// Everything a run needs, bundled in one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blueprint {
    /// Named local credential profile
    pub profile: String,
    pub region: String,
    /// Value of the `project` tag shared by every resource
    pub project: String,
    /// Prefix for resource `Name` tags (e.g., "Eval-1" -> "Eval-1-vpc")
    pub name_prefix: String,
    pub vpc_cidr: String,
    pub subnet_cidr: String,
    /// Destination of the route pointing at the internet gateway
    pub default_route_cidr: String,
    pub security_group_description: String,
    pub ingress_rules: Vec<IngressRule>,
    pub key_name: String,
    pub machines: Vec<MachineSpec>,
    pub boot_script: String,
}

impl Default for Blueprint {
    fn default() -> Self {
        let sg_name = format!("{}-sg", NAME_PREFIX);
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            region: DEFAULT_REGION.to_string(),
            project: PROJECT.to_string(),
            name_prefix: NAME_PREFIX.to_string(),
            vpc_cidr: VPC_CIDR.to_string(),
            subnet_cidr: SUBNET_CIDR.to_string(),
            default_route_cidr: ANYWHERE.to_string(),
            security_group_description: sg_name,
            ingress_rules: vec![
                IngressRule::tcp(22, ANYWHERE, "SSH access"),
                IngressRule::tcp(80, ANYWHERE, "HTTP access"),
            ],
            key_name: KEY_NAME.to_string(),
            machines: vec![
                MachineSpec::new("master-node-01", IMAGE_ID, "t2.small"),
                MachineSpec::new("worker-node-01", IMAGE_ID, "t2.micro"),
                MachineSpec::new("worker-node-02", IMAGE_ID, "t2.micro"),
            ],
            boot_script: BOOT_SCRIPT.to_string(),
        }
    }
}

impl Blueprint {
    /// `Name` tag for a network resource; instances use their machine name
    pub fn resource_name(&self, kind: ResourceKind) -> String {
        let suffix = match kind {
            ResourceKind::Vpc => "vpc",
            ResourceKind::InternetGateway => "ig",
            ResourceKind::Subnet => "subnet",
            ResourceKind::RouteTable => "rt",
            ResourceKind::SecurityGroup => "sg",
            ResourceKind::Instance => "instance",
        };
        format!("{}-{}", self.name_prefix, suffix)
    }

    pub fn security_group_name(&self) -> String {
        self.resource_name(ResourceKind::SecurityGroup)
    }

    /// Tags for a resource with the given `Name`
    pub fn tags(&self, name: &str) -> Tags {
        Tags::for_resource(&self.project, name)
    }

    /// Check the literal inputs before any call is made
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validation::validate_blueprint(self)
    }
}

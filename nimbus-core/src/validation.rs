//! Validation of blueprint inputs
//!
//! Catches malformed literals before the first provider call. Account state
//! (key pairs, images, limits) is not checked here.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::blueprint::Blueprint;

/// VPC and subnet prefix lengths accepted by EC2
const MIN_NETWORK_PREFIX: u8 = 16;
const MAX_NETWORK_PREFIX: u8 = 28;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Parsed IPv4 CIDR block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub addr: Ipv4Addr,
    pub prefix: u8,
}

impl Cidr {
    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix)
        }
    }

    /// True if every address of `other` lies within this block
    pub fn contains(&self, other: &Cidr) -> bool {
        other.prefix >= self.prefix
            && (u32::from(other.addr) & self.mask()) == (u32::from(self.addr) & self.mask())
    }
}

/// Parse and validate CIDR block format (e.g., "10.0.0.0/16")
pub fn parse_cidr(cidr: &str) -> Result<Cidr, String> {
    let (ip, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("Invalid CIDR format '{}': expected IP/prefix", cidr))?;

    let addr: Ipv4Addr = ip
        .parse()
        .map_err(|_| format!("Invalid IP address '{}' in CIDR block", ip))?;

    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(Cidr { addr, prefix: p }),
        Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-32", p)),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}

fn network_cidr(path: &str, value: &str, errors: &mut Vec<ValidationError>) -> Option<Cidr> {
    match parse_cidr(value) {
        Ok(cidr) if (MIN_NETWORK_PREFIX..=MAX_NETWORK_PREFIX).contains(&cidr.prefix) => Some(cidr),
        Ok(cidr) => {
            errors.push(ValidationError::new(
                path,
                format!(
                    "prefix /{} out of range: must be /{} to /{}",
                    cidr.prefix, MIN_NETWORK_PREFIX, MAX_NETWORK_PREFIX
                ),
            ));
            None
        }
        Err(message) => {
            errors.push(ValidationError::new(path, message));
            None
        }
    }
}

/// Validate every literal in a blueprint, collecting all errors
pub fn validate_blueprint(bp: &Blueprint) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let vpc = network_cidr("vpc_cidr", &bp.vpc_cidr, &mut errors);
    let subnet = network_cidr("subnet_cidr", &bp.subnet_cidr, &mut errors);
    if let (Some(vpc), Some(subnet)) = (vpc, subnet) {
        if !vpc.contains(&subnet) {
            errors.push(ValidationError::new(
                "subnet_cidr",
                format!("{} is not within {}", bp.subnet_cidr, bp.vpc_cidr),
            ));
        }
    }

    if let Err(message) = parse_cidr(&bp.default_route_cidr) {
        errors.push(ValidationError::new("default_route_cidr", message));
    }

    if bp.project.is_empty() {
        errors.push(ValidationError::new("project", "must not be empty"));
    }

    for (i, rule) in bp.ingress_rules.iter().enumerate() {
        let path = format!("ingress_rules[{}]", i);
        if !matches!(rule.protocol.as_str(), "tcp" | "udp" | "icmp" | "-1") {
            errors.push(ValidationError::new(
                format!("{}.protocol", path),
                format!(
                    "Invalid protocol '{}'. Must be one of: tcp, udp, icmp, -1",
                    rule.protocol
                ),
            ));
        }
        if rule.protocol != "-1" {
            for (field, port) in [("from_port", rule.from_port), ("to_port", rule.to_port)] {
                if !(0..=65535).contains(&port) {
                    errors.push(ValidationError::new(
                        format!("{}.{}", path, field),
                        "Port number must be between 0 and 65535",
                    ));
                }
            }
            if rule.from_port > rule.to_port {
                errors.push(ValidationError::new(
                    path.clone(),
                    format!(
                        "from_port {} is greater than to_port {}",
                        rule.from_port, rule.to_port
                    ),
                ));
            }
        }
        if let Err(message) = parse_cidr(&rule.cidr) {
            errors.push(ValidationError::new(format!("{}.cidr", path), message));
        }
    }

    if bp.key_name.is_empty() {
        errors.push(ValidationError::new("key_name", "must not be empty"));
    }

    if bp.machines.is_empty() {
        errors.push(ValidationError::new(
            "machines",
            "at least one machine is required",
        ));
    }
    for (i, machine) in bp.machines.iter().enumerate() {
        if machine.name.is_empty() {
            errors.push(ValidationError::new(
                format!("machines[{}].name", i),
                "must not be empty",
            ));
        }
        if machine.image_id.is_empty() {
            errors.push(ValidationError::new(
                format!("machines[{}].image_id", i),
                "must not be empty",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

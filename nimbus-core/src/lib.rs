//! Nimbus Core
//!
//! Core library for a one-shot EC2 bootstrapper: a public VPC, its routing and
//! firewall, and a fixed set of compute nodes, created in a single linear pass.

pub mod blueprint;
pub mod error;
pub mod plan;
pub mod provider;
pub mod provisioner;
pub mod resource;
pub mod validation;

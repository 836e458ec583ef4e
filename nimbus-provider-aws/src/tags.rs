//! Conversion of resource tags into EC2 tag specifications
//!
//! Tags ride on the create call itself; there is no follow-up `CreateTags`.

use aws_sdk_ec2::types::{ResourceType, Tag, TagSpecification};
use nimbus_core::resource::{ResourceKind, Tags};

pub(crate) fn resource_type(kind: ResourceKind) -> ResourceType {
    match kind {
        ResourceKind::Vpc => ResourceType::Vpc,
        ResourceKind::InternetGateway => ResourceType::InternetGateway,
        ResourceKind::Subnet => ResourceType::Subnet,
        ResourceKind::RouteTable => ResourceType::RouteTable,
        ResourceKind::SecurityGroup => ResourceType::SecurityGroup,
        ResourceKind::Instance => ResourceType::Instance,
    }
}

/// Build the TagSpecification attached to a create request
pub(crate) fn tag_specification(kind: ResourceKind, tags: &Tags) -> TagSpecification {
    let mut builder = TagSpecification::builder().resource_type(resource_type(kind));
    for tag in tags {
        builder = builder.tags(Tag::builder().key(&tag.key).value(&tag.value).build());
    }
    builder.build()
}

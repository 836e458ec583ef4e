//! Errors returned by a provisioning run

use thiserror::Error;

use crate::plan::Step;
use crate::provider::ProviderError;
use crate::resource::ResourceRef;
use crate::validation::ValidationError;

/// Errors that abort a provisioning run
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The blueprint failed validation; no call was made
    #[error("Invalid blueprint: {}", join_errors(.0))]
    InvalidBlueprint(Vec<ValidationError>),

    /// A provider call failed; the run stopped and nothing was rolled back
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: Step,
        /// Resources created before the failure, in creation order
        created: Vec<ResourceRef>,
        #[source]
        source: ProviderError,
    },
}

impl ProvisionError {
    /// Resources that remain in the account after this failure
    pub fn created(&self) -> &[ResourceRef] {
        match self {
            ProvisionError::InvalidBlueprint(_) => &[],
            ProvisionError::StepFailed { created, .. } => created,
        }
    }

    pub fn failed_step(&self) -> Option<&Step> {
        match self {
            ProvisionError::InvalidBlueprint(_) => None,
            ProvisionError::StepFailed { step, .. } => Some(step),
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    #[test]
    fn step_failure_message() {
        let err = ProvisionError::StepFailed {
            step: Step::CreateSubnet,
            created: vec![ResourceRef::new(ResourceKind::Vpc, "vpc-1", "Eval-1-vpc")],
            source: ProviderError::new("InvalidSubnet.Range").for_resource(ResourceKind::Subnet),
        };
        assert_eq!(
            err.to_string(),
            "Step 'create public subnet' failed: [subnet] InvalidSubnet.Range"
        );
        assert_eq!(err.created().len(), 1);
        assert_eq!(err.failed_step(), Some(&Step::CreateSubnet));
    }

    #[test]
    fn invalid_blueprint_leaves_nothing_behind() {
        let err = ProvisionError::InvalidBlueprint(vec![]);
        assert!(err.created().is_empty());
        assert!(err.failed_step().is_none());
    }
}

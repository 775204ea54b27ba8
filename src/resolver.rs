//! Container-type resolution.
//!
//! Classifies a create request from bundle annotations. Pure: no I/O, no
//! engine calls.

use crate::constants::{
    CONTAINER_TYPE_ANNOTATION, CONTAINER_TYPE_CONTAINER, CONTAINER_TYPE_SANDBOX,
    SANDBOX_ID_ANNOTATION, validate_container_id,
};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Kind of create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerType {
    /// Start a new sandbox whose first container is the request.
    NewSandbox,
    /// Add a container to an existing sandbox.
    ContainerInSandbox { sandbox_id: String },
}

impl ContainerType {
    /// Annotation token for this type.
    pub fn token(&self) -> &'static str {
        match self {
            Self::NewSandbox => CONTAINER_TYPE_SANDBOX,
            Self::ContainerInSandbox { .. } => CONTAINER_TYPE_CONTAINER,
        }
    }
}

/// Classifies a request from its annotations.
///
/// An absent container-type annotation means a new sandbox. An unrecognized
/// value yields [`Error::InvalidContainerType`] carrying the value verbatim.
/// The container token without a non-empty sandbox ID yields
/// [`Error::MissingSandboxId`]; one that is not a valid identifier yields
/// [`Error::InvalidSandboxId`].
pub fn resolve(annotations: &HashMap<String, String>) -> Result<ContainerType> {
    let Some(value) = annotations.get(CONTAINER_TYPE_ANNOTATION) else {
        return Ok(ContainerType::NewSandbox);
    };

    match value.as_str() {
        CONTAINER_TYPE_SANDBOX => Ok(ContainerType::NewSandbox),
        CONTAINER_TYPE_CONTAINER => match annotations.get(SANDBOX_ID_ANNOTATION) {
            Some(id) if !id.is_empty() => {
                validate_container_id(id).map_err(|reason| Error::InvalidSandboxId {
                    annotation: SANDBOX_ID_ANNOTATION.to_string(),
                    value: id.clone(),
                    reason: reason.to_string(),
                })?;
                Ok(ContainerType::ContainerInSandbox {
                    sandbox_id: id.clone(),
                })
            }
            _ => Err(Error::MissingSandboxId {
                annotation: SANDBOX_ID_ANNOTATION.to_string(),
            }),
        },
        other => Err(Error::InvalidContainerType {
            annotation: CONTAINER_TYPE_ANNOTATION.to_string(),
            value: other.to_string(),
        }),
    }
}

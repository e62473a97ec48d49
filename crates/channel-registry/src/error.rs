use crate::ResourceKind;
use thiserror::Error;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} index {index} is already allocated")]
    AlreadyAllocated { kind: ResourceKind, index: usize },
}

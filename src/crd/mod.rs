//! # ManagedSecret CRD
//!
//! Custom resource definition for declarative secret synchronization.
//!
//! A `ManagedSecret` declares which backend holds the secret material, which
//! references to fetch, how to compose them, and what output Secret to keep
//! in sync.

pub mod spec;
pub mod status;

pub use spec::{
    DeletionPolicy, LeafPolicy, ManagedSecret, ManagedSecretSpec, MergePolicy, ProviderRef,
    PushSpec, SecretReference, SelectorReference, TargetSpec, TemplateSpec,
};
pub use status::{Condition, ManagedSecretStatus};

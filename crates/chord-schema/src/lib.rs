//! Service manifest parsing, service variants, and config variable names.
//!
//! This crate defines the schema layer: the JSON service manifest
//! (`ServiceDescriptor`, loaded with disabled entries filtered out), the closed
//! `ServiceKind` variant selected once per service, the `ConfigVars` map every
//! other crate passes around, and the well-known config keys.

pub mod keys;
pub mod kind;
pub mod manifest;
pub mod types;

pub use kind::{ServiceKind, ServiceMode};
pub use manifest::{
    apt_dependencies, load_services, parse_services_str, validate_artifact, CommandHook,
    Language, ManifestError, ServiceDescriptor, ServiceType,
};
pub use types::{Artifact, PackageName};

use std::collections::BTreeMap;

/// Flat, upper-case keyed configuration for one service type.
///
/// Ordered so that every rendering of it (environment files, JSON documents)
/// is byte-for-byte reproducible.
pub type ConfigVars = BTreeMap<String, String>;

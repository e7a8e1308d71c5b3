//! kiln-lib: dependency resolution and build planning for hermetic package sandboxes.
//!
//! This crate turns a tree of package manifests into a build plan:
//! - `sandbox`: resolves the dependency tree rooted at a sandbox directory
//! - `env`: computes the scoped environment of every package
//! - `identity`: derives content-addressed package keys
//! - `graph`: emits ordered build rules and renders them as a Makefile
//!
//! Nothing here executes builds; the emitted plan is consumed by an external executor.

pub mod consts;
pub mod diagnostics;
pub mod env;
pub mod graph;
pub mod identity;
pub mod manifest;
pub mod platform;
pub mod sandbox;
pub mod store;
pub mod util;

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shared types for the explorer API gateway
//!
//! This crate provides the routing vocabulary shared between the gateway and the
//! crates that implement resource handlers, avoiding circular dependencies.

pub mod resources;
pub mod shards;

pub use resources::{Resource, ResourceScope};
pub use shards::{ShardId, ShardIdError};

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Resource catalogue
//!
//! Every resource router the gateway mounts is named here together with its
//! mount path and the level of the routing tree it belongs to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource routers served by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    /// Blocks by number or hash
    Block,
    /// Plain transactions
    Transaction,
    /// Staking transactions
    StakingTransaction,
    /// Address balances and history
    Address,
    /// Internal (trace) transactions
    InternalTransaction,
    /// Event logs
    Logs,
    /// ERC20 tokens
    Erc20,
    /// ERC721 tokens
    Erc721,
    /// ERC1155 tokens
    Erc1155,
    /// Method and event signatures
    Signature,
    /// Token price data
    Price,
    /// Metrics exposition
    Metrics,
    /// JSON-RPC pass-through
    Rpc,
    /// Generic API surface
    Api,
    /// Administrative operations
    Admin,
}

/// Where in the routing tree a resource is mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceScope {
    /// Mounted once per shard under `/v0/shard/{shardID}`
    Sharded,
    /// Mounted under `/v0`, reachable with or without a shard segment
    ShardIndependent,
    /// Mounted at the application root, outside `/v0`
    TopLevel,
}

impl Resource {
    /// Returns every resource in mount order
    pub const fn all() -> &'static [Self] {
        &[
            Self::Block,
            Self::Transaction,
            Self::StakingTransaction,
            Self::Address,
            Self::InternalTransaction,
            Self::Logs,
            Self::Erc20,
            Self::Erc721,
            Self::Erc1155,
            Self::Signature,
            Self::Price,
            Self::Metrics,
            Self::Rpc,
            Self::Api,
            Self::Admin,
        ]
    }

    /// Resources mounted at `scope`, in mount order
    pub fn in_scope(scope: ResourceScope) -> impl Iterator<Item = Self> {
        Self::all()
            .iter()
            .copied()
            .filter(move |resource| resource.scope() == scope)
    }

    /// Path segment the resource is known by
    pub const fn name(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Transaction => "transaction",
            Self::StakingTransaction => "stakingTransaction",
            Self::Address => "address",
            Self::InternalTransaction => "internalTransaction",
            Self::Logs => "logs",
            Self::Erc20 => "erc20",
            Self::Erc721 => "erc721",
            Self::Erc1155 => "erc1155",
            Self::Signature => "signature",
            Self::Price => "price",
            Self::Metrics => "metrics",
            Self::Rpc => "rpc",
            Self::Api => "api",
            Self::Admin => "admin",
        }
    }

    /// Prefix the resource router is nested under, relative to its group
    pub const fn mount_path(self) -> &'static str {
        match self {
            Self::Block => "/block",
            Self::Transaction => "/transaction",
            Self::StakingTransaction => "/stakingTransaction",
            Self::Address => "/address",
            Self::InternalTransaction => "/internalTransaction",
            Self::Logs => "/logs",
            Self::Erc20 => "/erc20",
            Self::Erc721 => "/erc721",
            Self::Erc1155 => "/erc1155",
            Self::Signature => "/signature",
            Self::Price => "/price",
            Self::Metrics => "/metrics",
            Self::Rpc => "/rpc",
            Self::Api => "/api",
            Self::Admin => "/admin",
        }
    }

    /// Level of the routing tree this resource lives at
    pub const fn scope(self) -> ResourceScope {
        match self {
            Self::Block
            | Self::Transaction
            | Self::StakingTransaction
            | Self::Address
            | Self::InternalTransaction
            | Self::Logs
            | Self::Erc20
            | Self::Erc721
            | Self::Erc1155 => ResourceScope::Sharded,
            Self::Signature | Self::Price | Self::Metrics | Self::Rpc => {
                ResourceScope::ShardIndependent
            }
            Self::Api | Self::Admin => ResourceScope::TopLevel,
        }
    }

    /// Whether the router gets its own transport finalizer at its mount point
    ///
    /// The plain sharded resources rely on the finalizer of the shard mount.
    pub const fn finalized_at_mount(self) -> bool {
        !matches!(
            self,
            Self::Block
                | Self::Transaction
                | Self::StakingTransaction
                | Self::Address
                | Self::InternalTransaction
                | Self::Logs
        )
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn mount_paths_are_disjoint() {
        let paths: HashSet<_> = Resource::all().iter().map(|r| r.mount_path()).collect();
        assert_eq!(paths.len(), Resource::all().len());

        for resource in Resource::all() {
            assert_eq!(resource.mount_path(), format!("/{}", resource.name()));
        }
    }

    #[test]
    fn scopes_partition_the_catalogue() {
        let sharded: Vec<_> = Resource::in_scope(ResourceScope::Sharded).collect();
        assert_eq!(sharded.len(), 9);
        assert_eq!(sharded.first(), Some(&Resource::Block));
        assert_eq!(sharded.last(), Some(&Resource::Erc1155));

        assert_eq!(
            Resource::in_scope(ResourceScope::ShardIndependent).collect::<Vec<_>>(),
            vec![
                Resource::Signature,
                Resource::Price,
                Resource::Metrics,
                Resource::Rpc
            ]
        );
        assert_eq!(
            Resource::in_scope(ResourceScope::TopLevel).collect::<Vec<_>>(),
            vec![Resource::Api, Resource::Admin]
        );
    }

    #[test]
    fn only_token_standards_are_finalized_inside_shards() {
        let finalized: Vec<_> = Resource::in_scope(ResourceScope::Sharded)
            .filter(|r| r.finalized_at_mount())
            .collect();
        assert_eq!(
            finalized,
            vec![Resource::Erc20, Resource::Erc721, Resource::Erc1155]
        );
    }

    #[test]
    fn serde_uses_path_names() {
        let json = serde_json::to_string(&Resource::InternalTransaction).expect("serialize");
        assert_eq!(json, "\"internalTransaction\"");
        assert_eq!(
            serde_json::to_string(&Resource::Erc1155).expect("serialize"),
            "\"erc1155\""
        );
    }
}

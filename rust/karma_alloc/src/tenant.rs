// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Tenant bookkeeping shared by every allocator.
//!
//! Allocators keep their tenants in a `BTreeMap` keyed by ID so that
//! iteration, and therefore every tie-break that depends on iteration
//! order, is reproducible from one run to the next.
//!
//! Usage errors (adding a tenant twice, touching a tenant that does not
//! exist) are reported as [`TenantError`] by the `try_*` methods of
//! [`Allocator`]. The plain methods are thin adapters that log the error
//! and carry on, which is what a long-running simulation loop wants.

use std::io;

use log::warn;

/// ID of the shared public pool. Never a real tenant.
pub const PUBLIC_ID: u32 = 0;

/// Placeholder ID. Never a real tenant.
pub const DUMMY_ID: u32 = u32::MAX;

/// Returns true if `id` is one of the reserved sentinel IDs.
pub fn is_reserved(id: u32) -> bool {
    id == PUBLIC_ID || id == DUMMY_ID
}

/// Errors from tenant registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantError {
    /// The tenant ID is already registered.
    Duplicate(u32),
    /// The tenant ID is not registered.
    NotFound(u32),
    /// The ID is reserved (`PUBLIC_ID` or `DUMMY_ID`).
    Reserved(u32),
}

impl std::fmt::Display for TenantError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantError::Duplicate(id) => write!(f, "tenant ID {id} already exists"),
            TenantError::NotFound(id) => write!(f, "tenant ID {id} does not exist"),
            TenantError::Reserved(id) => write!(f, "tenant ID {id:#x} is reserved"),
        }
    }
}

impl std::error::Error for TenantError {}

/// Common interface of the block allocators.
///
/// A harness registers tenants, sets their demand for the coming round,
/// calls [`Allocator::allocate`] once and reads the result back through
/// [`Allocator::allocation`] or [`Allocator::output_tenant`].
pub trait Allocator {
    /// Total number of blocks the allocator hands out.
    fn total_blocks(&self) -> u32;

    fn try_add_user(&mut self, id: u32) -> Result<(), TenantError>;

    fn try_remove_user(&mut self, id: u32) -> Result<(), TenantError>;

    fn try_set_demand(&mut self, id: u32, demand: u32) -> Result<(), TenantError>;

    /// Recompute every tenant's allocation for the current round.
    fn allocate(&mut self);

    fn num_tenants(&self) -> u32;

    /// Registered tenant IDs in ascending order.
    fn tenant_ids(&self) -> Vec<u32>;

    fn demand(&self, id: u32) -> Option<u32>;

    fn allocation(&self, id: u32) -> Option<u32>;

    fn add_user(&mut self, id: u32) {
        if let Err(e) = self.try_add_user(id) {
            warn!("add_user(): {}", e);
        }
    }

    fn remove_user(&mut self, id: u32) {
        if let Err(e) = self.try_remove_user(id) {
            warn!("remove_user(): {}", e);
        }
    }

    fn set_demand(&mut self, id: u32, demand: u32) {
        if let Err(e) = self.try_set_demand(id, demand) {
            warn!("set_demand(): {}", e);
        }
    }

    /// Allocations of every tenant, in tenant ID order.
    fn allocations(&self) -> Vec<u32> {
        self.tenant_ids()
            .into_iter()
            .filter_map(|id| self.allocation(id))
            .collect()
    }

    /// Write `ID: <id> - alloc=<allocation>/<demand>` for tenant `id`.
    ///
    /// The line format is parsed by existing tooling and must not change.
    fn output_tenant(&self, s: &mut dyn io::Write, id: u32) -> io::Result<()> {
        match (self.allocation(id), self.demand(id)) {
            (Some(allocation), Some(demand)) => {
                writeln!(s, "ID: {} - alloc={}/{}", id, allocation, demand)
            }
            _ => {
                warn!("output_tenant(): {}", TenantError::NotFound(id));
                Ok(())
            }
        }
    }
}

/// Per-tenant state common to both allocators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Usage {
    pub demand: u32,
    pub allocation: u32,
}

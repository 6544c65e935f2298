// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Max-min fair allocator
//!
//! Every round the allocation is derived from scratch out of the current
//! demands. When the pool covers total demand, everybody gets what they
//! asked for. Otherwise the pool is water-filled: the water level rises
//! uniformly over all tenants that are still hungry, tenants whose demand
//! is reached drop out, and the level keeps rising until the pool is
//! empty.
//!
//! The level is raised in batches rather than a block at a time. With `k`
//! tenants left and `supply` blocks in hand, the level can rise by
//!
//! ```text
//! alpha = min(smallest remaining demand, supply / k)
//! ```
//!
//! without overshooting either. The remaining demands live in a
//! [`BroadcastHeap`] so the rise is a single offset update. When fewer
//! blocks than tenants remain, the last blocks go one each to the tenants
//! closest to being satisfied, lowest ID first among equals.

use std::collections::BTreeMap;

use log::debug;
use log::trace;

use crate::bheap::BroadcastHeap;
use crate::tenant::is_reserved;
use crate::tenant::Allocator;
use crate::tenant::TenantError;
use crate::tenant::Usage;

#[derive(Debug)]
pub struct MaxMinAllocator {
    total_blocks: u32,
    total_demand: u64,
    tenants: BTreeMap<u32, Usage>,
}

impl MaxMinAllocator {
    pub fn new(num_blocks: u32) -> Self {
        Self {
            total_blocks: num_blocks,
            total_demand: 0,
            tenants: BTreeMap::new(),
        }
    }

    /// Sum of all registered tenants' demand.
    pub fn total_demand(&self) -> u64 {
        self.total_demand
    }

    fn water_fill(&mut self) {
        let mut h = BroadcastHeap::new();
        for (&id, t) in self.tenants.iter() {
            h.push(id, t.demand as i64);
        }

        let mut supply = self.total_blocks as i64;
        while supply > 0 && !h.is_empty() {
            if supply < h.len() as i64 {
                // Not enough to raise the level for everyone. One block
                // each to the tenants nearest their demand.
                for _ in 0..supply {
                    let Some((id, v)) = h.pop() else {
                        break;
                    };
                    self.set_allocation(id, v - 1);
                }
                supply = 0;
            } else {
                let nr = h.len() as i64;
                let level = h.peek_min().unwrap_or(0).min(supply / nr);
                h.add_all(-level);
                supply -= nr * level;
            }

            while h.peek_min() == Some(0) {
                if let Some((id, _)) = h.pop() {
                    self.set_allocation(id, 0);
                }
            }
        }

        while let Some((id, v)) = h.pop() {
            self.set_allocation(id, v);
        }
    }

    // `unmet` is how far short of its demand the tenant ends up.
    fn set_allocation(&mut self, id: u32, unmet: i64) {
        if let Some(t) = self.tenants.get_mut(&id) {
            t.allocation = (t.demand as i64 - unmet) as u32;
            trace!("tenant {}: alloc={}/{}", id, t.allocation, t.demand);
        }
    }
}

impl Allocator for MaxMinAllocator {
    fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    fn try_add_user(&mut self, id: u32) -> Result<(), TenantError> {
        if is_reserved(id) {
            return Err(TenantError::Reserved(id));
        }
        if self.tenants.contains_key(&id) {
            return Err(TenantError::Duplicate(id));
        }
        self.tenants.insert(id, Usage::default());
        Ok(())
    }

    fn try_remove_user(&mut self, id: u32) -> Result<(), TenantError> {
        let t = self.tenants.remove(&id).ok_or(TenantError::NotFound(id))?;
        self.total_demand -= t.demand as u64;
        Ok(())
    }

    fn try_set_demand(&mut self, id: u32, demand: u32) -> Result<(), TenantError> {
        let t = self.tenants.get_mut(&id).ok_or(TenantError::NotFound(id))?;
        self.total_demand = self.total_demand - t.demand as u64 + demand as u64;
        t.demand = demand;
        Ok(())
    }

    fn allocate(&mut self) {
        if self.total_blocks as u64 >= self.total_demand {
            for t in self.tenants.values_mut() {
                t.allocation = t.demand;
            }
        } else {
            self.water_fill();
        }
        debug!(
            "max-min: {} tenants, demand={} blocks={}",
            self.tenants.len(),
            self.total_demand,
            self.total_blocks
        );
    }

    fn num_tenants(&self) -> u32 {
        self.tenants.len() as u32
    }

    fn tenant_ids(&self) -> Vec<u32> {
        self.tenants.keys().copied().collect()
    }

    fn demand(&self, id: u32) -> Option<u32> {
        self.tenants.get(&id).map(|t| t.demand)
    }

    fn allocation(&self, id: u32) -> Option<u32> {
        self.tenants.get(&id).map(|t| t.allocation)
    }
}

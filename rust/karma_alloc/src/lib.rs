// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Block allocators for tenants with dynamic demand
//!
//! This crate divides a fixed pool of fungible blocks among competing
//! tenants, one round at a time, under two policies:
//!
//! - [`MaxMinAllocator`]: classic max-min fairness. Each round is solved
//!   from scratch by water-filling over the current demands.
//!
//! - [`KarmaAllocator`]: credit-based sharing. Tenants that use less than
//!   their guaranteed share donate the rest and earn credits; tenants that
//!   need more spend credits to borrow. Over time this evens out
//!   allocation across tenants whose demand comes in bursts.
//!
//! Both implement the [`Allocator`] trait. A round looks like:
//!
//! ```
//! use karma_alloc::Allocator;
//! use karma_alloc::MaxMinAllocator;
//!
//! let mut alloc = MaxMinAllocator::new(9);
//! for (id, demand) in [(1, 10), (2, 5), (3, 0)] {
//!     alloc.add_user(id);
//!     alloc.set_demand(id, demand);
//! }
//! alloc.allocate();
//! assert_eq!(alloc.allocations(), vec![4, 5, 0]);
//! ```
//!
//! The [`metrics`] module scores recorded allocation history for welfare,
//! fairness and utilization, and [`trace`] produces seeded synthetic
//! demand for experiments.

mod bheap;

mod tenant;
pub use tenant::is_reserved;
pub use tenant::Allocator;
pub use tenant::TenantError;
pub use tenant::DUMMY_ID;
pub use tenant::PUBLIC_ID;

mod maxmin;
pub use maxmin::MaxMinAllocator;

mod karma;
pub use karma::KarmaAllocator;
pub use karma::KarmaConfig;

pub mod metrics;

pub mod trace;
pub use trace::DemandGenerator;
pub use trace::Matrix;

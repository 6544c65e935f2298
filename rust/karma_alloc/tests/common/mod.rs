use std::sync::Once;

use karma_alloc::Allocator;
use karma_alloc::Matrix;

static LOG_INIT: Once = Once::new();

/// Route `log` output through the test harness so it shows up only for
/// failing tests. Safe to call from every test.
pub fn setup_test() {
    LOG_INIT.call_once(|| {
        let _ = simplelog::TestLogger::init(
            simplelog::LevelFilter::Debug,
            simplelog::Config::default(),
        );
    });
}

/// Register tenants `1..=nr`.
pub fn add_tenants(alloc: &mut dyn Allocator, nr: u32) {
    for id in 1..=nr {
        alloc
            .try_add_user(id)
            .unwrap_or_else(|e| panic!("adding tenant {id}: {e}"));
    }
}

/// Apply one row of demands to tenants `1..=row.len()` and allocate.
pub fn run_round(alloc: &mut dyn Allocator, row: &[u32]) -> Vec<u32> {
    for (i, &d) in row.iter().enumerate() {
        alloc
            .try_set_demand(i as u32 + 1, d)
            .unwrap_or_else(|e| panic!("setting demand: {e}"));
    }
    alloc.allocate();
    alloc.allocations()
}

/// Run a whole trace, returning the allocation matrix.
#[allow(dead_code)]
pub fn run_trace(alloc: &mut dyn Allocator, demands: &Matrix) -> Matrix {
    demands.iter().map(|row| run_round(alloc, row)).collect()
}

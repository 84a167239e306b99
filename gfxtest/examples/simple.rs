//! gfxtest Simple Test
//!
//! A test without subtests: exits 0 on success, 77 on skip, 99 on failure.
//!
//! Run with:
//!   cargo run --example simple
//!   INTEL_SIMULATION=1 cargo run --example simple   # Skips

use gfxtest::prelude::*;

fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |acc, &b| acc.rotate_left(5) ^ u32::from(b))
}

#[gfxtest::simple_main]
fn main(test: &mut Subtest) -> TestResult {
    gfxtest::skip_on_simulation()?;

    let data: Vec<u8> = (0..=255).collect();
    let first = checksum(&data);

    // Same checksum from every child.
    test.fork(4, |_| {
        gt_assert_eq!(checksum(&data), first);
        Ok(())
    })?;
    test.wait_children()?;

    let mut stats = Stats::with_capacity(data.len());
    stats
        .push_array(&data.iter().map(|&b| u64::from(b)).collect::<Vec<_>>())
        .or_fail("stats")?;
    gt_assert_eq!(stats.median(), 127.5);
    gt_warn_on!(stats.std_deviation() == 0.0);

    info!("checksum {first:#010x}, trimean {}", stats.trimean());
    Ok(())
}

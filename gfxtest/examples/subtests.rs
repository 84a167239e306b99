//! gfxtest Example Test Binary
//!
//! A test with fixtures, groups, forked children and a background helper,
//! exercising a fake device so it runs anywhere.
//!
//! Run with:
//!   cargo run --example subtests                              # Run every subtest
//!   cargo run --example subtests -- --list-subtests           # List subtests
//!   cargo run --example subtests -- --run-subtest 'basic-*'   # Run a selection
//!   cargo run --example subtests -- --rounds 10 --debug       # Extra and built-in options
//!   cargo run --example subtests -- --help                    # Show all options

use clap::{Arg, value_parser};
use gfxtest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

static ROUNDS: AtomicU32 = AtomicU32::new(3);

// ============================================================================
// Fake Device
// ============================================================================

struct Device {
    buffers: Vec<Vec<u8>>,
}

impl Device {
    fn open() -> Result<Self, String> {
        Ok(Self {
            buffers: Vec::new(),
        })
    }

    fn create(&mut self, size: usize) -> usize {
        self.buffers.push(vec![0; size]);
        self.buffers.len()
    }

    fn write(&mut self, handle: usize, offset: usize, value: u8) -> Result<(), String> {
        let buffer = self
            .buffers
            .get_mut(handle - 1)
            .ok_or_else(|| format!("bad handle {handle}"))?;
        let byte = buffer
            .get_mut(offset)
            .ok_or_else(|| format!("offset {offset} out of range"))?;
        *byte = value;
        Ok(())
    }
}

fn cleanup(sig: i32) {
    if sig != 0 {
        eprintln!("cleaning up after signal {sig}");
    }
}

fn extra_options() -> ExtraOptions {
    ExtraOptions::new()
        .arg(
            Arg::new("rounds")
                .long("rounds")
                .value_name("N")
                .value_parser(value_parser!(u32)),
        )
        .handler(|id, matches| match matches.get_one::<u32>(id) {
            Some(0) => Err("at least one round is needed".to_string()),
            Some(rounds) => {
                ROUNDS.store(*rounds, Ordering::Relaxed);
                Ok(())
            }
            None => Ok(()),
        })
}

// ============================================================================
// Test Body
// ============================================================================

#[gfxtest::main(help = "  --rounds N  repeat the stress subtests N times", options = extra_options, timeout = "5m")]
fn main(run: &mut TestRun) -> TestResult {
    let mut device = run.fixture(|| {
        gfxtest::install_exit_handler(cleanup).or_fail("exit handler")?;
        Device::open().or_skip("no device")
    });

    run.subtest("basic-create", |_| {
        let Some(device) = device.as_mut() else {
            gt_skip!("no device");
        };
        let handle = device.create(4096);
        gt_assert_neq!(handle, 0);
        Ok(())
    });

    run.subtest("basic-write", |_| {
        let Some(device) = device.as_mut() else {
            gt_skip!("no device");
        };
        let handle = device.create(16);
        device.write(handle, 0, 0xff).or_fail("write")?;
        gt_assert!(device.write(handle, 16, 0).is_err(), "write past the end succeeded");
        Ok(())
    });

    run.subtest_group(|run| {
        run.fixture(|| {
            gt_require!(
                std::path::Path::new("/dev/dri").exists(),
                "needs a DRM device"
            );
            Ok(())
        });

        run.subtest("hw-readback", |_| Ok(()));
    });

    run.subtest("stress-children", |subtest| {
        let rounds = ROUNDS.load(Ordering::Relaxed);
        subtest.fork(4, |index| {
            let mut stats = Stats::with_capacity(rounds as usize);
            for round in 0..rounds {
                stats
                    .push(u64::from(round) * (index as u64 + 1))
                    .or_fail("stats")?;
            }
            gt_assert_cmp!(stats.max(), >=, stats.min());
            Ok(())
        })?;
        subtest.wait_children()
    });

    run.subtest("stress-interrupted", |_| {
        let helper = gfxtest::SignalHelper::start().or_fail("signal helper")?;
        let mut stats = Stats::with_capacity(64);
        for i in 0..64u64 {
            std::thread::sleep(std::time::Duration::from_micros(100));
            stats.push(i).or_fail("stats")?;
        }
        let interruptions = helper.stop().or_fail("signal helper")?;
        info!("interrupted {interruptions} times, median {}", stats.median());
        Ok(())
    });

    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_stamps_valid_timestamps() {
    let clock = SystemClock;
    assert!(clock.timestamp().is_valid());
}

#[test]
fn fake_clock_advances_both_times() {
    let clock = FakeClock::new();
    let t1 = clock.now();
    let w1 = clock.timestamp();
    clock.advance(Duration::from_secs(60));
    assert!(clock.now().duration_since(t1) >= Duration::from_secs(60));
    assert_eq!(clock.timestamp().sec - w1.sec, 60);
}

#[test]
fn fake_clock_is_cloneable_and_shared() {
    let clock1 = FakeClock::new();
    let clock2 = clock1.clone();
    let t1 = clock1.now();
    clock2.advance(Duration::from_secs(30));
    assert!(clock1.now().duration_since(t1) >= Duration::from_secs(30));
}

#[test]
fn fake_wall_clock_can_be_pinned() {
    let clock = FakeClock::new();
    let pinned = DateTime::from_timestamp(1_700_000_000, 5).unwrap();
    clock.set_wall(pinned);
    let ts = clock.timestamp();
    assert_eq!((ts.sec, ts.nsec), (1_700_000_000, 5));
}

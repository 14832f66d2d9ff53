use std::time::Duration;

use buildpool::inventory::{calc_tier, heartbeat_expired};

#[test]
fn test_light_load_keeps_power_index() {
    assert_eq!(calc_tier(0.1, 0.1, 0.1, 5), 5);
    assert_eq!(calc_tier(0.89, 2.0, 2.0, 3), 3);
}

#[test]
fn test_short_burst_excused_by_medium_term_calm() {
    // High ld1 alone is forgiven when ld5 is calm.
    assert_eq!(calc_tier(2.5, 0.3, 1.0, 4), 4);
}

#[test]
fn test_sustained_medium_load_demotes_one_tier() {
    assert_eq!(calc_tier(1.0, 0.8, 0.5, 4), 3);
}

#[test]
fn test_sustained_heavy_load_disqualifies() {
    assert_eq!(calc_tier(1.5, 1.5, 1.5, 4), 0);
}

#[test]
fn test_thresholds_are_strict_less_than() {
    // Equality at each threshold falls through to the next clause.
    assert_eq!(calc_tier(0.9, 0.69, 2.0, 4), 4);
    assert_eq!(calc_tier(0.9, 0.7, 0.79, 4), 3);
    assert_eq!(calc_tier(0.9, 0.7, 0.8, 4), 0);
}

#[test]
fn test_demotion_never_goes_below_sentinel() {
    // A power-index-1 host demoted one tier lands on the sentinel, not -0/negative.
    assert_eq!(calc_tier(1.0, 0.8, 0.5, 1), 0);
    assert_eq!(calc_tier(1.0, 0.8, 0.5, 0), 0);
}

#[test]
fn test_silence_window_boundary() {
    assert!(!heartbeat_expired(Duration::from_secs(59)));
    assert!(!heartbeat_expired(Duration::from_secs(60)));
    assert!(heartbeat_expired(Duration::from_secs(61)));
}

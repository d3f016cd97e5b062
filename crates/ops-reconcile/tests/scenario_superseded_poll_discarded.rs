//! Scenario: Superseded Poll Responses Are Discarded
//!
//! # Invariants under test
//!
//! 1. The response to the latest issued request is accepted.
//! 2. A response to an older request is superseded, even if it arrives first.
//! 3. A late response to an older request after the latest was accepted is
//!    still superseded.
//! 4. A sequence is accepted at most once.

use ops_reconcile::{PollFreshness, PollSequencer};

#[test]
fn latest_issued_is_accepted() {
    let mut s = PollSequencer::new();
    let seq = s.issue();
    assert_eq!(s.accept(seq), PollFreshness::Latest);
    assert_eq!(s.last_accepted(), Some(seq));
}

#[test]
fn older_response_arriving_first_is_superseded() {
    let mut s = PollSequencer::new();
    let scheduled = s.issue();
    let forced = s.issue();

    assert_eq!(
        s.accept(scheduled),
        PollFreshness::Superseded {
            latest: forced,
            got: scheduled
        }
    );
    assert_eq!(s.last_accepted(), None);
    assert!(s.accept(forced).is_latest());
}

#[test]
fn late_older_response_after_latest_is_superseded() {
    let mut s = PollSequencer::new();
    let a = s.issue();
    let b = s.issue();
    assert!(s.accept(b).is_latest());
    assert!(!s.accept(a).is_latest());
    assert_eq!(s.last_accepted(), Some(b));
}

#[test]
fn duplicate_acceptance_is_refused() {
    let mut s = PollSequencer::new();
    let a = s.issue();
    assert!(s.accept(a).is_latest());
    assert_eq!(s.accept(a), PollFreshness::Duplicate { got: a });
}

use super::*;

#[test]
fn test_fresh_indices_accepted_once() {
    let mut w = ReplayWindow::new();
    assert!(w.check_and_update(100));
    assert!(!w.check_and_update(100));
    assert!(w.check_and_update(101));
    assert!(!w.check_and_update(101));
}

#[test]
fn test_out_of_order_within_window() {
    let mut w = ReplayWindow::new();
    assert!(w.check_and_update(1000));
    assert!(w.check_and_update(998));
    assert!(w.check_and_update(999));
    assert!(!w.check_and_update(998));
}

#[test]
fn test_too_old_rejected() {
    let mut w = ReplayWindow::new();
    assert!(w.check_and_update(REPLAY_WINDOW_SIZE + 5));
    // Exactly the window edge is still in range.
    assert!(w.check_and_update(5 + 1));
    // One past the window is gone.
    assert!(!w.check_and_update(5));
}

#[test]
fn test_large_jump_clears_history() {
    let mut w = ReplayWindow::new();
    for i in 0..10 {
        assert!(w.check_and_update(i));
    }
    assert!(w.check_and_update(1_000_000));
    // Everything before the jump is out of the window now.
    assert!(!w.check_and_update(9));
    // But indices just behind the new head are acceptable.
    assert!(w.check_and_update(1_000_000 - 1));
}

#[test]
fn test_word_boundary_shifts() {
    let mut w = ReplayWindow::new();
    assert!(w.check_and_update(0));
    for step in [63u64, 64, 65, 127, 128, 129, 640] {
        assert!(w.check_and_update(step), "step {step}");
        assert!(!w.check_and_update(step), "step {step} replay");
    }
    // All previously seen indices are still marked.
    for step in [63u64, 64, 65, 127, 128, 129] {
        assert!(!w.check_and_update(step), "step {step} late replay");
    }
}

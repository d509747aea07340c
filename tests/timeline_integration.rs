//! Engine-level time model: anchors, cycle quantization, and the FTC
//! utility objects, wired the way a host would use them.

mod helpers;

use helpers::*;
use reeltime::FrameTimeCode;

#[test]
fn test_cycles_quantization_against_anchor() {
    let host = test_host("cycles");
    let anchor = host.engine.anchor("grid");
    anchor.mark();
    host.clock.set(23_000);

    let mut cycles = host.engine.cycles("grid");
    cycles.set_loop_length(ftc(12_000));

    // A bang asks for the next boundary.
    assert_eq!(cycles.next_start().unwrap(), ftc(24_000));
    // Whole-cycle displacement, including backwards.
    assert_eq!(cycles.start_after(-1).unwrap(), ftc(12_000));

    cycles.set_loop_length(ftc(48_000));
    assert_eq!(cycles.count(ftc(96_000)).unwrap(), 2.0);

    cleanup_temp_dir("cycles");
}

#[test]
fn test_anchor_shared_between_objects() {
    let host = test_host("shared_anchor");
    let anchor = host.engine.anchor("song");
    anchor.mark();
    host.clock.advance(4_800);

    // Both a direct reference and a by-name lookup see the same origin.
    assert_eq!(anchor.elapsed_frames(), 4_800);
    let found = host.engine.anchors().find("song").unwrap();
    assert_eq!(found.elapsed_frames(), 4_800);

    host.engine.destroy_anchor("song");
    assert!(host.engine.anchors().find("song").is_none());
    // Held references keep counting after the name is unbound.
    host.clock.advance(100);
    assert_eq!(anchor.elapsed_frames(), 4_900);

    cleanup_temp_dir("shared_anchor");
}

#[test]
fn test_ftc_objects_compose() {
    let host = test_host("ftc_objects");

    let mut add = host.engine.ftc_add(ftc(500));
    let mut mult = host.engine.ftc_mult(0.5);
    let mut compare = host.engine.ftc_compare(ftc(1_000));

    let sum = add.apply(ftc(1_500));
    assert_eq!(sum, ftc(2_000));
    let scaled = mult.apply(sum);
    assert_eq!(scaled, ftc(1_000));
    assert_eq!(compare.apply(scaled), 0.0);
    assert_eq!(compare.apply(ftc(999)), -1.0);

    // Wire-format round trip across an epoch boundary.
    let big = ftc(3 * reeltime::EPOCH_BASE + 77);
    let wire = big.to_list();
    assert_eq!(FrameTimeCode::parse(&wire).unwrap(), big);

    cleanup_temp_dir("ftc_objects");
}

//! Fuzz target: sensor frame accumulator.
//!
//! Feeds arbitrary bytes in arbitrary chunk sizes (first byte picks the
//! split) and checks the buffer bound and counter consistency.

#![no_main]

use libfuzzer_sys::fuzz_target;
use watertank::sensors::frame::{FrameAccumulator, parse};

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(split % 32) + 1;
    let max_len = usize::from(split % 57) + 8;

    let mut acc = FrameAccumulator::new(max_len);
    let mut frames = 0u32;
    for piece in rest.chunks(chunk) {
        acc.feed(piece, |f| {
            assert!(f.distance_mm.is_finite());
            frames += 1;
        });
        assert!(acc.pending() <= max_len);
    }
    assert_eq!(acc.stats().records, frames);

    // The parser alone must never panic either.
    let _ = parse(rest);
});

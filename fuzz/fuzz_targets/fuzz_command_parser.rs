//! Fuzz target: remote command parser and line assembler.

#![no_main]

use libfuzzer_sys::fuzz_target;
use watertank::app::commands::Command;
use watertank::app::queue::{CommandQueue, LineAssembler};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = core::str::from_utf8(data) {
        let _ = Command::parse(text);
    }

    let queue = CommandQueue::new();
    let mut lines = LineAssembler::new();
    lines.feed(data, &queue);
    while queue.try_next().is_some() {}
});

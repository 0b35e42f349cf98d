//! Fuzz target: `SequenceMachine`
//!
//! Feeds arbitrary edge / timer-expiry streams into a machine built from
//! arbitrary step bounds and verifies:
//! - No panics
//! - Overflow is only reported when an overflow action exists
//! - Reported steps are always in range
//!
//! cargo fuzz run fuzz_sequence

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartsensors::sequence::machine::Notify;
use smartsensors::sequence::{Edge, Level, Persistence, SequenceMachine};

fuzz_target!(|data: &[u8]| {
    let [header, bounds @ ..] = data else {
        return;
    };
    let steps = usize::from(header & 0x0f);
    let has_overflow = header & 0x10 != 0;
    let start = if header & 0x20 != 0 { Level::High } else { Level::Low };
    if bounds.len() < steps * 2 {
        return;
    }
    let (bounds, events) = bounds.split_at(steps * 2);
    let persistence: Vec<Persistence> = bounds
        .chunks_exact(2)
        .map(|b| Persistence::new(u32::from(b[0]), u32::from(b[1])))
        .collect();

    let Ok(mut m) = SequenceMachine::new(start, &persistence, has_overflow) else {
        return;
    };

    for &e in events {
        let token = m.token().wrapping_sub(u32::from(e >> 2) % 3);
        let r = match e & 3 {
            0 => m.on_edge(Edge::Rise),
            1 => m.on_edge(Edge::Fall),
            2 => m.on_min_elapsed(token),
            _ => m.on_max_elapsed(token),
        };
        match r.notify {
            Some(Notify::Overflow) => assert!(has_overflow),
            Some(Notify::Step(k)) => assert!(k < m.len()),
            None => {}
        }
    }
});

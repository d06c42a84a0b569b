#![no_main]

use gate_core::config::ByteOrder;
use gate_core::envelope::unpack;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Unpacking arbitrary bytes must never panic, only return Err.
    let _ = unpack(data, ByteOrder::BigEndian);
    let _ = unpack(data, ByteOrder::LittleEndian);
});

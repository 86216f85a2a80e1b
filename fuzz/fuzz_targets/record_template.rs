#![no_main]

use evfwd_output::render::RecordTemplate;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = RecordTemplate::parse(text);
    }
});

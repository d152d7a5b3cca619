#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = pulsewire::Message::decode(data) {
        let _ = message.payload_str();
        let _ = message.encode();
    }
});

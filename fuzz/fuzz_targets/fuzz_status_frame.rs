#![no_main]
use libfuzzer_sys::fuzz_target;
use servo_core::protocol::{encode_frame, split_frames};

fuzz_target!(|data: &[u8]| {
    for frame in split_frames(data) {
        if let Ok(report) = servo_core::decode_frame(frame) {
            // anything that decodes must re-encode to the same bytes
            let bytes = encode_frame(&report);
            assert_eq!(servo_core::decode_frame(&bytes).ok(), Some(report));
        }
    }
});

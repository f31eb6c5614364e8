// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for fixed-frame decoding

#![no_main]

use libfuzzer_sys::fuzz_target;
use seqlog_core::{Frame, Framing, LengthPrefixed, Mirrored};

fuzz_target!(|data: &[u8]| {
    let layouts: [Box<dyn Framing>; 2] = match (LengthPrefixed::new(64), Mirrored::new(64)) {
        (Ok(a), Ok(b)) => [Box::new(a), Box::new(b)],
        _ => return,
    };

    for framing in &layouts {
        // Arbitrary bytes must decode or fail cleanly, never panic
        let Ok(Frame::Data(payload)) = framing.decode_frame(data) else {
            continue;
        };

        // Anything that decodes re-encodes to an equivalent frame
        let frame = framing
            .encode_frame(payload)
            .expect("decoded payload fits its own frame");
        assert_eq!(framing.decode_frame(&frame), Ok(Frame::Data(payload)));
    }
});

// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for stored entry decoding

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use tidemark_store::{Codec, ManualClock};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Decoding arbitrary text must fail cleanly, never panic.
    let codec = Codec::new("1.0.0", false, Arc::new(ManualClock::new(0)));
    let Ok(envelope) = codec.decode_envelope(text) else {
        return;
    };

    // Anything that decodes re-renders in both modes and decodes to the same value.
    let ascii = Codec::new("1.0.0", true, Arc::new(ManualClock::new(0)));
    for codec in [&codec, &ascii] {
        let rendered = codec.render(&envelope).expect("decoded envelopes render");
        let again = codec.decode_envelope(&rendered).expect("rendered envelopes decode");
        assert_eq!(again, envelope);
    }
});

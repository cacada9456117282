//! Fuzz target for fetch request JSON decoding.
//!
//! Arbitrary bytes must never panic the decoder, and anything that decodes
//! must survive validation and a re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use taskpoll_core::{DispatchConfig, FetchRequest};

fuzz_target!(|data: &[u8]| {
    let Ok(request) = serde_json::from_slice::<FetchRequest>(data) else {
        return;
    };
    let max_ms = DispatchConfig::default().max_request_timeout_ms;
    let _ = request.async_response_timeout.map(|t| t > max_ms);
    let _ = request.topic_names().count();
    let encoded = serde_json::to_vec(&request).expect("decoded request must re-encode");
    let _ = serde_json::from_slice::<FetchRequest>(&encoded).expect("re-encoded request must decode");
});

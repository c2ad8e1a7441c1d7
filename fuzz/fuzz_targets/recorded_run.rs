#![no_main]

use libfuzzer_sys::fuzz_target;
use sidefx::oracle::{dump_records, extract_diff_apis};
use sidefx::recorder::RecordedRun;

fuzz_target!(|data: &[u8]| {
    // Payloads come back from an untrusted page; decoding must never panic
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    if let Ok(run) = RecordedRun::from_value(value) {
        let dump = dump_records(&run.records);
        let _ = extract_diff_apis(&dump);
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = extract_diff_apis(text);
    }
});

#![no_main]

use fsdex::index::page::{Page, TreeHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Corrupt tree files must surface as errors, never panics
    let _ = TreeHeader::parse(data);
    let _ = Page::parse(0, data);
    let _ = fsdex::utils::encoding::decode_str(data);
});

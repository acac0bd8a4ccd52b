#![no_main]

use arbitrary::Arbitrary;
use fsdex::index::types::MAX_TERM_CHARS;
use fsdex::utils::encoding::{decode_str, encode_str, encoded_len};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    text: String,
    file_name: String,
}

fuzz_target!(|input: Input| {
    let _ = fsdex::utils::name_stem(&input.file_name);

    for term in fsdex::utils::analyze(&input.text) {
        assert!(!term.is_empty());
        if term.encode_utf16().count() > MAX_TERM_CHARS {
            continue;
        }
        let mut buf = Vec::new();
        encode_str(&term, &mut buf);
        assert_eq!(buf.len(), encoded_len(&term));
        assert_eq!(decode_str(&buf).unwrap(), term);
    }
});

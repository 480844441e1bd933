#![no_main]

use libfuzzer_sys::fuzz_target;
use loadscope::classify::SymbolMetaParser;
use std::sync::LazyLock;

static PARSER: LazyLock<SymbolMetaParser> =
    LazyLock::new(|| SymbolMetaParser::new().expect("embedded pattern compiles"));

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Some(meta) = PARSER.parse(input) {
            // a parsed symbol always yields a file under its package
            assert!(meta.file().starts_with(&meta.package));
        }
    }
});

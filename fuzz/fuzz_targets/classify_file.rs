#![no_main]

use libfuzzer_sys::fuzz_target;
use loadscope::classify::ClassificationRules;
use loadscope::config::AnalyzerConfig;
use std::sync::LazyLock;

static RULES: LazyLock<Option<ClassificationRules>> = LazyLock::new(|| {
    let kinds = AnalyzerConfig::default_kinds().ok()?;
    ClassificationRules::from_kinds(&kinds).ok()
});

fuzz_target!(|data: &[u8]| {
    let Some(rules) = RULES.as_ref() else {
        return;
    };
    if let Ok(path) = std::str::from_utf8(data) {
        let c = rules.classify_file(path);
        assert!(!c.category_name.is_empty());
    }
});

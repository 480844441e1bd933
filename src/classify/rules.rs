use crate::category::{
    basename, Classification, ComponentCategory, FileClassification, OriginKind,
};
use crate::classify::config::{is_regex_pattern, ComponentKindConfig};
use crate::classify::symbol::SymbolMetaParser;
use anyhow::{Context, Result};
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;

/// Where a configured selector points
#[derive(Debug, Clone)]
struct RuleTarget {
    component: String,
    category: ComponentCategory,
    subcategory: Option<String>,
    origin: OriginKind,
}

impl RuleTarget {
    fn file_classification(&self, file: &str) -> FileClassification {
        FileClassification {
            file: file.to_string(),
            category: self.category,
            category_name: self.component.clone(),
            subcategory_name: self.subcategory.clone(),
            origin_kind: self.origin,
        }
    }
}

/// Compiled file and thread classification tables
///
/// Built once from the kind configuration and read-only afterwards.
///
/// # Example Usage
/// ```
/// use loadscope::category::ComponentCategory;
/// use loadscope::classify::ClassificationRules;
///
/// let rules = ClassificationRules::from_kinds(&[])?;
/// let c = rules.classify_file("/proc/123/root/data/storage/el1/bundle/libs/arm64/libapp.so");
/// assert_eq!(c.category, ComponentCategory::AppSo);
/// assert!(c.file.starts_with("/proc/{pid}/"));
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct ClassificationRules {
    /// Exact path → target (first configured wins)
    exact: HashMap<String, RuleTarget>,

    /// File regexes in configuration order
    patterns: Vec<(Regex, RuleTarget)>,

    /// Thread name regexes in configuration order
    threads: Vec<(Regex, RuleTarget)>,

    proc_pid: Regex,
    app_bundle: Regex,
    symbol_meta: SymbolMetaParser,
}

impl ClassificationRules {
    /// Compile the rule tables
    ///
    /// # Errors
    /// Returns error if any file or thread pattern is not a valid regex.
    pub fn from_kinds(kinds: &[ComponentKindConfig]) -> Result<Self> {
        let mut exact = HashMap::new();
        let mut patterns = Vec::new();
        let mut threads = Vec::new();

        for kind in kinds {
            for sub in &kind.components {
                let target = RuleTarget {
                    component: kind.name.clone(),
                    category: kind.kind,
                    subcategory: sub.name.clone(),
                    origin: sub.origin,
                };

                for thread in &sub.threads {
                    let regex = Regex::new(thread).with_context(|| {
                        format!("Invalid thread pattern '{}' in kind '{}'", thread, kind.name)
                    })?;
                    threads.push((regex, target.clone()));
                }

                for file in &sub.files {
                    if is_regex_pattern(file) {
                        let regex = Regex::new(file).with_context(|| {
                            format!("Invalid file pattern '{}' in kind '{}'", file, kind.name)
                        })?;
                        patterns.push((regex, target.clone()));
                    } else {
                        exact.entry(file.clone()).or_insert_with(|| target.clone());
                    }
                }

                for pattern in &sub.patterns {
                    let regex = Regex::new(pattern).with_context(|| {
                        format!("Invalid file pattern '{}' in kind '{}'", pattern, kind.name)
                    })?;
                    patterns.push((regex, target.clone()));
                }
            }
        }

        Ok(Self {
            exact,
            patterns,
            threads,
            proc_pid: Regex::new(r"/proc/(\d+)/")?,
            app_bundle: Regex::new(r"^/proc/[^/]+/(?:.*/)?data/storage/(?:.*/)?bundle/")?,
            symbol_meta: SymbolMetaParser::new()?,
        })
    }

    /// Parser for package metadata embedded in bytecode symbol names
    pub fn symbol_meta(&self) -> &SymbolMetaParser {
        &self.symbol_meta
    }

    /// Replace the pid in `/proc/<pid>/` with `{pid}` so builds compare equal
    pub fn normalize_path<'a>(&self, path: &'a str) -> Cow<'a, str> {
        self.proc_pid.replace(path, "/proc/{pid}/")
    }

    /// Classify a file path; never fails, the last resort is `SYS_SDK`
    pub fn classify_file(&self, path: &str) -> FileClassification {
        let file = self.normalize_path(path);
        let file = file.as_ref();

        if let Some(target) = self.exact.get(file) {
            return target.file_classification(file);
        }

        if let Some((_, target)) = self.patterns.iter().find(|(re, _)| re.is_match(file)) {
            return target.file_classification(file);
        }

        let name = basename(file);
        if self.app_bundle.is_match(file) {
            let category = if name.ends_with(".so") || file.contains("/bundle/libs/") {
                ComponentCategory::AppSo
            } else {
                ComponentCategory::AppAbc
            };
            return FileClassification {
                file: file.to_string(),
                category,
                category_name: category.name().to_string(),
                subcategory_name: Some(name.to_string()),
                origin_kind: OriginKind::FirstParty,
            };
        }

        if let Some(target) = self.exact.get(name) {
            return target.file_classification(file);
        }

        FileClassification {
            file: file.to_string(),
            category: ComponentCategory::SysSdk,
            category_name: ComponentCategory::SysSdk.name().to_string(),
            subcategory_name: Some(name.to_string()),
            origin_kind: OriginKind::Unknown,
        }
    }

    /// First thread rule matching `name`
    ///
    /// `None` means "no thread-level override", not UNKNOWN.
    pub fn classify_thread(&self, name: Option<&str>) -> Option<Classification> {
        let name = name?;
        self.threads
            .iter()
            .find(|(re, _)| re.is_match(name))
            .map(|(_, target)| Classification {
                category: target.category,
                category_name: target.component.clone(),
                subcategory_name: target.subcategory.clone(),
            })
    }

    pub fn rule_count(&self) -> usize {
        self.exact.len() + self.patterns.len() + self.threads.len()
    }
}

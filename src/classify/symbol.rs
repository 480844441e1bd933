use crate::category::{ComponentCategory, FileClassification};
use crate::classify::registry::ComponentRegistry;
use fnv::FnvHashMap;
use regex::Regex;

// function-name [url:entry|package|version|path:line:column]
const EMBEDDED_META: &str = r"^(?P<function>.*?)\s*:?\s*\[url:(?P<entry>[^|\]]*)\|(?P<package>[^|\]]*)\|(?P<version>[^|\]]*)\|(?P<path>[^\]]*?):(?P<line>\d+):(?P<column>\d+)\]\s*$";

/// Package metadata embedded in a bytecode symbol name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedSymbolMeta {
    pub function: String,
    pub entry: String,
    pub package: String,
    pub version: String,
    pub path: String,
    pub line: u32,
    pub column: u32,
}

impl EmbeddedSymbolMeta {
    /// `package/version/path`, the file a reclassified symbol is reported under
    pub fn file(&self) -> String {
        format!("{}/{}/{}", self.package, self.version, self.path)
    }
}

/// Compiled matcher for embedded symbol metadata
#[derive(Debug, Clone)]
pub struct SymbolMetaParser {
    pattern: Regex,
}

impl SymbolMetaParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(EMBEDDED_META)?,
        })
    }

    /// Parse `function [url:entry|package|version|path:line:column]`
    pub fn parse(&self, raw: &str) -> Option<EmbeddedSymbolMeta> {
        let caps = self.pattern.captures(raw)?;
        Some(EmbeddedSymbolMeta {
            function: caps["function"].to_string(),
            entry: caps["entry"].to_string(),
            package: caps["package"].to_string(),
            version: caps["version"].to_string(),
            path: caps["path"].to_string(),
            line: caps["line"].parse().ok()?,
            column: caps["column"].parse().ok()?,
        })
    }
}

/// Symbol id → display text for one database load
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: FnvHashMap<i64, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: i64, text: String) {
        self.names.insert(id, text);
    }

    pub fn get(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(|s| s.as_str())
    }

    /// Display text, empty for unknown ids
    pub fn name(&self, id: i64) -> &str {
        self.get(id).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }
}

/// Reclassifies bytecode frames from the package metadata in their symbol names
#[derive(Debug, Default)]
pub struct SymbolReclassifier {
    /// `None` records symbols without embedded metadata
    cache: FnvHashMap<i64, Option<FileClassification>>,
}

impl SymbolReclassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classification for a frame whose file classified as `fallback`
    ///
    /// Only `APP_ABC` frames are reclassified. On a match the stored symbol
    /// text is rewritten to the bare function name.
    pub fn classify_symbol(
        &mut self,
        symbol_id: i64,
        fallback: &FileClassification,
        symbols: &mut SymbolTable,
        parser: &SymbolMetaParser,
        registry: &ComponentRegistry,
    ) -> FileClassification {
        if fallback.category != ComponentCategory::AppAbc {
            return fallback.clone();
        }

        if let Some(cached) = self.cache.get(&symbol_id) {
            return cached.clone().unwrap_or_else(|| fallback.clone());
        }

        let meta = symbols.get(symbol_id).and_then(|text| parser.parse(text));
        let Some(meta) = meta else {
            self.cache.insert(symbol_id, None);
            return fallback.clone();
        };

        let registered = registry.get(&meta.package);
        let classification = FileClassification {
            file: meta.file(),
            category: registered.map_or(fallback.category, |c| c.category),
            category_name: registered.map_or_else(|| fallback.category_name.clone(), |c| c.name.clone()),
            subcategory_name: Some(meta.package.clone()),
            origin_kind: registered.map_or(fallback.origin_kind, |c| c.origin_kind),
        };

        symbols.insert(symbol_id, meta.function);
        self.cache.insert(symbol_id, Some(classification.clone()));
        classification
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

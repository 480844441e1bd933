//! Component categories and classification records
//!
//! Two closed classification axes: what kind of software a frame belongs to
//! (`ComponentCategory`) and whose code it is (`OriginKind`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder used for unknown threads, processes and files
pub const UNKNOWN_STR: &str = "UNKNOWN";

/// Kind of software component a file or thread belongs to
///
/// Serialized as its numeric id so configuration files can use `kind = 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum ComponentCategory {
    /// Application bytecode (.abc containers)
    AppAbc = 0,
    /// Application native libraries
    AppSo = 1,
    /// Reused packages bundled with the application
    AppLib = 2,
    OsRuntime = 3,
    SysSdk = 4,
    /// React Native
    Rn = 5,
    Flutter = 6,
    Web = 7,
    Unknown = -1,
}

impl ComponentCategory {
    /// All categories in report label order (UNKNOWN last)
    pub const ALL: [ComponentCategory; 9] = [
        ComponentCategory::AppAbc,
        ComponentCategory::AppSo,
        ComponentCategory::AppLib,
        ComponentCategory::OsRuntime,
        ComponentCategory::SysSdk,
        ComponentCategory::Rn,
        ComponentCategory::Flutter,
        ComponentCategory::Web,
        ComponentCategory::Unknown,
    ];

    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }

    /// Label used in reports (e.g. "APP_ABC", "OS_Runtime")
    pub fn name(self) -> &'static str {
        match self {
            ComponentCategory::AppAbc => "APP_ABC",
            ComponentCategory::AppSo => "APP_SO",
            ComponentCategory::AppLib => "APP_LIB",
            ComponentCategory::OsRuntime => "OS_Runtime",
            ComponentCategory::SysSdk => "SYS_SDK",
            ComponentCategory::Rn => "RN",
            ComponentCategory::Flutter => "Flutter",
            ComponentCategory::Web => "WEB",
            ComponentCategory::Unknown => UNKNOWN_STR,
        }
    }
}

impl TryFrom<i32> for ComponentCategory {
    type Error = String;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("unknown component category id {}", id))
    }
}

impl From<ComponentCategory> for i32 {
    fn from(category: ComponentCategory) -> Self {
        category.id()
    }
}

impl fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whose code a component is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OriginKind {
    #[default]
    Unknown,
    FirstParty,
    OpenSource,
    ThirdParty,
}

impl OriginKind {
    pub fn id(self) -> i32 {
        match self {
            OriginKind::Unknown => 0,
            OriginKind::FirstParty => 1,
            OriginKind::OpenSource => 2,
            OriginKind::ThirdParty => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OriginKind::Unknown => UNKNOWN_STR,
            OriginKind::FirstParty => "FIRST_PARTY",
            OriginKind::OpenSource => "OPEN_SOURCE",
            OriginKind::ThirdParty => "THIRD_PARTY",
        }
    }
}

/// Category label as exported with every report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLabel {
    pub name: String,
    pub id: i32,
}

/// Category labels in the fixed enum order
pub fn category_labels() -> Vec<CategoryLabel> {
    ComponentCategory::ALL
        .iter()
        .map(|c| CategoryLabel {
            name: c.name().to_string(),
            id: c.id(),
        })
        .collect()
}

/// Thread-level classification (no file attached)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ComponentCategory,
    /// Name of the configured component that matched
    pub category_name: String,
    pub subcategory_name: Option<String>,
}

/// Classification of one file (or of a reclassified bytecode symbol)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileClassification {
    /// Normalized file path (pid replaced by `{pid}`)
    pub file: String,
    pub category: ComponentCategory,
    pub category_name: String,
    pub subcategory_name: Option<String>,
    pub origin_kind: OriginKind,
}

impl FileClassification {
    /// Classification reserved for file id -1 and for unresolvable frames
    pub fn unknown() -> Self {
        Self {
            file: UNKNOWN_STR.to_string(),
            category: ComponentCategory::Unknown,
            category_name: UNKNOWN_STR.to_string(),
            subcategory_name: None,
            origin_kind: OriginKind::Unknown,
        }
    }
}

/// Last path segment (the whole string if there is no `/`)
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

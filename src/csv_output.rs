//! CSV output for spreadsheet analysis
//!
//! Symbol detail rows (one line per attributed symbol) and the optional
//! callchain debug dump.

use crate::analyzer::CallchainDumpRow;
use crate::report::SymbolDetail;

pub const SYMBOL_DETAILS_FILE: &str = "perf_symbol_details.csv";
pub const CALLCHAIN_FILE: &str = "callchain.csv";

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// CSV formatter for symbol detail rows
#[derive(Debug, Default)]
pub struct CsvOutput {
    version: String,
    scene: String,
    details: Vec<SymbolDetail>,
}

impl CsvOutput {
    pub fn new(version: &str, scene: &str) -> Self {
        Self {
            version: version.to_string(),
            scene: scene.to_string(),
            details: Vec::new(),
        }
    }

    pub fn add_detail(&mut self, detail: SymbolDetail) {
        self.details.push(detail);
    }

    pub fn extend<I: IntoIterator<Item = SymbolDetail>>(&mut self, details: I) {
        self.details.extend(details);
    }

    fn header() -> &'static str {
        "test_version,test_scene_name,step_id,event_type,process_id,process_name,process_events,\
         thread_id,thread_name,thread_events,file,file_events,symbol,symbol_events,\
         symbol_total_events,component_name,component_category,origin_kind"
    }

    fn format_detail(&self, d: &SymbolDetail) -> String {
        [
            escape_field(&self.version),
            escape_field(&self.scene),
            d.step_id.to_string(),
            d.event_type.label().to_string(),
            d.pid.to_string(),
            escape_field(&d.process_name),
            d.process_events.to_string(),
            d.tid.to_string(),
            escape_field(&d.thread_name),
            d.thread_events.to_string(),
            escape_field(&d.file),
            d.file_events.to_string(),
            escape_field(&d.symbol),
            d.symbol_events.to_string(),
            d.symbol_total_events.to_string(),
            escape_field(&d.component_name),
            d.component_category.id().to_string(),
            d.origin_kind.id().to_string(),
        ]
        .join(",")
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str(Self::header());
        output.push('\n');

        for detail in &self.details {
            output.push_str(&self.format_detail(detail));
            output.push('\n');
        }
        output
    }
}

/// Callchain debug dump
pub fn callchains_to_csv(rows: &[CallchainDumpRow]) -> String {
    let mut output = String::from("callchain_id,depth,file,symbol,category,subcategory,origin,load\n");

    for row in rows {
        let fields = [
            row.callchain_id.to_string(),
            row.depth.to_string(),
            escape_field(&row.file),
            escape_field(&row.symbol),
            row.classification.category.name().to_string(),
            escape_field(row.classification.subcategory_name.as_deref().unwrap_or("")),
            row.classification.origin_kind.name().to_string(),
            row.load.label().to_string(),
        ];
        output.push_str(&fields.join(","));
        output.push('\n');
    }
    output
}

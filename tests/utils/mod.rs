// Integration test utilities
//
// Builds scenario folders with capture databases in the converter's schema.

#![allow(dead_code)]

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};

const CAPTURE_SCHEMA: &str = "
    CREATE TABLE perf_thread (thread_id INTEGER, process_id INTEGER, thread_name TEXT);
    CREATE TABLE perf_files (file_id INTEGER, serial_id INTEGER, symbol TEXT, path TEXT);
    CREATE TABLE data_dict (id INTEGER, data TEXT);
    CREATE TABLE perf_callchain (callchain_id INTEGER, depth INTEGER, ip INTEGER, vaddr_in_file INTEGER,
                                 file_id INTEGER, symbol_id INTEGER, name INTEGER);
    CREATE TABLE perf_report (id INTEGER, report_type TEXT, report_value TEXT);
    CREATE TABLE perf_sample (id INTEGER, callchain_id INTEGER, timestamp INTEGER, thread_id INTEGER,
                              event_count INTEGER, event_type_id INTEGER, timestamp_trace INTEGER,
                              cpu_id INTEGER, thread_state TEXT);
    CREATE TABLE process (ipid INTEGER, pid INTEGER, name TEXT);
    CREATE TABLE thread (itid INTEGER, ipid INTEGER, tid INTEGER, name TEXT);
    CREATE TABLE callstack (id INTEGER, ts INTEGER, dur INTEGER, callid INTEGER, name TEXT);
    INSERT INTO perf_report VALUES (1, 'config_name', 'hw-instructions');
    INSERT INTO perf_report VALUES (2, 'config_name', 'hw-cpu-cycles');
    INSERT INTO process VALUES (1, 66666, 'testdriver');
    INSERT INTO thread VALUES (1, 1, 66666, 'testdriver');
";

pub const INSTRUCTIONS: i64 = 1;
pub const CYCLES: i64 = 2;

pub const LIBSHOP: &str = "/proc/100/root/data/storage/el1/bundle/libs/arm64/libshop.so";
pub const MODULES_ABC: &str = "/proc/100/root/data/storage/el1/bundle/entry/ets/modules.abc";

/// Capture database writer
pub struct CaptureDb {
    conn: Connection,
    next_id: i64,
}

impl CaptureDb {
    pub fn create(path: &Path) -> Self {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(CAPTURE_SCHEMA).unwrap();
        Self { conn, next_id: 0 }
    }

    pub fn thread(&mut self, tid: i64, pid: i64, name: &str) -> &mut Self {
        self.conn
            .execute("INSERT INTO perf_thread VALUES (?1, ?2, ?3)", params![tid, pid, name])
            .unwrap();
        self
    }

    pub fn file(&mut self, file_id: i64, path: &str) -> &mut Self {
        self.conn
            .execute("INSERT INTO perf_files VALUES (?1, 0, 'sym', ?2)", params![file_id, path])
            .unwrap();
        self
    }

    pub fn symbol(&mut self, id: i64, text: &str) -> &mut Self {
        self.conn
            .execute("INSERT INTO data_dict VALUES (?1, ?2)", params![id, text])
            .unwrap();
        self
    }

    /// Frames leaf first as `(file_id, symbol_id)`
    pub fn callchain(&mut self, id: i64, frames: &[(i64, i64)]) -> &mut Self {
        let depth_max = frames.len() as i64 - 1;
        for (i, (file_id, symbol_id)) in frames.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT INTO perf_callchain VALUES (?1, ?2, 0, 0, ?3, 0, ?4)",
                    params![id, depth_max - i as i64, file_id, symbol_id],
                )
                .unwrap();
        }
        self
    }

    pub fn sample(&mut self, callchain_id: i64, tid: i64, count: i64, event: i64, ts: i64) -> &mut Self {
        self.next_id += 1;
        self.conn
            .execute(
                "INSERT INTO perf_sample VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?3, 0, 'Running')",
                params![self.next_id, callchain_id, ts, tid, count, event],
            )
            .unwrap();
        self
    }

    pub fn marker(&mut self, name: &str, ts: i64, dur: i64) -> &mut Self {
        self.next_id += 1;
        self.conn
            .execute(
                "INSERT INTO callstack VALUES (?1, ?2, ?3, 1, ?4)",
                params![self.next_id, ts, dur, name],
            )
            .unwrap();
        self
    }

    /// Shop app with one kernel → native → runtime → bytecode chain
    pub fn shop_app(&mut self) -> &mut Self {
        self.thread(100, 100, "com.example.shop")
            .thread(101, 100, "worker")
            .thread(300, 300, "render_service")
            .file(1, "[kernel.kallsyms]")
            .file(2, LIBSHOP)
            .file(3, "/system/lib64/platformsdk/libark_jsruntime.so")
            .file(4, MODULES_ABC)
            .symbol(10, "el0_svc")
            .symbol(11, "Decode")
            .symbol(12, "Execute")
            .symbol(13, "onClick: [url:entry|entry|1.0.0|src/main/ets/pages/Index.ts:12:5]")
            .callchain(1, &[(1, 10), (2, 11), (3, 12), (4, 13)])
            .callchain(2, &[(1, 10)])
    }
}

/// Step directory with a raw capture placeholder; returns the database path
pub fn step_dir(round_dir: &Path, step: u32) -> PathBuf {
    let dir = round_dir.join("hiperf").join(format!("step{}", step));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("perf.data"), b"raw capture").unwrap();
    dir.join("perf.db")
}

pub fn write_metadata(round_dir: &Path, steps: &[(u32, &str)]) {
    let steps: Vec<serde_json::Value> = steps
        .iter()
        .map(|(idx, description)| {
            serde_json::json!({"name": format!("step{}", idx), "stepIdx": idx, "description": description})
        })
        .collect();
    fs::create_dir_all(round_dir.join("hiperf")).unwrap();
    fs::write(
        round_dir.join("hiperf").join("steps.json"),
        serde_json::to_string(&steps).unwrap(),
    )
    .unwrap();
    fs::write(
        round_dir.join("testInfo.json"),
        r#"{"app_id": "com.example.shop", "app_name": "Shop", "app_version": "1.2.0",
            "scene": "ShopLaunch", "timestamp": 1700000000}"#,
    )
    .unwrap();
}

/// Harness result file `result/<scene>.xml` carrying the device metadata
pub fn write_result_xml(round_dir: &Path, scene_name: &str, rom_version: &str) {
    let dir = round_dir.join("result");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(format!("{}.xml", scene_name)),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites name="{}" devices="[{{'sn': 'SN0042', 'version': '{}'}}]">
    <testsuite name="{}" tests="1"/>
</testsuites>"#,
            scene_name, rom_version, scene_name
        ),
    )
    .unwrap();
}

/// Three rounds of a one-step scene; step 1 retires 100, 130 and 300 instructions
///
/// Only round 1 carries a step window and a deep callchain; rounds 0 and 2
/// charge everything to the kernel.
pub fn three_round_scene(parent: &Path) -> PathBuf {
    for (round, instructions) in [(0usize, 100i64), (1, 130), (2, 300)] {
        let round_dir = parent.join(format!("shop_launch_round{}", round));
        write_metadata(&round_dir, &[(1, "Launch")]);
        write_result_xml(&round_dir, "shop_launch", "5.0.0.100");

        let mut db = CaptureDb::create(&step_dir(&round_dir, 1));
        db.shop_app();
        if round == 1 {
            db.marker("H:START&1&Launch", 1_000, 100)
                .marker("H:END&1", 5_000, 0)
                .sample(1, 101, 60, INSTRUCTIONS, 2_000)
                .sample(1, 101, 70, INSTRUCTIONS, 3_000)
                .sample(1, 101, 500, CYCLES, 2_500);
        } else {
            db.sample(2, 101, instructions, INSTRUCTIONS, 2_000);
        }
    }
    parent.join("shop_launch")
}

// Integration test utilities and fixture management for covlens.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use covlens_core::engine::crc64;
use covlens_core::exec::{ExecDataWriter, ExecutionData, SessionInfo};
use covlens_core::pipeline::{AnalysisRun, CoveragePipeline};
use covlens_core::session::CoverageSession;
use tokio_util::sync::CancellationToken;

const ACC_PUBLIC: u16 = 0x0001;
const ACC_SUPER: u16 = 0x0020;

// ── Class-file assembler ─────────────────────────────────────────

#[derive(Debug, Clone)]
struct MethodSpec {
    access: u16,
    name: String,
    descriptor: String,
    code: Option<Vec<u8>>,
    lines: Vec<(u16, u16)>,
    handlers: Vec<(u16, u16, u16)>,
}

/// Assembles minimal valid JVM class files.
///
/// Only the structures coverage analysis reads are emitted: constant pool,
/// access flags, super class, methods with `Code`, exception tables and
/// `LineNumberTable`, and an optional `SourceFile`.
#[derive(Debug, Clone)]
pub struct ClassFileBuilder {
    name: String,
    super_name: String,
    access: u16,
    major_version: u16,
    source_file: Option<String>,
    methods: Vec<MethodSpec>,
}

impl ClassFileBuilder {
    /// A public class with the given internal name extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: "java/lang/Object".to_string(),
            access: ACC_PUBLIC | ACC_SUPER,
            major_version: 52,
            source_file: None,
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn super_name(mut self, super_name: &str) -> Self {
        self.super_name = super_name.to_string();
        self
    }

    #[must_use]
    pub fn major_version(mut self, major: u16) -> Self {
        self.major_version = major;
        self
    }

    #[must_use]
    pub fn source_file(mut self, file: &str) -> Self {
        self.source_file = Some(file.to_string());
        self
    }

    /// A public method with `code` and `(start_pc, line)` entries.
    #[must_use]
    pub fn method(self, name: &str, descriptor: &str, code: &[u8], lines: &[(u16, u16)]) -> Self {
        self.method_with_access(ACC_PUBLIC, name, descriptor, code, lines)
    }

    #[must_use]
    pub fn method_with_access(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        code: &[u8],
        lines: &[(u16, u16)],
    ) -> Self {
        self.methods.push(MethodSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: Some(code.to_vec()),
            lines: lines.to_vec(),
            handlers: Vec::new(),
        });
        self
    }

    /// Add an exception handler `(start, end, handler)` to the last method.
    #[must_use]
    pub fn handler(mut self, start: u16, end: u16, handler: u16) -> Self {
        if let Some(method) = self.methods.last_mut() {
            method.handlers.push((start, end, handler));
        }
        self
    }

    /// A method without a `Code` attribute.
    #[must_use]
    pub fn abstract_method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(MethodSpec {
            access: ACC_PUBLIC | 0x0400,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: None,
            lines: Vec::new(),
            handlers: Vec::new(),
        });
        self
    }

    /// `void simple()` followed by `int check(int x) { if (x > 0) return 1; return 0; }`.
    ///
    /// Probes: 0 = `simple` return, 1 = `check` return 1, 2 = `check` return 0.
    #[must_use]
    pub fn with_sample_methods(self) -> Self {
        self.method("simple", "()V", &[0xb1], &[(0, 10)]).method(
            "check",
            "(I)I",
            &[0x1b, 0x9e, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac],
            &[(0, 20), (4, 21), (6, 23)],
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = Pool::default();
        let this_class = pool.class(&self.name);
        let super_class = pool.class(&self.super_name);
        let code_attr = pool.utf8("Code");
        let lines_attr = pool.utf8("LineNumberTable");
        let source_attr = self
            .source_file
            .as_ref()
            .map(|file| (pool.utf8("SourceFile"), pool.utf8(file)));

        let mut methods = Vec::new();
        put_u16(&mut methods, len_u16(self.methods.len()));
        for method in &self.methods {
            put_u16(&mut methods, method.access);
            put_u16(&mut methods, pool.utf8(&method.name));
            put_u16(&mut methods, pool.utf8(&method.descriptor));
            let Some(code) = &method.code else {
                put_u16(&mut methods, 0);
                continue;
            };
            put_u16(&mut methods, 1);
            put_u16(&mut methods, code_attr);
            let body = code_body(method, code, lines_attr);
            put_u32(&mut methods, len_u32(body.len()));
            methods.extend_from_slice(&body);
        }

        let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0];
        put_u16(&mut out, self.major_version);
        put_u16(&mut out, pool.count());
        out.extend_from_slice(&pool.bytes);
        put_u16(&mut out, self.access);
        put_u16(&mut out, this_class);
        put_u16(&mut out, super_class);
        put_u16(&mut out, 0); // interfaces
        put_u16(&mut out, 0); // fields
        out.extend_from_slice(&methods);
        match source_attr {
            Some((attr, file)) => {
                put_u16(&mut out, 1);
                put_u16(&mut out, attr);
                put_u32(&mut out, 2);
                put_u16(&mut out, file);
            }
            None => put_u16(&mut out, 0),
        }
        out
    }
}

fn code_body(method: &MethodSpec, code: &[u8], lines_attr: u16) -> Vec<u8> {
    let mut body = Vec::new();
    put_u16(&mut body, 4); // max_stack
    put_u16(&mut body, 4); // max_locals
    put_u32(&mut body, len_u32(code.len()));
    body.extend_from_slice(code);
    put_u16(&mut body, len_u16(method.handlers.len()));
    for &(start, end, handler) in &method.handlers {
        put_u16(&mut body, start);
        put_u16(&mut body, end);
        put_u16(&mut body, handler);
        put_u16(&mut body, 0); // catch any
    }
    if method.lines.is_empty() {
        put_u16(&mut body, 0);
    } else {
        put_u16(&mut body, 1);
        put_u16(&mut body, lines_attr);
        put_u32(&mut body, len_u32(2 + method.lines.len() * 4));
        put_u16(&mut body, len_u16(method.lines.len()));
        for &(pc, line) in &method.lines {
            put_u16(&mut body, pc);
            put_u16(&mut body, line);
        }
    }
    body
}

#[derive(Debug, Default)]
struct Pool {
    bytes: Vec<u8>,
    next: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Pool {
    fn push(&mut self, entry: &[u8]) -> u16 {
        if self.next == 0 {
            self.next = 1;
        }
        self.bytes.extend_from_slice(entry);
        let index = self.next;
        self.next += 1;
        index
    }

    fn utf8(&mut self, s: &str) -> u16 {
        if let Some(&index) = self.utf8.get(s) {
            return index;
        }
        let mut entry = vec![1];
        put_u16(&mut entry, len_u16(s.len()));
        entry.extend_from_slice(s.as_bytes());
        let index = self.push(&entry);
        self.utf8.insert(s.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(&index) = self.classes.get(name) {
            return index;
        }
        let name_index = self.utf8(name);
        let mut entry = vec![7];
        put_u16(&mut entry, name_index);
        let index = self.push(&entry);
        self.classes.insert(name.to_string(), index);
        index
    }

    fn count(&self) -> u16 {
        self.next.max(1)
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn len_u16(len: usize) -> u16 {
    u16::try_from(len).expect("fixture length fits in u16")
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).expect("fixture length fits in u32")
}

// ── Temporary projects ───────────────────────────────────────────

/// A class written into a [`TestProject`].
#[derive(Debug, Clone)]
pub struct ClassFixture {
    pub path: PathBuf,
    pub id: i64,
    pub name: String,
}

/// A temporary project laid out like a Maven build (`target/classes`).
#[derive(Debug)]
pub struct TestProject {
    pub dir: tempfile::TempDir,
}

impl TestProject {
    pub const CLASSES_DIR: &'static str = "target/classes";
    pub const EXEC_FILE: &'static str = "target/jacoco.exec";

    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Assemble `class` into `target/classes/<internal name>.class`.
    pub fn add_class(&self, class: &ClassFileBuilder) -> ClassFixture {
        let bytes = class.build();
        let path = self
            .path()
            .join(Self::CLASSES_DIR)
            .join(format!("{}.class", class.name()));
        std::fs::create_dir_all(path.parent().expect("class path has a parent"))
            .expect("create class directory");
        std::fs::write(&path, &bytes).expect("write class file");
        ClassFixture {
            path,
            id: crc64::class_id(&bytes),
            name: class.name().to_string(),
        }
    }

    /// Write `target/jacoco.exec` with one session and the given probe arrays.
    pub fn write_exec(&self, entries: &[(&ClassFixture, Vec<bool>)]) -> PathBuf {
        let mut writer = ExecDataWriter::new(Vec::new()).expect("write header");
        writer
            .write_session_info(&SessionInfo {
                id: "test-session".to_string(),
                start: 1_714_564_800_000,
                dump: 1_714_564_860_000,
            })
            .expect("write session");
        for (class, probes) in entries {
            writer
                .write_execution_data(&ExecutionData::new(class.id, &class.name, probes.clone()))
                .expect("write execution data");
        }
        let path = self.path().join(Self::EXEC_FILE);
        std::fs::create_dir_all(path.parent().expect("exec path has a parent"))
            .expect("create exec directory");
        std::fs::write(&path, writer.into_inner()).expect("write exec file");
        path
    }

    /// Write `.covlens/config.toml`.
    pub fn write_config(&self, text: &str) {
        let dir = self.path().join(".covlens");
        std::fs::create_dir_all(&dir).expect("create config dir");
        std::fs::write(dir.join("config.toml"), text).expect("write config");
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Run Analyze → Aggregate for a project on the current thread.
pub fn run_pipeline(root: &Path) -> AnalysisRun {
    CoveragePipeline::new(root)
        .expect("load pipeline")
        .analyze(&CancellationToken::new())
        .expect("pipeline run")
}

/// Run a project through a [`CoverageSession`], as long-lived callers do.
pub async fn run_session(root: &Path) -> CoverageSession {
    let session = CoverageSession::new(CoveragePipeline::new(root).expect("load pipeline"));
    session
        .run(CancellationToken::new())
        .await
        .expect("session run");
    session
}

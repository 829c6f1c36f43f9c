//! Coverage engines: turn artifacts plus execution data into raw counters.

pub mod classfile;
pub mod crc64;
pub mod flow;
pub mod insn;
pub mod traits;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::ArtifactParseError;
use crate::exec::{ExecutionData, ExecutionStore};
use crate::types::UnitCounters;

use classfile::{ACC_ENUM, ACC_MODULE, ACC_SYNTHETIC, ClassFile, ClassFormatError, Method};

pub use traits::CoverageEngine;

/// Engine for JVM class files, compatible with the probe layout of the
/// agent that wrote the execution records.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytecodeEngine;

impl BytecodeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl CoverageEngine for BytecodeEngine {
    fn name(&self) -> &'static str {
        "bytecode"
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "class")
    }

    fn analyze(
        &self,
        bytes: &[u8],
        path: &Path,
        store: &ExecutionStore,
    ) -> Result<Vec<UnitCounters>, ArtifactParseError> {
        let class = classfile::parse(bytes).map_err(|e| to_artifact_error(&e, path))?;
        if class.access & (ACC_MODULE | ACC_SYNTHETIC) != 0 {
            debug!(class = %class.name, "Skipping module or synthetic class");
            return Ok(Vec::new());
        }

        let id = crc64::class_id(bytes);
        let data = store.get(id);
        if data.is_none() && store.contains_name(&class.name) {
            warn!(
                class = %class.name,
                id = format_args!("{id:016x}"),
                "Execution data does not match class version, reporting as not executed"
            );
        }

        analyze_class(&class, data).map_err(|e| to_artifact_error(&e, path))
    }
}

/// Counters for one parsed class. Probe ids run across methods in file order.
pub(crate) fn analyze_class(
    class: &ClassFile,
    data: Option<&ExecutionData>,
) -> Result<Vec<UnitCounters>, ClassFormatError> {
    let mut unit = UnitCounters::new(class.name.clone());
    let mut lines: BTreeMap<u16, bool> = BTreeMap::new();
    let mut next_probe = 0u32;

    for method in &class.methods {
        let Some(code) = &method.code else {
            continue;
        };
        let insns = insn::decode(&code.bytes)?;
        let coverage = flow::analyze_method(code, &insns, &mut next_probe, data);
        if is_filtered(class, method) || coverage.instructions.total() == 0 {
            continue;
        }
        unit.instruction.add(coverage.instructions);
        unit.branch.add(coverage.branches);
        unit.method.increment(coverage.is_covered());
        for (line, covered) in coverage.lines {
            *lines.entry(line).or_insert(false) |= covered;
        }
    }

    if unit.instruction.total() == 0 {
        return Ok(Vec::new());
    }
    for covered in lines.into_values() {
        unit.line.increment(covered);
    }
    unit.class.increment(unit.method.covered > 0);
    debug!(
        class = %unit.name,
        source = class.source_file.as_deref().unwrap_or("-"),
        probes = next_probe,
        instructions = unit.instruction.total(),
        "Class analysed"
    );
    Ok(vec![unit])
}

/// Compiler-generated members that are not part of the source.
fn is_filtered(class: &ClassFile, method: &Method) -> bool {
    if method.access & ACC_SYNTHETIC != 0 && !method.name.starts_with("lambda$") {
        return true;
    }
    if class.access & ACC_ENUM != 0 && class.super_name.as_deref() == Some("java/lang/Enum") {
        let values = format!("()[L{};", class.name);
        let value_of = format!("(Ljava/lang/String;)L{};", class.name);
        return (method.name == "values" && method.descriptor == values)
            || (method.name == "valueOf" && method.descriptor == value_of);
    }
    false
}

fn to_artifact_error(err: &ClassFormatError, path: &Path) -> ArtifactParseError {
    let path = path.display().to_string();
    match err {
        ClassFormatError::Subroutine(_) => ArtifactParseError::Unsupported {
            path,
            message: err.to_string(),
        },
        _ => ArtifactParseError::Malformed {
            path,
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::classfile::{Code, LineNumber};
    use crate::types::Counter;

    fn method(name: &str, descriptor: &str, access: u16, bytes: &[u8], lines: &[(u32, u16)]) -> Method {
        Method {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: Some(Code {
                bytes: bytes.to_vec(),
                exception_table: Vec::new(),
                line_numbers: lines
                    .iter()
                    .map(|&(start_pc, line)| LineNumber { start_pc, line })
                    .collect(),
            }),
        }
    }

    fn class(name: &str, access: u16, super_name: &str, methods: Vec<Method>) -> ClassFile {
        ClassFile {
            major_version: 52,
            access,
            name: name.to_string(),
            super_name: Some(super_name.to_string()),
            source_file: None,
            methods,
        }
    }

    /// `simple()` then `check(int)` from the flow tests.
    fn sample() -> ClassFile {
        class(
            "com/example/Sample",
            0x21,
            "java/lang/Object",
            vec![
                method("simple", "()V", 1, &[0xb1], &[(0, 10)]),
                method(
                    "check",
                    "(I)I",
                    1,
                    &[0x1b, 0x9e, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac],
                    &[(0, 20), (4, 21), (6, 23)],
                ),
            ],
        )
    }

    #[test]
    fn probes_are_numbered_across_methods() {
        let data = ExecutionData::new(1, "com/example/Sample", vec![false, true, false]);
        let units = analyze_class(&sample(), Some(&data)).unwrap();
        let unit = &units[0];
        assert_eq!(unit.name, "com/example/Sample");
        assert_eq!(unit.instruction, Counter::new(4, 3));
        assert_eq!(unit.branch, Counter::new(1, 1));
        assert_eq!(unit.line, Counter::new(2, 2));
        assert_eq!(unit.method, Counter::new(1, 1));
        assert_eq!(unit.class, Counter::new(1, 0));
    }

    #[test]
    fn no_data_reports_everything_missed() {
        let units = analyze_class(&sample(), None).unwrap();
        let unit = &units[0];
        assert_eq!(unit.instruction, Counter::new(0, 7));
        assert_eq!(unit.method, Counter::new(0, 2));
        assert_eq!(unit.class, Counter::new(0, 1));
    }

    #[test]
    fn synthetic_methods_are_filtered_but_keep_their_probes() {
        let mut c = sample();
        c.methods.insert(0, method("access$000", "()V", ACC_SYNTHETIC, &[0xb1], &[]));
        c.methods.push(method("lambda$run$0", "()V", ACC_SYNTHETIC, &[0xb1], &[(0, 40)]));
        // probe 0 belongs to the filtered bridge, probe 1 to simple()
        let data = ExecutionData::new(1, "x", vec![true, true, false, false, true]);
        let unit = &analyze_class(&c, Some(&data)).unwrap()[0];
        assert_eq!(unit.method, Counter::new(2, 1));
        assert_eq!(unit.instruction, Counter::new(2, 6));
    }

    #[test]
    fn enum_accessors_are_filtered() {
        let c = class(
            "p/Color",
            ACC_ENUM | 0x21,
            "java/lang/Enum",
            vec![
                method("values", "()[Lp/Color;", 9, &[0x01, 0xb0], &[(0, 1)]),
                method("valueOf", "(Ljava/lang/String;)Lp/Color;", 9, &[0x01, 0xb0], &[(0, 1)]),
                method("ordinalName", "()V", 1, &[0xb1], &[(0, 3)]),
            ],
        );
        let unit = &analyze_class(&c, None).unwrap()[0];
        assert_eq!(unit.method, Counter::new(0, 1));
        assert_eq!(unit.instruction.total(), 1);
    }

    #[test]
    fn class_without_code_yields_no_unit() {
        let mut c = sample();
        for m in &mut c.methods {
            m.code = None;
        }
        assert!(analyze_class(&c, None).unwrap().is_empty());
    }

    #[test]
    fn subroutines_are_unsupported() {
        let c = class(
            "p/Old",
            0x21,
            "java/lang/Object",
            vec![method("m", "()V", 1, &[0xa8, 0x00, 0x03, 0xb1], &[])],
        );
        let err = analyze_class(&c, None).unwrap_err();
        let err = to_artifact_error(&err, Path::new("p/Old.class"));
        assert!(matches!(err, ArtifactParseError::Unsupported { .. }));
    }

    #[test]
    fn non_class_bytes_are_malformed() {
        let err = BytecodeEngine
            .analyze(b"not a class", Path::new("x.class"), &ExecutionStore::new())
            .unwrap_err();
        assert!(matches!(err, ArtifactParseError::Malformed { .. }));
    }

    #[test]
    fn accepts_class_extension_only() {
        assert!(BytecodeEngine.accepts(Path::new("a/B.class")));
        assert!(!BytecodeEngine.accepts(Path::new("a/B.jar")));
    }
}

//! Kernel code generation.
//!
//! A kernel is one C function fusing a query's filter and projection into a
//! single loop over a page's record array:
//!
//! ```text
//! int k_<hash>(const kiln_record *records, int n, kiln_result *out, int max_out)
//! {
//!     int matched = 0;
//!     for (int i = 0; i < n; i++) {
//!         if (matched >= max_out) break;        /* omitted for COUNT(*) */
//!         const kiln_record *r = &records[i];
//!         if (!(<filter>)) continue;
//!         <copy projection into out[matched]>
//!         matched++;
//!     }
//!     return matched;
//! }
//! ```
//!
//! The kernel name is a SipHash of the canonical form of everything that
//! determines the generated code, so equal queries always map to the same
//! name and therefore to the same cached artifact.

use std::fmt::Write;
use std::hash::Hasher;

use siphasher::sip::SipHasher13;
use thiserror::Error;
use tracing::debug;

use crate::layout::{FieldLayout, RecordLayout};
use crate::schema::TableSchema;
use crate::validate::{KernelSpec, Projection};

pub mod c;
mod filter;

pub use c::{header_file_name, record_header, render_record, RECORD_TYPE, RESULT_TYPE};
pub use filter::FilterLowering;

/// Fixed SipHash keys for kernel naming.
const NAME_KEY_0: u64 = 0x6b69_6c6e_6b65_726e;
const NAME_KEY_1: u64 = 0x0c0d_ee5e_ed5a_1f00;

/// Errors raised while generating C source.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// A referenced column is not part of the schema.
    #[error("codegen: unknown column '{0}'")]
    UnknownColumn(String),

    /// Expression shape that has no C lowering.
    #[error("codegen: unsupported expression {0}")]
    UnsupportedExpression(String),

    /// A literal that cannot be written as C.
    #[error("codegen: invalid literal {0}")]
    InvalidLiteral(String),
}

/// Result type for code generation.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Generated kernel source plus everything needed to build and call it.
#[derive(Debug, Clone)]
pub struct GeneratedKernel {
    /// Entry point symbol, `k_<16 hex digits>`.
    pub name: String,
    /// Table the kernel scans.
    pub table: String,
    /// Complete C translation unit.
    pub source: String,
    /// Headers the source includes from the table include directory.
    pub dependencies: Vec<String>,
    /// Output shape.
    pub projection: Projection,
    /// Layout of one element of the output buffer.
    pub result_layout: RecordLayout,
}

/// Generates kernels for one table.
pub struct KernelGenerator<'a> {
    schema: &'a TableSchema,
}

impl<'a> KernelGenerator<'a> {
    /// Creates a generator for `schema`.
    pub fn new(schema: &'a TableSchema) -> Self {
        Self { schema }
    }

    /// Deterministic kernel name for a spec.
    pub fn kernel_name(&self, spec: &KernelSpec) -> String {
        let canonical = format!(
            "{}\n{}\n{}\n{}",
            spec.table,
            self.schema.layout_signature(),
            spec.projection.canonical(),
            spec.predicate
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default()
        );

        let mut hasher = SipHasher13::new_with_keys(NAME_KEY_0, NAME_KEY_1);
        hasher.write(canonical.as_bytes());
        format!("k_{:016x}", hasher.finish())
    }

    /// Generates the kernel for a validated spec.
    pub fn generate(&self, spec: &KernelSpec) -> CodegenResult<GeneratedKernel> {
        let name = self.kernel_name(spec);
        let result_layout = spec.result_layout(self.schema);

        let filter = spec
            .predicate
            .as_ref()
            .map(|p| FilterLowering::new(self.schema, "r").lower(p))
            .transpose()?;

        let mut src = String::new();
        let _ = writeln!(src, "/* kernel {} for table {} */", name, c::comment_safe(&self.schema.name));
        let _ = writeln!(src, "/* projection: {} */", c::comment_safe(&spec.projection.canonical()));
        if let Some(ref predicate) = spec.predicate {
            let _ = writeln!(src, "/* filter: {} */", c::comment_safe(&predicate.to_string()));
        }
        src.push_str("#include <stdint.h>\n#include <string.h>\n");
        let _ = writeln!(src, "#include \"{}\"", header_file_name(&self.schema.name));
        src.push('\n');

        src.push_str(&self.result_typedef(&spec.projection)?);
        src.push('\n');

        let _ = writeln!(
            src,
            "int {}(const {} *records, int n, {} *out, int max_out)",
            name, RECORD_TYPE, RESULT_TYPE
        );
        src.push_str("{\n    int matched = 0;\n    for (int i = 0; i < n; i++) {\n");

        if !spec.projection.is_count() {
            src.push_str("        if (matched >= max_out) {\n            break;\n        }\n");
        }

        let copy = self.projection_copy(&spec.projection)?;
        let needs_record = filter.is_some() || copy.iter().any(|line| line.contains("r->") || line.contains("*r"));
        if needs_record {
            let _ = writeln!(src, "        const {} *r = &records[i];", RECORD_TYPE);
        }
        if let Some(ref filter) = filter {
            let _ = writeln!(src, "        if (!{}) {{\n            continue;\n        }}", filter);
        }
        for line in &copy {
            let _ = writeln!(src, "        {}", line);
        }
        src.push_str("        matched++;\n    }\n");

        if spec.projection.is_count() {
            src.push_str("    if (max_out > 0) {\n        out[0] = matched;\n    }\n");
        }
        src.push_str("    return matched;\n}\n");

        debug!(kernel = %name, table = %spec.table, bytes = src.len(), "Generated kernel source");

        Ok(GeneratedKernel {
            name,
            table: self.schema.name.clone(),
            source: src,
            dependencies: vec![header_file_name(&self.schema.name)],
            projection: spec.projection.clone(),
            result_layout,
        })
    }

    fn result_typedef(&self, projection: &Projection) -> CodegenResult<String> {
        Ok(match projection {
            Projection::All => format!("typedef {} {};\n", RECORD_TYPE, RESULT_TYPE),
            Projection::Count { .. } | Projection::Positions => {
                format!("typedef int32_t {};\n", RESULT_TYPE)
            }
            Projection::Columns(cols) => {
                for col in cols {
                    if col.index >= self.schema.len() {
                        return Err(CodegenError::UnknownColumn(col.output_name.clone()));
                    }
                }
                let layout = RecordLayout::from_fields(
                    cols.iter()
                        .map(|c| (self.schema.columns[c.index].name.clone(), c.data_type)),
                );
                c::struct_typedef(&layout, RESULT_TYPE)
            }
        })
    }

    /// Statements copying the current record `r` into `out[matched]`.
    fn projection_copy(&self, projection: &Projection) -> CodegenResult<Vec<String>> {
        Ok(match projection {
            Projection::All => vec!["out[matched] = *r;".to_string()],
            Projection::Count { .. } => Vec::new(),
            Projection::Positions => vec!["out[matched] = i;".to_string()],
            Projection::Columns(cols) => cols
                .iter()
                .enumerate()
                .map(|(out_index, col)| {
                    let dst = FieldLayout::c_name(out_index);
                    let src = FieldLayout::c_name(col.index);
                    if col.data_type.is_string() {
                        format!(
                            "memcpy(out[matched].{dst}, r->{src}, sizeof(out[matched].{dst}));"
                        )
                    } else {
                        format!("out[matched].{dst} = r->{src};")
                    }
                })
                .collect(),
        })
    }
}

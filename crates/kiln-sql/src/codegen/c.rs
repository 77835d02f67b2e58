//! C source building blocks.
//!
//! Shared by kernel generation, page sources and index modules: literal
//! rendering, struct declarations and the per-table record header.

use std::fmt::Write;

use crate::layout::{FieldLayout, RecordLayout};
use crate::parser::DataType;
use crate::schema::TableSchema;
use crate::value::{Value, DATE_FORMAT};

use super::{CodegenError, CodegenResult};

/// Name of the record typedef in every generated header.
pub const RECORD_TYPE: &str = "kiln_record";

/// Name of the kernel output element typedef.
pub const RESULT_TYPE: &str = "kiln_result";

/// File name of a table's record header.
pub fn header_file_name(table: &str) -> String {
    format!("{}_record.h", table)
}

/// Renders a C string literal. Bytes outside printable ASCII become
/// three-digit octal escapes; `?` is escaped so no trigraph can form.
pub fn c_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for &b in s.as_bytes() {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'?' => out.push_str("\\?"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            }
        }
    }
    out.push('"');
    out
}

/// Renders an integer literal of any 64-bit value.
pub fn c_int_literal(i: i64) -> String {
    if i == i64::MIN {
        "(-9223372036854775807LL - 1)".to_string()
    } else if i32::try_from(i).is_ok() {
        if i == i64::from(i32::MIN) {
            "(-2147483647 - 1)".to_string()
        } else {
            i.to_string()
        }
    } else {
        format!("{}LL", i)
    }
}

/// Renders a finite double literal.
pub fn c_float_literal(v: f64) -> CodegenResult<String> {
    if !v.is_finite() {
        return Err(CodegenError::InvalidLiteral(format!("{}", v)));
    }
    // Debug formatting always keeps a decimal point or exponent.
    Ok(format!("{:?}", v))
}

/// Renders a value as an initializer for a field of `data_type`.
pub fn c_value_literal(value: &Value, data_type: &DataType) -> CodegenResult<String> {
    match (data_type, value) {
        (_, Value::Null) => c_value_literal(&Value::zero(data_type), data_type),
        (DataType::Int, Value::Int(i)) => Ok(c_int_literal(i64::from(*i))),
        (DataType::Float, Value::Float(v)) => c_float_literal(*v),
        (DataType::Float, Value::Int(i)) => c_float_literal(f64::from(*i)),
        (DataType::Boolean, Value::Boolean(b)) => Ok(if *b { "1" } else { "0" }.to_string()),
        (DataType::Varchar(_) | DataType::Text, Value::String(s)) => Ok(c_string_literal(s)),
        (DataType::Date, Value::Date(d)) => {
            Ok(c_string_literal(&d.format(DATE_FORMAT).to_string()))
        }
        (DataType::Date, Value::String(s)) => Ok(c_string_literal(s)),
        (dt, v) => Err(CodegenError::InvalidLiteral(format!(
            "{} is not a {} value",
            v, dt
        ))),
    }
}

/// Declares a struct member for `data_type`.
pub fn c_field_decl(name: &str, data_type: &DataType) -> String {
    match data_type {
        DataType::Int => format!("int32_t {}", name),
        DataType::Float => format!("double {}", name),
        DataType::Boolean => format!("bool {}", name),
        DataType::Varchar(_) | DataType::Text | DataType::Date => {
            let (size, _) = crate::layout::physical_size(data_type);
            format!("char {}[{}]", name, size)
        }
    }
}

/// Emits `typedef struct { ... } <type_name>;` for a layout.
pub fn struct_typedef(layout: &RecordLayout, type_name: &str) -> String {
    let mut out = String::from("typedef struct {\n");
    for (i, field) in layout.fields().iter().enumerate() {
        let _ = writeln!(
            out,
            "    {}; /* {} {} @{} */",
            c_field_decl(&FieldLayout::c_name(i), &field.data_type),
            comment_safe(&field.name),
            field.data_type,
            field.offset
        );
    }
    let _ = writeln!(out, "}} {};", type_name);
    out
}

/// Renders the record header shared by a table's pages and kernels.
pub fn record_header(schema: &TableSchema) -> String {
    let layout = schema.layout();
    let guard = format!("KILN_{}_RECORD_H", schema.name.to_ascii_uppercase());

    let mut out = String::new();
    let _ = writeln!(out, "/* record layout for table {} */", comment_safe(&schema.name));
    let _ = writeln!(out, "/* layout: {} size={} */", layout.signature(), layout.size());
    let _ = writeln!(out, "#ifndef {}", guard);
    let _ = writeln!(out, "#define {}", guard);
    out.push('\n');
    out.push_str("#include <stdbool.h>\n#include <stdint.h>\n\n");
    out.push_str(&struct_typedef(&layout, RECORD_TYPE));
    out.push('\n');
    let _ = writeln!(out, "#endif /* {} */", guard);
    out
}

/// Renders one record as a brace initializer: `{ 1, "Alice", 0 }`.
pub fn render_record(schema: &TableSchema, values: &[Value]) -> CodegenResult<String> {
    if values.len() != schema.len() {
        return Err(CodegenError::InvalidLiteral(format!(
            "record has {} values, table '{}' has {} columns",
            values.len(),
            schema.name,
            schema.len()
        )));
    }

    let fields: CodegenResult<Vec<_>> = values
        .iter()
        .zip(&schema.columns)
        .map(|(value, column)| c_value_literal(value, &column.data_type))
        .collect();

    Ok(format!("{{ {} }}", fields?.join(", ")))
}

/// Makes arbitrary text safe to embed in a block comment.
pub fn comment_safe(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '.' })
        .collect::<String>()
        .replace("*/", "*.")
        .replace("/*", "./")
        .replace("??", "?.")
}

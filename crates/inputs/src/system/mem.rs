//! Memory metrics

use lodge_schema::{Field, FieldType, Record, Value};

use super::{SampleError, proc, round2};

pub(crate) fn fields() -> Vec<Field> {
    vec![
        Field::described("mem_usage", FieldType::Float, "Memory usage percentage"),
        Field::described("mem_total", FieldType::Int, "Memory total size in bytes"),
    ]
}

pub(crate) fn collect(record: &mut Record) -> Result<(), SampleError> {
    let (total, available) = proc::meminfo()?;

    let usage = if total > 0 {
        round2((total - available) as f64 / total as f64 * 100.0)
    } else {
        0.0
    };

    record.insert("mem_usage".to_string(), Value::Float(usage));
    record.insert("mem_total".to_string(), Value::Int(total as i64));

    Ok(())
}

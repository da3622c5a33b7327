//! CPU metrics
//!
//! Load averages, CPU usage percent, and core count. Usage is the share of
//! busy time in the interval since the previous sample: deltaBusy /
//! (deltaBusy + deltaIdle). The first sample has no interval yet and
//! reports 0.

use lodge_schema::{Field, FieldType, Record, Value};

use super::{SampleError, proc, round2};

pub(crate) fn fields() -> Vec<Field> {
    vec![
        Field::described("la_1", FieldType::Float, "Load average for 1 minute"),
        Field::described("la_5", FieldType::Float, "Load average for 5 minutes"),
        Field::described("la_15", FieldType::Float, "Load average for 15 minutes"),
        Field::described("cpu_usage", FieldType::Float, "CPU usage percentage"),
        Field::described("cpu_cores", FieldType::Int, "Number of CPU cores"),
    ]
}

#[derive(Debug, Default)]
pub(crate) struct CpuStats {
    primed: bool,
    busy: f64,
    idle: f64,
}

impl CpuStats {
    pub fn collect(&mut self, record: &mut Record) -> Result<(), SampleError> {
        let (la1, la5, la15) = proc::loadavg()?;
        record.insert("la_1".to_string(), Value::Float(round2(la1)));
        record.insert("la_5".to_string(), Value::Float(round2(la5)));
        record.insert("la_15".to_string(), Value::Float(round2(la15)));

        let (busy, idle) = proc::cpu_times()?;

        let usage = if self.primed {
            let delta_busy = busy - self.busy;
            let delta_idle = idle - self.idle;
            let total = delta_busy + delta_idle;
            if total > 0.0 {
                round2(delta_busy / total * 100.0)
            } else {
                0.0
            }
        } else {
            self.primed = true;
            0.0
        };
        record.insert("cpu_usage".to_string(), Value::Float(usage));

        let cores = std::thread::available_parallelism()
            .map(|p| p.get() as i64)
            .unwrap_or(1);
        record.insert("cpu_cores".to_string(), Value::Int(cores));

        self.busy = busy;
        self.idle = idle;

        Ok(())
    }
}

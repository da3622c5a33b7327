//! Disk metrics
//!
//! Filesystem usage for a target path plus I/O byte deltas of the block
//! device backing it. The device is the one mounted at the longest prefix
//! of the target path; deltas are 0 on the first sample.

use lodge_schema::{Field, FieldType, Record, Value};

use super::{SampleError, proc, round2};

pub(crate) fn fields() -> Vec<Field> {
    vec![
        Field::described("disk_usage", FieldType::Float, "Disk usage percentage"),
        Field::described("disk_total", FieldType::Int, "Disk total size in bytes"),
        Field::described("disk_read_bytes", FieldType::Int, "Delta of bytes read"),
        Field::described("disk_write_bytes", FieldType::Int, "Delta of bytes written"),
    ]
}

#[derive(Debug)]
pub(crate) struct DiskStats {
    path: String,
    device: String,
    primed: bool,
    read: u64,
    write: u64,
}

impl DiskStats {
    /// Resolve the device backing `path` by longest-prefix mountpoint
    /// match. An unresolvable device disables the I/O deltas but not the
    /// usage numbers.
    pub fn init(path: &str) -> Self {
        let mut device = String::new();

        match proc::mounts() {
            Ok(mut mounts) => {
                mounts.sort_by_key(|(_, mountpoint)| std::cmp::Reverse(mountpoint.len()));
                if let Some((dev, _)) = mounts
                    .iter()
                    .find(|(_, mountpoint)| path.starts_with(mountpoint.as_str()))
                {
                    device = dev.rsplit('/').next().unwrap_or(dev).to_string();
                }
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "failed to resolve disk device");
            }
        }

        Self {
            path: path.to_string(),
            device,
            primed: false,
            read: 0,
            write: 0,
        }
    }

    pub fn collect(&mut self, record: &mut Record) -> Result<(), SampleError> {
        let (usage, total) = proc::fs_usage(&self.path)?;
        record.insert("disk_usage".to_string(), Value::Float(round2(usage)));
        record.insert("disk_total".to_string(), Value::Int(total as i64));

        let mut delta_read = 0i64;
        let mut delta_write = 0i64;

        if !self.device.is_empty() {
            if let Some((read, write)) = proc::disk_io(&self.device)? {
                if self.primed {
                    delta_read = read.saturating_sub(self.read) as i64;
                    delta_write = write.saturating_sub(self.write) as i64;
                }
                self.read = read;
                self.write = write;
                self.primed = true;
            }
        }

        record.insert("disk_read_bytes".to_string(), Value::Int(delta_read));
        record.insert("disk_write_bytes".to_string(), Value::Int(delta_write));

        Ok(())
    }
}

//! procfs and sysfs readers
//!
//! Thin parsing helpers over the Linux proc and sys filesystems. Each
//! returns a [`SampleError`] naming the file it failed on; callers decide
//! whether that kills the tick.

use std::path::Path;

use super::SampleError;

fn read(path: &str) -> Result<String, SampleError> {
    std::fs::read_to_string(path).map_err(|e| SampleError::proc(path, e))
}

/// System uptime in whole seconds, from `/proc/uptime`.
pub fn uptime() -> Result<i64, SampleError> {
    let content = read("/proc/uptime")?;
    content
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as i64)
        .ok_or_else(|| SampleError::other("malformed /proc/uptime"))
}

/// 1/5/15-minute load averages via `getloadavg`.
pub fn loadavg() -> Result<(f64, f64, f64), SampleError> {
    let mut values = [0.0_f64; 3];
    // SAFETY: getloadavg writes up to 3 doubles into a valid buffer.
    let n = unsafe { libc::getloadavg(values.as_mut_ptr(), 3) };
    if n != 3 {
        return Err(SampleError::other("getloadavg failed"));
    }
    Ok((values[0], values[1], values[2]))
}

/// Aggregate CPU time split into (busy, idle) jiffies from `/proc/stat`.
///
/// Busy covers user, nice, system, irq, softirq, steal, guest, and guest
/// nice; idle covers idle and iowait.
pub fn cpu_times() -> Result<(f64, f64), SampleError> {
    let content = read("/proc/stat")?;
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SampleError::other("no cpu line in /proc/stat"))?;

    let ticks: Vec<f64> = line
        .split_whitespace()
        .skip(1)
        .map(|v| v.parse::<f64>().unwrap_or(0.0))
        .collect();
    if ticks.len() < 7 {
        return Err(SampleError::other("malformed cpu line in /proc/stat"));
    }

    let field = |i: usize| ticks.get(i).copied().unwrap_or(0.0);
    // user nice system idle iowait irq softirq steal guest guestnice
    let busy = field(0) + field(1) + field(2) + field(5) + field(6) + field(7) + field(8) + field(9);
    let idle = field(3) + field(4);

    Ok((busy, idle))
}

/// (total, available) memory in bytes from `/proc/meminfo`.
pub fn meminfo() -> Result<(u64, u64), SampleError> {
    let content = read("/proc/meminfo")?;

    let field = |name: &str| -> Option<u64> {
        content
            .lines()
            .find(|l| l.starts_with(name))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };

    match (field("MemTotal:"), field("MemAvailable:")) {
        (Some(total), Some(available)) => Ok((total, available)),
        _ => Err(SampleError::other("malformed /proc/meminfo")),
    }
}

/// Mounted filesystems as (device, mountpoint) pairs from `/proc/mounts`.
pub fn mounts() -> Result<Vec<(String, String)>, SampleError> {
    let content = read("/proc/mounts")?;

    Ok(content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let device = parts.next()?;
            let mountpoint = parts.next()?;
            Some((device.to_string(), mountpoint.to_string()))
        })
        .collect())
}

/// Cumulative (read, written) bytes for a block device from
/// `/proc/diskstats`. Sector counts are 512-byte units.
pub fn disk_io(device: &str) -> Result<Option<(u64, u64)>, SampleError> {
    let content = read("/proc/diskstats")?;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 || parts[2] != device {
            continue;
        }

        let sectors_read: u64 = parts[5].parse().unwrap_or(0);
        let sectors_written: u64 = parts[9].parse().unwrap_or(0);
        return Ok(Some((sectors_read * 512, sectors_written * 512)));
    }

    Ok(None)
}

/// Filesystem (usage percent, total bytes) for a path via `statvfs`.
pub fn fs_usage(path: &str) -> Result<(f64, u64), SampleError> {
    let c_path = std::ffi::CString::new(path)
        .map_err(|_| SampleError::other("path contains NUL"))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: statvfs fills the zeroed struct for a valid C path.
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return Err(SampleError::proc(path, std::io::Error::last_os_error()));
    }

    let block_size = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * block_size;
    let free = stat.f_bfree as u64 * block_size;
    let used = total.saturating_sub(free);
    let usage = if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    Ok((usage, total))
}

/// Interface carrying the default route, from `/proc/net/route`.
pub fn default_route_interface() -> Result<String, SampleError> {
    let content = read("/proc/net/route")?;

    for line in content.lines().skip(1) {
        let mut parts = line.split_whitespace();
        let (Some(iface), Some(dest)) = (parts.next(), parts.next()) else {
            continue;
        };
        if dest == "00000000" {
            return Ok(iface.to_string());
        }
    }

    Err(SampleError::other("default interface not found"))
}

/// One interface statistics counter from sysfs; 0 when unreadable.
pub fn net_stat(iface: &str, key: &str) -> i64 {
    let path = Path::new("/sys/class/net").join(iface).join("statistics").join(key);

    std::fs::read_to_string(path)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

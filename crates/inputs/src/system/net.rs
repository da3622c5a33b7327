//! Network metrics
//!
//! Per-tick deltas of the interface counters under
//! `/sys/class/net/<if>/statistics`, zero on the first sample. The
//! interface name "default" resolves to whichever interface carries the
//! default route.

use lodge_schema::{Field, FieldType, Record, Value};

use super::{SampleError, proc};

/// Counter files tracked per interface, in record order.
const COUNTERS: [&str; 8] = [
    "rx_bytes",
    "tx_bytes",
    "rx_packets",
    "tx_packets",
    "rx_errors",
    "tx_errors",
    "rx_dropped",
    "tx_dropped",
];

pub(crate) fn fields() -> Vec<Field> {
    vec![
        Field::described("net_if", FieldType::String, "Network interface name"),
        Field::described("net_rx_bytes", FieldType::Int, "Delta of received bytes"),
        Field::described("net_tx_bytes", FieldType::Int, "Delta of transmitted bytes"),
        Field::described("net_rx_packets", FieldType::Int, "Delta of received packets"),
        Field::described("net_tx_packets", FieldType::Int, "Delta of transmitted packets"),
        Field::described("net_rx_errors", FieldType::Int, "Delta of receive errors"),
        Field::described("net_tx_errors", FieldType::Int, "Delta of transmit errors"),
        Field::described("net_rx_dropped", FieldType::Int, "Delta of dropped incoming packets"),
        Field::described("net_tx_dropped", FieldType::Int, "Delta of dropped outgoing packets"),
    ]
}

#[derive(Debug)]
pub(crate) struct NetStats {
    ifname: String,
    primed: bool,
    counters: [i64; COUNTERS.len()],
}

impl NetStats {
    pub fn init(interface: &str) -> Result<Self, SampleError> {
        let ifname = if interface == "default" {
            proc::default_route_interface()?
        } else {
            interface.to_string()
        };

        Ok(Self {
            ifname,
            primed: false,
            counters: [0; COUNTERS.len()],
        })
    }

    pub fn collect(&mut self, record: &mut Record) {
        record.insert("net_if".to_string(), Value::Str(self.ifname.clone()));

        for (i, key) in COUNTERS.iter().enumerate() {
            let value = proc::net_stat(&self.ifname, key);
            let delta = if self.primed {
                value - self.counters[i]
            } else {
                0
            };
            self.counters[i] = value;

            record.insert(format!("net_{key}"), Value::Int(delta));
        }

        self.primed = true;
    }
}

//! Replays a generated trace against a [`numa_block_cache::HostCache`],
//! timing each command.

use std::time::Instant;

use numa_block_cache::{BackingStore, Command, HostCache, WriteMode, WritebackRegistry};

use crate::models::{Operation, Request};
use crate::stats::RunReport;

/// Replays `requests` against `host`/`store` under `write_mode`, returning
/// aggregate latency and hit-rate statistics.
pub fn run(
    host: &HostCache,
    store: &dyn BackingStore,
    block_size: u64,
    write_mode: WriteMode,
    writeback: Option<&WritebackRegistry>,
    requests: &[Request],
) -> RunReport {
    let mut report = RunReport::new(requests.len());
    let mut buf = vec![0u8; block_size as usize];

    for req in requests {
        let cmd = match req.op {
            Operation::Read => Command::Read {
                target: 0,
                lun: 0,
                offset: req.offset,
                length: req.length,
            },
            Operation::Write => Command::Write {
                target: 0,
                lun: 0,
                offset: req.offset,
                length: req.length,
            },
        };

        let start = Instant::now();
        let result = numa_block_cache::dispatch(host, store, block_size, write_mode, writeback, &cmd, &mut buf);
        let elapsed = start.elapsed();

        match result {
            Ok(_) => report.record_success(elapsed),
            Err(_) => report.record_failure(),
        }
    }

    report.finish(host.metrics());
    report
}

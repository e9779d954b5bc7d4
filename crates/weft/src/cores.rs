//! Core table and isolated-CPU discovery.

use std::fs;

/// Kernel node listing the CPUs isolated from the general scheduler.
const ISOLATED_CPUS_PATH: &str = "/sys/devices/system/cpu/isolated";

#[derive(Debug, Clone, Copy)]
struct Core {
    id: usize,
    workers: usize,
}

/// Per-core worker load table driving automatic placement.
#[derive(Debug)]
pub(crate) struct CoreTable {
    entries: Vec<Core>,
}

impl CoreTable {
    /// Table over core ids `0..cores`.
    pub(crate) fn with_default_ids(cores: usize) -> Self {
        Self::with_ids((0..cores).collect())
    }

    fn with_ids(ids: Vec<usize>) -> Self {
        Self {
            entries: ids.into_iter().map(|id| Core { id, workers: 0 }).collect(),
        }
    }

    /// Build the table for a new pool. Under realtime-kernel mode, placement
    /// is restricted to isolated cores when the machine reserves enough of
    /// them; otherwise the first `cores` ids are used.
    pub(crate) fn for_pool(cores: usize) -> Self {
        if weft_sync::realtime_kernel_mode() {
            let isolated = isolated_cores();
            if isolated.len() >= cores {
                tracing::info!(?isolated, cores, "placing workers on isolated cores");
                return Self::with_ids(isolated[..cores].to_vec());
            }
        }
        Self::with_default_ids(cores)
    }

    /// Index of the least-used core. Ties resolve to the highest core id.
    pub(crate) fn pick_auto(&self) -> usize {
        let mut min_index = 0;
        let mut min_workers = usize::MAX;
        for (index, core) in self.entries.iter().enumerate() {
            if core.workers <= min_workers {
                min_workers = core.workers;
                min_index = index;
            }
        }
        min_index
    }

    /// Index of the entry for an explicitly requested core id.
    pub(crate) fn index_of(&self, core_id: usize) -> Option<usize> {
        self.entries.iter().position(|core| core.id == core_id)
    }

    pub(crate) fn id_at(&self, index: usize) -> usize {
        self.entries[index].id
    }

    pub(crate) fn add_worker_at(&mut self, index: usize) {
        self.entries[index].workers += 1;
    }

    pub(crate) fn remove_worker_at(&mut self, index: usize) {
        debug_assert!(self.entries[index].workers > 0);
        self.entries[index].workers -= 1;
    }

    /// Snapshot of `(core_id, worker_count)` in table order.
    pub(crate) fn loads(&self) -> Vec<(usize, usize)> {
        self.entries
            .iter()
            .map(|core| (core.id, core.workers))
            .collect()
    }
}

/// Parse the isolated-CPU node contents: either empty or `<first>-<last>`,
/// an inclusive range. Anything else means no isolation.
fn parse_isolated_cores(contents: &str) -> Vec<usize> {
    let trimmed = contents.trim();
    let Some((first, last)) = trimmed.split_once('-') else {
        return Vec::new();
    };
    let (Ok(first), Ok(last)) = (first.parse::<usize>(), last.parse::<usize>()) else {
        return Vec::new();
    };
    if first > last {
        return Vec::new();
    }
    (first..=last).collect()
}

/// Core ids isolated from the general scheduler, or empty when the kernel
/// isolates none (or the node is unreadable).
fn isolated_cores() -> Vec<usize> {
    match fs::read_to_string(ISOLATED_CPUS_PATH) {
        Ok(contents) => parse_isolated_cores(&contents),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_isolated_ranges() {
        assert_eq!(parse_isolated_cores("0-3"), vec![0, 1, 2, 3]);
        assert_eq!(parse_isolated_cores("2-3"), vec![2, 3]);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(parse_isolated_cores("23").is_empty());
        assert!(parse_isolated_cores("").is_empty());
        assert!(parse_isolated_cores("4-").is_empty());
        assert!(parse_isolated_cores("-4").is_empty());
        assert!(parse_isolated_cores("3-1").is_empty());
        assert!(parse_isolated_cores("a-b").is_empty());
    }

    #[test]
    fn test_parse_tolerates_trailing_newline() {
        assert_eq!(parse_isolated_cores("1-2\n"), vec![1, 2]);
    }

    #[test]
    fn test_auto_placement_prefers_highest_free_core() {
        let mut table = CoreTable::with_default_ids(4);
        // All empty: the highest id wins the tie.
        assert_eq!(table.id_at(table.pick_auto()), 3);

        table.add_worker_at(3);
        assert_eq!(table.id_at(table.pick_auto()), 2);
        table.add_worker_at(2);
        assert_eq!(table.id_at(table.pick_auto()), 1);
        table.add_worker_at(1);
        assert_eq!(table.id_at(table.pick_auto()), 0);
        table.add_worker_at(0);

        // Back to a tie at one worker each.
        assert_eq!(table.id_at(table.pick_auto()), 3);
    }

    #[test]
    fn test_explicit_lookup() {
        let table = CoreTable::with_default_ids(4);
        assert_eq!(table.index_of(2), Some(2));
        assert_eq!(table.index_of(5), None);
    }

    #[test]
    fn test_rollback_restores_the_load() {
        let mut table = CoreTable::with_default_ids(2);
        let index = table.pick_auto();
        table.add_worker_at(index);
        table.remove_worker_at(index);
        assert_eq!(table.loads(), vec![(0, 0), (1, 0)]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// The parser never panics and only ever yields the inclusive range
        /// it was given.
        #[test]
        fn prop_parser_is_total(contents in ".{0,32}") {
            let cores = parse_isolated_cores(&contents);
            if let (Some(first), Some(last)) = (cores.first(), cores.last()) {
                prop_assert!(first <= last);
                prop_assert_eq!(cores.len(), last - first + 1);
            }
        }

        /// Auto placement keeps the per-core load balanced: after any number
        /// of placements the spread between cores is at most one.
        #[test]
        fn prop_auto_placement_stays_balanced(
            cores in 1usize..8,
            placements in 0usize..32,
        ) {
            let mut table = CoreTable::with_default_ids(cores);
            for _ in 0..placements {
                let index = table.pick_auto();
                table.add_worker_at(index);
            }
            let loads = table.loads();
            let max = loads.iter().map(|(_, n)| *n).max().unwrap_or(0);
            let min = loads.iter().map(|(_, n)| *n).min().unwrap_or(0);
            prop_assert!(max - min <= 1);
        }
    }
}

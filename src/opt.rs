use crate::ir::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use tracing::debug;

pub mod dce;
pub mod fold;
pub mod sccp;
pub mod tco;

/// Which previously computed analyses survive a run unchanged. Any
/// structural change invalidates control-flow-shape-dependent analyses:
/// SCCP is designed to eventually prune edges, and TCO redirects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preserved {
    All,
    None,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PassStats {
    pub sccp_hits: usize,
    pub dce_hits: usize,
    pub tco_hits: usize,
    pub iterations: usize,
}

impl PassStats {
    pub fn accumulate(&mut self, other: Self) {
        self.sccp_hits += other.sccp_hits;
        self.dce_hits += other.dce_hits;
        self.tco_hits += other.tco_hits;
        self.iterations += other.iterations;
    }
}

pub struct Pipeline;

impl Pipeline {
    pub fn new() -> Self {
        Self
    }

    fn env_bool(key: &str, default_v: bool) -> bool {
        match env::var(key) {
            Ok(v) => matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
            Err(_) => default_v,
        }
    }

    fn env_usize(key: &str, default_v: usize) -> usize {
        env::var(key)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(default_v)
    }

    fn verify_each_pass() -> bool {
        Self::env_bool("OPAL_VERIFY_EACH_PASS", false)
    }

    fn max_opt_iterations() -> usize {
        Self::env_usize("OPAL_OPT_MAX_ITERS", 8)
    }

    fn maybe_verify(func: &Function, stage: &str) {
        if Self::verify_each_pass() {
            if let Err(e) = crate::ir::verify::verify_fn(func) {
                panic!(
                    "IR verification failed at {}: {}\nfunction: {}",
                    stage, e, func.name
                );
            }
        }
    }

    fn fingerprint(func: &Function) -> u64 {
        let mut h = DefaultHasher::new();
        func.name.hash(&mut h);
        func.params.hash(&mut h);
        func.varargs.hash(&mut h);
        func.entry.hash(&mut h);
        func.insts.len().hash(&mut h);
        for inst in &func.insts {
            inst.kind.hash(&mut h);
            inst.bid.hash(&mut h);
        }
        for block in &func.blocks {
            block.insts.hash(&mut h);
            block.term.hash(&mut h);
        }
        h.finish()
    }

    pub fn run_function(&self, func: &mut Function) -> Preserved {
        self.run_function_with_stats(func).1
    }

    // Each function gets its own engine state; instances share nothing, so a
    // host is free to parallelize this loop instead.
    pub fn run_program(&self, funcs: &mut FxHashMap<String, Function>) {
        let _ = self.run_program_with_stats(funcs);
    }

    pub fn run_program_with_stats(&self, funcs: &mut FxHashMap<String, Function>) -> PassStats {
        let mut stats = PassStats::default();
        for (_, func) in funcs.iter_mut() {
            let (s, _) = self.run_function_with_stats(func);
            stats.accumulate(s);
        }
        stats
    }

    pub fn run_function_with_stats(&self, func: &mut Function) -> (PassStats, Preserved) {
        let mut stats = PassStats::default();
        let mut seen_hashes = FxHashSet::default();
        seen_hashes.insert(Self::fingerprint(func));

        let mut changed = true;
        while changed && stats.iterations < Self::max_opt_iterations() {
            changed = false;
            stats.iterations += 1;
            let before_hash = Self::fingerprint(func);

            let tco_changed = tco::optimize(func);
            if tco_changed {
                stats.tco_hits += 1;
            }
            Self::maybe_verify(func, "after tco");
            changed |= tco_changed;

            let sccp_changed = sccp::Sccp::new().optimize(func);
            if sccp_changed {
                stats.sccp_hits += 1;
            }
            Self::maybe_verify(func, "after sccp");
            changed |= sccp_changed;

            let dce_changed = dce::optimize(func);
            if dce_changed {
                stats.dce_hits += 1;
            }
            Self::maybe_verify(func, "after dce");
            changed |= dce_changed;

            let after_hash = Self::fingerprint(func);
            if after_hash == before_hash {
                break;
            }
            if !seen_hashes.insert(after_hash) {
                // Degenerate oscillation guard.
                debug!(function = %func.name, "pipeline oscillation, stopping");
                break;
            }
        }

        let preserved = if stats.sccp_hits + stats.dce_hits + stats.tco_hits > 0 {
            Preserved::None
        } else {
            Preserved::All
        };
        (stats, preserved)
    }
}

// Arm Cortex-X4 PMU events.
// Applicable SoC platforms: MT6989 (Dimensity 9300), Cortex-X4 + Cortex-A720.
// 1 fixed counter + 12 programmable counters per big core.

use super::oryon::event;
use super::{Catalog, Event};

pub(super) fn catalog() -> Catalog {
    Catalog {
        fixed: vec![
            event!("cpu_cycles", "Cycle", 0x11),
            event!("cnt_cycles", "Constant frequency cycles", 0x4004),
            event!("inst_retired", "Instruction architecturally executed", 0x08),
        ],
        groups: vec![
            vec![
                event!("inst_spec", "Operation speculatively executed", 0x1b),
                event!("ld_spec", "Operation speculatively executed, load", 0x70),
                event!("st_spec", "Operation speculatively executed, store", 0x71),
                event!(
                    "dp_spec",
                    "Operation speculatively executed, integer data processing",
                    0x73
                ),
                event!(
                    "vfp_spec",
                    "Operation speculatively executed, scalar floating-point",
                    0x75
                ),
                event!(
                    "ase_spec",
                    "Operation speculatively executed, Advanced SIMD",
                    0x74
                ),
                event!(
                    "br_immed_spec",
                    "Branch speculatively executed, immediate branch",
                    0x78
                ),
                event!(
                    "br_indirect_spec",
                    "Branch speculatively executed, indirect branch",
                    0x7a
                ),
                event!(
                    "br_return_spec",
                    "Branch speculatively executed, procedure return",
                    0x79
                ),
            ],
            vec![
                event!("l1d_cache_refill", "Level 1 data cache refill", 0x03),
                event!("l1i_cache_refill", "Level 1 instruction cache refill", 0x01),
                event!("l2d_cache_refill", "Level 2 data cache refill", 0x17),
                event!("l3d_cache_refill", "Attributable level 3 cache refill", 0x2a),
                event!("l1d_tlb_refill", "Level 1 data TLB refill", 0x05),
                event!("l1i_tlb_refill", "Level 1 instruction TLB refill", 0x02),
                event!(
                    "br_mis_pred_retired",
                    "Branch instruction architecturally executed, mispredicted",
                    0x22
                ),
            ],
            vec![
                event!("bus_access_rd", "Bus access, read", 0x60),
                event!("bus_access_wr", "Bus access, write", 0x61),
                event!("mem_access_rd", "Data memory access, read", 0x66),
                event!("mem_access_rd_percyc", "Total cycles, mem_access_rd", 0x8121),
                event!(
                    "dtlb_walk",
                    "Data TLB access with at least one translation table walk",
                    0x34
                ),
                event!(
                    "itlb_walk",
                    "Instruction TLB access with at least one translation table walk",
                    0x35
                ),
                event!("dtlb_walk_percyc", "Total cycles, dtlb_walk", 0x8128),
                event!("itlb_walk_percyc", "Total cycles, itlb_walk", 0x8129),
            ],
        ],
    }
}

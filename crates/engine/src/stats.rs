//! Remapper statistics collection and reporting.
//!
//! This module tracks counters for the remapper. It provides:
//! 1. **Admission:** Accepted requests, grants, and rejections by reason.
//! 2. **Release:** Direct hits, park hits, and tag frees.
//! 3. **Buffering:** Parked completions, backpressured completions, and peak occupancy.

use serde::Serialize;

use crate::common::error::Rejection;
use crate::reorder::{Inbound, Release, ReleaseKind};

/// Counters accumulated over the life of an engine or shared remapper.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RemapStats {
    /// Turns (engine ticks) executed.
    pub turns: u64,
    /// Requests accepted from upstream.
    pub accepted: u64,
    /// Tags granted.
    pub grants: u64,
    /// Allocation attempts refused because every allocatable tag was live.
    pub rejected_table_full: u64,
    /// Allocation attempts refused because the ID's row had no spare column.
    pub rejected_row_full: u64,
    /// Allocation attempts refused because no row was unbound.
    pub rejected_no_row: u64,
    /// Completions released on arrival.
    pub direct_hits: u64,
    /// Completions released from the park.
    pub park_hits: u64,
    /// Completions parked.
    pub parked: u64,
    /// Completions handed back to the transport.
    pub backpressured: u64,
    /// Responses delivered to the caller.
    pub released: u64,
    /// Tags returned to their free list.
    pub freed: u64,
    /// Highest park occupancy observed.
    pub peak_parked: usize,
    /// Highest number of simultaneously live tags observed.
    pub peak_live: usize,
}

impl RemapStats {
    /// Records an allocation refusal. Completion-side refusals are counted by
    /// [`RemapStats::record_inbound`].
    pub fn record_rejection(&mut self, reason: Rejection) {
        match reason {
            Rejection::TableFull => self.rejected_table_full += 1,
            Rejection::RowFull(_) => self.rejected_row_full += 1,
            Rejection::NoFreeRow(_) => self.rejected_no_row += 1,
            Rejection::ParkFull | Rejection::SlotOccupied(_) | Rejection::OutputFull(_) => {}
        }
    }

    /// Records a grant and the resulting live-tag count.
    pub fn record_grant(&mut self, live: usize) {
        self.grants += 1;
        self.peak_live = self.peak_live.max(live);
    }

    /// Records the fate of an inbound completion.
    pub fn record_inbound<P>(&mut self, inbound: &Inbound<P>) {
        match inbound {
            Inbound::DirectHit(_) => {}
            Inbound::Parked(_) => self.parked += 1,
            Inbound::Backpressured(_) => self.backpressured += 1,
        }
    }

    /// Records a release.
    pub fn record_release<P>(&mut self, release: &Release<P>) {
        self.released += 1;
        match release.kind {
            ReleaseKind::DirectHit => self.direct_hits += 1,
            ReleaseKind::ParkHit => self.park_hits += 1,
        }
        if release.freed {
            self.freed += 1;
        }
    }

    /// Records current park occupancy.
    pub fn observe_park(&mut self, occupancy: usize) {
        self.peak_parked = self.peak_parked.max(occupancy);
    }

    /// Total allocation refusals.
    pub const fn rejections(&self) -> u64 {
        self.rejected_table_full + self.rejected_row_full + self.rejected_no_row
    }

    /// Fraction of releases that bypassed the park.
    pub fn direct_ratio(&self) -> f64 {
        if self.released == 0 {
            0.0
        } else {
            self.direct_hits as f64 / self.released as f64
        }
    }

    /// Prints the report to stdout.
    pub fn print(&self) {
        let turns = self.turns.max(1);
        println!("\n==========================================================");
        println!("TAG REMAPPER STATISTICS");
        println!("==========================================================");
        println!("turns                    {}", self.turns);
        println!("requests.accepted        {}", self.accepted);
        println!("tags.granted             {}", self.grants);
        println!("tags.freed               {}", self.freed);
        println!("tags.peak_live           {}", self.peak_live);
        println!("----------------------------------------------------------");
        println!("ADMISSION");
        println!("  rejected.table_full    {}", self.rejected_table_full);
        println!("  rejected.row_full      {}", self.rejected_row_full);
        println!("  rejected.no_free_row   {}", self.rejected_no_row);
        println!("----------------------------------------------------------");
        println!("RELEASE");
        println!("  released               {}", self.released);
        println!(
            "  direct_hits            {} ({:.2}%)",
            self.direct_hits,
            self.direct_ratio() * 100.0
        );
        println!("  park_hits              {}", self.park_hits);
        println!(
            "  throughput             {:.4} releases/turn",
            self.released as f64 / turns as f64
        );
        println!("----------------------------------------------------------");
        println!("PARK");
        println!("  parked                 {}", self.parked);
        println!("  backpressured          {}", self.backpressured);
        println!("  peak_occupancy         {}", self.peak_parked);
        println!("==========================================================");
    }
}

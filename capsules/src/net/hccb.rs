//! Header-Compression Context Buffer: up to 16 entries mapping a 4-bit
//! Context Identifier to an IPv6 prefix with a lifetime in minutes.
//!
//! Grounded on RIOT's `sys/net/include/sixlowpan/iphc_cbuf.h`
//! (`original_source/`): a fixed `NTX`-slot table (here 16, matching the
//! 4-bit CID field) with a per-entry lifetime and a GC pass
//! (`sixlowpan_iphc_cbuf_rem_cid` there, `remove_all_invalid` here). A
//! read-only, compile-time context store (`net::lowpan::ContextStore`)
//! isn't enough here; this type is the runtime-mutable owner that
//! `update`/`remove` operations require, kept behind a single `MapCell` so
//! the whole table is serialized by one mutex.

use kernel::common::cells::MapCell;
use kernel::ReturnCode;

use crate::net::ip6::Address;

pub const NUM_CONTEXTS: usize = 16;

#[derive(Copy, Clone)]
pub struct HccbEntry {
    pub cid: u8,
    pub prefix: Address,
    pub prefix_len: u8,
    pub lifetime_minutes: u16,
    pub valid_until_epoch_minutes: u32,
}

/// The Header-Compression Context Buffer.
pub struct Hccb {
    entries: MapCell<[Option<HccbEntry>; NUM_CONTEXTS]>,
}

impl Hccb {
    pub const fn new() -> Hccb {
        Hccb {
            entries: MapCell::new([None; NUM_CONTEXTS]),
        }
    }

    /// Rejects `cid >= 16`, `prefix_len == 0`, or `lifetime == 0`; otherwise
    /// stores the entry and recomputes `valid_until` from `now_minutes`.
    pub fn update(
        &self,
        cid: u8,
        prefix: Address,
        prefix_len: u8,
        lifetime_minutes: u16,
        now_minutes: u32,
    ) -> ReturnCode {
        if cid as usize >= NUM_CONTEXTS || prefix_len == 0 || lifetime_minutes == 0 {
            return ReturnCode::EINVAL;
        }
        self.entries.map(|table| {
            table[cid as usize] = Some(HccbEntry {
                cid,
                prefix,
                prefix_len,
                lifetime_minutes,
                valid_until_epoch_minutes: now_minutes + lifetime_minutes as u32,
            });
        });
        ReturnCode::SUCCESS
    }

    /// Returns the entry for `cid` only if `now_minutes` has not passed its
    /// `valid_until`; an expired entry is evicted and treated as absent, the
    /// same as a hole.
    pub fn lookup_cid(&self, cid: u8, now_minutes: u32) -> Option<HccbEntry> {
        if cid as usize >= NUM_CONTEXTS {
            return None;
        }
        let found = self
            .entries
            .map(|table| table[cid as usize])
            .flatten();
        match found {
            Some(entry) if entry.valid_until_epoch_minutes > now_minutes => Some(entry),
            Some(_) => {
                self.remove(cid);
                None
            }
            None => None,
        }
    }

    /// Returns the live entry whose prefix longest-matches `addr`. Among
    /// equally long prefixes, the lowest-CID match is returned, which is
    /// stable for a given table state.
    pub fn lookup_addr(&self, addr: &Address, now_minutes: u32) -> Option<HccbEntry> {
        let mut best: Option<HccbEntry> = None;
        self.entries.map(|table| {
            for maybe_entry in table.iter() {
                if let Some(entry) = maybe_entry {
                    if entry.valid_until_epoch_minutes <= now_minutes {
                        continue;
                    }
                    if prefix_matches(&entry.prefix, entry.prefix_len, addr) {
                        let better = match best {
                            None => true,
                            Some(cur) => entry.prefix_len > cur.prefix_len,
                        };
                        if better {
                            best = Some(*entry);
                        }
                    }
                }
            }
        });
        best
    }

    pub fn remove(&self, cid: u8) {
        if (cid as usize) < NUM_CONTEXTS {
            self.entries.map(|table| table[cid as usize] = None);
        }
    }

    /// Evicts every entry whose lifetime has elapsed as of `now_minutes`.
    pub fn remove_all_invalid(&self, now_minutes: u32) {
        self.entries.map(|table| {
            for slot in table.iter_mut() {
                if let Some(entry) = slot {
                    if entry.valid_until_epoch_minutes <= now_minutes {
                        *slot = None;
                    }
                }
            }
        });
    }
}

fn prefix_matches(prefix: &Address, prefix_len: u8, addr: &Address) -> bool {
    let full_bytes = (prefix_len / 8) as usize;
    let remaining_bits = prefix_len & 0x7;
    if prefix.0[..full_bytes] != addr.0[..full_bytes] {
        return false;
    }
    if remaining_bits != 0 {
        let mask = 0xffu8 << (8 - remaining_bits);
        if (prefix.0[full_bytes] & mask) != (addr.0[full_bytes] & mask) {
            return false;
        }
    }
    true
}

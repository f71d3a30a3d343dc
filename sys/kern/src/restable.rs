// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resource table processor.
//!
//! Parses the versioned header-plus-offset-array format a companion core's
//! firmware places at a fixed location in its image, validates it, and
//! walks its entries: `CARVEOUT` and (non-window) `DEVMEM` entries get
//! physical backing allocated by the [`PhysAllocator`] hook and patched back
//! into the table's bytes; the first `DEVMEM` entry in the table is instead
//! treated as the vring window for the `VDEV` entry immediately before it;
//! `TRACE`/`CRASHDUMP` entries are recorded without allocation. This is the
//! one place in the substrate where the host writes into what is
//! conceptually the remote core's own memory.

use core::mem::size_of;
use xproc_abi::{
    CarveoutEntry, CrashdumpEntry, DevmemEntry, Error, MemoryEntry, ResourceEntryKind,
    ResourceTableHeader, TraceEntry, VdevEntry, VringInfo, VringsDescriptor, RSC_TABLE_VERSION,
};
use zerocopy::{FromBytes, IntoBytes};

/// Physical memory allocator hook used to back carveout/devmem/vdev
/// entries.
pub trait PhysAllocator {
    fn alloc(&mut self, len: u32, align: u32) -> Option<u64>;

    /// Releases a prior allocation. Defaulted to a no-op so allocators that
    /// never need to give memory back (e.g. a one-shot bump allocator used
    /// only in tests) don't have to implement it; a walk that fails partway
    /// through calls this for every allocation it already made, in reverse
    /// order.
    fn free(&mut self, _pa: u64, _len: u32) {}
}

/// A parsed entry, borrowing its header back into the table's raw bytes so
/// the table doesn't need an allocator to hand these back. This is the
/// value every arm of the entry walk below constructs and matches on --
/// the type itself carries no logic, but it's what keeps each kind's
/// handling honest about which fields it may mutate.
#[derive(Debug)]
pub enum ParsedEntry<'a> {
    Carveout(&'a mut CarveoutEntry),
    Devmem(&'a mut DevmemEntry),
    Trace(&'a TraceEntry),
    Vdev(&'a VdevEntry),
    Crashdump(&'a CrashdumpEntry),
}

/// Upper bound on vrings a single `VDEV` entry may declare.
pub const MAX_VRINGS_PER_VDEV: usize = 4;
/// Upper bound on buffers a single vring may declare.
pub const MAX_BUFS_PER_VRING: usize = 256;
/// Per-buffer size assumed for a vring's buffer region.
///
/// `VringInfo` carries no per-buffer-size field of its own -- the real
/// message-transport collaborator that owns buffer sizing is out of scope
/// here, so this stands in for its contract.
pub const DEFAULT_VRING_BUFFER_SIZE: u32 = 256;
/// Per-descriptor overhead assumed for a vring's descriptor-ring region.
const VRING_DESC_SIZE: u32 = 16;
const ONE_MIB: u64 = 1024 * 1024;

fn round_up_to_1mib(len: u64) -> u64 {
    (len + ONE_MIB - 1) / ONE_MIB * ONE_MIB
}

/// Gates whether the walk may fall back to [`PhysAllocator`] for an unset
/// `CARVEOUT`/`DEVMEM`/`VDEV` physical address.
///
/// Both flags must be set for the fallback allocator path to run;
/// otherwise an unset address is reported as [`Error::AllocationFailed`]
/// rather than silently left at zero. Named-carveout-region sub-allocation
/// (satisfying a request out of a specific pre-registered carveout rather
/// than the generic allocator) is not modeled here.
#[derive(Copy, Clone, Debug)]
pub struct ResourceTableConfig {
    pub allow_alloc: bool,
    pub mmu_enabled: bool,
}

impl Default for ResourceTableConfig {
    fn default() -> Self {
        Self {
            allow_alloc: true,
            mmu_enabled: true,
        }
    }
}

/// Everything the walk produced: the physical backing it resolved for every
/// memory-bearing entry, the ring/buffer layout it chose for each `VDEV`,
/// and the trace/crashdump locations it recorded.
#[derive(Debug)]
pub struct ResourceTableResult {
    pub memory_entries: heapless::Vec<MemoryEntry, 16>,
    pub vrings: heapless::Vec<VringsDescriptor, 8>,
    pub traces: heapless::Vec<TraceEntry, 4>,
    pub crashdumps: heapless::Vec<CrashdumpEntry, 4>,
    pub patched_carveouts: u32,
}

impl ResourceTableResult {
    fn empty() -> Self {
        Self {
            memory_entries: heapless::Vec::new(),
            vrings: heapless::Vec::new(),
            traces: heapless::Vec::new(),
            crashdumps: heapless::Vec::new(),
            patched_carveouts: 0,
        }
    }
}

/// Validates `bytes` as a resource table and returns the entry offsets
/// (relative to `bytes`), without interpreting any entry payload yet.
///
/// This is split from entry interpretation so a caller who only wants the
/// entry count (e.g. to size a fixed-capacity array before walking) doesn't
/// pay for parsing entries it won't look at.
pub fn validate(bytes: &[u8]) -> Result<(&ResourceTableHeader, &[u8]), Error> {
    let header_len = size_of::<ResourceTableHeader>();
    if bytes.len() < header_len {
        return Err(Error::MalformedResourceTable);
    }
    let header = ResourceTableHeader::ref_from_bytes(&bytes[..header_len])
        .map_err(|_| Error::MalformedResourceTable)?;
    if header.version != RSC_TABLE_VERSION {
        return Err(Error::MalformedResourceTable);
    }
    let offsets_len = header.num_entries as usize * size_of::<u32>();
    let rest = &bytes[header_len..];
    if rest.len() < offsets_len {
        return Err(Error::MalformedResourceTable);
    }
    Ok((header, bytes))
}

/// Walks every entry in the table, dispatching by [`ResourceEntryKind`].
/// Collects every physical allocation it makes into `allocations` so the
/// caller can roll them back if a later entry fails validation.
fn walk_entries(
    bytes: &mut [u8],
    offsets: &[u32],
    alloc: &mut impl PhysAllocator,
    config: &ResourceTableConfig,
    result: &mut ResourceTableResult,
    allocations: &mut heapless::Vec<(u64, u32), 16>,
) -> Result<(), Error> {
    let mut last_vdev: Option<VringsDescriptor> = None;
    let mut vring_window_seen = false;

    for &offset in offsets {
        let offset = offset as usize;
        let kind_len = size_of::<u32>();
        if offset + kind_len > bytes.len() {
            return Err(Error::MalformedResourceTable);
        }
        let kind = u32::from_le_bytes(bytes[offset..offset + kind_len].try_into().unwrap());
        let entry_start = offset + kind_len;

        if kind == ResourceEntryKind::CARVEOUT.as_u32() {
            let entry_len = size_of::<CarveoutEntry>();
            if entry_start + entry_len > bytes.len() {
                return Err(Error::MalformedResourceTable);
            }
            let entry =
                CarveoutEntry::mut_from_bytes(&mut bytes[entry_start..entry_start + entry_len])
                    .map_err(|_| Error::MalformedResourceTable)?;
            let ParsedEntry::Carveout(entry) = ParsedEntry::Carveout(entry) else {
                unreachable!()
            };
            if entry.pa == 0 {
                if !(config.allow_alloc && config.mmu_enabled) {
                    return Err(Error::AllocationFailed);
                }
                let pa = alloc.alloc(entry.len, 1).ok_or(Error::AllocationFailed)?;
                entry.pa = pa;
                let _ = allocations.push((pa, entry.len));
                result.patched_carveouts += 1;
            }
            let _ = result.memory_entries.push(MemoryEntry {
                device_address: entry.da,
                phys_address: entry.pa,
                len: entry.len,
                map_mask: entry.flags,
                cache_enabled: false,
            });
        } else if kind == ResourceEntryKind::DEVMEM.as_u32() {
            let entry_len = size_of::<DevmemEntry>();
            if entry_start + entry_len > bytes.len() {
                return Err(Error::MalformedResourceTable);
            }
            let entry =
                DevmemEntry::mut_from_bytes(&mut bytes[entry_start..entry_start + entry_len])
                    .map_err(|_| Error::MalformedResourceTable)?;
            let ParsedEntry::Devmem(entry) = ParsedEntry::Devmem(entry) else {
                unreachable!()
            };
            if !vring_window_seen {
                vring_window_seen = true;
                let vdev = last_vdev.take().ok_or(Error::VdevAfterDevmem)?;
                if entry.pa == 0 {
                    entry.pa = vdev.ring_phys_base;
                } else if entry.pa != vdev.ring_phys_base {
                    return Err(Error::InvalidVdevDescriptor);
                }
            } else if entry.pa == 0 {
                if !(config.allow_alloc && config.mmu_enabled) {
                    return Err(Error::AllocationFailed);
                }
                let pa = alloc.alloc(entry.len, 1).ok_or(Error::AllocationFailed)?;
                entry.pa = pa;
                let _ = allocations.push((pa, entry.len));
            }
            let _ = result.memory_entries.push(MemoryEntry {
                device_address: entry.da,
                phys_address: entry.pa,
                len: entry.len,
                map_mask: 0,
                cache_enabled: false,
            });
        } else if kind == ResourceEntryKind::TRACE.as_u32() {
            let entry_len = size_of::<TraceEntry>();
            if entry_start + entry_len > bytes.len() {
                return Err(Error::MalformedResourceTable);
            }
            let entry = TraceEntry::ref_from_bytes(&bytes[entry_start..entry_start + entry_len])
                .map_err(|_| Error::MalformedResourceTable)?;
            let ParsedEntry::Trace(entry) = ParsedEntry::Trace(entry) else {
                unreachable!()
            };
            result
                .traces
                .push(*entry)
                .map_err(|_| Error::MalformedResourceTable)?;
        } else if kind == ResourceEntryKind::VDEV.as_u32() {
            let vdev_len = size_of::<VdevEntry>();
            if entry_start + vdev_len > bytes.len() {
                return Err(Error::MalformedResourceTable);
            }
            let vdev = VdevEntry::ref_from_bytes(&bytes[entry_start..entry_start + vdev_len])
                .map_err(|_| Error::MalformedResourceTable)?;
            let ParsedEntry::Vdev(vdev) = ParsedEntry::Vdev(vdev) else {
                unreachable!()
            };

            let num_vrings = vdev.num_vrings as usize;
            if num_vrings == 0 || num_vrings > MAX_VRINGS_PER_VDEV {
                return Err(Error::InvalidVdevDescriptor);
            }
            let vring_info_len = size_of::<VringInfo>();
            let vrings_start = entry_start + vdev_len;
            let vrings_len = num_vrings * vring_info_len;
            if vrings_start + vrings_len > bytes.len() {
                return Err(Error::MalformedResourceTable);
            }

            let mut ring_total: u64 = 0;
            let mut buffer_total: u64 = 0;
            for i in 0..num_vrings {
                let start = vrings_start + i * vring_info_len;
                let info = VringInfo::ref_from_bytes(&bytes[start..start + vring_info_len])
                    .map_err(|_| Error::MalformedResourceTable)?;
                if info.align == 0 || !info.align.is_power_of_two() {
                    return Err(Error::InvalidVdevDescriptor);
                }
                if info.num_bufs == 0 || info.num_bufs as usize > MAX_BUFS_PER_VRING {
                    return Err(Error::InvalidVdevDescriptor);
                }
                let align = u64::from(info.align);
                let ring_bytes = u64::from(info.num_bufs) * u64::from(VRING_DESC_SIZE);
                ring_total += (ring_bytes + align - 1) & !(align - 1);
                buffer_total += u64::from(info.num_bufs) * u64::from(DEFAULT_VRING_BUFFER_SIZE);
            }
            let total = round_up_to_1mib(ring_total + buffer_total);
            let total_u32: u32 = total.try_into().map_err(|_| Error::InvalidVdevDescriptor)?;

            if !(config.allow_alloc && config.mmu_enabled) {
                return Err(Error::AllocationFailed);
            }
            let base = alloc
                .alloc(total_u32, ONE_MIB as u32)
                .ok_or(Error::AllocationFailed)?;
            let _ = allocations.push((base, total_u32));

            let descriptor = VringsDescriptor {
                vdev_id: vdev.id,
                notify_id: vdev.notify_id,
                ring_phys_base: base,
                buffer_phys_base: base + ring_total,
                total_len: total_u32,
            };
            result
                .vrings
                .push(descriptor)
                .map_err(|_| Error::MalformedResourceTable)?;
            last_vdev = Some(descriptor);
        } else if kind == ResourceEntryKind::CRASHDUMP.as_u32() {
            let entry_len = size_of::<CrashdumpEntry>();
            if entry_start + entry_len > bytes.len() {
                return Err(Error::MalformedResourceTable);
            }
            let entry =
                CrashdumpEntry::ref_from_bytes(&bytes[entry_start..entry_start + entry_len])
                    .map_err(|_| Error::MalformedResourceTable)?;
            let ParsedEntry::Crashdump(entry) = ParsedEntry::Crashdump(entry) else {
                unreachable!()
            };
            result
                .crashdumps
                .push(*entry)
                .map_err(|_| Error::MalformedResourceTable)?;
        } else {
            return Err(Error::UnknownResourceEntry);
        }
    }
    Ok(())
}

/// Processes a resource table end to end: validates the header, walks every
/// entry, allocates and patches physical backing where needed, and returns
/// the memory map and vring/trace/crashdump descriptors the walk produced.
///
/// Idempotent for entries that already have a non-zero physical address --
/// re-running this against an already-patched table (e.g. after a restart
/// that kept the same firmware image) allocates nothing new for them, only
/// reporting their existing backing in `memory_entries`.
///
/// If any entry fails validation partway through, every allocation already
/// made during this call is released via [`PhysAllocator::free`] before the
/// error is returned -- a partially-patched table is never left behind.
pub fn process_table(
    bytes: &mut [u8],
    alloc: &mut impl PhysAllocator,
    config: ResourceTableConfig,
) -> Result<ResourceTableResult, Error> {
    let header_len = size_of::<ResourceTableHeader>();
    if bytes.len() < header_len {
        return Err(Error::MalformedResourceTable);
    }
    let (header_bytes, rest) = bytes.split_at(header_len);
    let header = ResourceTableHeader::ref_from_bytes(header_bytes)
        .map_err(|_| Error::MalformedResourceTable)?;
    if header.version != RSC_TABLE_VERSION {
        return Err(Error::MalformedResourceTable);
    }
    let num_entries = header.num_entries as usize;
    let offsets_len = num_entries * size_of::<u32>();
    if rest.len() < offsets_len {
        return Err(Error::MalformedResourceTable);
    }

    let mut offsets = [0u32; 64];
    if num_entries > offsets.len() {
        return Err(Error::MalformedResourceTable);
    }
    for (i, chunk) in rest[..offsets_len].chunks_exact(4).enumerate() {
        offsets[i] = u32::from_le_bytes(chunk.try_into().unwrap());
    }

    let mut result = ResourceTableResult::empty();
    let mut allocations: heapless::Vec<(u64, u32), 16> = heapless::Vec::new();

    match walk_entries(
        bytes,
        &offsets[..num_entries],
        alloc,
        &config,
        &mut result,
        &mut allocations,
    ) {
        Ok(()) => Ok(result),
        Err(e) => {
            for (pa, len) in allocations.iter().rev() {
                alloc.free(*pa, *len);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BumpAllocator {
        next: u64,
    }

    impl PhysAllocator for BumpAllocator {
        fn alloc(&mut self, len: u32, align: u32) -> Option<u64> {
            let align = align.max(1);
            let aligned = (self.next + u64::from(align) - 1) & !(u64::from(align) - 1);
            self.next = aligned + u64::from(len);
            Some(aligned)
        }
    }

    /// Allocator that fails every call, and records every `free` it sees so
    /// rollback-on-failure can be asserted against.
    struct CountingFreeAllocator {
        inner: BumpAllocator,
        freed: std::vec::Vec<(u64, u32)>,
        fail_after: usize,
        calls: usize,
    }

    impl PhysAllocator for CountingFreeAllocator {
        fn alloc(&mut self, len: u32, align: u32) -> Option<u64> {
            if self.calls >= self.fail_after {
                return None;
            }
            self.calls += 1;
            self.inner.alloc(len, align)
        }

        fn free(&mut self, pa: u64, len: u32) {
            self.freed.push((pa, len));
        }
    }

    fn header(num_entries: u32) -> ResourceTableHeader {
        ResourceTableHeader {
            version: RSC_TABLE_VERSION,
            num_entries,
            reserved: [0; 2],
        }
    }

    fn build_single_carveout(carveout_len: u32, pa: u64) -> std::vec::Vec<u8> {
        let mut bytes = std::vec::Vec::new();
        bytes.extend_from_slice(header(1).as_bytes());
        let offset_to_entry = size_of::<ResourceTableHeader>() as u32 + 4;
        bytes.extend_from_slice(&offset_to_entry.to_le_bytes());
        bytes.extend_from_slice(&ResourceEntryKind::CARVEOUT.as_u32().to_le_bytes());
        let entry = CarveoutEntry {
            da: 0x1000,
            pa,
            len: carveout_len,
            flags: 0,
            name: [0; 32],
        };
        bytes.extend_from_slice(entry.as_bytes());
        bytes
    }

    #[test]
    fn validate_accepts_well_formed_table() {
        let bytes = build_single_carveout(4096, 0);
        let (header, _) = validate(&bytes).unwrap();
        assert_eq!(header.num_entries, 1);
    }

    #[test]
    fn validate_rejects_truncated_table() {
        let bytes = build_single_carveout(4096, 0);
        assert_eq!(
            validate(&bytes[..4]).unwrap_err(),
            Error::MalformedResourceTable
        );
    }

    #[test]
    fn patches_unset_carveout_pa() {
        let mut bytes = build_single_carveout(4096, 0);
        let mut alloc = BumpAllocator { next: 0x9000_0000 };
        let result = process_table(&mut bytes, &mut alloc, ResourceTableConfig::default()).unwrap();
        assert_eq!(result.patched_carveouts, 1);
        assert_eq!(result.memory_entries.len(), 1);
        assert_ne!(result.memory_entries[0].phys_address, 0);
    }

    #[test]
    fn is_idempotent_when_already_patched() {
        let mut bytes = build_single_carveout(4096, 0x9000_0000);
        let mut alloc = BumpAllocator { next: 0xa000_0000 };
        let result = process_table(&mut bytes, &mut alloc, ResourceTableConfig::default()).unwrap();
        assert_eq!(result.patched_carveouts, 0);
        assert_eq!(result.memory_entries[0].phys_address, 0x9000_0000);
    }

    #[test]
    fn alloc_disabled_reports_allocation_failed() {
        let mut bytes = build_single_carveout(4096, 0);
        let mut alloc = BumpAllocator { next: 0x9000_0000 };
        let config = ResourceTableConfig {
            allow_alloc: false,
            mmu_enabled: true,
        };
        assert_eq!(
            process_table(&mut bytes, &mut alloc, config).unwrap_err(),
            Error::AllocationFailed
        );
    }

    /// Builds a table with one `VDEV` (two vrings), one `DEVMEM` vring
    /// window, one `TRACE`, and one `CRASHDUMP` entry, in that order.
    fn build_full_table() -> std::vec::Vec<u8> {
        let mut bytes = std::vec::Vec::new();
        bytes.extend_from_slice(header(4).as_bytes());
        let offsets_start = size_of::<ResourceTableHeader>();
        let offsets_len = 4 * 4;
        let mut body = std::vec::Vec::new();

        let vdev_off = offsets_start + offsets_len + body.len();
        body.extend_from_slice(&ResourceEntryKind::VDEV.as_u32().to_le_bytes());
        let vdev = VdevEntry {
            id: 7,
            notify_id: 1,
            num_vrings: 2,
            reserved: 0,
        };
        body.extend_from_slice(vdev.as_bytes());
        for _ in 0..2 {
            let vring = VringInfo {
                da: 0,
                align: 16,
                num_bufs: 4,
            };
            body.extend_from_slice(vring.as_bytes());
        }

        let devmem_off = offsets_start + offsets_len + body.len();
        body.extend_from_slice(&ResourceEntryKind::DEVMEM.as_u32().to_le_bytes());
        let devmem = DevmemEntry {
            da: 0x2000,
            pa: 0,
            len: 4096,
            name: [0; 32],
        };
        body.extend_from_slice(devmem.as_bytes());

        let trace_off = offsets_start + offsets_len + body.len();
        body.extend_from_slice(&ResourceEntryKind::TRACE.as_u32().to_le_bytes());
        let trace = TraceEntry {
            da: 0x3000,
            len: 256,
            name: [0; 32],
        };
        body.extend_from_slice(trace.as_bytes());

        let crash_off = offsets_start + offsets_len + body.len();
        body.extend_from_slice(&ResourceEntryKind::CRASHDUMP.as_u32().to_le_bytes());
        let crash = CrashdumpEntry {
            da: 0x4000,
            pa: 0x5000_0000,
            len: 1024,
            name: [0; 32],
        };
        body.extend_from_slice(crash.as_bytes());

        for off in [vdev_off as u32, devmem_off as u32, trace_off as u32, crash_off as u32] {
            bytes.extend_from_slice(&off.to_le_bytes());
        }
        bytes.extend_from_slice(&body);
        bytes
    }

    #[test]
    fn full_walk_patches_vdev_window_and_records_trace_and_crashdump() {
        let mut bytes = build_full_table();
        let mut alloc = BumpAllocator { next: 0x9000_0000 };
        let result = process_table(&mut bytes, &mut alloc, ResourceTableConfig::default()).unwrap();

        assert_eq!(result.vrings.len(), 1);
        assert_eq!(result.traces.len(), 1);
        assert_eq!(result.crashdumps.len(), 1);
        // the devmem vring window and the crashdump entry both surface as
        // memory entries; the trace entry does not.
        assert_eq!(result.memory_entries.len(), 1);
        assert_eq!(result.memory_entries[0].phys_address, result.vrings[0].ring_phys_base);
    }

    #[test]
    fn devmem_vring_window_with_no_preceding_vdev_is_rejected() {
        let mut bytes = std::vec::Vec::new();
        bytes.extend_from_slice(header(1).as_bytes());
        let offset_to_entry = size_of::<ResourceTableHeader>() as u32 + 4;
        bytes.extend_from_slice(&offset_to_entry.to_le_bytes());
        bytes.extend_from_slice(&ResourceEntryKind::DEVMEM.as_u32().to_le_bytes());
        let devmem = DevmemEntry {
            da: 0x2000,
            pa: 0,
            len: 4096,
            name: [0; 32],
        };
        bytes.extend_from_slice(devmem.as_bytes());

        let mut alloc = BumpAllocator { next: 0x9000_0000 };
        assert_eq!(
            process_table(&mut bytes, &mut alloc, ResourceTableConfig::default()).unwrap_err(),
            Error::VdevAfterDevmem
        );
    }

    #[test]
    fn failed_entry_rolls_back_earlier_allocations() {
        // two carveouts: the first allocates fine, the second hits an
        // allocator that has already exhausted its budget.
        let mut bytes = std::vec::Vec::new();
        bytes.extend_from_slice(header(2).as_bytes());
        let offsets_start = size_of::<ResourceTableHeader>();
        let entry_len = 4 + size_of::<CarveoutEntry>();
        let first_off = offsets_start + 8;
        let second_off = first_off + entry_len;
        bytes.extend_from_slice(&(first_off as u32).to_le_bytes());
        bytes.extend_from_slice(&(second_off as u32).to_le_bytes());
        for _ in 0..2 {
            bytes.extend_from_slice(&ResourceEntryKind::CARVEOUT.as_u32().to_le_bytes());
            let entry = CarveoutEntry {
                da: 0x1000,
                pa: 0,
                len: 4096,
                flags: 0,
                name: [0; 32],
            };
            bytes.extend_from_slice(entry.as_bytes());
        }

        let mut alloc = CountingFreeAllocator {
            inner: BumpAllocator { next: 0x9000_0000 },
            freed: std::vec::Vec::new(),
            fail_after: 1,
            calls: 0,
        };
        assert_eq!(
            process_table(&mut bytes, &mut alloc, ResourceTableConfig::default()).unwrap_err(),
            Error::AllocationFailed
        );
        assert_eq!(alloc.freed.len(), 1);
    }
}

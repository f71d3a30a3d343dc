//! Resource-table bootstrap through `xproc_kern::orchestrator`, using the
//! same header-plus-offset-array wire format a companion core's firmware
//! would carry.

use xproc_abi::{CarveoutEntry, ResourceEntryKind, ResourceTableHeader, RSC_TABLE_VERSION};
use xproc_kern::orchestrator::bootstrap_resource_table;
use xproc_kern::restable::{PhysAllocator, ResourceTableConfig};
use zerocopy::IntoBytes;

struct BumpAllocator {
    next: u64,
}

impl PhysAllocator for BumpAllocator {
    fn alloc(&mut self, len: u32, align: u32) -> Option<u64> {
        let align = u64::from(align.max(1));
        let aligned = (self.next + align - 1) & !(align - 1);
        self.next = aligned + u64::from(len);
        Some(aligned)
    }
}

fn build_table(entries: &[(u32, u64)]) -> Vec<u8> {
    let header = ResourceTableHeader {
        version: RSC_TABLE_VERSION,
        num_entries: entries.len() as u32,
        reserved: [0; 2],
    };
    let header_len = std::mem::size_of::<ResourceTableHeader>() as u32;
    let offsets_len = entries.len() as u32 * 4;
    let mut offsets = Vec::new();
    let mut payload = Vec::new();
    let mut cursor = header_len + offsets_len;
    for &(len, pa) in entries {
        offsets.push(cursor);
        payload.extend_from_slice(&ResourceEntryKind::CARVEOUT.as_u32().to_le_bytes());
        let entry = CarveoutEntry {
            da: 0x2000,
            pa,
            len,
            flags: 0,
            name: [0; 32],
        };
        payload.extend_from_slice(entry.as_bytes());
        cursor += 4 + std::mem::size_of::<CarveoutEntry>() as u32;
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(header.as_bytes());
    for offset in offsets {
        bytes.extend_from_slice(&offset.to_le_bytes());
    }
    bytes.extend_from_slice(&payload);
    bytes
}

#[test]
fn bootstrap_patches_every_unset_carveout() {
    let mut bytes = build_table(&[(4096, 0), (8192, 0)]);
    let mut alloc = BumpAllocator { next: 0x8000_0000 };
    let result =
        bootstrap_resource_table(&mut bytes, &mut alloc, ResourceTableConfig::default()).unwrap();
    assert_eq!(result.patched_carveouts, 2);
    assert_eq!(result.memory_entries.len(), 2);
}

#[test]
fn bootstrap_leaves_already_patched_carveouts_alone() {
    let mut bytes = build_table(&[(4096, 0x8000_0000)]);
    let mut alloc = BumpAllocator { next: 0x9000_0000 };
    let result =
        bootstrap_resource_table(&mut bytes, &mut alloc, ResourceTableConfig::default()).unwrap();
    assert_eq!(result.patched_carveouts, 0);
    assert_eq!(result.memory_entries[0].phys_address, 0x8000_0000);
}

#[test]
fn bootstrap_rejects_a_truncated_table() {
    let bytes = build_table(&[(4096, 0)]);
    let mut truncated = bytes[..4].to_vec();
    let mut alloc = BumpAllocator { next: 0x8000_0000 };
    assert!(
        bootstrap_resource_table(&mut truncated, &mut alloc, ResourceTableConfig::default())
            .is_err()
    );
}

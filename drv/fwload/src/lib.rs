// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ELF32 firmware image parsing, via `goblin`.
//!
//! Companion-core firmware is built as a freestanding ELF32 binary. The
//! resource table lives at the symbol named
//! [`drv_xproc_fwload_api::RESOURCE_TABLE_SYMBOL`]; this crate resolves that
//! symbol's virtual address down to a file offset by walking the section
//! headers, the same way a loader would resolve it to a load address.

use anyhow::{anyhow, Context};
use drv_xproc_fwload_api::{FirmwareImage, RESOURCE_TABLE_SYMBOL};
use goblin::elf::Elf;
use xproc_abi::Error;

/// A parsed ELF32 firmware image.
pub struct GoblinFirmwareImage {
    bytes: Vec<u8>,
    resource_table: (u32, u32),
    entry: u64,
}

impl GoblinFirmwareImage {
    /// Parses `bytes` as an ELF32 image and resolves the resource table
    /// symbol's file offset.
    pub fn parse(bytes: Vec<u8>) -> anyhow::Result<Self> {
        let elf = Elf::parse(&bytes).context("parsing ELF firmware image")?;

        let sym = elf
            .syms
            .iter()
            .find(|sym| {
                elf.strtab
                    .get_at(sym.st_name)
                    .map(|name| name == RESOURCE_TABLE_SYMBOL)
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("firmware image has no `{RESOURCE_TABLE_SYMBOL}` symbol"))?;

        let shdr = elf
            .section_headers
            .get(sym.st_shndx)
            .ok_or_else(|| anyhow!("resource table symbol points at an invalid section"))?;

        let file_offset = shdr.sh_offset + (sym.st_value - shdr.sh_addr);
        let resource_table = (file_offset as u32, sym.st_size as u32);

        Ok(Self {
            bytes,
            resource_table,
            entry: elf.entry,
        })
    }
}

impl FirmwareImage for GoblinFirmwareImage {
    fn resource_table(&self) -> Result<(u32, u32), Error> {
        let (offset, len) = self.resource_table;
        let end = offset
            .checked_add(len)
            .ok_or(Error::MalformedResourceTable)?;
        if end as usize > self.bytes.len() {
            return Err(Error::MalformedResourceTable);
        }
        Ok(self.resource_table)
    }

    fn entry_point(&self) -> u64 {
        self.entry
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_elf_bytes() {
        let err = GoblinFirmwareImage::parse(vec![0u8; 16]).unwrap_err();
        assert!(err.to_string().contains("parsing ELF"));
    }
}

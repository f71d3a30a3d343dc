// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cluster configuration for `xproc-clusterd`: which companion cores exist,
//! where their firmware images live, and how they're named.
//!
//! The shape here (kebab-case TOML, `deny_unknown_fields`, a typed struct
//! per table) follows the same config-file convention the rest of this
//! tree's host tooling uses for its own build-time TOML manifests.

use anyhow::Context;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level cluster manifest: one entry per companion core this host
/// manages.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ClusterConfig {
    pub name: String,
    pub cores: BTreeMap<String, CoreConfig>,
}

/// Configuration for a single companion core.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CoreConfig {
    /// The core's id as it appears in `xproc_abi::CoreId`.
    pub remote_id: u8,
    /// Path to the core's firmware image, relative to the manifest file.
    pub firmware: PathBuf,
    /// Override for the gate-acquire hardware spin limit; falls back to
    /// [`xproc_client::ClientConfig`]'s default when absent.
    #[serde(default)]
    pub spin_limit: Option<u32>,
}

impl ClusterConfig {
    /// Loads and validates a cluster manifest from `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading cluster manifest {}", path.display()))?;
        let config: ClusterConfig = toml::from_str(&text)
            .with_context(|| format!("parsing cluster manifest {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for (name, core) in &self.cores {
            if core.remote_id as usize >= xproc_abi::MAX_CORES {
                anyhow::bail!(
                    "core `{name}`: remote-id {} is out of range (max {})",
                    core.remote_id,
                    xproc_abi::MAX_CORES - 1
                );
            }
            if !seen.insert(core.remote_id) {
                anyhow::bail!("core `{name}`: remote-id {} is reused", core.remote_id);
            }
        }
        Ok(())
    }
}

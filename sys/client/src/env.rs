// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment-driven client configuration.
//!
//! `XPROC_PARAMS` carries `key=value` pairs separated by `;`, e.g.
//! `local=0;spin-limit=4096`. This mirrors the compile-time `TaskSlot`
//! binding this tree otherwise uses to wire a task to its peers, except
//! resolved at process startup instead of link time, since a host-side
//! client doesn't have a build-time app descriptor to bind against.

use xproc_abi::CoreId;

const ENV_VAR: &str = "XPROC_PARAMS";

#[derive(Copy, Clone, Debug)]
pub struct ClientConfig {
    pub local: CoreId,
    /// Spin count passed to [`xproc_kern::gate::acquire`] when the client
    /// doesn't specify its own.
    pub spin_limit: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            local: CoreId::HOST,
            spin_limit: 10_000,
        }
    }
}

impl ClientConfig {
    /// Parses [`ENV_VAR`] if set, falling back to defaults for any field it
    /// doesn't mention. Absence of the variable entirely is not an error --
    /// plenty of deployments are fine with every default.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        let Ok(raw) = std::env::var(ENV_VAR) else {
            return Ok(config);
        };
        config.apply(&raw)?;
        Ok(config)
    }

    fn apply(&mut self, raw: &str) -> anyhow::Result<()> {
        for pair in raw.split(';').filter(|s| !s.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("malformed {ENV_VAR} entry: {pair:?}"))?;
            match key.trim() {
                "local" => {
                    let id: u8 = value
                        .trim()
                        .parse()
                        .map_err(|_| anyhow::anyhow!("bad local core id: {value:?}"))?;
                    self.local = CoreId(id);
                }
                "spin-limit" => {
                    self.spin_limit = value
                        .trim()
                        .parse()
                        .map_err(|_| anyhow::anyhow!("bad spin-limit: {value:?}"))?;
                }
                other => {
                    anyhow::bail!("unknown {ENV_VAR} key: {other:?}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_no_input() {
        let config = ClientConfig::default();
        assert_eq!(config.local, CoreId::HOST);
    }

    #[test]
    fn parses_both_keys() {
        let mut config = ClientConfig::default();
        config.apply("local=2;spin-limit=99").unwrap();
        assert_eq!(config.local, CoreId(2));
        assert_eq!(config.spin_limit, 99);
    }

    #[test]
    fn rejects_unknown_key() {
        let mut config = ClientConfig::default();
        assert!(config.apply("bogus=1").is_err());
    }

    #[test]
    fn tolerates_trailing_semicolon() {
        let mut config = ClientConfig::default();
        config.apply("local=3;").unwrap();
        assert_eq!(config.local, CoreId(3));
    }

    proptest::proptest! {
        /// `apply` never panics on arbitrary input, and a pair built from a
        /// value `apply` itself accepted always round-trips back out.
        #[test]
        fn local_assignment_round_trips(id: u8) {
            let mut config = ClientConfig::default();
            config.apply(&format!("local={id}")).unwrap();
            proptest::prop_assert_eq!(config.local, CoreId(id));
        }

        #[test]
        fn spin_limit_assignment_round_trips(limit: u32) {
            let mut config = ClientConfig::default();
            config.apply(&format!("spin-limit={limit}")).unwrap();
            proptest::prop_assert_eq!(config.spin_limit, limit);
        }

        /// No sequence of `;`-joined garbage pairs should ever panic the
        /// parser -- it either accepts the entry or returns `Err`.
        #[test]
        fn arbitrary_input_never_panics(raw: String) {
            let mut config = ClientConfig::default();
            let _ = config.apply(&raw);
        }
    }
}

//! VM-wide tunables: quotas and initial heap sizing.
//!
//! Grouped into one `serde`-derived struct, loadable from a `quill.toml`
//! project file rather than threading a dozen constructor arguments
//! through every entry point.

use serde::{Deserialize, Serialize};

/// Default call-instruction budget per session: a *call* quota, default
/// 100,000.
pub const DEFAULT_CALL_QUOTA: u64 = 100_000;

/// Default fast-call (primitive dispatch) budget per session.
pub const DEFAULT_FAST_CALL_QUOTA: u64 = 1_000_000;

/// Default bound on native interpreter recursion depth.
pub const DEFAULT_RECURSION_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Instructions a session may dispatch before `error_loop`.
    pub call_quota: u64,
    /// Primitive calls a session may make before `error_loop`.
    pub fast_call_quota: u64,
    /// Native call-stack depth before `error_recurse`.
    pub recursion_limit: usize,
    /// Initial semispace size in bytes.
    pub initial_heap_size: u32,
    /// Fraction of capacity that, once exceeded post-collection, grows the
    /// next semispace.
    pub heap_growth_watermark: f64,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            call_quota: DEFAULT_CALL_QUOTA,
            fast_call_quota: DEFAULT_FAST_CALL_QUOTA,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            initial_heap_size: quill_core::heap::DEFAULT_HEAP_SIZE,
            heap_growth_watermark: 0.7,
        }
    }
}

impl VmConfig {
    pub fn from_toml(text: &str) -> Result<VmConfig, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quotas_are_100k_calls_and_1m_fast_calls() {
        let cfg = VmConfig::default();
        assert_eq!(cfg.call_quota, 100_000);
        assert_eq!(cfg.fast_call_quota, 1_000_000);
    }

    #[test]
    fn roundtrips_through_toml() {
        let cfg = VmConfig { call_quota: 42, ..VmConfig::default() };
        let text = cfg.to_toml().unwrap();
        let back = VmConfig::from_toml(&text).unwrap();
        assert_eq!(back.call_quota, 42);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg = VmConfig::from_toml("call_quota = 5\n").unwrap();
        assert_eq!(cfg.call_quota, 5);
        assert_eq!(cfg.fast_call_quota, DEFAULT_FAST_CALL_QUOTA);
    }
}

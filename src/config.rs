//! The configuration surface (§6, §10.3).
//!
//! `Config` is constructed once per generator run and handed to
//! `ModuleContext::new`. Like the teacher's `Store`/`Linker`, construction
//! goes through a small builder so call sites read as a sequence of named
//! overrides against sensible defaults rather than a positional struct
//! literal.

use crate::error::ConfigError;
use rulegen_core::ValueType;

/// Generation-time knobs, defaulted to the values noted in §4/§6.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub memory_pages: u32,
    pub table_size: u32,
    pub blacklist_types: alloc::vec::Vec<ValueType>,
    pub canonicalize_nans: bool,
    pub max_depth: u32,
    pub wrap_v128_args_via_i64: bool,

    pub p_use_typing: f64,
    pub p_interesting: f64,
    pub p_memarg_inbounds: f64,
    pub p_perturb: f64,
    pub p_reuse_global: f64,
    pub p_reuse_func: f64,
    pub p_struct_gen: f64,
    pub p_struct_exit: f64,
    pub p_struct_ret: f64,
    pub p_skip_else: f64,
    pub p_unreachable: f64,
    pub p_call: f64,
    pub p_call_indirect: f64,
    pub p_br_if: f64,
    pub p_br: f64,
    pub p_br_table: f64,
    pub p_stack_pop: f64,
    pub p_argconst: f64,
    pub p_var_gen: f64,
    pub p_multiret: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_pages: 1,
            table_size: 65536,
            blacklist_types: alloc::vec::Vec::new(),
            canonicalize_nans: true,
            max_depth: 5,
            wrap_v128_args_via_i64: false,

            p_use_typing: 0.8,
            p_interesting: 0.9,
            p_memarg_inbounds: 0.99,
            p_perturb: 0.05,
            p_reuse_global: 0.5,
            p_reuse_func: 0.9,
            p_struct_gen: 0.1,
            p_struct_exit: 0.1,
            p_struct_ret: 0.5,
            p_skip_else: 0.8,
            p_unreachable: 0.0001,
            p_call: 0.1,
            p_call_indirect: 0.001,
            p_br_if: 0.05,
            p_br: 0.05,
            p_br_table: 0.02,
            p_stack_pop: 0.9,
            p_argconst: 0.25,
            p_var_gen: 0.05,
            p_multiret: 0.2,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Checks the §6/§7 well-formedness rules: every `p_*` in `[0.0,
    /// 1.0]`, non-zero memory/table sizes, a blacklist that doesn't empty
    /// out every concrete value type.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_pages == 0 {
            return Err(ConfigError {
                field: "memory_pages",
                reason: "must be at least 1",
            });
        }
        if self.table_size == 0 {
            return Err(ConfigError {
                field: "table_size",
                reason: "must be at least 1",
            });
        }
        for (name, value) in self.probabilities() {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError {
                    field: name,
                    reason: "probability must lie in [0.0, 1.0]",
                });
            }
        }
        if self.blacklist_types.len() >= ValueType::ALL.len() {
            return Err(ConfigError {
                field: "blacklist_types",
                reason: "cannot blacklist every concrete value type",
            });
        }
        Ok(())
    }

    fn probabilities(&self) -> [(&'static str, f64); 19] {
        [
            ("p_use_typing", self.p_use_typing),
            ("p_interesting", self.p_interesting),
            ("p_memarg_inbounds", self.p_memarg_inbounds),
            ("p_perturb", self.p_perturb),
            ("p_reuse_global", self.p_reuse_global),
            ("p_reuse_func", self.p_reuse_func),
            ("p_struct_gen", self.p_struct_gen),
            ("p_struct_exit", self.p_struct_exit),
            ("p_struct_ret", self.p_struct_ret),
            ("p_skip_else", self.p_skip_else),
            ("p_unreachable", self.p_unreachable),
            ("p_call", self.p_call),
            ("p_call_indirect", self.p_call_indirect),
            ("p_br_if", self.p_br_if),
            ("p_br", self.p_br),
            ("p_br_table", self.p_br_table),
            ("p_stack_pop", self.p_stack_pop),
            ("p_argconst", self.p_argconst),
            ("p_var_gen", self.p_var_gen),
        ]
    }

    /// Memory budget reserved for mem-params (§4.4): `memory_pages · 64KiB
    /// / 16` sixteen-byte slots.
    pub fn max_mem_params(&self) -> u32 {
        (self.memory_pages * 65536) / 16
    }

    pub fn is_blacklisted(&self, ty: ValueType) -> bool {
        self.blacklist_types.contains(&ty)
    }
}

/// Builder for [`Config`]; every setter returns `Self` so calls chain.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: ConfigOrDefault,
}

#[derive(Debug, Clone)]
struct ConfigOrDefault(Config);

impl Default for ConfigOrDefault {
    fn default() -> Self {
        Self(Config::default())
    }
}

macro_rules! builder_setters {
    ($($field:ident: $ty:ty),* $(,)?) => {
        impl ConfigBuilder {
            $(
                pub fn $field(mut self, value: $ty) -> Self {
                    self.config.0.$field = value;
                    self
                }
            )*
        }
    };
}

builder_setters! {
    memory_pages: u32,
    table_size: u32,
    canonicalize_nans: bool,
    max_depth: u32,
    wrap_v128_args_via_i64: bool,
    p_br_table: f64,
}

impl ConfigBuilder {
    pub fn blacklist_type(mut self, ty: ValueType) -> Self {
        self.config.0.blacklist_types.push(ty);
        self
    }

    /// Builds the [`Config`], validating it against §7's `ConfigError`
    /// rules.
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.0.validate()?;
        Ok(self.config.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_table_size_is_rejected() {
        let err = Config::builder().table_size(0).build().unwrap_err();
        assert_eq!(err.field, "table_size");
    }

    #[test]
    fn blacklisting_every_type_is_rejected() {
        let mut builder = Config::builder();
        for ty in ValueType::ALL {
            builder = builder.blacklist_type(ty);
        }
        assert!(builder.build().is_err());
    }
}

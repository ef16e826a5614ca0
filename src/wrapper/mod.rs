//! The output-stage test harness shim (§4.7, C8).
//!
//! [`WrapperShim::Raw`] hands the module bytes back verbatim, for
//! engine-independent differential testing. [`WrapperShim::JsHarness`]
//! substitutes the module bytes and memory size into a small driver
//! template that calls `main` over either a full cross-product of
//! interesting-value tuples (≤2 params) or 1000 random draws from those
//! same tables (more params), logging each result plus a running checksum
//! of linear memory.
//!
//! `v128`/`funcref`/`externref` parameters have no direct JS calling
//! convention, so a harness request for a signature containing one of
//! them falls back to an empty argument list rather than guessing at a
//! representation.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use rulegen_core::{RandomnessSource, ValueType};

use crate::config::Config;
use crate::sampler::interesting;

/// Which output wrapping to apply to a generated module (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperShim {
    Raw,
    JsHarness,
}

const JS_TEMPLATE: &str = r#"const wasmBytes = new Uint8Array([WASM_CODE_HOLDER]);
const memoryMax = WASM_MEMORY_MAX;

function checksum(memory) {
    const view = new Uint8Array(memory.buffer, 0, Math.min(memory.buffer.byteLength, memoryMax));
    let sum = 0;
    for (let i = 0; i < view.length; i++) {
        sum = (sum + view[i] * (i + 1)) >>> 0;
    }
    return sum;
}

const argTuples = ARG_TUPLES_HOLDER;

(async () => {
    const { instance } = await WebAssembly.instantiate(wasmBytes, {});
    const { main, mem } = instance.exports;
    console.log(JSON.stringify([]), "=>", main(), "mem:", checksum(mem));
    for (const args of argTuples) {
        try {
            const result = main(...args);
            console.log(JSON.stringify(args), "=>", result, "mem:", checksum(mem));
        } catch (e) {
            console.log(JSON.stringify(args), "=> trap:", e.message);
        }
    }
})();
"#;

impl WrapperShim {
    /// Applies this shim to an already-emitted module. `main_params` is
    /// the exported `main` function's parameter signature, used by the
    /// `JsHarness` variant to build its argument tuples; ignored by `Raw`.
    pub fn render<R: RandomnessSource>(
        self,
        wasm_bytes: &[u8],
        config: &Config,
        main_params: &[ValueType],
        rng: &mut R,
    ) -> WrapperOutput {
        match self {
            WrapperShim::Raw => WrapperOutput::Bytes(wasm_bytes.to_vec()),
            WrapperShim::JsHarness => {
                WrapperOutput::Text(render_js_harness(wasm_bytes, config, main_params, rng))
            }
        }
    }
}

/// What a [`WrapperShim`] produces: raw bytes for `Raw`, driver source
/// text for `JsHarness`.
#[derive(Debug, Clone)]
pub enum WrapperOutput {
    Bytes(Vec<u8>),
    Text(String),
}

fn render_js_harness<R: RandomnessSource>(
    wasm_bytes: &[u8],
    config: &Config,
    main_params: &[ValueType],
    rng: &mut R,
) -> String {
    let code_holder = js_byte_array_literal(wasm_bytes);
    let memory_max = config.memory_pages * 65536;

    let arg_tuples = if main_params
        .iter()
        .any(|ty| ty.is_reference() || *ty == ValueType::V128)
    {
        js_arg_tuples_placeholder()
    } else if main_params.len() <= 2 {
        render_cross_product(main_params)
    } else {
        render_random_draws(main_params, config, rng)
    };

    JS_TEMPLATE
        .replace("WASM_CODE_HOLDER", &code_holder)
        .replace("WASM_MEMORY_MAX", &memory_max.to_string())
        .replace("ARG_TUPLES_HOLDER", &arg_tuples)
}

fn js_arg_tuples_placeholder() -> String {
    "[]".to_string()
}

fn js_byte_array_literal(bytes: &[u8]) -> String {
    bytes.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(",")
}

fn interesting_js_values(ty: ValueType) -> Vec<String> {
    match ty {
        ValueType::I32 => interesting::INTERESTING_I32.iter().map(|v| v.to_string()).collect(),
        ValueType::I64 => interesting::INTERESTING_I64.iter().map(|v| format!("{v}n")).collect(),
        ValueType::F32 => interesting::interesting_f32().iter().map(|v| js_float_literal(*v as f64)).collect(),
        ValueType::F64 => interesting::interesting_f64().iter().map(|v| js_float_literal(*v)).collect(),
        ValueType::V128 | ValueType::FuncRef | ValueType::ExternRef => Vec::new(),
    }
}

fn js_float_literal(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        format!("{v}")
    }
}

/// Full cross-product over each param's interesting-value table
/// (§4.7, ≤2-param case).
fn render_cross_product(params: &[ValueType]) -> String {
    let tables: Vec<Vec<String>> = params.iter().map(|ty| interesting_js_values(*ty)).collect();
    let mut tuples: Vec<Vec<String>> = alloc::vec![Vec::new()];
    for table in &tables {
        let mut next = Vec::new();
        for prefix in &tuples {
            for value in table {
                let mut tuple = prefix.clone();
                tuple.push(value.clone());
                next.push(tuple);
            }
        }
        tuples = next;
    }
    render_tuples(&tuples)
}

/// 1000 random draws from the interesting-value tables (§4.7, >2-param
/// case).
fn render_random_draws<R: RandomnessSource>(params: &[ValueType], config: &Config, rng: &mut R) -> String {
    let mut tuples = Vec::new();
    for _ in 0..1000 {
        let tuple: Vec<String> = params
            .iter()
            .map(|ty| {
                let table = interesting_js_values(*ty);
                if rng.choice_prob(config.p_interesting) && !table.is_empty() {
                    table[rng.choice(table.len())].clone()
                } else {
                    js_float_literal(rng.float() as f64)
                }
            })
            .collect();
        tuples.push(tuple);
    }
    render_tuples(&tuples)
}

fn render_tuples(tuples: &[Vec<String>]) -> String {
    let rows: Vec<String> = tuples.iter().map(|t| format!("[{}]", t.join(","))).collect();
    format!("[{}]", rows.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rulegen_core::PrngSource;

    #[test]
    fn raw_shim_returns_bytes_verbatim() {
        let bytes = alloc::vec![0u8, 1, 2];
        let mut rng = PrngSource::new(StdRng::seed_from_u64(0));
        match WrapperShim::Raw.render(&bytes, &Config::default(), &[], &mut rng) {
            WrapperOutput::Bytes(out) => assert_eq!(out, bytes),
            WrapperOutput::Text(_) => panic!("expected bytes"),
        }
    }

    #[test]
    fn js_harness_substitutes_both_placeholders() {
        let bytes = alloc::vec![0u8, 1, 2];
        let mut rng = PrngSource::new(StdRng::seed_from_u64(0));
        match WrapperShim::JsHarness.render(&bytes, &Config::default(), &[ValueType::I32], &mut rng) {
            WrapperOutput::Text(text) => {
                assert!(!text.contains("WASM_CODE_HOLDER"));
                assert!(!text.contains("WASM_MEMORY_MAX"));
                assert!(text.contains("0,1,2"));
            }
            WrapperOutput::Bytes(_) => panic!("expected text"),
        }
    }

    #[test]
    fn cross_product_covers_every_combination_for_two_params() {
        let text = render_cross_product(&[ValueType::I32, ValueType::I32]);
        let expected = interesting::INTERESTING_I32.len() * interesting::INTERESTING_I32.len();
        assert_eq!(text.matches("],[").count() + 1, expected);
    }
}

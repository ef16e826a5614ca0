//! Parsing the extracted-rule corpus text format (§6, §C3).
//!
//! Each non-empty, non-comment line describes one normalized rule:
//!
//! ```text
//! param_types | ret_types | body | conds
//! ```
//!
//! - `param_types`, `ret_types`: comma-separated [`ValueType`] names (`""`
//!   for none; §3 requires `|ret_types| <= 1`).
//! - `body`: space-separated instruction tokens, each either `arg:N`
//!   (consume positional parameter `N`) or `opcode(o0,o1,...)` where each
//!   `oN` is an oparg slot index. The final token is the rule's terminal
//!   opcode.
//! - `conds`: `;`-separated `slot:name(a0,a1,...)` entries, one set of
//!   [`Condition`]s per oparg slot (§4.3).
//!
//! A malformed line is not fatal (§7): [`parse_corpus`] skips it, records a
//! [`RuleLoadError`] with its line number, and continues.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use rulegen_core::ValueType;

use crate::condition::{Condition, ConditionExpr};
use crate::error::RuleLoadError;

/// One node of a rule's linearized body (§3's ValuePattern).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyNode {
    /// Consume positional rule parameter `index`.
    Arg(u32),
    /// Apply `opcode` to the named oparg slots.
    Op { opcode: String, opargs: Vec<u32> },
}

/// A normalized rule: typed parameters, typed returns, a linear body, and
/// per-oparg-slot conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrNode {
    pub param_types: Vec<ValueType>,
    pub ret_types: Vec<ValueType>,
    pub body: Vec<BodyNode>,
    pub conds: BTreeMap<u32, ConditionExpr>,
}

impl InstrNode {
    /// The rule's terminal opcode: the last `Op` node in its body.
    pub fn terminal_opcode(&self) -> Option<&str> {
        self.body.iter().rev().find_map(|node| match node {
            BodyNode::Op { opcode, .. } => Some(opcode.as_str()),
            BodyNode::Arg(_) => None,
        })
    }

    /// `noout` rules have an empty return-type list.
    pub fn is_noout(&self) -> bool {
        self.ret_types.is_empty()
    }
}

fn parse_types(field: &str) -> Option<Vec<ValueType>> {
    if field.trim().is_empty() {
        return Some(Vec::new());
    }
    field
        .split(',')
        .map(|name| ValueType::from_name(name.trim()))
        .collect()
}

fn parse_body(field: &str, line: usize) -> Result<Vec<BodyNode>, RuleLoadError> {
    let mut body = Vec::new();
    for token in field.split_whitespace() {
        if let Some(idx) = token.strip_prefix("arg:") {
            let idx: u32 = idx.parse().map_err(|_| RuleLoadError {
                line,
                reason: alloc::format!("bad arg index in `{token}`"),
            })?;
            body.push(BodyNode::Arg(idx));
            continue;
        }
        let open = token.find('(').ok_or_else(|| RuleLoadError {
            line,
            reason: alloc::format!("expected `opcode(...)`, got `{token}`"),
        })?;
        if !token.ends_with(')') {
            return Err(RuleLoadError {
                line,
                reason: alloc::format!("unterminated operand list in `{token}`"),
            });
        }
        let opcode = token[..open].to_string();
        let inner = &token[open + 1..token.len() - 1];
        let mut opargs = Vec::new();
        if !inner.is_empty() {
            for part in inner.split(',') {
                let idx: u32 = part.trim().parse().map_err(|_| RuleLoadError {
                    line,
                    reason: alloc::format!("bad oparg index in `{token}`"),
                })?;
                opargs.push(idx);
            }
        }
        body.push(BodyNode::Op { opcode, opargs });
    }
    if body.is_empty() {
        return Err(RuleLoadError {
            line,
            reason: "empty rule body".to_string(),
        });
    }
    Ok(body)
}

fn parse_conds(
    field: &str,
    line: usize,
) -> Result<BTreeMap<u32, ConditionExpr>, RuleLoadError> {
    let mut conds = BTreeMap::new();
    if field.trim().is_empty() {
        return Ok(conds);
    }
    for entry in field.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (slot, rest) = entry.split_once(':').ok_or_else(|| RuleLoadError {
            line,
            reason: alloc::format!("expected `slot:cond`, got `{entry}`"),
        })?;
        let slot: u32 = slot.trim().parse().map_err(|_| RuleLoadError {
            line,
            reason: alloc::format!("bad oparg slot in `{entry}`"),
        })?;
        let (name, args) = match rest.find('(') {
            Some(open) if rest.ends_with(')') => {
                let inner = &rest[open + 1..rest.len() - 1];
                let args: Vec<&str> = if inner.is_empty() {
                    Vec::new()
                } else {
                    inner.split(',').map(str::trim).collect()
                };
                (&rest[..open], args)
            }
            _ => (rest, Vec::new()),
        };
        let condition = Condition::parse(name.trim(), &args).ok_or_else(|| RuleLoadError {
            line,
            reason: alloc::format!("malformed condition `{rest}`"),
        })?;
        conds.entry(slot).or_insert_with(ConditionExpr::default).conditions.push(condition);
    }
    Ok(conds)
}

/// Parses a full corpus. Returns the successfully-parsed rules plus one
/// [`RuleLoadError`] per skipped line, in source order (§7: no line ever
/// aborts the whole load).
pub fn parse_corpus(text: &str) -> (Vec<InstrNode>, Vec<RuleLoadError>) {
    let mut rules = Vec::new();
    let mut errors = Vec::new();
    for (offset, raw_line) in text.lines().enumerate() {
        let line_no = offset + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line, line_no) {
            Ok(rule) => rules.push(rule),
            Err(error) => errors.push(error),
        }
    }
    (rules, errors)
}

fn parse_line(line: &str, line_no: usize) -> Result<InstrNode, RuleLoadError> {
    let fields: Vec<&str> = line.splitn(4, '|').collect();
    let [params, rets, body, conds] = <[&str; 4]>::try_from(fields.as_slice())
        .map_err(|_| RuleLoadError {
            line: line_no,
            reason: "expected 4 `|`-separated fields".to_string(),
        })?;

    let param_types = parse_types(params).ok_or_else(|| RuleLoadError {
        line: line_no,
        reason: "unrecognized value type in param_types".to_string(),
    })?;
    let ret_types = parse_types(rets).ok_or_else(|| RuleLoadError {
        line: line_no,
        reason: "unrecognized value type in ret_types".to_string(),
    })?;
    if ret_types.len() > 1 {
        return Err(RuleLoadError {
            line: line_no,
            reason: "at most one return type is supported".to_string(),
        });
    }
    let body = parse_body(body, line_no)?;
    let conds = parse_conds(conds, line_no)?;

    Ok(InstrNode {
        param_types,
        ret_types,
        body,
        conds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_binary_rule() {
        let (rules, errors) = parse_corpus("i32,i32|i32|arg:0 arg:1 i32.add(0,1)|");
        assert!(errors.is_empty());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].param_types, alloc::vec![ValueType::I32, ValueType::I32]);
        assert_eq!(rules[0].terminal_opcode(), Some("i32.add"));
    }

    #[test]
    fn parses_noout_rule_with_conditions() {
        let (rules, errors) =
            parse_corpus("i32||arg:0 i32.store(0,1)|0:_nonzero;1:lt(256)");
        assert!(errors.is_empty());
        let rule = &rules[0];
        assert!(rule.is_noout());
        assert_eq!(rule.conds[&0].conditions, alloc::vec![Condition::Nonzero]);
        assert_eq!(rule.conds[&1].conditions, alloc::vec![Condition::Lt(256)]);
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let (rules, errors) = parse_corpus("garbage\ni32||arg:0 i32.eqz(0)|");
        assert_eq!(rules.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 1);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let (rules, errors) = parse_corpus("# a comment\n\ni32||arg:0 i32.eqz(0)|");
        assert_eq!(rules.len(), 1);
        assert!(errors.is_empty());
    }
}

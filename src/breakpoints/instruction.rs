//! Instruction breakpoints keyed by address

use std::collections::{HashMap, HashSet};

use crate::common::{Error, Result};
use crate::dap::{Breakpoint, InstructionBreakpointArgument};
use crate::engine::{BreakpointId, DebugEngine};

use super::classify_stop;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionBreakpoint {
    pub id: BreakpointId,
    pub address: u64,
    pub instruction_reference: String,
    pub offset: i64,
}

impl InstructionBreakpoint {
    pub fn to_dap(&self) -> Breakpoint {
        Breakpoint {
            id: Some(self.id),
            verified: true,
            message: None,
            instruction_reference: Some(format!("{:#x}", self.address)),
        }
    }
}

#[derive(Debug, Default)]
pub struct InstructionBreakpoints {
    by_address: HashMap<u64, InstructionBreakpoint>,
}

impl InstructionBreakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, breakpoint: InstructionBreakpoint) -> Option<InstructionBreakpoint> {
        self.by_address.insert(breakpoint.address, breakpoint)
    }

    pub fn remove_address(&mut self, address: u64) -> Option<InstructionBreakpoint> {
        self.by_address.remove(&address)
    }

    pub fn get_by_id(&self, id: BreakpointId) -> Option<&InstructionBreakpoint> {
        self.by_address.values().find(|bp| bp.id == id)
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Replace the whole set with the requested breakpoints
    ///
    /// Breakpoints at addresses that are requested again are kept as they
    /// are; the rest are removed from the engine.
    pub fn set<E: DebugEngine>(
        &mut self,
        engine: &E,
        requested: &[InstructionBreakpointArgument],
    ) -> Result<Vec<Breakpoint>> {
        let resolved: Vec<_> = requested
            .iter()
            .map(|arg| resolve_address(&arg.instruction_reference, arg.offset))
            .collect();

        let keep: HashSet<u64> = resolved.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        let stale: Vec<u64> = self
            .by_address
            .keys()
            .filter(|address| !keep.contains(address))
            .copied()
            .collect();
        for address in stale {
            if let Some(bp) = self.by_address.remove(&address) {
                engine.remove_breakpoint(bp.id)?;
            }
        }

        let mut breakpoints = Vec::with_capacity(requested.len());
        for (arg, address) in requested.iter().zip(resolved) {
            let address = match address {
                Ok(address) => address,
                Err(e) => {
                    breakpoints.push(Breakpoint {
                        id: None,
                        verified: false,
                        message: Some(e.to_string()),
                        instruction_reference: Some(arg.instruction_reference.clone()),
                    });
                    continue;
                }
            };

            if let Some(existing) = self.by_address.get(&address) {
                breakpoints.push(existing.to_dap());
                continue;
            }

            let id = engine.create_address_breakpoint(address)?;
            tracing::debug!(id, address, "Created instruction breakpoint");
            let bp = InstructionBreakpoint {
                id,
                address,
                instruction_reference: arg.instruction_reference.clone(),
                offset: arg.offset,
            };
            breakpoints.push(bp.to_dap());
            self.insert(bp);
        }

        Ok(breakpoints)
    }

    /// The instruction breakpoint responsible for a stop, if every hit is one
    pub fn from_stop_reason(&self, data: &[u64]) -> Option<&InstructionBreakpoint> {
        classify_stop(data, |id| self.get_by_id(id))
    }
}

/// Parse an instruction reference (`0x` hex or decimal) and apply the offset
pub fn resolve_address(reference: &str, offset: i64) -> Result<u64> {
    let reference = reference.trim();
    let base = match reference
        .strip_prefix("0x")
        .or_else(|| reference.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => reference.parse::<u64>(),
    }
    .map_err(|_| Error::invalid_arguments(format!("invalid instruction reference '{reference}'")))?;

    base.checked_add_signed(offset).ok_or_else(|| {
        Error::invalid_arguments(format!(
            "instruction reference '{reference}' with offset {offset} is out of range"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;

    fn arg(reference: &str, offset: i64) -> InstructionBreakpointArgument {
        InstructionBreakpointArgument {
            instruction_reference: reference.to_string(),
            offset,
        }
    }

    #[test]
    fn test_resolve_address() {
        assert_eq!(resolve_address("0x1000", 0).unwrap(), 0x1000);
        assert_eq!(resolve_address("4096", 4).unwrap(), 4100);
        assert_eq!(resolve_address("0x10", -16).unwrap(), 0);
        assert!(resolve_address("0x10", -17).is_err());
        assert!(resolve_address("main", 0).is_err());
    }

    #[test]
    fn test_set_replaces_previous_breakpoints() {
        let engine = MockEngine::new();
        let mut table = InstructionBreakpoints::new();

        let first = table
            .set(&engine, &[arg("0x1000", 0), arg("0x2000", 0)])
            .unwrap();
        assert!(first.iter().all(|bp| bp.verified));
        assert_eq!(engine.breakpoints().len(), 2);

        let second = table.set(&engine, &[arg("0x1000", 0)]).unwrap();
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(table.len(), 1);
        assert_eq!(engine.breakpoints().len(), 1);
    }

    #[test]
    fn test_invalid_reference_is_unverified() {
        let engine = MockEngine::new();
        let mut table = InstructionBreakpoints::new();

        let result = table.set(&engine, &[arg("nowhere", 0)]).unwrap();
        assert!(!result[0].verified);
        assert!(result[0].message.as_deref().unwrap().contains("nowhere"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_stop_classification() {
        let engine = MockEngine::new();
        let mut table = InstructionBreakpoints::new();
        table.set(&engine, &[arg("0x1000", 0)]).unwrap();
        let id = table.by_address[&0x1000].id;

        assert_eq!(table.from_stop_reason(&[id as u64, 1]).unwrap().address, 0x1000);
        assert!(table.from_stop_reason(&[id as u64, 1, 99, 1]).is_none());

        table.remove_address(0x1000);
        assert!(table.get_by_id(id).is_none());
    }
}

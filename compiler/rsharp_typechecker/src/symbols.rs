//! Symbol tables: variable and function descriptors behind typed ids

use crate::types::RsType;
use serde::{Deserialize, Serialize};

/// Handle into the variable table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

/// Handle into the function table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub u32);

/// Everything the compiler knows about one variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub ty: RsType,
    pub is_global: bool,
    /// Set when `$var` appears anywhere; forces the variable onto the stack
    pub address_taken: bool,
}

/// Everything the compiler knows about one function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub return_type: RsType,
    pub param_types: Vec<RsType>,
    pub is_extern: bool,
}

/// Arena of variable descriptors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarTable {
    vars: Vec<VariableInfo>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, info: VariableInfo) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(info);
        id
    }

    pub fn get(&self, id: VarId) -> &VariableInfo {
        &self.vars[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: VarId) -> &mut VariableInfo {
        &mut self.vars[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len() as u32).map(VarId)
    }
}

/// Arena of function descriptors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuncTable {
    funcs: Vec<FunctionInfo>,
}

impl FuncTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, info: FunctionInfo) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(info);
        id
    }

    pub fn get(&self, id: FuncId) -> &FunctionInfo {
        &self.funcs[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (FuncId, &FunctionInfo)> {
        self.funcs
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    pub fn find_by_name(&self, name: &str) -> Option<FuncId> {
        self.funcs
            .iter()
            .position(|f| f.name == name)
            .map(|i| FuncId(i as u32))
    }
}

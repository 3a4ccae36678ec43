//! Registry of the functions this dll exports. Every `#[vba_func]` submits an
//! [`Export`] record at link time; [`declarations`] renders them as the VBA
//! `Declare` statements a workbook module needs in order to call them.

use crate::cell::HostCell;
use crate::grid::{HostValue, ReturnedGrid};
use crate::text::{BstrText, HeapText, NarrowText, WideText};

/// How a Rust parameter type appears in a VBA `Declare` statement.
pub trait VbaParam {
    const PASSING: &'static str;
    const VBA_TYPE: &'static str;
}

/// How a Rust return type appears in a VBA `Declare` statement. `None` makes
/// the declaration a `Sub`.
pub trait VbaReturn {
    const VBA_TYPE: Option<&'static str>;
}

impl VbaParam for HostValue {
    const PASSING: &'static str = "ByRef";
    const VBA_TYPE: &'static str = "Variant";
}

impl VbaParam for HostCell {
    const PASSING: &'static str = "ByVal";
    const VBA_TYPE: &'static str = "Variant";
}

impl VbaParam for NarrowText {
    const PASSING: &'static str = "ByVal";
    const VBA_TYPE: &'static str = "String";
}

impl VbaParam for WideText {
    const PASSING: &'static str = "ByVal";
    const VBA_TYPE: &'static str = "LongPtr";
}

impl VbaParam for BstrText {
    const PASSING: &'static str = "ByVal";
    const VBA_TYPE: &'static str = "LongPtr";
}

impl VbaReturn for ReturnedGrid {
    const VBA_TYPE: Option<&'static str> = Some("Variant");
}

impl VbaReturn for BstrText {
    const VBA_TYPE: Option<&'static str> = Some("String");
}

impl VbaReturn for HeapText {
    const VBA_TYPE: Option<&'static str> = Some("LongPtr");
}

impl VbaReturn for () {
    const VBA_TYPE: Option<&'static str> = None;
}

#[derive(Debug)]
pub struct ParamInfo {
    pub name: &'static str,
    pub passing: &'static str,
    pub vba_type: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct Export {
    pub name: &'static str,
    pub params: &'static [ParamInfo],
    pub returns: Option<&'static str>,
    pub description: &'static str,
}

inventory::collect!(Export);

/// All registered exports, sorted by name.
pub fn exports() -> Vec<&'static Export> {
    let mut all: Vec<&'static Export> = inventory::iter::<Export>.into_iter().collect();
    all.sort_by_key(|e| e.name);
    all
}

pub fn find(name: &str) -> Option<&'static Export> {
    inventory::iter::<Export>
        .into_iter()
        .find(|e| e.name == name)
}

impl Export {
    /// One `Declare` statement for this export, against the dll `lib`.
    pub fn declare(&self, lib: &str) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("{} {} As {}", p.passing, p.name, p.vba_type))
            .collect::<Vec<_>>()
            .join(", ");
        match self.returns {
            Some(ret) => format!(
                "Public Declare PtrSafe Function {} Lib \"{}\" ({}) As {}",
                self.name, lib, params, ret
            ),
            None => format!(
                "Public Declare PtrSafe Sub {} Lib \"{}\" ({})",
                self.name, lib, params
            ),
        }
    }
}

/// Renders a standard module declaring every export, each preceded by its
/// description as a comment.
pub fn declarations(lib: &str) -> String {
    let mut out = String::from("Attribute VB_Name = \"VbaBridge\"\r\nOption Explicit\r\n");
    for export in exports() {
        out.push_str("\r\n");
        if !export.description.is_empty() {
            out.push_str(&format!("' {}\r\n", export.description));
        }
        for p in export.params.iter().filter(|p| !p.description.is_empty()) {
            out.push_str(&format!("'   {}: {}\r\n", p.name, p.description));
        }
        out.push_str(&export.declare(lib));
        out.push_str("\r\n");
    }
    out
}

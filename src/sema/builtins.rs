// src/sema/builtins.rs
//! Host-registered builtin modules: `print`, `math`, `world`.
//! The analyzer dispatches calls to these in `exprs.rs`; this module
//! only names them and lists each module's exports.

/// One native function the analyzer knows how to lower
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFunc {
    PrintTell,
    PrintTitle,
    PrintTitleClear,
    MathRandint,
    MathMin,
    MathMax,
    MathPow,
    WorldSetblock,
    WorldFill,
    WorldTp,
}

impl BuiltinFunc {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PrintTell => "tell",
            Self::PrintTitle => "title",
            Self::PrintTitleClear => "title_clear",
            Self::MathRandint => "randint",
            Self::MathMin => "min",
            Self::MathMax => "max",
            Self::MathPow => "pow",
            Self::WorldSetblock => "setblock",
            Self::WorldFill => "fill",
            Self::WorldTp => "tp",
        }
    }
}

/// What a builtin module exports under one name
#[derive(Debug, Clone, Copy)]
pub enum BuiltinExport {
    Func(BuiltinFunc),
    Str(&'static str),
}

/// The export table of a builtin module, or None when no builtin of
/// that name exists (the loader then looks for a source file).
pub fn builtin_module_exports(name: &str) -> Option<&'static [(&'static str, BuiltinExport)]> {
    use BuiltinExport::*;
    use BuiltinFunc::*;
    match name {
        "print" => Some(&[
            ("tell", Func(PrintTell)),
            ("title", Func(PrintTitle)),
            ("title_clear", Func(PrintTitleClear)),
            ("TITLE", Str("title")),
            ("SUBTITLE", Str("subtitle")),
            ("ACTIONBAR", Str("actionbar")),
        ]),
        "math" => Some(&[
            ("randint", Func(MathRandint)),
            ("min", Func(MathMin)),
            ("max", Func(MathMax)),
            ("pow", Func(MathPow)),
        ]),
        "world" => Some(&[
            ("setblock", Func(WorldSetblock)),
            ("fill", Func(WorldFill)),
            ("tp", Func(WorldTp)),
        ]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_modules_export() {
        assert!(builtin_module_exports("print").is_some());
        assert!(builtin_module_exports("math").is_some());
        assert!(builtin_module_exports("world").is_some());
        assert!(builtin_module_exports("music").is_none());
    }

    #[test]
    fn print_exports_tell_and_modes() {
        let exports = builtin_module_exports("print").unwrap();
        assert!(exports.iter().any(|(n, _)| *n == "tell"));
        assert!(
            exports
                .iter()
                .any(|(n, e)| *n == "ACTIONBAR" && matches!(e, BuiltinExport::Str("actionbar")))
        );
    }
}

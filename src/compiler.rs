// src/compiler.rs
//! Pipeline orchestration: source text in, function-file tree out.

use std::path::Path;

use tracing::debug;

use crate::codegen::output::Output;
use crate::errors::{CompileError, EmitError};
use crate::frontend::Parser;
use crate::module::ModuleLoader;
use crate::sema::Analyzer;

/// Compilation options (spec surface plus output naming).
#[derive(Debug, Clone)]
pub struct Config {
    pub scoreboard: String,
    /// Path under the behavior pack's functions root, `/`-separated;
    /// empty means the root itself
    pub function_folder: String,
    pub main_file: String,
    /// None sinks init commands into the main file
    pub init_file: Option<String>,
    pub internal_folder: String,
    pub entity_tag_prefix: String,
    pub debug_comments: bool,
    /// Conditional-call inlining on/off
    pub optimize: bool,
    pub override_old: bool,
    pub encoding: String,
    pub verbose: bool,
    /// Largest guarded body inlined into an execute chain
    pub max_inline: usize,
    pub mc_version: (u32, u32, u32),
    pub education_edition: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scoreboard: "acacia".to_string(),
            function_folder: String::new(),
            main_file: "main".to_string(),
            init_file: Some("init".to_string()),
            internal_folder: "_acacia".to_string(),
            entity_tag_prefix: "acacia_".to_string(),
            debug_comments: false,
            optimize: true,
            override_old: false,
            encoding: "utf-8".to_string(),
            verbose: false,
            max_inline: 20,
            mc_version: (1, 19, 80),
            education_edition: false,
        }
    }
}

/// A failed compilation: the diagnostic plus the source unit it points
/// into (imported modules carry their own text).
#[derive(Debug)]
pub struct Failure {
    pub error: CompileError,
    pub source_name: String,
    pub source_text: String,
}

impl Failure {
    pub fn into_report(self) -> miette::Report {
        miette::Report::new(self.error)
            .with_source_code(miette::NamedSource::new(self.source_name, self.source_text))
    }
}

/// Compile one source unit. `name` is the unit's display name for
/// diagnostics; `base_dir` resolves its imports.
pub fn compile_source_with_base(
    source: &str,
    name: &str,
    base_dir: Option<&Path>,
    config: &Config,
) -> Result<Output, Failure> {
    let fail = |error: CompileError| Failure {
        error,
        source_name: name.to_string(),
        source_text: source.to_string(),
    };

    debug!(unit = name, "lexing and parsing");
    let mut parser = Parser::new(source).map_err(fail)?;
    let program = parser.parse_program().map_err(fail)?;

    debug!(unit = name, "analyzing");
    let loader = ModuleLoader::new(base_dir.map(Path::to_path_buf));
    let mut analyzer = Analyzer::new(config, parser.into_interner(), loader);
    if let Err(error) = analyzer.analyze(&program) {
        let (source_name, source_text) = analyzer
            .error_source
            .take()
            .unwrap_or_else(|| (name.to_string(), source.to_string()));
        return Err(Failure {
            error,
            source_name,
            source_text,
        });
    }
    analyzer.finish().map_err(fail)
}

/// Compile an in-memory source unit (imports unavailable).
pub fn compile_source(source: &str, name: &str, config: &Config) -> Result<Output, Failure> {
    compile_source_with_base(source, name, None, config)
}

/// Compile a source file; sibling files are importable.
pub fn compile_file(path: &Path, config: &Config) -> Result<Output, Failure> {
    let name = path.display().to_string();
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            return Err(Failure {
                error: CompileError::Emit(EmitError::Io(e)),
                source_name: name,
                source_text: String::new(),
            });
        }
    };
    compile_source_with_base(&source, &name, path.parent(), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_cli_defaults() {
        let config = Config::default();
        assert_eq!(config.scoreboard, "acacia");
        assert_eq!(config.main_file, "main");
        assert_eq!(config.init_file.as_deref(), Some("init"));
        assert_eq!(config.max_inline, 20);
        assert!(config.optimize);
    }

    #[test]
    fn trivial_unit_compiles() {
        let output = compile_source("x = 1 + 2\n", "main.aca", &Config::default()).unwrap();
        let init = output.file_text("init").unwrap();
        assert!(init.contains("scoreboard objectives add acacia dummy"));
        assert!(init.contains("scoreboard players set acacia1 acacia 3"));
        assert_eq!(output.file_text("main").unwrap(), "");
    }

    #[test]
    fn failure_carries_source() {
        let failure = compile_source("x = \"oops\nnext\n", "main.aca", &Config::default())
            .expect_err("unclosed string");
        assert_eq!(failure.source_name, "main.aca");
        assert!(failure.source_text.contains("oops"));
    }
}

// src/cli/mod.rs

use std::path::PathBuf;

use clap::Parser;

use crate::compiler::Config;

/// Acacia language compiler
#[derive(Parser, Debug)]
#[command(name = "acacia")]
#[command(version = "0.1.0")]
#[command(about = "Compile Acacia source to Minecraft Bedrock .mcfunction files", long_about = None)]
pub struct Cli {
    /// Path to the .aca source file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "acacia_out", value_name = "DIR")]
    pub out: PathBuf,

    /// Target Minecraft version
    #[arg(long, value_name = "X.Y.Z", default_value = "1.19.80")]
    pub mc_version: String,

    /// Target Education Edition
    #[arg(long)]
    pub education_edition: bool,

    /// Scoreboard objective used for variables
    #[arg(long, default_value = "acacia")]
    pub scoreboard: String,

    /// Folder path under the functions root ('/'-separated)
    #[arg(long, default_value = "")]
    pub function_folder: String,

    /// Name of the main function file
    #[arg(long, default_value = "main")]
    pub main_file: String,

    /// Name of the init function file; empty sinks init into main
    #[arg(long, default_value = "init")]
    pub init_file: String,

    /// Folder for internal helper files
    #[arg(long, default_value = "_acacia")]
    pub internal_folder: String,

    /// Prefix for generated entity tags
    #[arg(long, default_value = "acacia_", value_name = "PREFIX")]
    pub entity_tag: String,

    /// Write explanatory comments into generated files
    #[arg(long)]
    pub debug_comments: bool,

    /// Disable conditional-call inlining
    #[arg(long)]
    pub no_optimize: bool,

    /// Delete previous output directory contents first
    #[arg(long)]
    pub override_old: bool,

    /// Source file encoding
    #[arg(long, default_value = "utf-8")]
    pub encoding: String,

    /// Verbose compiler logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Largest guarded body inlined into an execute chain
    #[arg(long, default_value_t = 20, value_name = "N")]
    pub max_inline: usize,
}

/// A rejected option value; rendered as
/// `Acacia: error: option <name>: <reason>`.
#[derive(Debug, PartialEq, Eq)]
pub struct OptionError {
    pub name: &'static str,
    pub reason: String,
}

impl std::fmt::Display for OptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Acacia: error: option {}: {}", self.name, self.reason)
    }
}

fn check_identifier(name: &'static str, value: &str) -> Result<(), OptionError> {
    if value.is_empty() {
        return Err(OptionError {
            name,
            reason: "must not be empty".to_string(),
        });
    }
    if value.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(OptionError {
            name,
            reason: "must not start with a digit".to_string(),
        });
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(OptionError {
            name,
            reason: format!("invalid character '{}'", bad),
        });
    }
    Ok(())
}

fn check_folder(name: &'static str, value: &str) -> Result<(), OptionError> {
    for segment in value.split('/') {
        check_identifier(name, segment)?;
    }
    Ok(())
}

/// Validate option values and build the compiler configuration.
pub fn build_config(cli: &Cli) -> Result<Config, OptionError> {
    check_identifier("--scoreboard", &cli.scoreboard)?;
    check_identifier("--entity-tag", &cli.entity_tag)?;
    check_identifier("--main-file", &cli.main_file)?;
    check_identifier("--internal-folder", &cli.internal_folder)?;
    if !cli.init_file.is_empty() {
        check_identifier("--init-file", &cli.init_file)?;
    }
    if !cli.function_folder.is_empty() {
        check_folder("--function-folder", &cli.function_folder)?;
    }

    let encoding = cli.encoding.to_ascii_lowercase();
    if encoding != "utf-8" && encoding != "utf8" {
        return Err(OptionError {
            name: "--encoding",
            reason: format!("unsupported encoding '{}'", cli.encoding),
        });
    }

    let mc_version = parse_version(&cli.mc_version).ok_or_else(|| OptionError {
        name: "--mc-version",
        reason: format!("expected X.Y.Z, got '{}'", cli.mc_version),
    })?;

    Ok(Config {
        scoreboard: cli.scoreboard.clone(),
        function_folder: cli.function_folder.clone(),
        main_file: cli.main_file.clone(),
        init_file: if cli.init_file.is_empty() {
            None
        } else {
            Some(cli.init_file.clone())
        },
        internal_folder: cli.internal_folder.clone(),
        entity_tag_prefix: cli.entity_tag.clone(),
        debug_comments: cli.debug_comments,
        optimize: !cli.no_optimize,
        override_old: cli.override_old,
        encoding: "utf-8".to_string(),
        verbose: cli.verbose,
        max_inline: cli.max_inline,
        mc_version,
        education_edition: cli.education_edition,
    })
}

fn parse_version(text: &str) -> Option<(u32, u32, u32)> {
    let mut parts = text.split('.');
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    fn cli(extra: &[&str]) -> Cli {
        let mut argv = vec!["acacia", "main.aca"];
        argv.extend_from_slice(extra);
        Cli::parse_from(argv)
    }

    #[test]
    fn defaults_build() {
        let config = build_config(&cli(&[])).unwrap();
        assert_eq!(config.scoreboard, "acacia");
        assert_eq!(config.init_file.as_deref(), Some("init"));
        assert_eq!(config.mc_version, (1, 19, 80));
    }

    #[test]
    fn empty_scoreboard_rejected() {
        let err = build_config(&cli(&["--scoreboard", ""])).unwrap_err();
        assert_eq!(err.name, "--scoreboard");
        assert!(err.to_string().starts_with("Acacia: error: option"));
    }

    #[test]
    fn digit_leading_identifier_rejected() {
        let err = build_config(&cli(&["--scoreboard", "1abc"])).unwrap_err();
        assert!(err.reason.contains("digit"));
    }

    #[test]
    fn invalid_identifier_char_rejected() {
        let err = build_config(&cli(&["--entity-tag", "a b"])).unwrap_err();
        assert!(err.reason.contains("invalid character"));
    }

    #[test]
    fn function_folder_segments_validated() {
        assert!(build_config(&cli(&["--function-folder", "my/pack"])).is_ok());
        assert!(build_config(&cli(&["--function-folder", "my//pack"])).is_err());
    }

    #[test]
    fn empty_init_file_sinks_into_main() {
        let config = build_config(&cli(&["--init-file", ""])).unwrap();
        assert!(config.init_file.is_none());
    }

    #[test]
    fn bad_version_rejected() {
        assert!(build_config(&cli(&["--mc-version", "1.19"])).is_err());
        assert!(build_config(&cli(&["--mc-version", "1.19.80.1"])).is_err());
        assert!(build_config(&cli(&["--mc-version", "x.y.z"])).is_err());
    }

    #[test]
    fn unsupported_encoding_rejected() {
        let err = build_config(&cli(&["--encoding", "gbk"])).unwrap_err();
        assert_eq!(err.name, "--encoding");
    }
}
